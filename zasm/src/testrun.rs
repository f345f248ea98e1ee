//! Executes `#test` segments on the embedded interpreter after a clean
//! assembly: code segments are loaded into the 64 KiB core, registers are
//! seeded from the preamble, and the final state is compared against the
//! segment's expectations.

use crate::asm::Assembler;
use crate::error::ErrorKind;
use crate::segments::{SegmentKind, DEFAULT_TEST_CYCLES};
use crate::value::Value;
use z80::{CpuCycle, CpuKind, Processor, StopReason};

impl Assembler {
    pub(crate) fn run_tests(&mut self) {
        for index in 0..self.segments.len() {
            if self.segments[index].kind.is_test() {
                self.run_one_test(index);
            }
        }
    }

    fn check_resolved(&mut self, v: Value, what: &str, loc: crate::source::Location) -> Option<i32> {
        if v.is_valid() {
            Some(v.value)
        } else {
            self.error_at(
                ErrorKind::Runtime,
                format!("{} did not resolve to a final value", what),
                loc,
            );
            None
        }
    }

    fn run_one_test(&mut self, index: usize) {
        let seg_loc = self.segments[index].declared_at;
        let seg_name = self.segments[index].name.clone();

        // The test runs with Z80 semantics; 8080 code is a subset.
        let cpu = match self.cpu {
            CpuKind::Z180 => CpuKind::Z180,
            _ => CpuKind::Z80,
        };
        let mut p = Processor::new(cpu);
        p.ixcbr2_enabled = self.opts.ixcbr2_enabled;
        p.ixcbxh_enabled = self.opts.ixcbxh_enabled;

        // Code segments first, then the test code itself.
        for seg in &self.segments {
            if let SegmentKind::Code = seg.kind {
                p.core.load(seg.address.value as u16, &seg.buf);
            }
        }
        let address = self.segments[index].address.value as u16;
        p.core.load(address, &self.segments[index].buf);
        p.regs.pc = address;

        let spec = match &self.segments[index].kind {
            SegmentKind::Test(spec) => spec.clone(),
            _ => return,
        };

        let cycles: CpuCycle = match spec.cycle_limit {
            Some(v) => match self.check_resolved(v, "test cycle limit", seg_loc) {
                Some(n) if n > 0 => n,
                Some(n) => {
                    self.error_at(
                        ErrorKind::Runtime,
                        format!("bad test cycle limit {}", n),
                        seg_loc,
                    );
                    return;
                }
                None => return,
            },
            None => DEFAULT_TEST_CYCLES,
        };

        for (reg, v, loc) in &spec.seeds {
            if let Some(n) = self.check_resolved(*v, "seed value", *loc) {
                p.regs.set(*reg, n as u16);
            }
        }

        let stop = p.run(cycles);
        match stop {
            StopReason::TimeOut if p.halted() => {}
            StopReason::TimeOut => {
                self.error_at(
                    ErrorKind::Runtime,
                    format!(
                        "test '{}' did not halt within {} cycles",
                        seg_name, cycles
                    ),
                    seg_loc,
                );
                return;
            }
            StopReason::BreakPoint => {}
            StopReason::IllegalInstruction => {
                self.error_at(
                    ErrorKind::Runtime,
                    format!(
                        "test '{}' hit an illegal instruction near pc=${:04X}",
                        seg_name, p.regs.pc
                    ),
                    seg_loc,
                );
                return;
            }
            StopReason::UnsupportedIntAckByte => {
                self.error_at(
                    ErrorKind::Runtime,
                    format!("test '{}' raised an unsupported interrupt acknowledge", seg_name),
                    seg_loc,
                );
                return;
            }
        }

        for (reg, v, loc) in &spec.expects {
            if let Some(expected) = self.check_resolved(*v, "expected value", *loc) {
                let actual = p.regs.get(*reg);
                if actual != expected as u16 {
                    self.error_at(
                        ErrorKind::Runtime,
                        format!(
                            "{:?} is ${:04X}, expected ${:04X}",
                            reg, actual, expected as u16
                        ),
                        *loc,
                    );
                }
            }
        }
        for (addr, bytes, loc) in &spec.expect_mem {
            let base = match self.check_resolved(*addr, "expected address", *loc) {
                Some(a) => a as u16,
                None => continue,
            };
            for (offset, v) in bytes.iter().enumerate() {
                if let Some(expected) = self.check_resolved(*v, "expected byte", *loc) {
                    let at = base.wrapping_add(offset as u16);
                    let actual = p.core.peek(at);
                    if actual != expected as u8 {
                        self.error_at(
                            ErrorKind::Runtime,
                            format!(
                                "memory at ${:04X} is ${:02X}, expected ${:02X}",
                                at, actual, expected as u8
                            ),
                            *loc,
                        );
                    }
                }
            }
        }
    }
}
