//! CB-prefixed bit operations, including the DDCB/FDCB indexed forms and
//! their illegal register-result variants.

use super::{Index, Processor, StopReason};
use crate::constants::{CF, HF, PF, SF, XF, YF, ZF};
use crate::CpuKind;

impl Processor {
    fn bit_test(&mut self, bit: u8, v: u8) {
        let res = v & (1 << bit);
        let mut f = (self.regs.f & CF) | HF | (v & (YF | XF));
        if res == 0 {
            f |= ZF | PF;
        }
        if res & 0x80 != 0 {
            f |= SF;
        }
        self.regs.f = f;
    }

    pub(crate) fn exec_cb(&mut self, idx: Index) -> Result<(), StopReason> {
        if idx == Index::Hl {
            self.exec_cb_plain()
        } else {
            self.exec_cb_indexed(idx)
        }
    }

    fn exec_cb_plain(&mut self) -> Result<(), StopReason> {
        let op = self.fetch_m1();
        let kind = op >> 6;
        let bit = (op >> 3) & 7;
        let code = op & 7;
        match kind {
            0 => {
                // SLL is an illegal the Z180 traps.
                if bit == 6 && self.cpu_kind == CpuKind::Z180 {
                    return Err(StopReason::IllegalInstruction);
                }
                if code == 6 {
                    self.cc += 15;
                    let addr = self.regs.hl();
                    let v = self.core.peek(addr);
                    let res = self.rot8(bit, v);
                    self.core.poke(addr, res);
                } else {
                    self.cc += 8;
                    let v = self.get_r_plain(code);
                    let res = self.rot8(bit, v);
                    self.set_r_plain(code, res);
                }
            }
            1 => {
                let v = if code == 6 {
                    self.cc += 12;
                    self.core.peek(self.regs.hl())
                } else {
                    self.cc += 8;
                    self.get_r_plain(code)
                };
                self.bit_test(bit, v);
            }
            _ => {
                let mask = 1u8 << bit;
                if code == 6 {
                    self.cc += 15;
                    let addr = self.regs.hl();
                    let v = self.core.peek(addr);
                    let res = if kind == 2 { v & !mask } else { v | mask };
                    self.core.poke(addr, res);
                } else {
                    self.cc += 8;
                    let v = self.get_r_plain(code);
                    let res = if kind == 2 { v & !mask } else { v | mask };
                    self.set_r_plain(code, res);
                }
            }
        }
        Ok(())
    }

    /// DDCB/FDCB: the displacement byte sits between the prefix and the
    /// final opcode. Non-BIT forms with a register code also copy the
    /// memory result into that register, which needs `ixcbr2_enabled`.
    fn exec_cb_indexed(&mut self, idx: Index) -> Result<(), StopReason> {
        let d = self.fetch_byte() as i8;
        let base = if idx == Index::Ix {
            self.regs.ix()
        } else {
            self.regs.iy()
        };
        let addr = base.wrapping_add(d as i16 as u16);
        let op = self.fetch_byte();
        let kind = op >> 6;
        let bit = (op >> 3) & 7;
        let code = op & 7;

        if kind == 1 {
            // BIT ignores the register code entirely.
            self.cc += 16;
            let v = self.core.peek(addr);
            self.bit_test(bit, v);
            return Ok(());
        }

        if code != 6 && !(self.ixcbr2_enabled && self.cpu_kind == CpuKind::Z80) {
            return Err(StopReason::IllegalInstruction);
        }
        if kind == 0 && bit == 6 && self.cpu_kind == CpuKind::Z180 {
            return Err(StopReason::IllegalInstruction);
        }

        self.cc += 19;
        let v = self.core.peek(addr);
        let res = match kind {
            0 => self.rot8(bit, v),
            2 => v & !(1 << bit),
            _ => v | (1 << bit),
        };
        self.core.poke(addr, res);
        if code != 6 {
            self.set_r_plain(code, res);
        }
        Ok(())
    }
}
