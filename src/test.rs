use crate::constants::*;
use crate::*;

mod instructions;

/// Loads `program` at address 0 and runs it with the given cycle budget.
fn run_bytes(program: &[u8], cc_exit: CpuCycle) -> (Processor, StopReason) {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0, program);
    let stop = p.run(cc_exit);
    (p, stop)
}

/// Runs a program that is expected to reach HALT within the budget.
fn exec(program: &[u8]) -> Processor {
    let (p, stop) = run_bytes(program, 10_000);
    assert_eq!(stop, StopReason::TimeOut);
    assert!(p.halted(), "program did not halt");
    p
}

#[test]
fn reset_state() {
    let p = Processor::new(CpuKind::Z80);
    assert_eq!(p.regs.pc, 0);
    assert_eq!(p.regs.sp, 0xFFFF);
    assert_eq!(p.regs.af(), 0xFFFF);
    assert!(!p.regs.iff1);
}

#[test]
fn timeout_without_halt() {
    // An endless stream of NOPs only stops on the cycle budget.
    let (p, stop) = run_bytes(&[0x00; 16], 40);
    assert_eq!(stop, StopReason::TimeOut);
    assert!(!p.halted());
    assert!(p.cc >= 40);
}

#[test]
fn breakpoint_stops_run() {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0, &[0x00, 0x00, 0x00, 0x76]);
    p.breakpoint = Some(0x0002);
    let stop = p.run(1_000);
    assert_eq!(stop, StopReason::BreakPoint);
    assert_eq!(p.regs.pc, 0x0002);
}

#[test]
fn illegal_ed_opcode_stops_run() {
    let (_, stop) = run_bytes(&[0xED, 0x7F], 1_000);
    assert_eq!(stop, StopReason::IllegalInstruction);
}

#[test]
fn refresh_register_counts_m1_cycles() {
    // Seven NOPs then HALT: eight opcode fetches.
    let p = exec(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x76]);
    assert_eq!(p.regs.r & 0x7F, 8);
}

#[test]
fn halt_leaves_pc_past_the_instruction() {
    // LD A,42 / HALT
    let p = exec(&[0x3E, 42, 0x76]);
    assert_eq!(p.regs.a, 42);
    assert_eq!(p.regs.pc, 3);
}
