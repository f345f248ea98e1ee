use super::*;

fn interrupt_processor(program: &[u8]) -> Processor {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0, program);
    p.int_start = 50;
    p.int_end = 60;
    p
}

#[test]
fn im1_wakes_halt_and_vectors_to_38() {
    let mut program = [0u8; 64];
    program[0] = 0xFB; // ei
    program[1] = 0xED; // im 1
    program[2] = 0x56;
    program[3] = 0x76; // halt
    program[0x38] = 0x3E; // ld a,$2A
    program[0x39] = 0x2A;
    program[0x3A] = 0x76; // halt
    let mut p = interrupt_processor(&program);
    let stop = p.run(1_000);
    assert_eq!(stop, StopReason::TimeOut);
    assert_eq!(p.regs.a, 0x2A);
    // The return address pushed is the instruction after HALT.
    assert_eq!(p.core.peek_word(0xFFFD), 0x0004);
    assert!(!p.regs.iff1);
}

#[test]
fn im0_requires_rst_shaped_ack() {
    let mut p = interrupt_processor(&[0xFB, 0x76]);
    p.int_ack_byte = 0x00; // not a RST opcode
    assert_eq!(p.run(1_000), StopReason::UnsupportedIntAckByte);
}

#[test]
fn im0_executes_rst_ack() {
    let mut program = [0u8; 64];
    program[0] = 0xFB; // ei
    program[1] = 0x76; // halt
    program[0x28] = 0x3E;
    program[0x29] = 0x2A;
    program[0x2A] = 0x76;
    let mut p = interrupt_processor(&program);
    p.int_ack_byte = 0xEF; // rst $28
    p.run(1_000);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn im2_reads_vector_table() {
    let mut program = [0u8; 80];
    program[0] = 0x3E; // ld a,$10
    program[1] = 0x10;
    program[2] = 0xED; // ld i,a
    program[3] = 0x47;
    program[4] = 0xED; // im 2
    program[5] = 0x5E;
    program[6] = 0xFB; // ei
    program[7] = 0x76; // halt
    program[0x40] = 0x3E;
    program[0x41] = 0x2A;
    program[0x42] = 0x76;
    let mut p = interrupt_processor(&program);
    // Vector address = I:ack = $10FF -> $0040
    p.core.poke_word(0x10FF, 0x0040);
    p.run(1_000);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn di_keeps_interrupts_out() {
    let mut p = interrupt_processor(&[0xF3, 0x76]);
    let stop = p.run(1_000);
    assert_eq!(stop, StopReason::TimeOut);
    assert!(p.halted());
    assert_eq!(p.regs.pc, 2);
}
