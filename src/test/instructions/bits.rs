use super::*;

#[test]
fn rlc_register() {
    let p = exec(&[0x06, 0x81, 0xCB, 0x00, 0x76]); // ld b,$81 / rlc b
    assert_eq!(p.regs.b, 0x03);
    assert_flags!(p, set: CF, clear: ZF | NF | HF);
}

#[test]
fn rl_shifts_carry_in() {
    let p = exec(&[0x06, 0x00, 0x37, 0xCB, 0x10, 0x76]); // ld b,0 / scf / rl b
    assert_eq!(p.regs.b, 0x01);
    assert_flags!(p, set: 0, clear: CF | ZF);
}

#[test]
fn rrc_register() {
    let p = exec(&[0x3E, 0x01, 0xCB, 0x0F, 0x76]); // rrc a
    assert_eq!(p.regs.a, 0x80);
    assert_flags!(p, set: CF | SF, clear: ZF);
}

#[test]
fn sla() {
    let p = exec(&[0x3E, 0x40, 0xCB, 0x27, 0x76]);
    assert_eq!(p.regs.a, 0x80);
    assert_flags!(p, set: SF, clear: CF | ZF);
}

#[test]
fn sra_keeps_sign() {
    let p = exec(&[0x3E, 0x82, 0xCB, 0x2F, 0x76]);
    assert_eq!(p.regs.a, 0xC1);
    assert_flags!(p, set: SF, clear: CF | ZF);
}

#[test]
fn srl() {
    let p = exec(&[0x3E, 0x01, 0xCB, 0x3F, 0x76]);
    assert_eq!(p.regs.a, 0x00);
    assert_flags!(p, set: CF | ZF | PF, clear: SF);
}

#[test]
fn sll_shifts_one_in() {
    // Undocumented but well-defined on the Z80.
    let p = exec(&[0x3E, 0x01, 0xCB, 0x37, 0x76]);
    assert_eq!(p.regs.a, 0x03);
}

#[test]
fn sll_is_trapped_on_z180() {
    let mut p = Processor::new(CpuKind::Z180);
    p.core.load(0, &[0x3E, 0x01, 0xCB, 0x37, 0x76]);
    assert_eq!(p.run(1_000), StopReason::IllegalInstruction);
}

#[test]
fn bit_test_sign() {
    let p = exec(&[0x3E, 0x80, 0xCB, 0x7F, 0x76]); // bit 7,a
    assert_flags!(p, set: SF | HF, clear: ZF | NF);
}

#[test]
fn bit_test_zero() {
    let p = exec(&[0xAF, 0xCB, 0x47, 0x76]); // bit 0,a
    assert_flags!(p, set: ZF | PF | HF, clear: SF | NF);
}

#[test]
fn set_and_res() {
    let p = exec(&[0xAF, 0xCB, 0xEF, 0xCB, 0x87, 0x76]); // set 5,a / res 0,a
    assert_eq!(p.regs.a, 0x20);
}

#[test]
fn set_memory() {
    let p = exec(&[0x21, 0x40, 0x00, 0x36, 0x00, 0xCB, 0xC6, 0x76]); // set 0,(hl)
    assert_eq!(p.core.peek(0x0040), 0x01);
}

#[test]
fn indexed_set() {
    // ld ix,$0040 / set 0,(ix+1)
    let p = exec(&[0xDD, 0x21, 0x40, 0x00, 0xDD, 0xCB, 0x01, 0xC6, 0x76]);
    assert_eq!(p.core.peek(0x0041), 0x01);
}

#[test]
fn indexed_bit_ignores_register_code() {
    // DD CB d 40 is bit 0,(ix+d) regardless of the register bits.
    let p = exec(&[0xDD, 0x21, 0x40, 0x00, 0xDD, 0xCB, 0x00, 0x40, 0x76]);
    assert_flags!(p, set: ZF, clear: 0);
}

#[test]
fn indexed_register_result_needs_enabling() {
    let program = [0xDD, 0x21, 0x40, 0x00, 0xDD, 0xCB, 0x01, 0xC0, 0x76];
    let (_, stop) = run_bytes(&program, 1_000);
    assert_eq!(stop, StopReason::IllegalInstruction);

    let mut p = Processor::new(CpuKind::Z80);
    p.ixcbr2_enabled = true;
    p.core.load(0, &program);
    assert_eq!(p.run(1_000), StopReason::TimeOut);
    // set 0,(ix+1) with the result copied into b.
    assert_eq!(p.core.peek(0x0041), 0x01);
    assert_eq!(p.regs.b, 0x01);
}
