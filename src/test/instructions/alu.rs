use super::*;

#[test]
fn add_a_n() {
    let p = exec(&[0x3E, 0x44, 0xC6, 0x11, 0x76]);
    assert_eq!(p.regs.a, 0x55);
    assert_flags!(p, set: 0, clear: ZF | CF | NF | HF);
}

#[test]
fn add_overflow_sets_pv() {
    let p = exec(&[0x3E, 0x7F, 0xC6, 0x01, 0x76]);
    assert_eq!(p.regs.a, 0x80);
    assert_flags!(p, set: SF | HF | PF, clear: ZF | CF);
}

#[test]
fn add_carry_and_zero() {
    let p = exec(&[0x3E, 0xFF, 0xC6, 0x01, 0x76]);
    assert_eq!(p.regs.a, 0x00);
    assert_flags!(p, set: ZF | HF | CF, clear: SF | PF);
}

#[test]
fn adc_consumes_carry() {
    // ld a,$10 / scf / adc a,$00
    let p = exec(&[0x3E, 0x10, 0x37, 0xCE, 0x00, 0x76]);
    assert_eq!(p.regs.a, 0x11);
}

#[test]
fn sub_borrow() {
    let p = exec(&[0x3E, 0x05, 0xD6, 0x06, 0x76]);
    assert_eq!(p.regs.a, 0xFF);
    assert_flags!(p, set: SF | HF | CF | NF | YF | XF, clear: ZF | PF);
}

#[test]
fn cp_leaves_a_and_copies_operand_bits() {
    // Undocumented: CP takes YF/XF from the operand ($28 has both set).
    let p = exec(&[0x3E, 0x50, 0xFE, 0x28, 0x76]);
    assert_eq!(p.regs.a, 0x50);
    assert_flags!(p, set: NF | YF | XF, clear: ZF | CF);
}

#[test]
fn cp_equal_sets_zero() {
    let p = exec(&[0x3E, 0x05, 0xFE, 0x05, 0x76]);
    assert_flags!(p, set: ZF | NF, clear: CF | SF);
}

#[test]
fn and_sets_half_carry() {
    let p = exec(&[0x3E, 0xF0, 0xE6, 0x0F, 0x76]);
    assert_eq!(p.regs.a, 0);
    assert_flags!(p, set: ZF | HF | PF, clear: CF | NF | SF);
}

#[test]
fn xor_a_clears_everything_but_zero_parity() {
    let p = exec(&[0xAF, 0x76]);
    assert_eq!(p.regs.a, 0);
    assert_flags!(p, set: ZF | PF, clear: SF | HF | NF | CF);
}

#[test]
fn or_sign() {
    let p = exec(&[0xAF, 0xF6, 0x80, 0x76]);
    assert_eq!(p.regs.a, 0x80);
    assert_flags!(p, set: SF, clear: ZF | PF | CF);
}

#[test]
fn inc_preserves_carry() {
    // Reset leaves CF set; inc must not touch it.
    let p = exec(&[0x3E, 0x7F, 0x3C, 0x76]);
    assert_eq!(p.regs.a, 0x80);
    assert_flags!(p, set: SF | HF | PF | CF, clear: ZF | NF);
}

#[test]
fn dec_to_zero() {
    let p = exec(&[0x3E, 0x01, 0x3D, 0x76]);
    assert_eq!(p.regs.a, 0);
    assert_flags!(p, set: ZF | NF, clear: SF | HF);
}

#[test]
fn inc_memory() {
    let p = exec(&[0x21, 0x40, 0x00, 0x36, 0x0F, 0x34, 0x76]);
    assert_eq!(p.core.peek(0x0040), 0x10);
    assert_flags!(p, set: HF, clear: ZF | NF);
}

#[test]
fn daa_after_bcd_add() {
    let p = exec(&[0x3E, 0x15, 0xC6, 0x27, 0x27, 0x76]);
    assert_eq!(p.regs.a, 0x42);
    assert_flags!(p, set: 0, clear: CF);
}

#[test]
fn daa_with_decimal_carry() {
    let p = exec(&[0x3E, 0x99, 0xC6, 0x01, 0x27, 0x76]);
    assert_eq!(p.regs.a, 0x00);
    assert_flags!(p, set: ZF | CF, clear: SF);
}

#[test]
fn add_hl_de() {
    let p = exec(&[0x21, 0xFF, 0x7F, 0x11, 0x01, 0x00, 0x19, 0x76]);
    assert_eq!(p.regs.hl(), 0x8000);
    assert_flags!(p, set: HF, clear: CF | NF);
}

#[test]
fn adc_hl_sets_zero_from_16_bits() {
    // hl=$FFFF, bc=$0001, carry clear via xor a
    let p = exec(&[0x21, 0xFF, 0xFF, 0x01, 0x01, 0x00, 0xAF, 0xED, 0x4A, 0x76]);
    assert_eq!(p.regs.hl(), 0x0000);
    assert_flags!(p, set: ZF | CF, clear: SF | NF);
}

#[test]
fn sbc_hl() {
    // hl=$0001, de=$0002, carry cleared
    let p = exec(&[0x21, 0x01, 0x00, 0x11, 0x02, 0x00, 0xAF, 0xED, 0x52, 0x76]);
    assert_eq!(p.regs.hl(), 0xFFFF);
    assert_flags!(p, set: SF | CF | NF, clear: ZF);
}

#[test]
fn neg() {
    let p = exec(&[0x3E, 0x01, 0xED, 0x44, 0x76]);
    assert_eq!(p.regs.a, 0xFF);
    assert_flags!(p, set: SF | NF | CF, clear: ZF | PF);
}

#[test]
fn neg_of_zero_clears_carry() {
    let p = exec(&[0xAF, 0xED, 0x44, 0x76]);
    assert_eq!(p.regs.a, 0);
    assert_flags!(p, set: ZF, clear: CF | PF);
}

#[test]
fn scf_and_ccf() {
    let p = exec(&[0xAF, 0x37, 0x76]);
    assert_flags!(p, set: CF, clear: HF | NF);

    // ccf moves the old carry into HF.
    let p = exec(&[0xAF, 0x37, 0x3F, 0x76]);
    assert_flags!(p, set: HF, clear: CF | NF);
}

#[test]
fn cpl() {
    let p = exec(&[0x3E, 0x0F, 0x2F, 0x76]);
    assert_eq!(p.regs.a, 0xF0);
    assert_flags!(p, set: HF | NF, clear: 0);
}

#[test]
fn z180_mlt() {
    let mut p = Processor::new(CpuKind::Z180);
    // ld bc,$0C0C / mlt bc
    p.core.load(0, &[0x01, 0x0C, 0x0C, 0xED, 0x4C, 0x76]);
    let stop = p.run(1_000);
    assert_eq!(stop, StopReason::TimeOut);
    assert!(p.halted());
    assert_eq!(p.regs.bc(), 144);
}

#[test]
fn z180_tst_is_rejected_on_z80() {
    let (_, stop) = run_bytes(&[0xED, 0x04, 0x76], 1_000);
    assert_eq!(stop, StopReason::IllegalInstruction);
}

#[test]
fn z180_tst_does_not_store() {
    let mut p = Processor::new(CpuKind::Z180);
    // ld a,$F0 / ld b,$0F / tst b
    p.core.load(0, &[0x3E, 0xF0, 0x06, 0x0F, 0xED, 0x04, 0x76]);
    p.run(1_000);
    assert_eq!(p.regs.a, 0xF0);
    assert_flags!(p, set: ZF | HF | PF, clear: CF | SF);
}
