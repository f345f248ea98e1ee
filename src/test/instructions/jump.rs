use super::*;

#[test]
fn jp_absolute() {
    let p = exec(&[
        0xC3, 0x05, 0x00, // jp $0005
        0x76, 0x00, // skipped halt
        0x3E, 0x2A, // ld a,42
        0x76,
    ]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn jp_cc_not_taken() {
    // xor a sets Z, so jp nz falls through.
    let p = exec(&[0xAF, 0xC2, 0x08, 0x00, 0x3E, 0x2A, 0x76, 0x00, 0x76]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn jr_relative() {
    let p = exec(&[
        0x18, 0x02, // jr +2
        0x76, 0x00, // skipped
        0x3E, 0x2A, 0x76,
    ]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn jr_z_taken() {
    let p = exec(&[0xAF, 0x28, 0x01, 0x76, 0x3E, 0x2A, 0x76]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn jr_nc_not_taken_after_scf() {
    let p = exec(&[0x37, 0x30, 0x02, 0x3E, 0x2A, 0x76, 0x76]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn djnz_loops() {
    let p = exec(&[
        0xAF, // xor a
        0x06, 0x03, // ld b,3
        0x3C, // inc a
        0x10, 0xFD, // djnz -3
        0x76,
    ]);
    assert_eq!(p.regs.a, 3);
    assert_eq!(p.regs.b, 0);
}

#[test]
fn call_and_ret() {
    let p = exec(&[
        0xCD, 0x05, 0x00, // call $0005
        0x76, 0x00, // return lands on this halt
        0x3E, 0x2A, // ld a,42
        0xC9, // ret
    ]);
    assert_eq!(p.regs.a, 0x2A);
    assert_eq!(p.regs.pc, 4);
    assert_eq!(p.regs.sp, 0xFFFF);
}

#[test]
fn call_pushes_return_address() {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0, &[0xCD, 0x04, 0x00, 0x00, 0x76]);
    p.run(1_000);
    assert_eq!(p.core.peek_word(0xFFFD), 0x0003);
}

#[test]
fn ret_cc() {
    let p = exec(&[
        0xCD, 0x05, 0x00, // call $0005
        0x76, 0x00, //
        0xAF, // xor a (Z set)
        0xC8, // ret z -> taken
        0x3E, 0x2A, // skipped
        0xC9,
    ]);
    assert_eq!(p.regs.a, 0);
}

#[test]
fn rst_jumps_to_page_zero_vector() {
    let mut program = [0u8; 16];
    program[0] = 0x3E; // ld a,$01
    program[1] = 0x01;
    program[2] = 0xCF; // rst $08
    program[8] = 0x76; // halt at the vector
    let p = exec(&program);
    assert_eq!(p.regs.a, 1);
    assert_eq!(p.regs.pc, 9);
    assert_eq!(p.core.peek_word(0xFFFD), 0x0003);
}

#[test]
fn jp_hl() {
    let p = exec(&[0x21, 0x06, 0x00, 0xE9, 0x76, 0x00, 0x3E, 0x2A, 0x76]);
    assert_eq!(p.regs.a, 0x2A);
}

#[test]
fn jp_ix() {
    let p = exec(&[
        0xDD, 0x21, 0x08, 0x00, // ld ix,$0008
        0xDD, 0xE9, // jp (ix)
        0x76, 0x00, // skipped
        0x3E, 0x2A, 0x76,
    ]);
    assert_eq!(p.regs.a, 0x2A);
}
