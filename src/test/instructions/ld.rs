use super::*;

#[test]
fn ld_r_n() {
    let p = exec(&[0x3E, 0x12, 0x06, 0x34, 0x76]); // ld a,$12 / ld b,$34
    assert_eq!(p.regs.a, 0x12);
    assert_eq!(p.regs.b, 0x34);
}

#[test]
fn ld_r_r() {
    let p = exec(&[0x3E, 0x55, 0x47, 0x76]); // ld a,$55 / ld b,a
    assert_eq!(p.regs.b, 0x55);
}

#[test]
fn ld_rp_nn() {
    let p = exec(&[0x21, 0x34, 0x12, 0x31, 0x00, 0x80, 0x76]); // ld hl / ld sp
    assert_eq!(p.regs.hl(), 0x1234);
    assert_eq!(p.regs.sp, 0x8000);
}

#[test]
fn ld_through_hl() {
    // ld hl,$0040 / ld (hl),$AB / ld a,(hl)
    let p = exec(&[0x21, 0x40, 0x00, 0x36, 0xAB, 0x7E, 0x76]);
    assert_eq!(p.core.peek(0x0040), 0xAB);
    assert_eq!(p.regs.a, 0xAB);
}

#[test]
fn ld_a_direct_and_back() {
    // ld a,$77 / ld ($0040),a / ld a,$00 / ld a,($0040)
    let p = exec(&[0x3E, 0x77, 0x32, 0x40, 0x00, 0x3E, 0x00, 0x3A, 0x40, 0x00, 0x76]);
    assert_eq!(p.regs.a, 0x77);
}

#[test]
fn ld_hl_direct_round_trip() {
    // ld hl,$BEEF / ld ($0040),hl / ld hl,$0000 / ld hl,($0040)
    let p = exec(&[
        0x21, 0xEF, 0xBE, 0x22, 0x40, 0x00, 0x21, 0x00, 0x00, 0x2A, 0x40, 0x00, 0x76,
    ]);
    assert_eq!(p.regs.hl(), 0xBEEF);
    assert_eq!(p.core.peek_word(0x0040), 0xBEEF);
}

#[test]
fn ld_sp_hl() {
    let p = exec(&[0x21, 0x00, 0x70, 0xF9, 0x76]);
    assert_eq!(p.regs.sp, 0x7000);
}

#[test]
fn ex_de_hl() {
    let p = exec(&[0x21, 0x11, 0x11, 0x11, 0x22, 0x22, 0xEB, 0x76]);
    assert_eq!(p.regs.hl(), 0x2222);
    assert_eq!(p.regs.de(), 0x1111);
}

#[test]
fn exx_swaps_all_three_pairs() {
    let p = exec(&[
        0x01, 0x01, 0x01, // ld bc,$0101
        0x11, 0x02, 0x02, // ld de,$0202
        0x21, 0x03, 0x03, // ld hl,$0303
        0xD9, // exx
        0x76,
    ]);
    assert_eq!(p.regs.bc(), 0x0000);
    assert_eq!(p.regs.get(RegName::BC2), 0x0101);
    assert_eq!(p.regs.get(RegName::DE2), 0x0202);
    assert_eq!(p.regs.get(RegName::HL2), 0x0303);
}

#[test]
fn ld_a_i_sets_pv_from_iff2() {
    // ld a,$42 / ld i,a / ei / ld a,i
    let p = exec(&[0x3E, 0x42, 0xED, 0x47, 0xFB, 0xED, 0x57, 0x76]);
    assert_eq!(p.regs.a, 0x42);
    assert_flags!(p, set: PF, clear: ZF | SF | NF);
}

#[test]
fn indexed_load_and_store() {
    // ld ix,$0040 / ld (ix+2),$5A / ld a,(ix+2)
    let p = exec(&[
        0xDD, 0x21, 0x40, 0x00, 0xDD, 0x36, 0x02, 0x5A, 0xDD, 0x7E, 0x02, 0x76,
    ]);
    assert_eq!(p.core.peek(0x0042), 0x5A);
    assert_eq!(p.regs.a, 0x5A);
}

#[test]
fn indexed_negative_displacement() {
    // ld iy,$0050 / ld (iy-1),$77
    let p = exec(&[0xFD, 0x21, 0x50, 0x00, 0xFD, 0x36, 0xFF, 0x77, 0x76]);
    assert_eq!(p.core.peek(0x004F), 0x77);
}

#[test]
fn index_halves_need_enabling() {
    // ld ixh,$12 is an illegal.
    let (_, stop) = run_bytes(&[0xDD, 0x26, 0x12, 0x76], 1_000);
    assert_eq!(stop, StopReason::IllegalInstruction);

    let mut p = Processor::new(CpuKind::Z80);
    p.ixcbxh_enabled = true;
    p.core.load(0, &[0xDD, 0x26, 0x12, 0x76]);
    let stop = p.run(1_000);
    assert_eq!(stop, StopReason::TimeOut);
    assert_eq!(p.regs.ixh, 0x12);
}

#[test]
fn index_prefix_does_not_touch_plain_registers() {
    // DD 78 is ld a,b with a meaningless prefix.
    let p = exec(&[0x06, 0x99, 0xDD, 0x78, 0x76]);
    assert_eq!(p.regs.a, 0x99);
}
