use super::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn ldir_copies_and_clears_pv() {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0x0020, &[0xAA, 0xBB, 0xCC]);
    p.core.load(
        0,
        &[
            0x21, 0x20, 0x00, // ld hl,$0020
            0x11, 0x30, 0x00, // ld de,$0030
            0x01, 0x03, 0x00, // ld bc,3
            0xED, 0xB0, // ldir
            0x76,
        ],
    );
    assert_eq!(p.run(10_000), StopReason::TimeOut);
    assert!(p.halted());
    assert_eq!(p.core.peek(0x0030), 0xAA);
    assert_eq!(p.core.peek(0x0031), 0xBB);
    assert_eq!(p.core.peek(0x0032), 0xCC);
    assert_eq!(p.regs.bc(), 0);
    assert_eq!(p.regs.hl(), 0x0023);
    assert_eq!(p.regs.de(), 0x0033);
    assert_flags!(p, set: 0, clear: PF | NF | HF);
}

#[test]
fn lddr_copies_backwards() {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0x0020, &[0x11, 0x22]);
    p.core.load(
        0,
        &[
            0x21, 0x21, 0x00, // ld hl,$0021 (end of source)
            0x11, 0x31, 0x00, // ld de,$0031
            0x01, 0x02, 0x00, // ld bc,2
            0xED, 0xB8, // lddr
            0x76,
        ],
    );
    p.run(10_000);
    assert_eq!(p.core.peek(0x0030), 0x11);
    assert_eq!(p.core.peek(0x0031), 0x22);
}

#[test]
fn cpir_stops_on_match() {
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0x0020, &[1, 2, 3, 4]);
    p.core.load(
        0,
        &[
            0x3E, 0x03, // ld a,3
            0x21, 0x20, 0x00, // ld hl,$0020
            0x01, 0x04, 0x00, // ld bc,4
            0xED, 0xB1, // cpir
            0x76,
        ],
    );
    p.run(10_000);
    // Found at $0022; HL points past the match, one element left.
    assert_eq!(p.regs.hl(), 0x0023);
    assert_eq!(p.regs.bc(), 1);
    assert_flags!(p, set: ZF | PF | NF, clear: 0);
}

#[test]
fn otir_writes_block() {
    let written = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&written);
    let mut p = Processor::with_io(
        CpuKind::Z80,
        Box::new(|_, _| 0),
        Box::new(move |_, port, value| sink.borrow_mut().push((port, value))),
    );
    p.core.load(0x0020, &[0x0A, 0x0B]);
    p.core.load(
        0,
        &[
            0x21, 0x20, 0x00, // ld hl,$0020
            0x06, 0x02, // ld b,2
            0x0E, 0x10, // ld c,$10
            0xED, 0xB3, // otir
            0x76,
        ],
    );
    p.run(10_000);
    // B decrements before the port address forms.
    assert_eq!(*written.borrow(), vec![(0x0110, 0x0A), (0x0010, 0x0B)]);
    assert_eq!(p.regs.b, 0);
    assert_flags!(p, set: ZF, clear: 0);
}

#[test]
fn ldi_undocumented_bits() {
    // After LDI, YF/XF come from A + the transferred byte.
    let mut p = Processor::new(CpuKind::Z80);
    p.core.load(0x0020, &[0x28]);
    p.core.load(
        0,
        &[
            0xAF, // xor a
            0x21, 0x20, 0x00, // ld hl,$0020
            0x11, 0x30, 0x00, // ld de,$0030
            0x01, 0x02, 0x00, // ld bc,2
            0xED, 0xA0, // ldi
            0x76,
        ],
    );
    p.run(10_000);
    // n = a + v = $28: bit 3 -> XF, bit 1 -> clear.
    assert_flags!(p, set: XF | PF, clear: YF | NF | HF);
}
