use super::*;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn push_pop_round_trip() {
    let p = exec(&[0x21, 0x34, 0x12, 0xE5, 0xC1, 0x76]); // push hl / pop bc
    assert_eq!(p.regs.bc(), 0x1234);
    assert_eq!(p.regs.sp, 0xFFFF);
}

#[test]
fn push_af() {
    let p = exec(&[0x3E, 0x42, 0x37, 0xF5, 0xE1, 0x76]); // push af / pop hl
    assert_eq!(p.regs.h, 0x42);
    assert_eq!(p.regs.l & CF, CF);
}

#[test]
fn ex_sp_hl() {
    let p = exec(&[
        0x21, 0x11, 0x11, // ld hl,$1111
        0xE5, // push hl
        0x21, 0x22, 0x22, // ld hl,$2222
        0xE3, // ex (sp),hl
        0xC1, // pop bc
        0x76,
    ]);
    assert_eq!(p.regs.hl(), 0x1111);
    assert_eq!(p.regs.bc(), 0x2222);
}

fn io_processor(program: &[u8]) -> (Processor, Rc<RefCell<Vec<(u16, u8)>>>) {
    let written = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&written);
    let mut p = Processor::with_io(
        CpuKind::Z80,
        Box::new(|_, port| port as u8),
        Box::new(move |_, port, value| sink.borrow_mut().push((port, value))),
    );
    p.core.load(0, program);
    (p, written)
}

#[test]
fn out_n_a() {
    let (mut p, written) = io_processor(&[0x3E, 0x55, 0xD3, 0x10, 0x76]);
    p.run(1_000);
    // The accumulator forms the high byte of the port address.
    assert_eq!(*written.borrow(), vec![(0x5510, 0x55)]);
}

#[test]
fn in_a_n_reads_hook() {
    let (mut p, _) = io_processor(&[0x3E, 0x00, 0xDB, 0x42, 0x76]);
    p.run(1_000);
    assert_eq!(p.regs.a, 0x42);
}

#[test]
fn in_r_c_sets_flags() {
    // ld bc,$0000 / in a,(c): hook returns 0 -> Z and parity.
    let (mut p, _) = io_processor(&[0x01, 0x00, 0x00, 0xED, 0x78, 0x76]);
    p.run(1_000);
    assert_eq!(p.regs.a, 0);
    assert_flags!(p, set: ZF | PF, clear: SF | NF);
}

#[test]
fn out_c_r() {
    let (mut p, written) = io_processor(&[0x01, 0x34, 0x12, 0x3E, 0x77, 0xED, 0x79, 0x76]);
    p.run(1_000);
    assert_eq!(*written.borrow(), vec![(0x1234, 0x77)]);
}
