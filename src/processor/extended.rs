//! ED-prefixed opcodes: 16-bit arithmetic, block transfers, IO and the
//! Z180 extension set occupying holes in the Z80's ED page.

use super::{Index, Processor, StopReason};
use crate::constants::{CF, HF, NF, PF, SF, SZP, XF, YF, ZF};
use crate::CpuKind;

impl Processor {
    pub(crate) fn exec_ed(&mut self) -> Result<(), StopReason> {
        let op = self.fetch_m1();

        if self.cpu_kind == CpuKind::Z180 {
            if let Some(result) = self.exec_ed_z180(op) {
                return result;
            }
        }

        match op {
            _ if op & 0xC7 == 0x40 && op < 0x80 => {
                // IN r,(C); code 6 sets flags only.
                self.cc += 12;
                let port = self.regs.bc();
                let v = self.port_in(port);
                self.regs.f = (self.regs.f & CF) | SZP[v as usize];
                let code = (op >> 3) & 7;
                if code != 6 {
                    self.set_r_plain(code, v);
                }
            }
            _ if op & 0xC7 == 0x41 && op < 0x80 => {
                // OUT (C),r; code 6 outputs zero.
                self.cc += 12;
                let code = (op >> 3) & 7;
                let v = if code == 6 { 0 } else { self.get_r_plain(code) };
                let port = self.regs.bc();
                self.port_out(port, v);
            }

            _ if op & 0xCF == 0x42 => {
                self.cc += 15;
                let v = self.get_rp((op >> 4) & 3, Index::Hl);
                self.sbc16(v);
            }
            _ if op & 0xCF == 0x4A => {
                self.cc += 15;
                let v = self.get_rp((op >> 4) & 3, Index::Hl);
                self.adc16(v);
            }
            _ if op & 0xCF == 0x43 => {
                self.cc += 20;
                let nn = self.fetch_word();
                let v = self.get_rp((op >> 4) & 3, Index::Hl);
                self.core.poke_word(nn, v);
            }
            _ if op & 0xCF == 0x4B => {
                self.cc += 20;
                let nn = self.fetch_word();
                let v = self.core.peek_word(nn);
                self.set_rp((op >> 4) & 3, Index::Hl, v);
            }

            0x44 => {
                self.cc += 8;
                self.neg8();
            }
            0x45 => {
                self.cc += 14;
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop_word();
            }
            0x4D => {
                self.cc += 14;
                self.regs.iff1 = self.regs.iff2;
                self.regs.pc = self.pop_word();
            }

            0x46 => {
                self.cc += 8;
                self.regs.im = 0;
            }
            0x56 => {
                self.cc += 8;
                self.regs.im = 1;
            }
            0x5E => {
                self.cc += 8;
                self.regs.im = 2;
            }

            0x47 => {
                self.cc += 9;
                self.regs.i = self.regs.a;
            }
            0x4F => {
                self.cc += 9;
                self.regs.r = self.regs.a;
            }
            0x57 => {
                self.cc += 9;
                self.regs.a = self.regs.i;
                self.ld_a_ir_flags();
            }
            0x5F => {
                self.cc += 9;
                self.regs.a = self.regs.r;
                self.ld_a_ir_flags();
            }

            0x67 => {
                // RRD
                self.cc += 18;
                let addr = self.regs.hl();
                let m = self.core.peek(addr);
                let a = self.regs.a;
                self.core.poke(addr, (a << 4) | (m >> 4));
                self.regs.a = (a & 0xF0) | (m & 0x0F);
                self.regs.f = (self.regs.f & CF) | SZP[self.regs.a as usize];
            }
            0x6F => {
                // RLD
                self.cc += 18;
                let addr = self.regs.hl();
                let m = self.core.peek(addr);
                let a = self.regs.a;
                self.core.poke(addr, (m << 4) | (a & 0x0F));
                self.regs.a = (a & 0xF0) | (m >> 4);
                self.regs.f = (self.regs.f & CF) | SZP[self.regs.a as usize];
            }

            0xA0 | 0xA8 | 0xB0 | 0xB8 => self.block_ld(op),
            0xA1 | 0xA9 | 0xB1 | 0xB9 => self.block_cp(op),
            0xA2 | 0xAA | 0xB2 | 0xBA => self.block_in(op),
            0xA3 | 0xAB | 0xB3 | 0xBB => self.block_out(op),

            _ => return Err(StopReason::IllegalInstruction),
        }
        Ok(())
    }

    fn block_step(&self, op: u8) -> u16 {
        if op & 0x08 != 0 {
            0xFFFF // -1
        } else {
            1
        }
    }

    fn block_ld(&mut self, op: u8) {
        self.cc += 16;
        let step = self.block_step(op);
        let v = self.core.peek(self.regs.hl());
        let de = self.regs.de();
        self.core.poke(de, v);
        self.regs.set_hl(self.regs.hl().wrapping_add(step));
        self.regs.set_de(de.wrapping_add(step));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        let n = self.regs.a.wrapping_add(v);
        let mut f = self.regs.f & (SF | ZF | CF);
        if bc != 0 {
            f |= PF;
        }
        f |= n & XF;
        f |= (n & 0x02) << 4; // YF from bit 1
        self.regs.f = f;
        if op & 0x10 != 0 && bc != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cc += 5;
        }
    }

    fn block_cp(&mut self, op: u8) {
        self.cc += 16;
        let step = self.block_step(op);
        let a = self.regs.a;
        let v = self.core.peek(self.regs.hl());
        let res = a.wrapping_sub(v);
        self.regs.set_hl(self.regs.hl().wrapping_add(step));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);
        let half = (a & 0x0F) < (v & 0x0F);
        let mut f = (self.regs.f & CF) | NF | (res & SF);
        if res == 0 {
            f |= ZF;
        }
        if half {
            f |= HF;
        }
        if bc != 0 {
            f |= PF;
        }
        let n = res.wrapping_sub(if half { 1 } else { 0 });
        f |= n & XF;
        f |= (n & 0x02) << 4;
        self.regs.f = f;
        if op & 0x10 != 0 && bc != 0 && res != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cc += 5;
        }
    }

    fn block_in(&mut self, op: u8) {
        self.cc += 16;
        let step = self.block_step(op);
        let port = self.regs.bc();
        let v = self.port_in(port);
        let hl = self.regs.hl();
        self.core.poke(hl, v);
        self.regs.set_hl(hl.wrapping_add(step));
        self.regs.b = self.regs.b.wrapping_sub(1);
        let b = self.regs.b;
        let mut f = NF | (b & (SF | YF | XF));
        if b == 0 {
            f |= ZF;
        }
        self.regs.f = f;
        if op & 0x10 != 0 && b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cc += 5;
        }
    }

    fn block_out(&mut self, op: u8) {
        self.cc += 16;
        let step = self.block_step(op);
        let hl = self.regs.hl();
        let v = self.core.peek(hl);
        // B decrements before the port address is formed.
        self.regs.b = self.regs.b.wrapping_sub(1);
        let port = self.regs.bc();
        self.port_out(port, v);
        self.regs.set_hl(hl.wrapping_add(step));
        let b = self.regs.b;
        let mut f = NF | (b & (SF | YF | XF));
        if b == 0 {
            f |= ZF;
        }
        self.regs.f = f;
        if op & 0x10 != 0 && b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.cc += 5;
        }
    }

    /// TST shape: A AND v without storing, carry cleared.
    fn tst8(&mut self, v: u8) {
        let res = self.regs.a & v;
        self.regs.f = SZP[res as usize] | HF;
    }

    fn exec_ed_z180(&mut self, op: u8) -> Option<Result<(), StopReason>> {
        match op {
            _ if op & 0xC7 == 0x00 && (op >> 3) & 7 != 6 => {
                // IN0 r,(n)
                self.cc += 12;
                let n = self.fetch_byte();
                let v = self.port_in(n as u16);
                self.regs.f = (self.regs.f & CF) | SZP[v as usize];
                self.set_r_plain((op >> 3) & 7, v);
            }
            _ if op & 0xC7 == 0x01 && (op >> 3) & 7 != 6 => {
                // OUT0 (n),r
                self.cc += 13;
                let n = self.fetch_byte();
                let v = self.get_r_plain((op >> 3) & 7);
                self.port_out(n as u16, v);
            }
            _ if op & 0xC7 == 0x04 => {
                // TST r / TST (HL)
                let code = (op >> 3) & 7;
                let v = if code == 6 {
                    self.cc += 10;
                    self.core.peek(self.regs.hl())
                } else {
                    self.cc += 7;
                    self.get_r_plain(code)
                };
                self.tst8(v);
            }
            0x64 => {
                self.cc += 9;
                let n = self.fetch_byte();
                self.tst8(n);
            }
            0x74 => {
                // TSTIO n: port (C) AND n, flags only.
                self.cc += 12;
                let n = self.fetch_byte();
                let v = self.port_in(self.regs.c as u16);
                let res = v & n;
                self.regs.f = SZP[res as usize] | HF;
            }
            0x4C | 0x5C | 0x6C | 0x7C => {
                // MLT rr: unsigned product of the pair's halves.
                self.cc += 17;
                let code = (op >> 4) & 3;
                let v = self.get_rp(code, Index::Hl);
                let product = (v >> 8) as u16 * (v & 0xFF) as u16;
                self.set_rp(code, Index::Hl, product);
            }
            0x76 => {
                // SLP
                self.cc += 8;
                self.set_halted(true);
            }
            0x83 | 0x8B | 0x93 | 0x9B => {
                // OTIM/OTDM and their repeating forms.
                self.cc += 14;
                let dec = op & 0x08 != 0;
                let hl = self.regs.hl();
                let v = self.core.peek(hl);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.port_out(self.regs.c as u16, v);
                self.regs.set_hl(if dec {
                    hl.wrapping_sub(1)
                } else {
                    hl.wrapping_add(1)
                });
                self.regs.c = if dec {
                    self.regs.c.wrapping_sub(1)
                } else {
                    self.regs.c.wrapping_add(1)
                };
                let b = self.regs.b;
                let mut f = NF | (b & (SF | YF | XF));
                if b == 0 {
                    f |= ZF;
                }
                self.regs.f = f;
                if op & 0x10 != 0 && b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.cc += 2;
                }
            }
            _ => return None,
        }
        Some(Ok(()))
    }
}
