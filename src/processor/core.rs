//! Unprefixed opcode dispatch. DD/FD index contexts arrive here with the
//! prefix already consumed; H, L and HL resolve through the `Index`.

use super::{Index, Processor, StopReason};
use crate::constants::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::{Address, CpuKind};

impl Processor {
    /// True when an instruction may touch the index-register halves.
    fn halves_allowed(&self) -> bool {
        self.ixcbxh_enabled && self.cpu_kind != CpuKind::Z180
    }

    fn check_halves(&self, codes: &[u8], idx: Index) -> Result<(), StopReason> {
        if idx != Index::Hl
            && !self.halves_allowed()
            && codes.iter().any(|&c| c == 4 || c == 5)
        {
            return Err(StopReason::IllegalInstruction);
        }
        Ok(())
    }

    fn get_rp2(&self, code: u8, idx: Index) -> u16 {
        match code {
            3 => self.regs.af(),
            _ => self.get_rp(code, idx),
        }
    }

    fn set_rp2(&mut self, code: u8, idx: Index, v: u16) {
        match code {
            3 => self.regs.set_af(v),
            _ => self.set_rp(code, idx, v),
        }
    }

    fn jr_target(&mut self) -> Address {
        let d = self.fetch_byte() as i8;
        self.regs.pc.wrapping_add(d as i16 as u16)
    }

    pub(crate) fn exec_main(&mut self, op: u8, idx: Index) -> Result<(), StopReason> {
        match op {
            0xCB => return self.exec_cb(idx),
            0xED => return self.exec_ed(),

            0x76 => {
                self.cc += 4;
                self.set_halted(true);
            }

            // LD r,r' block, including the memory forms.
            0x40..=0x7F => {
                let dst = (op >> 3) & 7;
                let src = op & 7;
                if src == 6 {
                    self.cc += 7;
                    let addr = self.mem_addr(idx);
                    let v = self.core.peek(addr);
                    self.set_r_plain(dst, v);
                } else if dst == 6 {
                    self.cc += 7;
                    let addr = self.mem_addr(idx);
                    let v = self.get_r_plain(src);
                    self.core.poke(addr, v);
                } else {
                    self.cc += 4;
                    self.check_halves(&[dst, src], idx)?;
                    let v = self.get_r_idx(src, idx);
                    self.set_r_idx(dst, idx, v);
                }
            }

            // Accumulator arithmetic/logic block.
            0x80..=0xBF => {
                let aluop = (op >> 3) & 7;
                let src = op & 7;
                let v = if src == 6 {
                    self.cc += 7;
                    let addr = self.mem_addr(idx);
                    self.core.peek(addr)
                } else {
                    self.cc += 4;
                    self.check_halves(&[src], idx)?;
                    self.get_r_idx(src, idx)
                };
                self.alu8(aluop, v);
            }

            0x00 => self.cc += 4,

            0x01 | 0x11 | 0x21 | 0x31 => {
                self.cc += 10;
                let rp = (op >> 4) & 3;
                let nn = self.fetch_word();
                self.set_rp(rp, idx, nn);
            }

            0x02 => {
                self.cc += 7;
                let addr = self.regs.bc();
                self.core.poke(addr, self.regs.a);
            }
            0x12 => {
                self.cc += 7;
                let addr = self.regs.de();
                self.core.poke(addr, self.regs.a);
            }
            0x0A => {
                self.cc += 7;
                self.regs.a = self.core.peek(self.regs.bc());
            }
            0x1A => {
                self.cc += 7;
                self.regs.a = self.core.peek(self.regs.de());
            }

            0x22 => {
                self.cc += 16;
                let nn = self.fetch_word();
                let v = self.get_rp(2, idx);
                self.core.poke_word(nn, v);
            }
            0x2A => {
                self.cc += 16;
                let nn = self.fetch_word();
                let v = self.core.peek_word(nn);
                self.set_rp(2, idx, v);
            }
            0x32 => {
                self.cc += 13;
                let nn = self.fetch_word();
                self.core.poke(nn, self.regs.a);
            }
            0x3A => {
                self.cc += 13;
                let nn = self.fetch_word();
                self.regs.a = self.core.peek(nn);
            }

            0x03 | 0x13 | 0x23 | 0x33 => {
                self.cc += 6;
                let rp = (op >> 4) & 3;
                let v = self.get_rp(rp, idx).wrapping_add(1);
                self.set_rp(rp, idx, v);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.cc += 6;
                let rp = (op >> 4) & 3;
                let v = self.get_rp(rp, idx).wrapping_sub(1);
                self.set_rp(rp, idx, v);
            }

            _ if op & 0xC7 == 0x04 => {
                let code = (op >> 3) & 7;
                if code == 6 {
                    self.cc += 11;
                    let addr = self.mem_addr(idx);
                    let v = self.core.peek(addr);
                    let res = self.inc8(v);
                    self.core.poke(addr, res);
                } else {
                    self.cc += 4;
                    self.check_halves(&[code], idx)?;
                    let v = self.get_r_idx(code, idx);
                    let res = self.inc8(v);
                    self.set_r_idx(code, idx, res);
                }
            }
            _ if op & 0xC7 == 0x05 => {
                let code = (op >> 3) & 7;
                if code == 6 {
                    self.cc += 11;
                    let addr = self.mem_addr(idx);
                    let v = self.core.peek(addr);
                    let res = self.dec8(v);
                    self.core.poke(addr, res);
                } else {
                    self.cc += 4;
                    self.check_halves(&[code], idx)?;
                    let v = self.get_r_idx(code, idx);
                    let res = self.dec8(v);
                    self.set_r_idx(code, idx, res);
                }
            }
            _ if op & 0xC7 == 0x06 => {
                let code = (op >> 3) & 7;
                if code == 6 {
                    // Displacement precedes the immediate.
                    self.cc += if idx == Index::Hl { 10 } else { 7 };
                    let addr = self.mem_addr(idx);
                    let n = self.fetch_byte();
                    self.core.poke(addr, n);
                } else {
                    self.cc += 7;
                    self.check_halves(&[code], idx)?;
                    let n = self.fetch_byte();
                    self.set_r_idx(code, idx, n);
                }
            }

            0x07 | 0x0F | 0x17 | 0x1F => {
                self.cc += 4;
                self.rot_a((op >> 3) & 3);
            }

            0x08 => {
                self.cc += 4;
                std::mem::swap(&mut self.regs.a, &mut self.regs.a2);
                std::mem::swap(&mut self.regs.f, &mut self.regs.f2);
            }

            0x09 | 0x19 | 0x29 | 0x39 => {
                self.cc += 11;
                let rp = (op >> 4) & 3;
                let a = self.get_rp(2, idx);
                let b = self.get_rp(rp, idx);
                let res = self.add16(a, b);
                self.set_rp(2, idx, res);
            }

            0x10 => {
                let target = self.jr_target();
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.regs.pc = target;
                    self.cc += 13;
                } else {
                    self.cc += 8;
                }
            }
            0x18 => {
                self.cc += 12;
                let target = self.jr_target();
                self.regs.pc = target;
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let target = self.jr_target();
                if self.cond((op >> 3) & 3) {
                    self.regs.pc = target;
                    self.cc += 12;
                } else {
                    self.cc += 7;
                }
            }

            0x27 => {
                self.cc += 4;
                self.daa();
            }
            0x2F => {
                self.cc += 4;
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (YF | XF));
            }
            0x37 => {
                self.cc += 4;
                self.regs.f =
                    (self.regs.f & (SF | ZF | PF)) | CF | (self.regs.a & (YF | XF));
            }
            0x3F => {
                self.cc += 4;
                let old = self.regs.f;
                let mut f = (old & (SF | ZF | PF)) | (self.regs.a & (YF | XF));
                if old & CF != 0 {
                    f |= HF;
                } else {
                    f |= CF;
                }
                self.regs.f = f;
            }

            _ if op & 0xC7 == 0xC0 => {
                self.cc += 5;
                if self.cond((op >> 3) & 7) {
                    self.regs.pc = self.pop_word();
                    self.cc += 6;
                }
            }
            0xC9 => {
                self.cc += 10;
                self.regs.pc = self.pop_word();
            }

            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                self.cc += 10;
                let v = self.pop_word();
                self.set_rp2((op >> 4) & 3, idx, v);
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.cc += 11;
                let v = self.get_rp2((op >> 4) & 3, idx);
                self.push_word(v);
            }

            0xC3 => {
                self.cc += 10;
                self.regs.pc = self.fetch_word();
            }
            _ if op & 0xC7 == 0xC2 => {
                self.cc += 10;
                let nn = self.fetch_word();
                if self.cond((op >> 3) & 7) {
                    self.regs.pc = nn;
                }
            }

            0xCD => {
                self.cc += 17;
                let nn = self.fetch_word();
                let pc = self.regs.pc;
                self.push_word(pc);
                self.regs.pc = nn;
            }
            _ if op & 0xC7 == 0xC4 => {
                self.cc += 10;
                let nn = self.fetch_word();
                if self.cond((op >> 3) & 7) {
                    let pc = self.regs.pc;
                    self.push_word(pc);
                    self.regs.pc = nn;
                    self.cc += 7;
                }
            }

            _ if op & 0xC7 == 0xC6 => {
                self.cc += 7;
                let n = self.fetch_byte();
                self.alu8((op >> 3) & 7, n);
            }

            _ if op & 0xC7 == 0xC7 => {
                self.cc += 11;
                let pc = self.regs.pc;
                self.push_word(pc);
                self.regs.pc = (op & 0x38) as Address;
            }

            0xD3 => {
                self.cc += 11;
                let n = self.fetch_byte();
                let port = ((self.regs.a as u16) << 8) | n as u16;
                let v = self.regs.a;
                self.port_out(port, v);
            }
            0xDB => {
                self.cc += 11;
                let n = self.fetch_byte();
                let port = ((self.regs.a as u16) << 8) | n as u16;
                self.regs.a = self.port_in(port);
            }

            0xD9 => {
                self.cc += 4;
                std::mem::swap(&mut self.regs.b, &mut self.regs.b2);
                std::mem::swap(&mut self.regs.c, &mut self.regs.c2);
                std::mem::swap(&mut self.regs.d, &mut self.regs.d2);
                std::mem::swap(&mut self.regs.e, &mut self.regs.e2);
                std::mem::swap(&mut self.regs.h, &mut self.regs.h2);
                std::mem::swap(&mut self.regs.l, &mut self.regs.l2);
            }

            0xE3 => {
                self.cc += 19;
                let sp = self.regs.sp;
                let tmp = self.core.peek_word(sp);
                let v = self.get_rp(2, idx);
                self.core.poke_word(sp, v);
                self.set_rp(2, idx, tmp);
            }
            0xE9 => {
                self.cc += 4;
                self.regs.pc = self.get_rp(2, idx);
            }
            0xEB => {
                // Not affected by index prefixes.
                self.cc += 4;
                std::mem::swap(&mut self.regs.d, &mut self.regs.h);
                std::mem::swap(&mut self.regs.e, &mut self.regs.l);
            }

            0xF3 => {
                self.cc += 4;
                self.regs.iff1 = false;
                self.regs.iff2 = false;
            }
            0xFB => {
                self.cc += 4;
                self.regs.iff1 = true;
                self.regs.iff2 = true;
            }

            0xF9 => {
                self.cc += 6;
                self.regs.sp = self.get_rp(2, idx);
            }

            0xDD | 0xFD => unreachable!("prefix bytes are consumed by step()"),

            _ => unreachable!("unhandled opcode {:#04x}", op),
        }
        Ok(())
    }
}
