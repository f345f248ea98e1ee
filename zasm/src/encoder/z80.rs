//! Z80/Z180 instruction encoder. Operand combinations are validated per
//! mnemonic and emitted as their canonical byte sequences; preliminary
//! values emit placeholder bytes of the correct length and are fixed up
//! on a later pass.

use super::{as_cond, as_jr_cond, prefix, Arg, Rp};
use crate::asm::Assembler;
use crate::value::Value;
use z80::CpuKind;

const PFX_ED: u8 = 0xED;
const PFX_CB: u8 = 0xCB;

fn rp_code(rp: Rp) -> Option<u8> {
    match rp {
        Rp::BC => Some(0),
        Rp::DE => Some(1),
        Rp::HL => Some(2),
        Rp::SP => Some(3),
        _ => None,
    }
}

fn xh_code(high: bool) -> u8 {
    if high {
        4
    } else {
        5
    }
}

impl Assembler {
    fn illegal_halves(&self) -> Result<(), String> {
        if self.opts.ixcbxh_enabled && self.cpu != CpuKind::Z180 {
            Ok(())
        } else {
            Err("index register halves need the ixcbxh option".to_string())
        }
    }

    fn illegal_cb_result(&self) -> Result<(), String> {
        if self.opts.ixcbr2_enabled && self.cpu == CpuKind::Z80 {
            Ok(())
        } else {
            Err("bit operations with a register result need the ixcbr2 option".to_string())
        }
    }

    fn z180_only(&self, mnemonic: &str) -> Result<(), String> {
        if self.cpu == CpuKind::Z180 {
            Ok(())
        } else {
            Err(format!("'{}' requires the Z180", mnemonic))
        }
    }

    /// `$` plus the instruction length, the reference point for relative
    /// displacements.
    fn jump_origin(&mut self, length: i32) -> Value {
        let here = crate::expr::EvalContext::here(self);
        here + Value::valid(length)
    }

    pub(crate) fn asm_z80_instr(&mut self, mnemonic: &str, args_text: &str) -> Result<(), String> {
        let args = match self.classify_all(args_text) {
            Some(args) => args,
            None => return Ok(()), // syntax error already recorded
        };
        let a = args.as_slice();

        // Single-byte and ED-page constants first.
        let fixed: Option<&[u8]> = match (mnemonic, a) {
            ("nop", []) => Some(&[0x00]),
            ("halt", []) => Some(&[0x76]),
            ("di", []) => Some(&[0xF3]),
            ("ei", []) => Some(&[0xFB]),
            ("exx", []) => Some(&[0xD9]),
            ("daa", []) => Some(&[0x27]),
            ("cpl", []) => Some(&[0x2F]),
            ("scf", []) => Some(&[0x37]),
            ("ccf", []) => Some(&[0x3F]),
            ("rlca", []) => Some(&[0x07]),
            ("rrca", []) => Some(&[0x0F]),
            ("rla", []) => Some(&[0x17]),
            ("rra", []) => Some(&[0x1F]),
            ("neg", []) => Some(&[PFX_ED, 0x44]),
            ("retn", []) => Some(&[PFX_ED, 0x45]),
            ("reti", []) => Some(&[PFX_ED, 0x4D]),
            ("rrd", []) => Some(&[PFX_ED, 0x67]),
            ("rld", []) => Some(&[PFX_ED, 0x6F]),
            ("ldi", []) => Some(&[PFX_ED, 0xA0]),
            ("cpi", []) => Some(&[PFX_ED, 0xA1]),
            ("ini", []) => Some(&[PFX_ED, 0xA2]),
            ("outi", []) => Some(&[PFX_ED, 0xA3]),
            ("ldd", []) => Some(&[PFX_ED, 0xA8]),
            ("cpd", []) => Some(&[PFX_ED, 0xA9]),
            ("ind", []) => Some(&[PFX_ED, 0xAA]),
            ("outd", []) => Some(&[PFX_ED, 0xAB]),
            ("ldir", []) => Some(&[PFX_ED, 0xB0]),
            ("cpir", []) => Some(&[PFX_ED, 0xB1]),
            ("inir", []) => Some(&[PFX_ED, 0xB2]),
            ("otir", []) => Some(&[PFX_ED, 0xB3]),
            ("lddr", []) => Some(&[PFX_ED, 0xB8]),
            ("cpdr", []) => Some(&[PFX_ED, 0xB9]),
            ("indr", []) => Some(&[PFX_ED, 0xBA]),
            ("otdr", []) => Some(&[PFX_ED, 0xBB]),
            _ => None,
        };
        if let Some(bytes) = fixed {
            let bytes = bytes.to_vec();
            self.emit_slice(&bytes);
            return Ok(());
        }

        match mnemonic {
            "ld" => self.z80_ld(a),
            "add" => self.z80_alu_16_or_8(0, a),
            "adc" => self.z80_alu_16_or_8(1, a),
            "sub" => self.z80_alu8(2, a),
            "sbc" => self.z80_alu_16_or_8(3, a),
            "and" => self.z80_alu8(4, a),
            "xor" => self.z80_alu8(5, a),
            "or" => self.z80_alu8(6, a),
            "cp" => self.z80_alu8(7, a),
            "inc" => self.z80_incdec(true, a),
            "dec" => self.z80_incdec(false, a),
            "rlc" => self.z80_rot(0, a),
            "rrc" => self.z80_rot(1, a),
            "rl" => self.z80_rot(2, a),
            "rr" => self.z80_rot(3, a),
            "sla" => self.z80_rot(4, a),
            "sra" => self.z80_rot(5, a),
            "sll" | "sli" => {
                if self.cpu == CpuKind::Z180 {
                    return Err("'sll' is trapped by the Z180".to_string());
                }
                self.z80_rot(6, a)
            }
            "srl" => self.z80_rot(7, a),
            "bit" => self.z80_bit(1, a),
            "res" => self.z80_bit(2, a),
            "set" => self.z80_bit(3, a),
            "jp" => self.z80_jp(a),
            "jr" => self.z80_jr(a),
            "djnz" => self.z80_djnz(a),
            "call" => self.z80_call(a),
            "ret" => self.z80_ret(a),
            "rst" => self.z80_rst(a),
            "push" => self.z80_pushpop(true, a),
            "pop" => self.z80_pushpop(false, a),
            "ex" => self.z80_ex(a),
            "im" => self.z80_im(a),
            "in" => self.z80_in(a),
            "out" => self.z80_out(a),

            "mlt" => {
                self.z180_only("mlt")?;
                match a {
                    [Arg::Rp(rp)] => match rp_code(*rp) {
                        Some(code) => {
                            self.emit_slice(&[PFX_ED, 0x4C | code << 4]);
                            Ok(())
                        }
                        None => Err("mlt takes bc, de, hl or sp".to_string()),
                    },
                    _ => Err("mlt takes bc, de, hl or sp".to_string()),
                }
            }
            "in0" => {
                self.z180_only("in0")?;
                match a {
                    [Arg::R(r), Arg::MemImm(n)] => {
                        let v = self.eval_expr(n);
                        let n = self.byte_of(v);
                        self.emit_slice(&[PFX_ED, r << 3, n]);
                        Ok(())
                    }
                    _ => Err("invalid operands for 'in0'".to_string()),
                }
            }
            "out0" => {
                self.z180_only("out0")?;
                match a {
                    [Arg::MemImm(n), Arg::R(r)] => {
                        let v = self.eval_expr(n);
                        let n = self.byte_of(v);
                        self.emit_slice(&[PFX_ED, 0x01 | r << 3, n]);
                        Ok(())
                    }
                    _ => Err("invalid operands for 'out0'".to_string()),
                }
            }
            "tst" => {
                self.z180_only("tst")?;
                match a {
                    [Arg::R(r)] => {
                        self.emit_slice(&[PFX_ED, 0x04 | r << 3]);
                        Ok(())
                    }
                    [Arg::MemHl] => {
                        self.emit_slice(&[PFX_ED, 0x34]);
                        Ok(())
                    }
                    [Arg::Val(e)] => {
                        let v = self.eval_expr(e);
                        let n = self.byte_of(v);
                        self.emit_slice(&[PFX_ED, 0x64, n]);
                        Ok(())
                    }
                    _ => Err("invalid operands for 'tst'".to_string()),
                }
            }
            "tstio" => {
                self.z180_only("tstio")?;
                match a {
                    [Arg::Val(e)] => {
                        let v = self.eval_expr(e);
                        let n = self.byte_of(v);
                        self.emit_slice(&[PFX_ED, 0x74, n]);
                        Ok(())
                    }
                    _ => Err("invalid operands for 'tstio'".to_string()),
                }
            }
            "slp" => {
                self.z180_only("slp")?;
                self.emit_slice(&[PFX_ED, 0x76]);
                Ok(())
            }
            "otim" => {
                self.z180_only("otim")?;
                self.emit_slice(&[PFX_ED, 0x83]);
                Ok(())
            }
            "otdm" => {
                self.z180_only("otdm")?;
                self.emit_slice(&[PFX_ED, 0x8B]);
                Ok(())
            }
            "otimr" => {
                self.z180_only("otimr")?;
                self.emit_slice(&[PFX_ED, 0x93]);
                Ok(())
            }
            "otdmr" => {
                self.z180_only("otdmr")?;
                self.emit_slice(&[PFX_ED, 0x9B]);
                Ok(())
            }

            _ => Err(format!("unknown instruction '{}'", mnemonic)),
        }
    }

    fn z80_ld(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::R(d), Arg::R(s)] => {
                self.emit_slice(&[0x40 | d << 3 | s]);
                Ok(())
            }
            [Arg::R(d), Arg::XH { ix, high }] if ![4, 5].contains(d) => {
                self.illegal_halves()?;
                let bytes = [prefix(*ix), 0x40 | d << 3 | xh_code(*high)];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::XH { ix, high }, Arg::R(s)] if ![4, 5].contains(s) => {
                self.illegal_halves()?;
                let bytes = [prefix(*ix), 0x40 | xh_code(*high) << 3 | s];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::XH { ix: ix1, high: h1 }, Arg::XH { ix: ix2, high: h2 }] if ix1 == ix2 => {
                self.illegal_halves()?;
                let bytes = [prefix(*ix1), 0x40 | xh_code(*h1) << 3 | xh_code(*h2)];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::XH { ix, high }, Arg::Val(e)] => {
                self.illegal_halves()?;
                let v = self.eval_expr(e);
                let n = self.byte_of(v);
                let bytes = [prefix(*ix), 0x06 | xh_code(*high) << 3, n];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::R(d), Arg::MemHl] => {
                self.emit_slice(&[0x46 | d << 3]);
                Ok(())
            }
            [Arg::MemHl, Arg::R(s)] => {
                self.emit_slice(&[0x70 | s]);
                Ok(())
            }
            [Arg::MemHl, Arg::Val(e)] => {
                let v = self.eval_expr(e);
                let n = self.byte_of(v);
                self.emit_slice(&[0x36, n]);
                Ok(())
            }
            [Arg::R(d), Arg::MemIdx { ix, disp }] => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), 0x46 | d << 3, d8];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }, Arg::R(s)] => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), 0x70 | s, d8];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }, Arg::Val(e)] => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let v = self.eval_expr(e);
                let n = self.byte_of(v);
                let bytes = [prefix(*ix), 0x36, d8, n];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::R(7), Arg::MemBc] => {
                self.emit_slice(&[0x0A]);
                Ok(())
            }
            [Arg::R(7), Arg::MemDe] => {
                self.emit_slice(&[0x1A]);
                Ok(())
            }
            [Arg::MemBc, Arg::R(7)] => {
                self.emit_slice(&[0x02]);
                Ok(())
            }
            [Arg::MemDe, Arg::R(7)] => {
                self.emit_slice(&[0x12]);
                Ok(())
            }
            [Arg::R(7), Arg::MemImm(e)] => {
                let v = self.eval_expr(e);
                let nn = self.word_of(v);
                self.emit_slice(&[0x3A, nn[0], nn[1]]);
                Ok(())
            }
            [Arg::MemImm(e), Arg::R(7)] => {
                let v = self.eval_expr(e);
                let nn = self.word_of(v);
                self.emit_slice(&[0x32, nn[0], nn[1]]);
                Ok(())
            }
            [Arg::R(7), Arg::IReg] => {
                self.emit_slice(&[PFX_ED, 0x57]);
                Ok(())
            }
            [Arg::R(7), Arg::RReg] => {
                self.emit_slice(&[PFX_ED, 0x5F]);
                Ok(())
            }
            [Arg::IReg, Arg::R(7)] => {
                self.emit_slice(&[PFX_ED, 0x47]);
                Ok(())
            }
            [Arg::RReg, Arg::R(7)] => {
                self.emit_slice(&[PFX_ED, 0x4F]);
                Ok(())
            }
            [Arg::R(d), Arg::Val(e)] => {
                let v = self.eval_expr(e);
                let n = self.byte_of(v);
                self.emit_slice(&[0x06 | d << 3, n]);
                Ok(())
            }
            [Arg::Rp(rp), Arg::Val(e)] => {
                let v = self.eval_expr(e);
                let nn = self.word_of(v);
                match rp_code(*rp) {
                    Some(code) => {
                        self.emit_slice(&[0x01 | code << 4, nn[0], nn[1]]);
                        Ok(())
                    }
                    None => match rp {
                        Rp::IX | Rp::IY => {
                            self.emit_slice(&[prefix(*rp == Rp::IX), 0x21, nn[0], nn[1]]);
                            Ok(())
                        }
                        _ => Err("invalid operands for 'ld'".to_string()),
                    },
                }
            }
            [Arg::Rp(rp), Arg::MemImm(e)] => {
                let v = self.eval_expr(e);
                let nn = self.word_of(v);
                match rp {
                    Rp::HL => self.emit_slice(&[0x2A, nn[0], nn[1]]),
                    Rp::BC | Rp::DE | Rp::SP => {
                        let code = rp_code(*rp).unwrap();
                        self.emit_slice(&[PFX_ED, 0x4B | code << 4, nn[0], nn[1]]);
                    }
                    Rp::IX | Rp::IY => {
                        self.emit_slice(&[prefix(*rp == Rp::IX), 0x2A, nn[0], nn[1]]);
                    }
                    _ => return Err("invalid operands for 'ld'".to_string()),
                }
                Ok(())
            }
            [Arg::MemImm(e), Arg::Rp(rp)] => {
                let v = self.eval_expr(e);
                let nn = self.word_of(v);
                match rp {
                    Rp::HL => self.emit_slice(&[0x22, nn[0], nn[1]]),
                    Rp::BC | Rp::DE | Rp::SP => {
                        let code = rp_code(*rp).unwrap();
                        self.emit_slice(&[PFX_ED, 0x43 | code << 4, nn[0], nn[1]]);
                    }
                    Rp::IX | Rp::IY => {
                        self.emit_slice(&[prefix(*rp == Rp::IX), 0x22, nn[0], nn[1]]);
                    }
                    _ => return Err("invalid operands for 'ld'".to_string()),
                }
                Ok(())
            }
            [Arg::Rp(Rp::SP), Arg::Rp(Rp::HL)] => {
                self.emit_slice(&[0xF9]);
                Ok(())
            }
            [Arg::Rp(Rp::SP), Arg::Rp(rp @ Rp::IX)] | [Arg::Rp(Rp::SP), Arg::Rp(rp @ Rp::IY)] => {
                self.emit_slice(&[prefix(*rp == Rp::IX), 0xF9]);
                Ok(())
            }
            _ => Err("invalid operands for 'ld'".to_string()),
        }
    }

    /// ADD/ADC/SBC have 16-bit forms on HL (and IX/IY for ADD).
    fn z80_alu_16_or_8(&mut self, op: u8, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Rp(Rp::HL), Arg::Rp(rp)] => {
                let code = rp_code(*rp).ok_or("invalid operands for 16-bit arithmetic")?;
                match op {
                    0 => self.emit_slice(&[0x09 | code << 4]),
                    1 => self.emit_slice(&[PFX_ED, 0x4A | code << 4]),
                    3 => self.emit_slice(&[PFX_ED, 0x42 | code << 4]),
                    _ => unreachable!(),
                }
                Ok(())
            }
            [Arg::Rp(dst @ Rp::IX), Arg::Rp(rp)] | [Arg::Rp(dst @ Rp::IY), Arg::Rp(rp)] => {
                if op != 0 {
                    return Err("only 'add' works on ix/iy".to_string());
                }
                // The HL slot encodes the destination register itself.
                let code = match rp {
                    Rp::BC => 0,
                    Rp::DE => 1,
                    Rp::SP => 3,
                    _ if rp == dst => 2,
                    _ => return Err("invalid operands for 'add'".to_string()),
                };
                self.emit_slice(&[prefix(*dst == Rp::IX), 0x09 | code << 4]);
                Ok(())
            }
            _ => self.z80_alu8(op, a),
        }
    }

    fn z80_alu8(&mut self, op: u8, a: &[Arg]) -> Result<(), String> {
        // Both "add a,x" and the implied-accumulator "add x" forms.
        let x = match a {
            [Arg::R(7), x] => x,
            [x] => x,
            _ => return Err("invalid operands for accumulator arithmetic".to_string()),
        };
        match x {
            Arg::R(r) => {
                self.emit_slice(&[0x80 | op << 3 | r]);
                Ok(())
            }
            Arg::XH { ix, high } => {
                self.illegal_halves()?;
                let bytes = [prefix(*ix), 0x80 | op << 3 | xh_code(*high)];
                self.emit_slice(&bytes);
                Ok(())
            }
            Arg::MemHl => {
                self.emit_slice(&[0x86 | op << 3]);
                Ok(())
            }
            Arg::MemIdx { ix, disp } => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), 0x86 | op << 3, d8];
                self.emit_slice(&bytes);
                Ok(())
            }
            Arg::Val(e) => {
                let e = e.clone();
                let v = self.eval_expr(&e);
                let n = self.byte_of(v);
                self.emit_slice(&[0xC6 | op << 3, n]);
                Ok(())
            }
            _ => Err("invalid operands for accumulator arithmetic".to_string()),
        }
    }

    fn z80_incdec(&mut self, inc: bool, a: &[Arg]) -> Result<(), String> {
        let (r_base, m_base, rp_base, idx_op) = if inc {
            (0x04, 0x34, 0x03, 0x23)
        } else {
            (0x05, 0x35, 0x0B, 0x2B)
        };
        match a {
            [Arg::R(r)] => {
                self.emit_slice(&[r_base | r << 3]);
                Ok(())
            }
            [Arg::XH { ix, high }] => {
                self.illegal_halves()?;
                let bytes = [prefix(*ix), r_base | xh_code(*high) << 3];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::MemHl] => {
                self.emit_slice(&[m_base]);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }] => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), m_base, d8];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::Rp(rp)] => match rp_code(*rp) {
                Some(code) => {
                    self.emit_slice(&[rp_base | code << 4]);
                    Ok(())
                }
                None => match rp {
                    Rp::IX | Rp::IY => {
                        self.emit_slice(&[prefix(*rp == Rp::IX), idx_op]);
                        Ok(())
                    }
                    _ => Err("invalid operand for inc/dec".to_string()),
                },
            },
            _ => Err("invalid operand for inc/dec".to_string()),
        }
    }

    fn z80_rot(&mut self, kind: u8, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::R(r)] => {
                self.emit_slice(&[PFX_CB, kind << 3 | r]);
                Ok(())
            }
            [Arg::MemHl] => {
                self.emit_slice(&[PFX_CB, kind << 3 | 6]);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }] => {
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), PFX_CB, d8, kind << 3 | 6];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }, Arg::R(r)] => {
                self.illegal_cb_result()?;
                let dv = self.eval_expr(disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(*ix), PFX_CB, d8, kind << 3 | r];
                self.emit_slice(&bytes);
                Ok(())
            }
            _ => Err("invalid operands for a rotate/shift".to_string()),
        }
    }

    fn z80_bit(&mut self, group: u8, a: &[Arg]) -> Result<(), String> {
        let (bit_expr, rest) = match a {
            [Arg::Val(bit), rest @ ..] if !rest.is_empty() => (bit, rest),
            _ => return Err("bit operations take a bit number first".to_string()),
        };
        let bit_expr = bit_expr.clone();
        let bv = self.eval_expr(&bit_expr);
        if bv.is_valid() && !(0..=7).contains(&bv.value) {
            return Err(format!("bit number {} out of range", bv.value));
        }
        let bit = (bv.value & 7) as u8;
        let base = group << 6 | bit << 3;
        match rest {
            [Arg::R(r)] => {
                self.emit_slice(&[PFX_CB, base | r]);
                Ok(())
            }
            [Arg::MemHl] => {
                self.emit_slice(&[PFX_CB, base | 6]);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }] => {
                let ix = *ix;
                let disp = disp.clone();
                let dv = self.eval_expr(&disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(ix), PFX_CB, d8, base | 6];
                self.emit_slice(&bytes);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }, Arg::R(r)] => {
                if group == 1 {
                    return Err("bit cannot copy its result to a register".to_string());
                }
                self.illegal_cb_result()?;
                let ix = *ix;
                let disp = disp.clone();
                let r = *r;
                let dv = self.eval_expr(&disp);
                let d8 = self.disp_of(dv);
                let bytes = [prefix(ix), PFX_CB, d8, base | r];
                self.emit_slice(&bytes);
                Ok(())
            }
            _ => Err("invalid operands for a bit operation".to_string()),
        }
    }

    fn z80_jp(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::MemHl] => {
                self.emit_slice(&[0xE9]);
                Ok(())
            }
            [Arg::MemIdx { ix, disp }] => {
                let ix = *ix;
                let dv = self.eval_expr(&disp.clone());
                if dv.is_valid() && dv.value != 0 {
                    return Err("jp (ix) cannot take a displacement".to_string());
                }
                self.emit_slice(&[prefix(ix), 0xE9]);
                Ok(())
            }
            [Arg::Val(e)] => {
                let v = self.eval_expr(&e.clone());
                let nn = self.word_of(v);
                self.emit_slice(&[0xC3, nn[0], nn[1]]);
                Ok(())
            }
            [cond, Arg::Val(e)] => {
                let cc = as_cond(cond).ok_or("invalid condition for 'jp'")?;
                let v = self.eval_expr(&e.clone());
                let nn = self.word_of(v);
                self.emit_slice(&[0xC2 | cc << 3, nn[0], nn[1]]);
                Ok(())
            }
            _ => Err("invalid operands for 'jp'".to_string()),
        }
    }

    fn z80_jr(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Val(e)] => {
                let origin = self.jump_origin(2);
                let target = self.eval_expr(&e.clone());
                let d = self.rel_of(target, origin);
                self.emit_slice(&[0x18, d]);
                Ok(())
            }
            [cond, Arg::Val(e)] => {
                let cc = as_jr_cond(cond).ok_or("'jr' only takes nz, z, nc or c")?;
                let origin = self.jump_origin(2);
                let target = self.eval_expr(&e.clone());
                let d = self.rel_of(target, origin);
                self.emit_slice(&[0x20 | cc << 3, d]);
                Ok(())
            }
            _ => Err("invalid operands for 'jr'".to_string()),
        }
    }

    fn z80_djnz(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Val(e)] => {
                let origin = self.jump_origin(2);
                let target = self.eval_expr(&e.clone());
                let d = self.rel_of(target, origin);
                self.emit_slice(&[0x10, d]);
                Ok(())
            }
            _ => Err("invalid operand for 'djnz'".to_string()),
        }
    }

    fn z80_call(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Val(e)] => {
                let v = self.eval_expr(&e.clone());
                let nn = self.word_of(v);
                self.emit_slice(&[0xCD, nn[0], nn[1]]);
                Ok(())
            }
            [cond, Arg::Val(e)] => {
                let cc = as_cond(cond).ok_or("invalid condition for 'call'")?;
                let v = self.eval_expr(&e.clone());
                let nn = self.word_of(v);
                self.emit_slice(&[0xC4 | cc << 3, nn[0], nn[1]]);
                Ok(())
            }
            _ => Err("invalid operands for 'call'".to_string()),
        }
    }

    fn z80_ret(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [] => {
                self.emit_slice(&[0xC9]);
                Ok(())
            }
            [cond] => {
                let cc = as_cond(cond).ok_or("invalid condition for 'ret'")?;
                self.emit_slice(&[0xC0 | cc << 3]);
                Ok(())
            }
            _ => Err("invalid operands for 'ret'".to_string()),
        }
    }

    fn z80_rst(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Val(e)] => {
                let v = self.eval_expr(&e.clone());
                let vector = if !v.is_valid() {
                    0
                } else if v.value % 8 == 0 && (0..=0x38).contains(&v.value) {
                    v.value as u8
                } else if (1..8).contains(&v.value) {
                    // Accept the vector number as well as the address.
                    (v.value as u8) << 3
                } else {
                    return Err(format!("invalid rst target {}", v.value));
                };
                self.emit_slice(&[0xC7 | vector]);
                Ok(())
            }
            _ => Err("invalid operand for 'rst'".to_string()),
        }
    }

    fn z80_pushpop(&mut self, push: bool, a: &[Arg]) -> Result<(), String> {
        let base = if push { 0xC5 } else { 0xC1 };
        match a {
            [Arg::Rp(rp)] => {
                let code = match rp {
                    Rp::BC => 0,
                    Rp::DE => 1,
                    Rp::HL => 2,
                    Rp::AF => 3,
                    Rp::IX | Rp::IY => {
                        self.emit_slice(&[prefix(*rp == Rp::IX), base | 2 << 4]);
                        return Ok(());
                    }
                    _ => return Err("invalid operand for push/pop".to_string()),
                };
                self.emit_slice(&[base | code << 4]);
                Ok(())
            }
            _ => Err("invalid operand for push/pop".to_string()),
        }
    }

    fn z80_ex(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Rp(Rp::DE), Arg::Rp(Rp::HL)] => {
                self.emit_slice(&[0xEB]);
                Ok(())
            }
            [Arg::Rp(Rp::AF), Arg::Rp(Rp::AFAlt)] => {
                self.emit_slice(&[0x08]);
                Ok(())
            }
            [Arg::MemSp, Arg::Rp(Rp::HL)] => {
                self.emit_slice(&[0xE3]);
                Ok(())
            }
            [Arg::MemSp, Arg::Rp(rp @ Rp::IX)] | [Arg::MemSp, Arg::Rp(rp @ Rp::IY)] => {
                self.emit_slice(&[prefix(*rp == Rp::IX), 0xE3]);
                Ok(())
            }
            _ => Err("invalid operands for 'ex'".to_string()),
        }
    }

    fn z80_im(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::Val(e)] => {
                let v = self.eval_expr(&e.clone());
                let op = match v.value {
                    _ if !v.is_valid() => 0x46,
                    0 => 0x46,
                    1 => 0x56,
                    2 => 0x5E,
                    n => return Err(format!("invalid interrupt mode {}", n)),
                };
                self.emit_slice(&[PFX_ED, op]);
                Ok(())
            }
            _ => Err("invalid operand for 'im'".to_string()),
        }
    }

    fn z80_in(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::R(7), Arg::MemImm(e)] => {
                let v = self.eval_expr(&e.clone());
                let n = self.byte_of(v);
                self.emit_slice(&[0xDB, n]);
                Ok(())
            }
            [Arg::R(r), Arg::MemC] => {
                let r = *r;
                self.emit_slice(&[PFX_ED, 0x40 | r << 3]);
                Ok(())
            }
            [Arg::MemC] => {
                // IN (C): flags only, result discarded.
                self.emit_slice(&[PFX_ED, 0x70]);
                Ok(())
            }
            _ => Err("invalid operands for 'in'".to_string()),
        }
    }

    fn z80_out(&mut self, a: &[Arg]) -> Result<(), String> {
        match a {
            [Arg::MemImm(e), Arg::R(7)] => {
                let v = self.eval_expr(&e.clone());
                let n = self.byte_of(v);
                self.emit_slice(&[0xD3, n]);
                Ok(())
            }
            [Arg::MemC, Arg::R(r)] => {
                let r = *r;
                self.emit_slice(&[PFX_ED, 0x41 | r << 3]);
                Ok(())
            }
            [Arg::MemC, Arg::Val(e)] => {
                let v = self.eval_expr(&e.clone());
                if v.is_valid() && v.value != 0 {
                    return Err("only 0 can be output from no register".to_string());
                }
                self.emit_slice(&[PFX_ED, 0x71]);
                Ok(())
            }
            _ => Err("invalid operands for 'out'".to_string()),
        }
    }
}
