//! Intel 8080 mnemonics. The byte values are the Z80's; only the operand
//! syntax differs (M is the memory operand, pairs are named B, D, H, PSW).

use super::RawOp;
use crate::asm::Assembler;
use crate::expr::Expr;

/// 8080 register operand, including M (= memory through HL).
fn reg8(op: &RawOp) -> Option<u8> {
    if let RawOp::Expr(Expr::Ident(name)) = op {
        return match name.to_ascii_lowercase().as_str() {
            "b" => Some(0),
            "c" => Some(1),
            "d" => Some(2),
            "e" => Some(3),
            "h" => Some(4),
            "l" => Some(5),
            "m" => Some(6),
            "a" => Some(7),
            _ => None,
        };
    }
    None
}

/// 8080 register pair; `psw` selects AF where allowed, otherwise SP.
fn pair(op: &RawOp, with_psw: bool) -> Option<u8> {
    if let RawOp::Expr(Expr::Ident(name)) = op {
        return match name.to_ascii_lowercase().as_str() {
            "b" | "bc" => Some(0),
            "d" | "de" => Some(1),
            "h" | "hl" => Some(2),
            "sp" if !with_psw => Some(3),
            "psw" if with_psw => Some(3),
            _ => None,
        };
    }
    None
}

fn invalid(mnemonic: &str) -> String {
    format!("invalid operands for '{}'", mnemonic)
}

fn value(op: &RawOp) -> Option<&Expr> {
    match op {
        RawOp::Expr(e) => Some(e),
        RawOp::Mem(_) => None,
    }
}

impl Assembler {
    pub(crate) fn asm_8080_instr(&mut self, mnemonic: &str, args_text: &str) -> Result<(), String> {
        let ops = match self.parse_operands(args_text) {
            Some(ops) => ops,
            None => return Ok(()),
        };
        // No-operand opcodes.
        let fixed: Option<u8> = match mnemonic {
            "nop" => Some(0x00),
            "hlt" => Some(0x76),
            "rlc" => Some(0x07),
            "rrc" => Some(0x0F),
            "ral" => Some(0x17),
            "rar" => Some(0x1F),
            "daa" => Some(0x27),
            "cma" => Some(0x2F),
            "stc" => Some(0x37),
            "cmc" => Some(0x3F),
            "xchg" => Some(0xEB),
            "xthl" => Some(0xE3),
            "sphl" => Some(0xF9),
            "pchl" => Some(0xE9),
            "ret" => Some(0xC9),
            "rnz" => Some(0xC0),
            "rz" => Some(0xC8),
            "rnc" => Some(0xD0),
            "rc" => Some(0xD8),
            "rpo" => Some(0xE0),
            "rpe" => Some(0xE8),
            "rp" => Some(0xF0),
            "rm" => Some(0xF8),
            "ei" => Some(0xFB),
            "di" => Some(0xF3),
            _ => None,
        };
        if let Some(op) = fixed {
            if !ops.is_empty() {
                return Err(invalid(mnemonic));
            }
            self.emit_slice(&[op]);
            return Ok(());
        }

        // Jumps and calls share their layout: opcode + 16-bit address.
        let jump: Option<u8> = match mnemonic {
            "jmp" => Some(0xC3),
            "jnz" => Some(0xC2),
            "jz" => Some(0xCA),
            "jnc" => Some(0xD2),
            "jc" => Some(0xDA),
            "jpo" => Some(0xE2),
            "jpe" => Some(0xEA),
            "jp" => Some(0xF2),
            "jm" => Some(0xFA),
            "call" => Some(0xCD),
            "cnz" => Some(0xC4),
            "cz" => Some(0xCC),
            "cnc" => Some(0xD4),
            "cc" => Some(0xDC),
            "cpo" => Some(0xE4),
            "cpe" => Some(0xEC),
            "cp" => Some(0xF4),
            "cm" => Some(0xFC),
            "sta" => Some(0x32),
            "lda" => Some(0x3A),
            "shld" => Some(0x22),
            "lhld" => Some(0x2A),
            _ => None,
        };
        if let Some(op) = jump {
            match ops.as_slice() {
                [arg] => {
                    let e = value(arg).ok_or_else(|| invalid(mnemonic))?.clone();
                    let v = self.eval_expr(&e);
                    let nn = self.word_of(v);
                    self.emit_slice(&[op, nn[0], nn[1]]);
                    return Ok(());
                }
                _ => return Err(invalid(mnemonic)),
            }
        }

        // Accumulator arithmetic on a register operand.
        let alu: Option<u8> = match mnemonic {
            "add" => Some(0x80),
            "adc" => Some(0x88),
            "sub" => Some(0x90),
            "sbb" => Some(0x98),
            "ana" => Some(0xA0),
            "xra" => Some(0xA8),
            "ora" => Some(0xB0),
            "cmp" => Some(0xB8),
            _ => None,
        };
        if let Some(base) = alu {
            match ops.as_slice() {
                [op] => {
                    let r = reg8(op).ok_or_else(|| invalid(mnemonic))?;
                    self.emit_slice(&[base | r]);
                    return Ok(());
                }
                _ => return Err(invalid(mnemonic)),
            }
        }

        // Accumulator arithmetic with an immediate.
        let alu_imm: Option<u8> = match mnemonic {
            "adi" => Some(0xC6),
            "aci" => Some(0xCE),
            "sui" => Some(0xD6),
            "sbi" => Some(0xDE),
            "ani" => Some(0xE6),
            "xri" => Some(0xEE),
            "ori" => Some(0xF6),
            "cpi" => Some(0xFE),
            "in" => Some(0xDB),
            "out" => Some(0xD3),
            _ => None,
        };
        if let Some(op) = alu_imm {
            match ops.as_slice() {
                [arg] => {
                    let e = value(arg).ok_or_else(|| invalid(mnemonic))?.clone();
                    let v = self.eval_expr(&e);
                    let n = self.byte_of(v);
                    self.emit_slice(&[op, n]);
                    return Ok(());
                }
                _ => return Err(invalid(mnemonic)),
            }
        }

        match (mnemonic, ops.as_slice()) {
            ("mov", [d, s]) => {
                let d = reg8(d).ok_or_else(|| invalid(mnemonic))?;
                let s = reg8(s).ok_or_else(|| invalid(mnemonic))?;
                if d == 6 && s == 6 {
                    return Err("mov m,m does not exist".to_string());
                }
                self.emit_slice(&[0x40 | d << 3 | s]);
                Ok(())
            }
            ("mvi", [d, v]) => {
                let d = reg8(d).ok_or_else(|| invalid(mnemonic))?;
                let e = value(v).ok_or_else(|| invalid(mnemonic))?.clone();
                let v = self.eval_expr(&e);
                let n = self.byte_of(v);
                self.emit_slice(&[0x06 | d << 3, n]);
                Ok(())
            }
            ("lxi", [p, v]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                let e = value(v).ok_or_else(|| invalid(mnemonic))?.clone();
                let v = self.eval_expr(&e);
                let nn = self.word_of(v);
                self.emit_slice(&[0x01 | p << 4, nn[0], nn[1]]);
                Ok(())
            }
            ("ldax", [p]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                if p > 1 {
                    return Err("ldax only works on b or d".to_string());
                }
                self.emit_slice(&[0x0A | p << 4]);
                Ok(())
            }
            ("stax", [p]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                if p > 1 {
                    return Err("stax only works on b or d".to_string());
                }
                self.emit_slice(&[0x02 | p << 4]);
                Ok(())
            }
            ("inr", [r]) => {
                let r = reg8(r).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0x04 | r << 3]);
                Ok(())
            }
            ("dcr", [r]) => {
                let r = reg8(r).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0x05 | r << 3]);
                Ok(())
            }
            ("inx", [p]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0x03 | p << 4]);
                Ok(())
            }
            ("dcx", [p]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0x0B | p << 4]);
                Ok(())
            }
            ("dad", [p]) => {
                let p = pair(p, false).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0x09 | p << 4]);
                Ok(())
            }
            ("push", [p]) => {
                let p = pair(p, true).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0xC5 | p << 4]);
                Ok(())
            }
            ("pop", [p]) => {
                let p = pair(p, true).ok_or_else(|| invalid(mnemonic))?;
                self.emit_slice(&[0xC1 | p << 4]);
                Ok(())
            }
            ("rst", [v]) => {
                let e = value(v).ok_or_else(|| invalid(mnemonic))?.clone();
                let v = self.eval_expr(&e);
                if v.is_valid() && !(0..=7).contains(&v.value) {
                    return Err(format!("invalid rst number {}", v.value));
                }
                self.emit_slice(&[0xC7 | ((v.value & 7) as u8) << 3]);
                Ok(())
            }
            _ => Err(format!("unknown instruction '{}'", mnemonic)),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::asm::{assemble, Options};

    fn bytes(source: &str) -> Vec<u8> {
        let mut opts = Options::default();
        opts.syntax_8080 = true;
        let assembly = assemble(source, opts).expect(source);
        assembly.segments[0].bytes.clone()
    }

    #[test]
    fn mov_and_mvi() {
        assert_eq!(bytes(" mov b,a\n mov a,m"), vec![0x47, 0x7E]);
        assert_eq!(bytes(" mvi a, 42"), vec![0x3E, 42]);
        assert_eq!(bytes(" mvi m, 0"), vec![0x36, 0]);
    }

    #[test]
    fn pairs_and_stack() {
        assert_eq!(bytes(" lxi h, 1234h"), vec![0x21, 0x34, 0x12]);
        assert_eq!(bytes(" lxi sp, 0"), vec![0x31, 0x00, 0x00]);
        assert_eq!(bytes(" push psw\n pop b"), vec![0xF5, 0xC1]);
        assert_eq!(bytes(" dad d"), vec![0x19]);
    }

    #[test]
    fn loads_and_stores() {
        assert_eq!(bytes(" sta 8000h"), vec![0x32, 0x00, 0x80]);
        assert_eq!(bytes(" lhld 1234h"), vec![0x2A, 0x34, 0x12]);
        assert_eq!(bytes(" ldax d"), vec![0x1A]);
    }

    #[test]
    fn alu_and_immediates() {
        assert_eq!(bytes(" add m\n sbb b"), vec![0x86, 0x98]);
        assert_eq!(bytes(" adi 1\n cpi 255"), vec![0xC6, 1, 0xFE, 255]);
    }

    #[test]
    fn jumps_and_conditionals() {
        assert_eq!(bytes(" jmp 0\n jz 8"), vec![0xC3, 0, 0, 0xCA, 8, 0]);
        assert_eq!(bytes(" cnz 16\n rz"), vec![0xC4, 16, 0, 0xC8]);
        assert_eq!(bytes(" rst 7"), vec![0xFF]);
    }

    #[test]
    fn z80_mnemonics_are_rejected() {
        let mut opts = Options::default();
        opts.syntax_8080 = true;
        assert!(assemble(" ld a, 1", opts).is_err());
    }
}
