//! Operand parsing and classification shared by the Z80 and 8080
//! instruction encoders.

pub(crate) mod i8080;
pub(crate) mod z80;

use crate::asm::Assembler;
use crate::error::ErrorKind;
use crate::expr::{BinOp, Expr, UnOp};
use crate::parser::{Rule, ZasmParser};
use matches::debug_assert_matches;
use pest::Parser;

/// Syntactic shape of one operand; a leading parenthesis means memory.
pub(crate) enum RawOp {
    Mem(Expr),
    Expr(Expr),
}

/// Register pair names as written in source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Rp {
    BC,
    DE,
    HL,
    SP,
    IX,
    IY,
    AF,
    AFAlt,
}

/// Operand after register-name resolution. Expressions stay unevaluated
/// so identifiers that turn out to be registers or conditions never hit
/// the label table.
pub(crate) enum Arg {
    /// 8-bit register by encoding code (B=0 … A=7).
    R(u8),
    /// Index-register half (illegal unless enabled).
    XH { ix: bool, high: bool },
    IReg,
    RReg,
    Rp(Rp),
    MemBc,
    MemDe,
    MemHl,
    MemSp,
    MemC,
    MemIdx { ix: bool, disp: Expr },
    MemImm(Expr),
    Val(Expr),
}

impl Assembler {
    pub(crate) fn parse_operands(&mut self, text: &str) -> Option<Vec<RawOp>> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            return Some(Vec::new());
        }
        let mut pairs = match ZasmParser::parse(Rule::operand_list, text) {
            Ok(pairs) => pairs,
            Err(err) => {
                self.error(ErrorKind::Syntax, crate::expr::pest_message(err));
                return None;
            }
        };
        let list = pairs.next().unwrap();
        debug_assert_matches!(list.as_rule(), Rule::operand_list);
        let mut ops = Vec::new();
        for pair in list.into_inner() {
            if pair.as_rule() == Rule::EOI {
                continue;
            }
            let inner = pair.into_inner().next().unwrap();
            let is_mem = inner.as_rule() == Rule::mem;
            let expr_pair = if is_mem {
                inner.into_inner().next().unwrap()
            } else {
                inner
            };
            let built = crate::expr::build(expr_pair.into_inner(), self.pratt_table());
            match built {
                Ok(e) => ops.push(if is_mem { RawOp::Mem(e) } else { RawOp::Expr(e) }),
                Err(message) => {
                    self.error(ErrorKind::Syntax, message);
                    return None;
                }
            }
        }
        Some(ops)
    }

    pub(crate) fn classify(&self, raw: RawOp) -> Arg {
        match raw {
            RawOp::Expr(e) => {
                if let Expr::Ident(name) = &e {
                    match name.to_ascii_lowercase().as_str() {
                        "b" => return Arg::R(0),
                        "c" => return Arg::R(1),
                        "d" => return Arg::R(2),
                        "e" => return Arg::R(3),
                        "h" => return Arg::R(4),
                        "l" => return Arg::R(5),
                        "a" => return Arg::R(7),
                        "i" => return Arg::IReg,
                        "r" => return Arg::RReg,
                        "ixh" => return Arg::XH { ix: true, high: true },
                        "ixl" => return Arg::XH { ix: true, high: false },
                        "iyh" => return Arg::XH { ix: false, high: true },
                        "iyl" => return Arg::XH { ix: false, high: false },
                        "bc" => return Arg::Rp(Rp::BC),
                        "de" => return Arg::Rp(Rp::DE),
                        "hl" => return Arg::Rp(Rp::HL),
                        "sp" => return Arg::Rp(Rp::SP),
                        "ix" => return Arg::Rp(Rp::IX),
                        "iy" => return Arg::Rp(Rp::IY),
                        "af" => return Arg::Rp(Rp::AF),
                        "af'" => return Arg::Rp(Rp::AFAlt),
                        _ => {}
                    }
                }
                Arg::Val(e)
            }
            RawOp::Mem(e) => {
                if let Expr::Ident(name) = &e {
                    match name.to_ascii_lowercase().as_str() {
                        "bc" => return Arg::MemBc,
                        "de" => return Arg::MemDe,
                        "hl" => return Arg::MemHl,
                        "sp" => return Arg::MemSp,
                        "c" => return Arg::MemC,
                        "ix" => {
                            return Arg::MemIdx {
                                ix: true,
                                disp: Expr::Num(0),
                            }
                        }
                        "iy" => {
                            return Arg::MemIdx {
                                ix: false,
                                disp: Expr::Num(0),
                            }
                        }
                        _ => {}
                    }
                }
                if let Expr::Bin(op @ BinOp::Add, lhs, rhs) | Expr::Bin(op @ BinOp::Sub, lhs, rhs) =
                    &e
                {
                    if let Expr::Ident(name) = lhs.as_ref() {
                        let ix = match name.to_ascii_lowercase().as_str() {
                            "ix" => Some(true),
                            "iy" => Some(false),
                            _ => None,
                        };
                        if let Some(ix) = ix {
                            let disp = if *op == BinOp::Sub {
                                Expr::Un(UnOp::Neg, rhs.clone())
                            } else {
                                rhs.as_ref().clone()
                            };
                            return Arg::MemIdx { ix, disp };
                        }
                    }
                }
                Arg::MemImm(e)
            }
        }
    }

    pub(crate) fn classify_all(&mut self, text: &str) -> Option<Vec<Arg>> {
        let raw = self.parse_operands(text)?;
        Some(raw.into_iter().map(|op| self.classify(op)).collect())
    }
}

/// Condition-code resolution for jump-family first operands. `c` doubles
/// as the register C, so both shapes map to the carry condition.
pub(crate) fn as_cond(arg: &Arg) -> Option<u8> {
    match arg {
        Arg::R(1) => Some(3),
        Arg::Val(Expr::Ident(name)) => match name.to_ascii_lowercase().as_str() {
            "nz" => Some(0),
            "z" => Some(1),
            "nc" => Some(2),
            "po" => Some(4),
            "pe" => Some(5),
            "p" => Some(6),
            "m" => Some(7),
            _ => None,
        },
        _ => None,
    }
}

/// The JR subset: NZ, Z, NC, C only.
pub(crate) fn as_jr_cond(arg: &Arg) -> Option<u8> {
    as_cond(arg).filter(|&c| c < 4)
}

pub(crate) fn prefix(ix: bool) -> u8 {
    if ix {
        0xDD
    } else {
        0xFD
    }
}
