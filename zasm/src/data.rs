//! Raw-data pseudo-ops: defb/defw/defm, space reservation, hex blobs,
//! alignment, origin control and the `#test` preamble ops.

use crate::asm::{split_list, Assembler};
use crate::encoder::RawOp;
use crate::error::ErrorKind;
use crate::expr::Expr;
use crate::parser::{self, Rule, ZasmParser};
use crate::segments::SegmentKind;
use matches::debug_assert_matches;
use pest::Parser;
use z80::RegName;

pub(crate) enum DataArg {
    Str(Vec<u8>),
    Val(Expr),
}

impl Assembler {
    fn parse_data_args(&mut self, text: &str) -> Option<Vec<DataArg>> {
        let mut pairs = match ZasmParser::parse(Rule::data_list, text) {
            Ok(pairs) => pairs,
            Err(err) => {
                self.error(ErrorKind::Syntax, crate::expr::pest_message(err));
                return None;
            }
        };
        let list = pairs.next().unwrap();
        debug_assert_matches!(list.as_rule(), Rule::data_list);
        let mut args = Vec::new();
        for pair in list.into_inner() {
            if pair.as_rule() == Rule::EOI {
                continue;
            }
            let inner = pair.into_inner().next().unwrap();
            match inner.as_rule() {
                Rule::string => {
                    let s = inner.as_str();
                    args.push(DataArg::Str(parser::unescape(&s[1..s.len() - 1])));
                }
                Rule::expr => {
                    let built = crate::expr::build(inner.into_inner(), self.pratt_table());
                    match built {
                        Ok(e) => args.push(DataArg::Val(e)),
                        Err(message) => {
                            self.error(ErrorKind::Syntax, message);
                            return None;
                        }
                    }
                }
                rule => unreachable!("data argument rule {:?}", rule),
            }
        }
        Some(args)
    }

    /// defb/defm (`size` 1) and defw (`size` 2).
    pub(crate) fn op_defb(&mut self, args: &str, size: u8) {
        let args = match self.parse_data_args(args) {
            Some(args) => args,
            None => return,
        };
        if args.is_empty() {
            self.error(ErrorKind::Syntax, "expected at least one data value");
            return;
        }
        let mut bytes = Vec::new();
        for arg in args {
            match arg {
                DataArg::Str(s) => {
                    if size == 2 {
                        self.error(ErrorKind::Syntax, "defw cannot take a string");
                        return;
                    }
                    bytes.extend_from_slice(&s);
                }
                DataArg::Val(e) => {
                    let v = self.eval_expr(&e);
                    if size == 1 {
                        bytes.push(self.byte_of(v));
                    } else {
                        let w = self.word_of(v);
                        bytes.extend_from_slice(&w);
                    }
                }
            }
        }
        self.emit_slice(&bytes);
    }

    /// defs/ds: space reservation with an optional fill byte.
    pub(crate) fn op_defs(&mut self, args: &str) {
        let parts = split_list(args);
        if parts.is_empty() || parts.len() > 2 {
            self.error(ErrorKind::Syntax, "defs expects a count and optional fill");
            return;
        }
        let count = self.eval_text(&parts[0]);
        let fill = parts.get(1).map(|t| self.eval_text(t));
        let n = if !count.is_valid() {
            self.size_retry("defs count did not resolve");
            0
        } else if count.value < 0 || count.value > 0x1_0000 {
            self.error(
                ErrorKind::Value,
                format!("defs count {} out of range", count.value),
            );
            0
        } else {
            count.value as u32
        };
        match fill {
            Some(f) => {
                let byte = self.byte_of(f);
                let data_seg = {
                    let index = self.ensure_segment();
                    self.segments[index].kind.is_data()
                };
                if data_seg {
                    self.reserve_space(n);
                } else {
                    self.emit_slice(&vec![byte; n as usize]);
                }
            }
            None => self.reserve_space(n),
        }
    }

    /// Literal hex digit pairs, whitespace ignored: `hex 00FF 3D`.
    pub(crate) fn op_hex(&mut self, args: &str) {
        let mut digits = Vec::new();
        for c in args.chars() {
            if c == ';' {
                break;
            }
            if c.is_whitespace() {
                continue;
            }
            match c.to_digit(16) {
                Some(d) => digits.push(d as u8),
                None => {
                    self.error(ErrorKind::Syntax, format!("'{}' is not a hex digit", c));
                    return;
                }
            }
        }
        if digits.len() % 2 != 0 {
            self.error(ErrorKind::Syntax, "hex needs an even number of digits");
            return;
        }
        let bytes: Vec<u8> = digits.chunks(2).map(|p| (p[0] << 4) | p[1]).collect();
        self.emit_slice(&bytes);
    }

    pub(crate) fn op_org(&mut self, args: &str) {
        let v = self.eval_text(args);
        let index = self.ensure_segment();
        if self.segments[index].lpos == 0 && self.segments[index].phase.is_none() {
            self.segments[index].address = v;
            self.segments[index].has_explicit_address = true;
            return;
        }
        // Mid-segment org skips forward to the new address.
        let here = self.segments[index].logical_pos();
        let gap = v - here;
        if !gap.is_valid() {
            if gap.is_invalid() {
                self.size_retry("org target did not resolve");
                return;
            }
            // Preliminary: pad with the current estimate.
        }
        if gap.value < 0 {
            self.error(
                ErrorKind::Segment,
                format!("org moves backwards by {} bytes", -gap.value),
            );
            return;
        }
        self.reserve_space(gap.value as u32);
    }

    pub(crate) fn op_align(&mut self, args: &str) {
        let v = self.eval_text(args);
        if !v.is_valid() {
            self.size_retry("align boundary did not resolve");
            return;
        }
        if v.value <= 0 {
            self.error(ErrorKind::Value, format!("bad alignment {}", v.value));
            return;
        }
        let index = self.ensure_segment();
        let pos = self.segments[index].logical_pos();
        let n = v.value;
        let pad = (n - pos.value.rem_euclid(n)) % n;
        self.reserve_space(pad as u32);
    }

    pub(crate) fn op_phase(&mut self, args: &str) {
        let v = self.eval_text(args);
        let index = self.ensure_segment();
        if self.segments[index].phase.is_some() {
            self.error(ErrorKind::Segment, ".phase blocks cannot nest");
            return;
        }
        let lpos = self.segments[index].lpos;
        self.segments[index].phase = Some((lpos, v));
    }

    pub(crate) fn op_dephase(&mut self) {
        let index = self.ensure_segment();
        if self.segments[index].phase.take().is_none() {
            self.error(ErrorKind::Segment, ".dephase without .phase");
        }
    }

    fn size_retry(&mut self, message: &str) {
        self.request_retry();
        if self.final_pass {
            self.error(ErrorKind::Value, message);
        }
    }

    // ---- test preamble ----

    fn reg_name(&mut self, e: &Expr) -> Option<RegName> {
        if let Expr::Ident(name) = e {
            let canon = name.to_ascii_uppercase().replace('\'', "2");
            if let Ok(reg) = canon.parse::<RegName>() {
                return Some(reg);
            }
        }
        self.error(ErrorKind::Syntax, "expected a register name");
        None
    }

    fn test_segment_index(&mut self, what: &str) -> Option<usize> {
        match self.cur {
            Some(index) if self.segments[index].kind.is_test() => Some(index),
            _ => {
                self.error(
                    ErrorKind::Syntax,
                    format!("{} is only allowed inside a #test segment", what),
                );
                None
            }
        }
    }

    /// `.seed reg, value`: register state before the test runs.
    pub(crate) fn op_seed(&mut self, args: &str) {
        let index = match self.test_segment_index(".seed") {
            Some(index) => index,
            None => return,
        };
        let ops = match self.parse_operands(args) {
            Some(ops) => ops,
            None => return,
        };
        let (reg, value) = match ops.as_slice() {
            [RawOp::Expr(r), RawOp::Expr(v)] => {
                let reg = match self.reg_name(r) {
                    Some(reg) => reg,
                    None => return,
                };
                (reg, self.eval_expr(v))
            }
            _ => {
                self.error(ErrorKind::Syntax, ".seed expects a register and a value");
                return;
            }
        };
        let loc = self.loc;
        if let SegmentKind::Test(spec) = &mut self.segments[index].kind {
            spec.seeds.push((reg, value, loc));
        }
    }

    /// `.expect reg, value` or `.expect (addr), byte [, byte …]`.
    pub(crate) fn op_expect(&mut self, args: &str) {
        let index = match self.test_segment_index(".expect") {
            Some(index) => index,
            None => return,
        };
        let ops = match self.parse_operands(args) {
            Some(ops) => ops,
            None => return,
        };
        let loc = self.loc;
        match ops.as_slice() {
            [RawOp::Mem(addr), rest @ ..] if !rest.is_empty() => {
                let addr = self.eval_expr(addr);
                let mut bytes = Vec::with_capacity(rest.len());
                for op in rest {
                    match op {
                        RawOp::Expr(e) => bytes.push(self.eval_expr(e)),
                        RawOp::Mem(_) => {
                            self.error(ErrorKind::Syntax, ".expect takes plain byte values");
                            return;
                        }
                    }
                }
                if let SegmentKind::Test(spec) = &mut self.segments[index].kind {
                    spec.expect_mem.push((addr, bytes, loc));
                }
            }
            [RawOp::Expr(r), RawOp::Expr(v)] => {
                let reg = match self.reg_name(r) {
                    Some(reg) => reg,
                    None => return,
                };
                let value = self.eval_expr(v);
                if let SegmentKind::Test(spec) = &mut self.segments[index].kind {
                    spec.expects.push((reg, value, loc));
                }
            }
            _ => self.error(
                ErrorKind::Syntax,
                ".expect expects a register or memory reference and value(s)",
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::asm::{assemble, Options};

    fn bytes(source: &str) -> Vec<u8> {
        let assembly = assemble(source, Options::default()).expect(source);
        assembly.segments[0].bytes.clone()
    }

    #[test]
    fn defb_mixes_strings_and_values() {
        assert_eq!(bytes(" defb \"AB\", 13, 'x'"), vec![0x41, 0x42, 13, 0x78]);
    }

    #[test]
    fn defw_is_little_endian() {
        assert_eq!(bytes(" defw $1234, 1"), vec![0x34, 0x12, 0x01, 0x00]);
    }

    #[test]
    fn defs_emits_fill_in_code() {
        assert_eq!(bytes(" defs 3\n defs 2, $FF"), vec![0, 0, 0, 0xFF, 0xFF]);
    }

    #[test]
    fn hex_blob() {
        assert_eq!(bytes(" hex 00 FF3D"), vec![0x00, 0xFF, 0x3D]);
    }

    #[test]
    fn align_pads_to_boundary() {
        assert_eq!(bytes(" nop\n align 4\n nop").len(), 5);
    }

    #[test]
    fn org_mid_segment_skips_forward() {
        let b = bytes(" org $8000\n nop\n org $8004\n ret");
        assert_eq!(b, vec![0x00, 0x00, 0x00, 0x00, 0xC9]);
    }

    #[test]
    fn org_backwards_is_a_segment_error() {
        let err = assemble(" org $8000\n nop\n org $7000\n", Options::default()).unwrap_err();
        assert!(format!("{}", err).contains("backwards"));
    }

    #[test]
    fn phase_affects_location_counter() {
        let b = bytes(" org $0100\n phase $8000\nhere: defw here\n dephase");
        assert_eq!(b, vec![0x00, 0x80]);
    }
}
