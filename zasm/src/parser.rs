use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "zasm.pest"]
pub struct ZasmParser;

/// Operator table with the usual C-like precedence tiers, loosest first.
pub fn pratt() -> PrattParser<Rule> {
    PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left))
        .op(Op::infix(Rule::op_and, Assoc::Left))
        .op(Op::infix(Rule::op_bor, Assoc::Left))
        .op(Op::infix(Rule::op_bxor, Assoc::Left))
        .op(Op::infix(Rule::op_band, Assoc::Left))
        .op(Op::infix(Rule::op_eq, Assoc::Left) | Op::infix(Rule::op_ne, Assoc::Left))
        .op(Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left))
        .op(Op::infix(Rule::op_shl, Assoc::Left) | Op::infix(Rule::op_shr, Assoc::Left))
        .op(Op::infix(Rule::op_add, Assoc::Left) | Op::infix(Rule::op_sub, Assoc::Left))
        .op(Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
        .op(Op::prefix(Rule::op_lnot)
            | Op::prefix(Rule::op_bnot)
            | Op::prefix(Rule::op_neg)
            | Op::prefix(Rule::op_pos))
}

/// Degenerate table for the legacy dialect: every binary operator on one
/// level, evaluated strictly left to right.
pub fn pratt_flat() -> PrattParser<Rule> {
    PrattParser::new()
        .op(Op::infix(Rule::op_or, Assoc::Left)
            | Op::infix(Rule::op_and, Assoc::Left)
            | Op::infix(Rule::op_bor, Assoc::Left)
            | Op::infix(Rule::op_bxor, Assoc::Left)
            | Op::infix(Rule::op_band, Assoc::Left)
            | Op::infix(Rule::op_eq, Assoc::Left)
            | Op::infix(Rule::op_ne, Assoc::Left)
            | Op::infix(Rule::op_lt, Assoc::Left)
            | Op::infix(Rule::op_le, Assoc::Left)
            | Op::infix(Rule::op_gt, Assoc::Left)
            | Op::infix(Rule::op_ge, Assoc::Left)
            | Op::infix(Rule::op_shl, Assoc::Left)
            | Op::infix(Rule::op_shr, Assoc::Left)
            | Op::infix(Rule::op_add, Assoc::Left)
            | Op::infix(Rule::op_sub, Assoc::Left)
            | Op::infix(Rule::op_mul, Assoc::Left)
            | Op::infix(Rule::op_div, Assoc::Left)
            | Op::infix(Rule::op_mod, Assoc::Left))
        .op(Op::prefix(Rule::op_lnot)
            | Op::prefix(Rule::op_bnot)
            | Op::prefix(Rule::op_neg)
            | Op::prefix(Rule::op_pos))
}

/// Resolves backslash escapes in a string or character literal body.
pub fn unescape(body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('r') => out.push(b'\r'),
                Some('t') => out.push(b'\t'),
                Some('0') => out.push(0),
                Some(other) => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => out.push(b'\\'),
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use pest::Parser;

    fn parses(rule: Rule, input: &str) -> bool {
        ZasmParser::parse(rule, input).is_ok()
    }

    #[test]
    fn literal_forms() {
        for input in &["$FF2A", "0x12", "255", "0FFh", "%1010", "0b1010", "0o17", "'A'"] {
            assert!(parses(Rule::full_expr, input), "rejected {}", input);
        }
    }

    #[test]
    fn location_counter_symbols() {
        assert!(parses(Rule::full_expr, "$"));
        assert!(parses(Rule::full_expr, "$$"));
        assert!(parses(Rule::full_expr, "$ - $$"));
    }

    #[test]
    fn operator_soup() {
        assert!(parses(Rule::full_expr, "1 + 2*3 << 4 & lo($8000) | hi(12h)"));
        assert!(parses(Rule::full_expr, "-~!5 % 3"));
        assert!(parses(Rule::full_expr, "min(1, 2) > max(3, abs(-4))"));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(!parses(Rule::full_expr, "1 +"));
        assert!(!parses(Rule::full_expr, "(1"));
        assert!(!parses(Rule::full_expr, "1 2"));
    }

    #[test]
    fn operand_shapes() {
        for input in &["a, (hl)", "(ix+5), b", "nz, $8000", "af, af'", "(c)", "0x10"] {
            assert!(parses(Rule::operand_list, input), "rejected {}", input);
        }
    }

    #[test]
    fn data_arguments() {
        assert!(parses(Rule::data_list, "\"hello\", 13, 10, 'x'"));
        assert!(parses(Rule::data_list, "(2+2)*2"));
    }

    #[test]
    fn comments_are_skipped() {
        assert!(parses(Rule::full_expr, "1 + 2 ; trailing words"));
        assert!(parses(Rule::operand_list, "a, b ; comment"));
    }

    #[test]
    fn unescape_sequences() {
        assert_eq!(unescape("a\\nb"), b"a\nb");
        assert_eq!(unescape("\\\"\\0"), b"\"\0");
    }
}
