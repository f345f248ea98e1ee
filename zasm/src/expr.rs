//! Expression trees and their per-pass evaluation. Parsing builds an
//! `Expr` once per line visit via the Pratt operator tables; evaluation
//! runs against an [`EvalContext`] so unresolved identifiers flow back as
//! Invalid values instead of errors.

use crate::parser::{self, Rule, ZasmParser};
use crate::value::Value;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::PrattParser;
use pest::Parser;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(i32),
    Ident(String),
    /// `$`, the current logical address.
    Here,
    /// `$$`, the current segment base.
    Base,
    Un(UnOp, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    LogicalNot,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Lo,
    Hi,
    Abs,
    Min,
    Max,
    Sin,
    Defined,
    Required,
}

/// Name resolution and position queries the evaluator needs from the
/// assembler (mockable in tests).
pub trait EvalContext {
    /// Looks a label up, marking it used; Invalid when (not yet) known.
    fn lookup(&mut self, name: &str) -> Value;
    /// `$` for the current segment.
    fn here(&mut self) -> Value;
    /// `$$` for the current segment.
    fn base(&mut self) -> Value;
    fn is_defined(&mut self, name: &str) -> bool;
    /// Marks a label as required; returns whether it is defined.
    fn mark_required(&mut self, name: &str) -> bool;
}

pub fn parse(text: &str, pratt: &PrattParser<Rule>) -> Result<Expr, String> {
    let mut pairs = ZasmParser::parse(Rule::full_expr, text).map_err(pest_message)?;
    let expr = pairs.next().unwrap().into_inner().next().unwrap();
    build(expr.into_inner(), pratt)
}

pub fn pest_message(err: pest::error::Error<Rule>) -> String {
    err.variant.message().into_owned()
}

pub fn build(pairs: Pairs<Rule>, pratt: &PrattParser<Rule>) -> Result<Expr, String> {
    pratt
        .map_primary(|p| primary(p, pratt))
        .map_prefix(|op, rhs| {
            let op = match op.as_rule() {
                Rule::op_neg => UnOp::Neg,
                Rule::op_pos => UnOp::Pos,
                Rule::op_lnot => UnOp::LogicalNot,
                Rule::op_bnot => UnOp::BitNot,
                rule => unreachable!("prefix rule {:?}", rule),
            };
            Ok(Expr::Un(op, Box::new(rhs?)))
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::op_add => BinOp::Add,
                Rule::op_sub => BinOp::Sub,
                Rule::op_mul => BinOp::Mul,
                Rule::op_div => BinOp::Div,
                Rule::op_mod => BinOp::Mod,
                Rule::op_shl => BinOp::Shl,
                Rule::op_shr => BinOp::Shr,
                Rule::op_lt => BinOp::Lt,
                Rule::op_le => BinOp::Le,
                Rule::op_gt => BinOp::Gt,
                Rule::op_ge => BinOp::Ge,
                Rule::op_eq => BinOp::Eq,
                Rule::op_ne => BinOp::Ne,
                Rule::op_band => BinOp::BitAnd,
                Rule::op_bxor => BinOp::BitXor,
                Rule::op_bor => BinOp::BitOr,
                Rule::op_and => BinOp::And,
                Rule::op_or => BinOp::Or,
                rule => unreachable!("infix rule {:?}", rule),
            };
            Ok(Expr::Bin(op, Box::new(lhs?), Box::new(rhs?)))
        })
        .parse(pairs)
}

fn int_literal(digits: &str, radix: u32) -> Result<i32, String> {
    u32::from_str_radix(digits, radix)
        .map(|v| v as i32)
        .map_err(|_| format!("number '{}' out of range", digits))
}

fn primary(p: Pair<Rule>, pratt: &PrattParser<Rule>) -> Result<Expr, String> {
    match p.as_rule() {
        Rule::hex_prefix => {
            let s = p.as_str();
            let digits = s.trim_start_matches('$');
            let digits = digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .unwrap_or(digits);
            Ok(Expr::Num(int_literal(digits, 16)?))
        }
        Rule::hex_suffix => {
            let s = p.as_str();
            Ok(Expr::Num(int_literal(&s[..s.len() - 1], 16)?))
        }
        Rule::bin_lit => {
            let s = p.as_str();
            let digits = s
                .strip_prefix('%')
                .or_else(|| s.strip_prefix("0b"))
                .or_else(|| s.strip_prefix("0B"))
                .unwrap_or(s);
            Ok(Expr::Num(int_literal(digits, 2)?))
        }
        Rule::oct_lit => Ok(Expr::Num(int_literal(&p.as_str()[2..], 8)?)),
        Rule::dec_lit => {
            let s = p.as_str();
            let wide: i64 = s.parse().map_err(|_| format!("number '{}' out of range", s))?;
            if wide > u32::MAX as i64 {
                return Err(format!("number '{}' out of range", s));
            }
            Ok(Expr::Num(wide as u32 as i32))
        }
        Rule::char_lit => {
            let s = p.as_str();
            let bytes = parser::unescape(&s[1..s.len() - 1]);
            match bytes.as_slice() {
                [b] => Ok(Expr::Num(*b as i32)),
                _ => Err(format!("character literal {} is not a single byte", s)),
            }
        }
        Rule::base_sym => Ok(Expr::Base),
        Rule::here_sym => Ok(Expr::Here),
        Rule::ident => Ok(Expr::Ident(p.as_str().to_string())),
        Rule::paren => {
            let inner = p.into_inner().next().unwrap();
            build(inner.into_inner(), pratt)
        }
        Rule::func_call => {
            let mut inner = p.into_inner();
            let name = inner.next().unwrap().as_str().to_ascii_lowercase();
            let mut args = Vec::new();
            for pair in inner {
                args.push(build(pair.into_inner(), pratt)?);
            }
            call(&name, args)
        }
        rule => unreachable!("primary rule {:?}", rule),
    }
}

fn call(name: &str, args: Vec<Expr>) -> Result<Expr, String> {
    let (func, arity) = match name {
        "lo" => (Func::Lo, 1..=1),
        "hi" => (Func::Hi, 1..=1),
        "abs" => (Func::Abs, 1..=1),
        "min" => (Func::Min, 2..=usize::MAX),
        "max" => (Func::Max, 2..=usize::MAX),
        "sin" => (Func::Sin, 3..=3),
        "defined" => (Func::Defined, 1..=1),
        "required" => (Func::Required, 1..=1),
        _ => return Err(format!("unknown function '{}'", name)),
    };
    if !arity.contains(&args.len()) {
        return Err(format!("wrong number of arguments for {}()", name));
    }
    if matches!(func, Func::Defined | Func::Required)
        && !matches!(args[0], Expr::Ident(_))
    {
        return Err(format!("{}() expects a label name", name));
    }
    Ok(Expr::Call(func, args))
}

pub fn eval(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, String> {
    match expr {
        Expr::Num(n) => Ok(Value::valid(*n)),
        Expr::Ident(name) => Ok(ctx.lookup(name)),
        Expr::Here => Ok(ctx.here()),
        Expr::Base => Ok(ctx.base()),
        Expr::Un(op, inner) => {
            let v = eval(inner, ctx)?;
            Ok(match op {
                UnOp::Neg => -v,
                UnOp::Pos => v,
                UnOp::BitNot => !v,
                UnOp::LogicalNot => v.lnot(),
            })
        }
        Expr::Bin(BinOp::And, lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            if l.is_valid() && l.value == 0 {
                return Ok(Value::valid(0));
            }
            let r = eval(rhs, ctx)?;
            Ok((l.ne_val(Value::valid(0))) & (r.ne_val(Value::valid(0))))
        }
        Expr::Bin(BinOp::Or, lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            if l.is_valid() && l.value != 0 {
                return Ok(Value::valid(1));
            }
            let r = eval(rhs, ctx)?;
            Ok((l.ne_val(Value::valid(0))) | (r.ne_val(Value::valid(0))))
        }
        Expr::Bin(op, lhs, rhs) => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            let result = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l.div(r).map_err(|e| e.to_string())?,
                BinOp::Mod => l.rem(r).map_err(|e| e.to_string())?,
                BinOp::Shl => l.shl(r).map_err(|e| e.to_string())?,
                BinOp::Shr => l.shr(r).map_err(|e| e.to_string())?,
                BinOp::Lt => l.lt(r),
                BinOp::Le => l.le(r),
                BinOp::Gt => l.gt(r),
                BinOp::Ge => l.ge(r),
                BinOp::Eq => l.eq_val(r),
                BinOp::Ne => l.ne_val(r),
                BinOp::BitAnd => l & r,
                BinOp::BitXor => l ^ r,
                BinOp::BitOr => l | r,
                BinOp::And | BinOp::Or => unreachable!(),
            };
            Ok(result)
        }
        Expr::Call(func, args) => eval_call(*func, args, ctx),
    }
}

fn eval_call(func: Func, args: &[Expr], ctx: &mut dyn EvalContext) -> Result<Value, String> {
    match func {
        Func::Defined => {
            let name = ident_arg(args);
            let defined = ctx.is_defined(name);
            Ok(Value::valid(defined as i32))
        }
        Func::Required => {
            let name = ident_arg(args);
            let defined = ctx.mark_required(name);
            Ok(Value::valid(defined as i32))
        }
        Func::Lo => {
            let v = eval(&args[0], ctx)?;
            Ok(Value::new(v.value & 0xFF, v.validity))
        }
        Func::Hi => {
            let v = eval(&args[0], ctx)?;
            Ok(Value::new((v.value >> 8) & 0xFF, v.validity))
        }
        Func::Abs => {
            let v = eval(&args[0], ctx)?;
            Ok(Value::new(v.value.wrapping_abs(), v.validity))
        }
        Func::Min | Func::Max => {
            let mut acc = eval(&args[0], ctx)?;
            for arg in &args[1..] {
                let v = eval(arg, ctx)?;
                let keep = if func == Func::Min {
                    v.value < acc.value
                } else {
                    v.value > acc.value
                };
                let validity = std::cmp::min(acc.validity, v.validity);
                acc = Value::new(if keep { v.value } else { acc.value }, validity);
            }
            Ok(acc)
        }
        Func::Sin => {
            let angle = eval(&args[0], ctx)?;
            let circle = eval(&args[1], ctx)?;
            let amplitude = eval(&args[2], ctx)?;
            let validity = std::cmp::min(
                angle.validity,
                std::cmp::min(circle.validity, amplitude.validity),
            );
            if circle.value == 0 {
                if circle.is_valid() {
                    return Err("division by zero".to_string());
                }
                return Ok(Value::new(0, validity));
            }
            let radians =
                angle.value as f64 / circle.value as f64 * 2.0 * std::f64::consts::PI;
            let result = (amplitude.value as f64 * radians.sin()).round() as i32;
            Ok(Value::new(result, validity))
        }
    }
}

fn ident_arg(args: &[Expr]) -> &str {
    match &args[0] {
        Expr::Ident(name) => name,
        _ => unreachable!("checked at build time"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::pratt;
    use crate::value::Validity;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockCtx {
        labels: HashMap<String, Value>,
        required: Vec<String>,
    }

    impl EvalContext for MockCtx {
        fn lookup(&mut self, name: &str) -> Value {
            self.labels.get(name).copied().unwrap_or_else(Value::invalid)
        }

        fn here(&mut self) -> Value {
            Value::valid(0x8000)
        }

        fn base(&mut self) -> Value {
            Value::valid(0x4000)
        }

        fn is_defined(&mut self, name: &str) -> bool {
            self.labels.contains_key(name)
        }

        fn mark_required(&mut self, name: &str) -> bool {
            self.required.push(name.to_string());
            self.labels.contains_key(name)
        }
    }

    fn eval_str(text: &str, ctx: &mut MockCtx) -> Result<Value, String> {
        let expr = parse(text, &pratt()).expect(text);
        eval(&expr, ctx)
    }

    fn num(text: &str) -> i32 {
        eval_str(text, &mut MockCtx::default()).unwrap().value
    }

    #[test]
    fn precedence() {
        assert_eq!(num("5+3*2"), 11);
        assert_eq!(num("(5+3)*2"), 16);
        assert_eq!(num("1+2 == 3 && 4 > 2"), 1);
        assert_eq!(num("1 << 4 | 1"), 17);
        assert_eq!(num("10 % 4 + 1"), 3);
    }

    #[test]
    fn flat_operators_evaluate_left_to_right() {
        let expr = parse("5+3*2", &crate::parser::pratt_flat()).unwrap();
        let v = eval(&expr, &mut MockCtx::default()).unwrap();
        assert_eq!(v.value, 16);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(num("-5"), -5);
        assert_eq!(num("~0"), -1);
        assert_eq!(num("!0"), 1);
        assert_eq!(num("!42"), 0);
        assert_eq!(num("--5"), 5);
    }

    #[test]
    fn literal_radices() {
        assert_eq!(num("$FF"), 255);
        assert_eq!(num("0x10"), 16);
        assert_eq!(num("0FFh"), 255);
        assert_eq!(num("%1010"), 10);
        assert_eq!(num("0b11"), 3);
        assert_eq!(num("0o17"), 15);
        assert_eq!(num("'A'"), 65);
        assert_eq!(num("'\\n'"), 10);
    }

    #[test]
    fn location_symbols() {
        assert_eq!(num("$"), 0x8000);
        assert_eq!(num("$$"), 0x4000);
        assert_eq!(num("$ - $$"), 0x4000);
    }

    #[test]
    fn builtins() {
        assert_eq!(num("lo($1234)"), 0x34);
        assert_eq!(num("hi($1234)"), 0x12);
        assert_eq!(num("abs(-7)"), 7);
        assert_eq!(num("min(3, 1, 2)"), 1);
        assert_eq!(num("max(3, 1, 2)"), 3);
        assert_eq!(num("sin(0, 256, 100)"), 0);
        assert_eq!(num("sin(64, 256, 100)"), 100);
        assert_eq!(num("sin(128, 256, 100)"), 0);
    }

    #[test]
    fn unresolved_identifier_is_invalid_not_an_error() {
        let v = eval_str("nowhere + 1", &mut MockCtx::default()).unwrap();
        assert_eq!(v.validity, Validity::Invalid);
    }

    #[test]
    fn defined_and_required() {
        let mut ctx = MockCtx::default();
        ctx.labels.insert("x".into(), Value::valid(1));
        assert_eq!(eval_str("defined(x)", &mut ctx).unwrap().value, 1);
        assert_eq!(eval_str("defined(y)", &mut ctx).unwrap().value, 0);
        assert_eq!(eval_str("required(z)", &mut ctx).unwrap().value, 0);
        assert_eq!(ctx.required, vec!["z".to_string()]);
    }

    #[test]
    fn short_circuit_only_on_valid_lhs() {
        let mut ctx = MockCtx::default();
        ctx.labels.insert("p".into(), Value::preliminary(1));
        // Valid false lhs short-circuits to a Valid result.
        assert!(eval_str("0 && p", &mut ctx).unwrap().is_valid());
        // Preliminary lhs forces both sides and taints the result.
        assert_eq!(
            eval_str("p && 1", &mut ctx).unwrap().validity,
            Validity::Preliminary
        );
    }

    #[test]
    fn syntax_errors_raise() {
        assert!(parse("1 +", &pratt()).is_err());
        assert!(parse("frob(1)", &pratt()).is_err());
        assert!(parse("min(1)", &pratt()).is_err());
    }

    #[test]
    fn division_by_valid_zero_raises() {
        assert!(eval_str("1/0", &mut MockCtx::default()).is_err());
    }
}
