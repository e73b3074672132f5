// src/sema/consteval.rs
//! Compile-time operator semantics. Callers get `Ok(None)` when an
//! operator is not defined for the operand types (the analyzer turns
//! that into an invalid-operand diagnostic with proper type names) and
//! `Err` for evaluation failures like overflow or division by zero.

use miette::SourceSpan;

use crate::errors::SemaError;
use crate::frontend::ast::{BinaryOp, CompareOp, UnaryOp};
use crate::sema::value::{ConstValue, FStrValue};

fn arith_error(msg: &str, span: SourceSpan) -> SemaError {
    SemaError::ConstArithmetic {
        msg: msg.to_string(),
        span,
    }
}

/// Floor division matching the runtime's scoreboard semantics.
fn floor_div(a: i32, b: i32, span: SourceSpan) -> Result<i32, SemaError> {
    if b == 0 {
        return Err(arith_error("division by zero", span));
    }
    if a == i32::MIN && b == -1 {
        return Err(arith_error("integer overflow", span));
    }
    let q = a / b;
    let r = a % b;
    Ok(if r != 0 && ((r < 0) != (b < 0)) { q - 1 } else { q })
}

/// Modulo with the sign of the divisor, matching floor division.
fn floor_mod(a: i32, b: i32, span: SourceSpan) -> Result<i32, SemaError> {
    if b == 0 {
        return Err(arith_error("modulo by zero", span));
    }
    let r = a % b;
    Ok(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
}

fn int_binary(op: BinaryOp, a: i32, b: i32, span: SourceSpan) -> Result<i32, SemaError> {
    match op {
        BinaryOp::Add => a
            .checked_add(b)
            .ok_or_else(|| arith_error("integer overflow", span)),
        BinaryOp::Sub => a
            .checked_sub(b)
            .ok_or_else(|| arith_error("integer overflow", span)),
        BinaryOp::Mul => a
            .checked_mul(b)
            .ok_or_else(|| arith_error("integer overflow", span)),
        BinaryOp::Div => floor_div(a, b, span),
        BinaryOp::Mod => floor_mod(a, b, span),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical ops handled on bools"),
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64, span: SourceSpan) -> Result<Option<f64>, SemaError> {
    Ok(Some(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(arith_error("division by zero", span));
            }
            a / b
        }
        BinaryOp::Mod => return Ok(None),
        BinaryOp::And | BinaryOp::Or => return Ok(None),
    }))
}

fn concat_fstr(lhs: &ConstValue, rhs: &ConstValue) -> FStrValue {
    let mut out = FStrValue::default();
    for side in [lhs, rhs] {
        match side {
            ConstValue::Str(s) => out.push_text(s),
            ConstValue::FStr(f) => {
                out.deps.extend(f.deps.iter().cloned());
                for part in &f.parts {
                    match part {
                        crate::codegen::cmds::RawtextPart::Text(t) => out.push_text(t),
                        other => out.parts.push(other.clone()),
                    }
                }
            }
            _ => unreachable!("concat_fstr called on string values"),
        }
    }
    out
}

/// Evaluate a binary operator on two compile-time values.
pub fn binary(
    op: BinaryOp,
    lhs: &ConstValue,
    rhs: &ConstValue,
    span: SourceSpan,
) -> Result<Option<ConstValue>, SemaError> {
    use ConstValue::*;
    Ok(match (op, lhs, rhs) {
        (BinaryOp::And, Bool(a), Bool(b)) => Some(Bool(*a && *b)),
        (BinaryOp::Or, Bool(a), Bool(b)) => Some(Bool(*a || *b)),
        (BinaryOp::And | BinaryOp::Or, _, _) => Option::None,

        (_, Int(a), Int(b)) => Some(Int(int_binary(op, *a, *b, span)?)),
        (_, Float(a), Float(b)) => float_binary(op, *a, *b, span)?.map(Float),
        (_, Int(a), Float(b)) => float_binary(op, *a as f64, *b, span)?.map(Float),
        (_, Float(a), Int(b)) => float_binary(op, *a, *b as f64, span)?.map(Float),

        (BinaryOp::Add, Str(_) | FStr(_), Str(_) | FStr(_)) => {
            if let (Str(a), Str(b)) = (lhs, rhs) {
                Some(Str(format!("{}{}", a, b)))
            } else {
                Some(FStr(concat_fstr(lhs, rhs)))
            }
        }
        (BinaryOp::Mul, Str(s), Int(n)) | (BinaryOp::Mul, Int(n), Str(s)) => {
            Some(Str(s.repeat((*n).max(0) as usize)))
        }

        (BinaryOp::Add, List(a), List(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Some(List(out))
        }
        (BinaryOp::Mul, List(items), Int(n)) | (BinaryOp::Mul, Int(n), List(items)) => {
            let mut out = Vec::new();
            for _ in 0..(*n).max(0) {
                out.extend(items.iter().cloned());
            }
            Some(List(out))
        }

        _ => Option::None,
    })
}

/// Evaluate a unary operator on a compile-time value.
pub fn unary(
    op: UnaryOp,
    value: &ConstValue,
    span: SourceSpan,
) -> Result<Option<ConstValue>, SemaError> {
    use ConstValue::*;
    Ok(match (op, value) {
        (UnaryOp::Pos, Int(v)) => Some(Int(*v)),
        (UnaryOp::Neg, Int(v)) => Some(Int(
            v.checked_neg()
                .ok_or_else(|| arith_error("integer overflow", span))?,
        )),
        (UnaryOp::Pos, Float(v)) => Some(Float(*v)),
        (UnaryOp::Neg, Float(v)) => Some(Float(-*v)),
        (UnaryOp::Not, Bool(v)) => Some(Bool(!*v)),
        _ => Option::None,
    })
}

/// Evaluate one comparison. `Ok(None)` when the pair is not ordered.
pub fn compare(op: CompareOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<bool> {
    use ConstValue::*;
    let ord = |o: std::cmp::Ordering| match op {
        CompareOp::Eq => o.is_eq(),
        CompareOp::Ne => o.is_ne(),
        CompareOp::Lt => o.is_lt(),
        CompareOp::Le => o.is_le(),
        CompareOp::Gt => o.is_gt(),
        CompareOp::Ge => o.is_ge(),
    };
    match (lhs, rhs) {
        (Int(a), Int(b)) => Some(ord(a.cmp(b))),
        (Float(a), Float(b)) => a.partial_cmp(b).map(ord),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b).map(ord),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).map(ord),
        (Bool(a), Bool(b)) => match op {
            CompareOp::Eq => Some(a == b),
            CompareOp::Ne => Some(a != b),
            _ => Option::None,
        },
        (Str(a), Str(b)) => match op {
            CompareOp::Eq => Some(a == b),
            CompareOp::Ne => Some(a != b),
            _ => Option::None,
        },
        (None, None) => match op {
            CompareOp::Eq => Some(true),
            CompareOp::Ne => Some(false),
            _ => Option::None,
        },
        _ => Option::None,
    }
}

/// Subscript a compile-time list or map.
pub fn subscript(
    obj: &ConstValue,
    index: &ConstValue,
    span: SourceSpan,
) -> Result<Option<ConstValue>, SemaError> {
    match obj {
        ConstValue::List(items) => {
            let ConstValue::Int(i) = index else {
                return Ok(None);
            };
            let len = items.len();
            let idx = if *i < 0 { *i as i64 + len as i64 } else { *i as i64 };
            if idx < 0 || idx >= len as i64 {
                return Err(SemaError::ListIndexOutOfBounds {
                    index: *i as i64,
                    len,
                    span,
                });
            }
            Ok(Some(items[idx as usize].clone()))
        }
        ConstValue::Map(map) => {
            let key = index.as_key().ok_or_else(|| SemaError::InvalidMapKey {
                ty: index.ty().base_name().to_string(),
                span,
            })?;
            map.get(&key)
                .cloned()
                .map(Some)
                .ok_or_else(|| SemaError::MapKeyNotFound {
                    key: key.display(),
                    span,
                })
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::value::{ConstKey, ConstMap};

    fn span() -> SourceSpan {
        (0, 0).into()
    }

    #[test]
    fn int_arithmetic_folds() {
        let v = binary(BinaryOp::Add, &ConstValue::Int(0xF2e), &ConstValue::Int(3), span())
            .unwrap()
            .unwrap();
        assert_eq!(v, ConstValue::Int(3889));
    }

    #[test]
    fn int_division_floors() {
        let div = |a: i32, b: i32| {
            binary(BinaryOp::Div, &ConstValue::Int(a), &ConstValue::Int(b), span())
                .unwrap()
                .unwrap()
        };
        assert_eq!(div(7, 2), ConstValue::Int(3));
        assert_eq!(div(-7, 2), ConstValue::Int(-4));
        assert_eq!(div(7, -2), ConstValue::Int(-4));
    }

    #[test]
    fn int_modulo_follows_divisor_sign() {
        let m = |a: i32, b: i32| {
            binary(BinaryOp::Mod, &ConstValue::Int(a), &ConstValue::Int(b), span())
                .unwrap()
                .unwrap()
        };
        assert_eq!(m(7, 3), ConstValue::Int(1));
        assert_eq!(m(-7, 3), ConstValue::Int(2));
        assert_eq!(m(7, -3), ConstValue::Int(-2));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = binary(BinaryOp::Div, &ConstValue::Int(1), &ConstValue::Int(0), span());
        assert!(matches!(err, Err(SemaError::ConstArithmetic { .. })));
        let err = binary(BinaryOp::Mod, &ConstValue::Int(1), &ConstValue::Int(0), span());
        assert!(matches!(err, Err(SemaError::ConstArithmetic { .. })));
    }

    #[test]
    fn overflow_is_reported() {
        let err = binary(
            BinaryOp::Mul,
            &ConstValue::Int(i32::MAX),
            &ConstValue::Int(2),
            span(),
        );
        assert!(matches!(err, Err(SemaError::ConstArithmetic { .. })));
        let err = unary(UnaryOp::Neg, &ConstValue::Int(i32::MIN), span());
        assert!(matches!(err, Err(SemaError::ConstArithmetic { .. })));
    }

    #[test]
    fn float_promotion() {
        let v = binary(
            BinaryOp::Mul,
            &ConstValue::Int(2),
            &ConstValue::Float(1.5),
            span(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(v, ConstValue::Float(3.0));
    }

    #[test]
    fn string_concat_and_repeat() {
        let v = binary(
            BinaryOp::Add,
            &ConstValue::Str("ab".into()),
            &ConstValue::Str("cd".into()),
            span(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(v, ConstValue::Str("abcd".into()));

        let v = binary(
            BinaryOp::Mul,
            &ConstValue::Str("ab".into()),
            &ConstValue::Int(3),
            span(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(v, ConstValue::Str("ababab".into()));
    }

    #[test]
    fn list_concat_and_repeat() {
        let l = ConstValue::List(vec![ConstValue::Int(1)]);
        let v = binary(BinaryOp::Add, &l, &l, span()).unwrap().unwrap();
        assert_eq!(
            v,
            ConstValue::List(vec![ConstValue::Int(1), ConstValue::Int(1)])
        );
        let v = binary(BinaryOp::Mul, &l, &ConstValue::Int(2), span())
            .unwrap()
            .unwrap();
        assert_eq!(
            v,
            ConstValue::List(vec![ConstValue::Int(1), ConstValue::Int(1)])
        );
    }

    #[test]
    fn undefined_operand_pairs_return_none() {
        assert!(
            binary(
                BinaryOp::Add,
                &ConstValue::Bool(true),
                &ConstValue::Int(1),
                span()
            )
            .unwrap()
            .is_none()
        );
        assert!(
            unary(UnaryOp::Not, &ConstValue::Int(1), span())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            compare(CompareOp::Lt, &ConstValue::Int(1), &ConstValue::Int(2)),
            Some(true)
        );
        assert_eq!(
            compare(CompareOp::Eq, &ConstValue::Str("a".into()), &ConstValue::Str("a".into())),
            Some(true)
        );
        assert_eq!(
            compare(CompareOp::Lt, &ConstValue::Str("a".into()), &ConstValue::Str("b".into())),
            None
        );
        assert_eq!(
            compare(CompareOp::Ge, &ConstValue::Float(2.0), &ConstValue::Int(2)),
            Some(true)
        );
    }

    #[test]
    fn list_subscript_bounds() {
        let l = ConstValue::List(vec![ConstValue::Int(10), ConstValue::Int(20)]);
        assert_eq!(
            subscript(&l, &ConstValue::Int(1), span()).unwrap().unwrap(),
            ConstValue::Int(20)
        );
        assert_eq!(
            subscript(&l, &ConstValue::Int(-1), span()).unwrap().unwrap(),
            ConstValue::Int(20)
        );
        assert!(matches!(
            subscript(&l, &ConstValue::Int(2), span()),
            Err(SemaError::ListIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn map_subscript() {
        let mut map = ConstMap::default();
        map.insert(ConstKey::Str("red".into()), ConstValue::Int(1));
        let m = ConstValue::Map(map);
        assert_eq!(
            subscript(&m, &ConstValue::Str("red".into()), span())
                .unwrap()
                .unwrap(),
            ConstValue::Int(1)
        );
        assert!(matches!(
            subscript(&m, &ConstValue::Str("blue".into()), span()),
            Err(SemaError::MapKeyNotFound { .. })
        ));
        assert!(matches!(
            subscript(&m, &ConstValue::List(vec![]), span()),
            Err(SemaError::InvalidMapKey { .. })
        ));
    }
}
