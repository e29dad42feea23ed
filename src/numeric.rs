//! Numeric promotion and literal evaluation shared by the simulator and the
//! constant folder.
//!
//! Evaluation follows the JVM exactly: integer arithmetic wraps, float
//! arithmetic is IEEE 754 in the operand width, and float-to-integer
//! conversion saturates with NaN mapping to zero (which is also what Rust's
//! `as` does).

use crate::expr::{ArithmeticOp, ComparisonOp};
use crate::types::{LiteralValue, NumericKind};
use crate::{AnalysisError, ErrorReason, Result};
use std::cmp::Ordering;

/// Converts a numeric literal to `to`, widening or narrowing.
/// Returns `None` for non-numeric literals.
pub fn convert(value: &LiteralValue, to: NumericKind) -> Option<LiteralValue> {
    let converted = match (value, to) {
        (LiteralValue::Int(v), NumericKind::Int) => LiteralValue::Int(*v),
        (LiteralValue::Int(v), NumericKind::Long) => LiteralValue::Long(*v as i64),
        (LiteralValue::Int(v), NumericKind::Float) => LiteralValue::Float(*v as f32),
        (LiteralValue::Int(v), NumericKind::Double) => LiteralValue::Double(*v as f64),
        (LiteralValue::Long(v), NumericKind::Int) => LiteralValue::Int(*v as i32),
        (LiteralValue::Long(v), NumericKind::Long) => LiteralValue::Long(*v),
        (LiteralValue::Long(v), NumericKind::Float) => LiteralValue::Float(*v as f32),
        (LiteralValue::Long(v), NumericKind::Double) => LiteralValue::Double(*v as f64),
        (LiteralValue::Float(v), NumericKind::Int) => LiteralValue::Int(*v as i32),
        (LiteralValue::Float(v), NumericKind::Long) => LiteralValue::Long(*v as i64),
        (LiteralValue::Float(v), NumericKind::Float) => LiteralValue::Float(*v),
        (LiteralValue::Float(v), NumericKind::Double) => LiteralValue::Double(*v as f64),
        (LiteralValue::Double(v), NumericKind::Int) => LiteralValue::Int(*v as i32),
        (LiteralValue::Double(v), NumericKind::Long) => LiteralValue::Long(*v as i64),
        (LiteralValue::Double(v), NumericKind::Float) => LiteralValue::Float(*v as f32),
        (LiteralValue::Double(v), NumericKind::Double) => LiteralValue::Double(*v),
        _ => return None,
    };
    Some(converted)
}

/// Promotes both operands to their common kind.
fn promote_pair(left: &LiteralValue, right: &LiteralValue) -> Option<(LiteralValue, LiteralValue)> {
    let kind = left.numeric_kind()?.promote(right.numeric_kind()?);
    Some((convert(left, kind)?, convert(right, kind)?))
}

/// Evaluates a binary arithmetic operation over two literals.
///
/// Returns `Ok(None)` when either operand is not numeric, and an error when
/// dividing by a zero literal (integral or decimal).
pub fn fold_arithmetic(op: ArithmeticOp, left: &LiteralValue, right: &LiteralValue) -> Result<Option<LiteralValue>> {
    let Some((l, r)) = promote_pair(left, right) else {
        return Ok(None);
    };
    if matches!(op, ArithmeticOp::Div | ArithmeticOp::Rem) && r.is_zero() {
        return Err(AnalysisError::structural(
            ErrorReason::DivisionByZeroLiteral,
            format!("{} {} {}", left, op.symbol(), right),
        ));
    }
    let result = match (l, r) {
        (LiteralValue::Int(a), LiteralValue::Int(b)) => LiteralValue::Int(match op {
            ArithmeticOp::Add => a.wrapping_add(b),
            ArithmeticOp::Sub => a.wrapping_sub(b),
            ArithmeticOp::Mul => a.wrapping_mul(b),
            ArithmeticOp::Div => a.wrapping_div(b),
            ArithmeticOp::Rem => a.wrapping_rem(b),
            ArithmeticOp::Neg => return Ok(None),
        }),
        (LiteralValue::Long(a), LiteralValue::Long(b)) => LiteralValue::Long(match op {
            ArithmeticOp::Add => a.wrapping_add(b),
            ArithmeticOp::Sub => a.wrapping_sub(b),
            ArithmeticOp::Mul => a.wrapping_mul(b),
            ArithmeticOp::Div => a.wrapping_div(b),
            ArithmeticOp::Rem => a.wrapping_rem(b),
            ArithmeticOp::Neg => return Ok(None),
        }),
        (LiteralValue::Float(a), LiteralValue::Float(b)) => LiteralValue::Float(match op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => a / b,
            ArithmeticOp::Rem => a % b,
            ArithmeticOp::Neg => return Ok(None),
        }),
        (LiteralValue::Double(a), LiteralValue::Double(b)) => LiteralValue::Double(match op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => a / b,
            ArithmeticOp::Rem => a % b,
            ArithmeticOp::Neg => return Ok(None),
        }),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Arithmetic negation of a literal. Non-numeric literals have no negation.
pub fn fold_negate(value: &LiteralValue) -> Result<LiteralValue> {
    match value {
        LiteralValue::Int(v) => Ok(LiteralValue::Int(v.wrapping_neg())),
        LiteralValue::Long(v) => Ok(LiteralValue::Long(v.wrapping_neg())),
        LiteralValue::Float(v) => Ok(LiteralValue::Float(-v)),
        LiteralValue::Double(v) => Ok(LiteralValue::Double(-v)),
        other => Err(AnalysisError::structural(
            ErrorReason::UnrepresentableNumericNegation,
            format!("cannot negate {:?} literal {}", other.kind(), other),
        )),
    }
}

/// Evaluates a comparison between two literals when the result is defined:
/// numeric values compare after promotion (NaN is unordered), other literals
/// support equality only.
pub fn fold_comparison(op: ComparisonOp, left: &LiteralValue, right: &LiteralValue) -> Option<bool> {
    if let Some((l, r)) = promote_pair(left, right) {
        let ordering = match (l, r) {
            (LiteralValue::Int(a), LiteralValue::Int(b)) => Some(a.cmp(&b)),
            (LiteralValue::Long(a), LiteralValue::Long(b)) => Some(a.cmp(&b)),
            (LiteralValue::Float(a), LiteralValue::Float(b)) => a.partial_cmp(&b),
            (LiteralValue::Double(a), LiteralValue::Double(b)) => a.partial_cmp(&b),
            _ => return None,
        };
        return Some(match ordering {
            None => op == ComparisonOp::Ne,
            Some(ord) => ordering_satisfies(op, ord),
        });
    }
    let equal = match (left, right) {
        (LiteralValue::Null, LiteralValue::Null) => true,
        (LiteralValue::Null, other) | (other, LiteralValue::Null) if is_reference(other) => false,
        (LiteralValue::Bool(a), LiteralValue::Bool(b)) => a == b,
        (LiteralValue::Str(a), LiteralValue::Str(b)) => a == b,
        (LiteralValue::Constant { .. }, LiteralValue::Constant { .. }) => left == right,
        _ => return None,
    };
    match op {
        ComparisonOp::Eq => Some(equal),
        ComparisonOp::Ne => Some(!equal),
        _ => None,
    }
}

fn is_reference(value: &LiteralValue) -> bool {
    matches!(
        value,
        LiteralValue::Str(_) | LiteralValue::Array(_) | LiteralValue::Object { .. } | LiteralValue::Constant { .. }
    )
}

fn ordering_satisfies(op: ComparisonOp, ord: Ordering) -> bool {
    match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::Ne => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::Le => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::Ge => ord != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_addition() {
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Int(2), &LiteralValue::Int(3)).unwrap();
        assert_eq!(r, Some(LiteralValue::Int(5)));
    }

    #[test]
    fn test_integral_plus_decimal_promotes() {
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Int(2), &LiteralValue::Double(3.0)).unwrap();
        assert_eq!(r, Some(LiteralValue::Double(5.0)));
        let r = fold_arithmetic(ArithmeticOp::Mul, &LiteralValue::Long(3), &LiteralValue::Float(0.5)).unwrap();
        assert_eq!(r, Some(LiteralValue::Float(1.5)));
        let r = fold_arithmetic(ArithmeticOp::Sub, &LiteralValue::Int(1), &LiteralValue::Long(5)).unwrap();
        assert_eq!(r, Some(LiteralValue::Long(-4)));
    }

    #[test]
    fn test_integer_semantics_match_jvm() {
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Int(i32::MAX), &LiteralValue::Int(1)).unwrap();
        assert_eq!(r, Some(LiteralValue::Int(i32::MIN)));
        let r = fold_arithmetic(ArithmeticOp::Div, &LiteralValue::Int(i32::MIN), &LiteralValue::Int(-1)).unwrap();
        assert_eq!(r, Some(LiteralValue::Int(i32::MIN)));
        let r = fold_arithmetic(ArithmeticOp::Div, &LiteralValue::Int(-7), &LiteralValue::Int(2)).unwrap();
        assert_eq!(r, Some(LiteralValue::Int(-3)));
        let r = fold_arithmetic(ArithmeticOp::Rem, &LiteralValue::Int(-7), &LiteralValue::Int(2)).unwrap();
        assert_eq!(r, Some(LiteralValue::Int(-1)));
    }

    #[test]
    fn test_float_arithmetic_is_bit_exact() {
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Float(0.1), &LiteralValue::Float(0.2)).unwrap();
        assert_eq!(r, Some(LiteralValue::Float(0.1f32 + 0.2f32)));
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Float(0.1), &LiteralValue::Double(0.2)).unwrap();
        assert_eq!(r, Some(LiteralValue::Double(0.1f32 as f64 + 0.2)));
    }

    #[test]
    fn test_division_by_zero_literal() {
        let err = fold_arithmetic(ArithmeticOp::Div, &LiteralValue::Int(1), &LiteralValue::Int(0)).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DivisionByZeroLiteral);
        assert!(err.offset.is_none());
        let err = fold_arithmetic(ArithmeticOp::Rem, &LiteralValue::Double(1.0), &LiteralValue::Double(0.0)).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DivisionByZeroLiteral);
    }

    #[test]
    fn test_non_numeric_operands_do_not_fold() {
        let r = fold_arithmetic(ArithmeticOp::Add, &LiteralValue::Str("a".into()), &LiteralValue::Int(1)).unwrap();
        assert_eq!(r, None);
    }

    #[test]
    fn test_negation() {
        assert_eq!(fold_negate(&LiteralValue::Int(i32::MIN)).unwrap(), LiteralValue::Int(i32::MIN));
        assert_eq!(fold_negate(&LiteralValue::Double(2.5)).unwrap(), LiteralValue::Double(-2.5));
        let err = fold_negate(&LiteralValue::Bool(true)).unwrap_err();
        assert_eq!(err.reason, ErrorReason::UnrepresentableNumericNegation);
    }

    #[test]
    fn test_narrowing_conversions() {
        assert_eq!(convert(&LiteralValue::Double(1e20), NumericKind::Int), Some(LiteralValue::Int(i32::MAX)));
        assert_eq!(convert(&LiteralValue::Double(f64::NAN), NumericKind::Long), Some(LiteralValue::Long(0)));
        assert_eq!(convert(&LiteralValue::Long(1 << 33 | 5), NumericKind::Int), Some(LiteralValue::Int(5)));
        assert_eq!(convert(&LiteralValue::Str("1".into()), NumericKind::Int), None);
    }

    #[test]
    fn test_fold_comparisons() {
        assert_eq!(fold_comparison(ComparisonOp::Lt, &LiteralValue::Int(1), &LiteralValue::Double(1.5)), Some(true));
        assert_eq!(fold_comparison(ComparisonOp::Ge, &LiteralValue::Long(3), &LiteralValue::Int(3)), Some(true));
        assert_eq!(fold_comparison(ComparisonOp::Eq, &LiteralValue::Double(f64::NAN), &LiteralValue::Double(f64::NAN)), Some(false));
        assert_eq!(fold_comparison(ComparisonOp::Ne, &LiteralValue::Double(f64::NAN), &LiteralValue::Int(0)), Some(true));
        assert_eq!(fold_comparison(ComparisonOp::Eq, &LiteralValue::Null, &LiteralValue::Str("x".into())), Some(false));
        assert_eq!(fold_comparison(ComparisonOp::Ne, &LiteralValue::Str("x".into()), &LiteralValue::Str("x".into())), Some(false));
        assert_eq!(fold_comparison(ComparisonOp::Lt, &LiteralValue::Str("a".into()), &LiteralValue::Str("b".into())), None);
        assert_eq!(fold_comparison(ComparisonOp::Eq, &LiteralValue::Bool(true), &LiteralValue::Int(1)), None);
    }
}
