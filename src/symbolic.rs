//! Symbolic values tracked on the simulated operand stack, and their lowering
//! into the public [`Expression`] form.

use crate::constant_pool::MemberRef;
use crate::decode::field_kind;
use crate::expr::{ArgumentPath, ArithmeticOp, ComparisonOp, Expression, LogicalOp, PathSegment};
use crate::instruction::{ArithOp, CmpOp, NanBias, Slot};
use crate::types::{LiteralValue, NumericKind, ValueKind};
use crate::{AnalysisError, ErrorReason, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolicValue {
    Literal(LiteralValue),
    /// An unresolved parameter slot; only the subject is ever left unbound.
    VariableRef(Slot),
    FieldAccess {
        receiver: Box<SymbolicValue>,
        field: MemberRef,
    },
    MethodCall {
        receiver: Option<Box<SymbolicValue>>,
        method: MemberRef,
        args: Vec<SymbolicValue>,
        kind: ValueKind,
    },
    UnaryOp {
        operand: Box<SymbolicValue>,
        kind: NumericKind,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<SymbolicValue>,
        right: Box<SymbolicValue>,
    },
    Negation(Box<SymbolicValue>),
    /// `left && right` or `left || right`, rebuilt from short-circuit branches.
    Logical {
        op: LogicalOp,
        left: Box<SymbolicValue>,
        right: Box<SymbolicValue>,
    },
    /// A wrapper object passed through an unboxing call. Lowers to the wrapped
    /// value; only the kind changes.
    Unboxed {
        value: Box<SymbolicValue>,
        kind: ValueKind,
    },
    /// Pending `lcmp`/`fcmpl`/... result, consumed by the next branch.
    ThreeWay {
        left: Box<SymbolicValue>,
        right: Box<SymbolicValue>,
        nan: NanBias,
    },
    /// A folded branch diamond.
    Conditional {
        test: Box<SymbolicValue>,
        then_value: Box<SymbolicValue>,
        else_value: Box<SymbolicValue>,
    },
    ArrayElement {
        array: Box<SymbolicValue>,
        index: Box<SymbolicValue>,
        kind: ValueKind,
    },
    ArrayLength(Box<SymbolicValue>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Arithmetic(ArithmeticOp, NumericKind),
    Compare(ComparisonOp),
}

impl From<CmpOp> for ComparisonOp {
    fn from(op: CmpOp) -> Self {
        match op {
            CmpOp::Eq => ComparisonOp::Eq,
            CmpOp::Ne => ComparisonOp::Ne,
            CmpOp::Lt => ComparisonOp::Lt,
            CmpOp::Le => ComparisonOp::Le,
            CmpOp::Gt => ComparisonOp::Gt,
            CmpOp::Ge => ComparisonOp::Ge,
        }
    }
}

impl From<ArithOp> for ArithmeticOp {
    fn from(op: ArithOp) -> Self {
        match op {
            ArithOp::Add => ArithmeticOp::Add,
            ArithOp::Sub => ArithmeticOp::Sub,
            ArithOp::Mul => ArithmeticOp::Mul,
            ArithOp::Div => ArithmeticOp::Div,
            ArithOp::Rem => ArithmeticOp::Rem,
        }
    }
}

impl SymbolicValue {
    pub fn literal(value: LiteralValue) -> Self {
        SymbolicValue::Literal(value)
    }

    pub fn compare(op: ComparisonOp, left: SymbolicValue, right: SymbolicValue) -> Self {
        SymbolicValue::BinaryOp { op: BinaryOperator::Compare(op), left: Box::new(left), right: Box::new(right) }
    }

    pub fn negation(inner: SymbolicValue) -> Self {
        SymbolicValue::Negation(Box::new(inner))
    }

    pub fn logical(op: LogicalOp, left: SymbolicValue, right: SymbolicValue) -> Self {
        SymbolicValue::Logical { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn conditional(test: SymbolicValue, then_value: SymbolicValue, else_value: SymbolicValue) -> Self {
        SymbolicValue::Conditional {
            test: Box::new(test),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        }
    }

    /// Best-effort static kind, used to tell booleans from ints.
    pub fn kind(&self) -> ValueKind {
        match self {
            SymbolicValue::Literal(v) => v.kind(),
            SymbolicValue::VariableRef(_) => ValueKind::Unknown,
            SymbolicValue::FieldAccess { field, .. } => field_kind(field),
            SymbolicValue::MethodCall { kind, .. }
            | SymbolicValue::ArrayElement { kind, .. }
            | SymbolicValue::Unboxed { kind, .. } => kind.clone(),
            SymbolicValue::UnaryOp { kind, .. } => (*kind).into(),
            SymbolicValue::BinaryOp { op: BinaryOperator::Arithmetic(_, kind), .. } => (*kind).into(),
            SymbolicValue::BinaryOp { op: BinaryOperator::Compare(_), .. }
            | SymbolicValue::Negation(_)
            | SymbolicValue::Logical { .. } => ValueKind::Bool,
            SymbolicValue::ThreeWay { .. } | SymbolicValue::ArrayLength(_) => ValueKind::Int,
            SymbolicValue::Conditional { then_value, else_value, .. } => {
                let (a, b) = (then_value.kind(), else_value.kind());
                if a == ValueKind::Bool || b == ValueKind::Bool {
                    ValueKind::Bool
                } else if a == b {
                    a
                } else {
                    ValueKind::Unknown
                }
            }
        }
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == ValueKind::Bool
    }

    /// Booleans, plus the int `0`/`1` literals compiled code uses for them.
    pub fn is_boolean_shaped(&self) -> bool {
        matches!(self, SymbolicValue::Literal(LiteralValue::Int(0 | 1))) || self.is_bool()
    }

    pub fn as_bool_literal(&self) -> Option<bool> {
        match self {
            SymbolicValue::Literal(LiteralValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// For `b op tail`, returns `op` and `b`.
    pub fn split_tail(&self, tail: &SymbolicValue) -> Option<(LogicalOp, SymbolicValue)> {
        match self {
            SymbolicValue::Logical { op, left, right } if **right == *tail => Some((*op, (**left).clone())),
            _ => None,
        }
    }

    /// Rewrites integer `0`/`1` literals (also inside conditional arms) as
    /// boolean literals. Everything else is returned unchanged.
    pub fn into_bool(self) -> SymbolicValue {
        match self {
            SymbolicValue::Literal(LiteralValue::Int(0)) => SymbolicValue::Literal(LiteralValue::Bool(false)),
            SymbolicValue::Literal(LiteralValue::Int(1)) => SymbolicValue::Literal(LiteralValue::Bool(true)),
            SymbolicValue::Conditional { test, then_value, else_value } => SymbolicValue::Conditional {
                test,
                then_value: Box::new(then_value.into_bool()),
                else_value: Box::new(else_value.into_bool()),
            },
            other => other,
        }
    }

    /// Lowers into the public AST. `subject` is the slot holding the
    /// predicate's parameter; paths are rooted there.
    pub fn lower(&self, subject: Slot) -> Result<Expression> {
        let expr = match self {
            SymbolicValue::Literal(v) => Expression::Literal(v.clone()),
            SymbolicValue::VariableRef(slot) if *slot == subject => Expression::ArgumentPath(ArgumentPath::root()),
            SymbolicValue::VariableRef(slot) => {
                return Err(AnalysisError::structural(
                    ErrorReason::UnresolvableCapture,
                    format!("slot {} is neither the subject nor a capture", slot),
                ))
            }
            SymbolicValue::FieldAccess { receiver, field } => match receiver.lower(subject)? {
                Expression::ArgumentPath(path) => {
                    Expression::ArgumentPath(path.child(PathSegment::Field(field.name.clone())))
                }
                _ => return Err(unsupported(format!("field {} read from a computed value", field.name))),
            },
            SymbolicValue::MethodCall { receiver, method, args, .. } => {
                let target = match receiver {
                    Some(r) => Some(r.lower(subject)?),
                    None => None,
                };
                match target {
                    Some(Expression::ArgumentPath(path)) if args.is_empty() => {
                        Expression::ArgumentPath(path.child(PathSegment::Method(method.name.clone())))
                    }
                    target => Expression::MethodInvocation {
                        target: target.map(Box::new),
                        method: method.clone(),
                        args: args.iter().map(|a| a.lower(subject)).collect::<Result<_>>()?,
                    },
                }
            }
            SymbolicValue::UnaryOp { operand, kind } => {
                Expression::arithmetic(ArithmeticOp::Neg, *kind, vec![operand.lower(subject)?])
            }
            SymbolicValue::BinaryOp { op, left, right } => {
                let (l, r) = (left.lower(subject)?, right.lower(subject)?);
                match op {
                    BinaryOperator::Arithmetic(op, kind) => Expression::arithmetic(*op, *kind, vec![l, r]),
                    BinaryOperator::Compare(op) => Expression::compare(*op, l, r),
                }
            }
            SymbolicValue::Negation(inner) => Expression::not(inner.lower(subject)?),
            SymbolicValue::Logical { op, left, right } => Expression::BooleanCombination {
                op: *op,
                operands: vec![left.lower(subject)?, right.lower(subject)?],
            },
            SymbolicValue::Unboxed { value, .. } => value.lower(subject)?,
            SymbolicValue::ThreeWay { .. } => {
                return Err(unsupported("three-way comparison result used as a value".into()))
            }
            SymbolicValue::Conditional { test, then_value, else_value } => Expression::conditional(
                test.lower(subject)?,
                then_value.lower(subject)?,
                else_value.lower(subject)?,
            ),
            SymbolicValue::ArrayElement { array, index, .. } => {
                match (array.lower(subject)?, index.as_ref()) {
                    (Expression::ArgumentPath(path), SymbolicValue::Literal(LiteralValue::Int(i))) if *i >= 0 => {
                        Expression::ArgumentPath(path.child(PathSegment::Index(*i as u32)))
                    }
                    _ => return Err(unsupported("array element with a computed array or index".into())),
                }
            }
            SymbolicValue::ArrayLength(array) => match array.lower(subject)? {
                Expression::ArgumentPath(path) => Expression::ArgumentPath(path.child(PathSegment::Length)),
                _ => return Err(unsupported("length of a computed array".into())),
            },
        };
        Ok(expr)
    }
}

fn unsupported(message: String) -> AnalysisError {
    AnalysisError::structural(ErrorReason::UnsupportedOpcode, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age() -> SymbolicValue {
        SymbolicValue::FieldAccess {
            receiver: Box::new(SymbolicValue::VariableRef(0)),
            field: MemberRef::new("Person", "age", "I"),
        }
    }

    #[test]
    fn test_lower_field_chain_to_path() {
        let city = SymbolicValue::FieldAccess {
            receiver: Box::new(SymbolicValue::MethodCall {
                receiver: Some(Box::new(SymbolicValue::VariableRef(1))),
                method: MemberRef::new("Person", "getAddress", "()LAddress;"),
                args: vec![],
                kind: ValueKind::Object("Address".into()),
            }),
            field: MemberRef::new("Address", "city", "Ljava/lang/String;"),
        };
        let expr = city.lower(1).unwrap();
        assert_eq!(expr.to_string(), "it.getAddress().city");
        assert_eq!(city.kind(), ValueKind::Str);
    }

    #[test]
    fn test_lower_comparison() {
        let cmp = SymbolicValue::compare(ComparisonOp::Ge, age(), SymbolicValue::literal(LiteralValue::Int(18)));
        assert!(cmp.is_bool());
        assert_eq!(
            cmp.lower(0).unwrap(),
            Expression::compare(ComparisonOp::Ge, Expression::path(&["age"]), Expression::literal(LiteralValue::Int(18)))
        );
    }

    #[test]
    fn test_method_with_arguments_stays_invocation() {
        let call = SymbolicValue::MethodCall {
            receiver: Some(Box::new(SymbolicValue::VariableRef(0))),
            method: MemberRef::new("Person", "hasTag", "(Ljava/lang/String;)Z"),
            args: vec![SymbolicValue::literal(LiteralValue::Str("vip".into()))],
            kind: ValueKind::Bool,
        };
        assert!(matches!(call.lower(0).unwrap(), Expression::MethodInvocation { .. }));
    }

    #[test]
    fn test_into_bool_coerces_nested_arms() {
        let value = SymbolicValue::conditional(
            SymbolicValue::compare(ComparisonOp::Lt, age(), SymbolicValue::literal(LiteralValue::Int(18))),
            SymbolicValue::literal(LiteralValue::Int(0)),
            SymbolicValue::literal(LiteralValue::Int(1)),
        );
        assert_eq!(value.kind(), ValueKind::Int);
        let coerced = value.into_bool();
        assert!(coerced.is_bool());
        let SymbolicValue::Conditional { then_value, else_value, .. } = coerced else {
            panic!("expected conditional");
        };
        assert_eq!(*then_value, SymbolicValue::literal(LiteralValue::Bool(false)));
        assert_eq!(*else_value, SymbolicValue::literal(LiteralValue::Bool(true)));
        // only 0 and 1 are boolean-shaped
        assert_eq!(
            SymbolicValue::literal(LiteralValue::Int(2)).into_bool(),
            SymbolicValue::literal(LiteralValue::Int(2))
        );
    }

    #[test]
    fn test_lower_rejects_pending_three_way() {
        let three_way = SymbolicValue::ThreeWay {
            left: Box::new(age()),
            right: Box::new(SymbolicValue::literal(LiteralValue::Int(1))),
            nan: NanBias::None,
        };
        let err = three_way.lower(0).unwrap_err();
        assert_eq!(err.reason, ErrorReason::UnsupportedOpcode);
        assert_eq!(err.offset, None);
    }

    #[test]
    fn test_lower_array_paths() {
        let tags = SymbolicValue::FieldAccess {
            receiver: Box::new(SymbolicValue::VariableRef(0)),
            field: MemberRef::new("Person", "scores", "[I"),
        };
        let len = SymbolicValue::ArrayLength(Box::new(tags.clone()));
        assert_eq!(len.lower(0).unwrap().to_string(), "it.scores.length");
        let first = SymbolicValue::ArrayElement {
            array: Box::new(tags),
            index: Box::new(SymbolicValue::literal(LiteralValue::Int(0))),
            kind: ValueKind::Int,
        };
        assert_eq!(first.lower(0).unwrap().to_string(), "it.scores[0]");
    }

    #[test]
    fn test_unboxed_boolean_is_bool_and_lowers_transparently() {
        let active = SymbolicValue::MethodCall {
            receiver: Some(Box::new(SymbolicValue::VariableRef(0))),
            method: MemberRef::new("Person", "getActive", "()Ljava/lang/Boolean;"),
            args: vec![],
            kind: ValueKind::Object("java/lang/Boolean".into()),
        };
        assert!(!active.is_bool());
        let unboxed = SymbolicValue::Unboxed { value: Box::new(active), kind: ValueKind::Bool };
        assert!(unboxed.is_bool());
        assert_eq!(unboxed.lower(0).unwrap().to_string(), "it.getActive()");
    }

    #[test]
    fn test_logical_lowers_to_combination_and_splits_tail() {
        let adult = SymbolicValue::compare(ComparisonOp::Ge, age(), SymbolicValue::literal(LiteralValue::Int(18)));
        let young = SymbolicValue::compare(ComparisonOp::Lt, age(), SymbolicValue::literal(LiteralValue::Int(65)));
        let both = SymbolicValue::logical(LogicalOp::And, adult.clone(), young.clone());
        assert!(both.is_bool());
        assert!(matches!(both.lower(0).unwrap(), Expression::BooleanCombination { op: LogicalOp::And, .. }));
        assert_eq!(both.split_tail(&young), Some((LogicalOp::And, adult.clone())));
        assert_eq!(both.split_tail(&adult), None);
        assert!(SymbolicValue::literal(LiteralValue::Int(1)).is_boolean_shaped());
        assert!(!SymbolicValue::literal(LiteralValue::Int(2)).is_boolean_shaped());
    }

    #[test]
    fn test_lower_unknown_slot() {
        let err = SymbolicValue::VariableRef(3).lower(0).unwrap_err();
        assert_eq!(err.reason, ErrorReason::UnresolvableCapture);
    }
}
