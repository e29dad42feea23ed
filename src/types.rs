//! Types module: defines value kinds and literal values seen by the analyzer.
//!
//! This module provides ValueKind, NumericKind and LiteralValue. Literals carry
//! structural equality and hashing (floats by bit pattern) so they can be used
//! directly inside cache keys.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ValueKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Str,
    Null,
    Object(String),
    Array(Box<ValueKind>),
    Void,
    Unknown, // descriptor or capture without a usable type
}

/// The four computational numeric kinds of the instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Array(Vec<LiteralValue>),
    /// A captured object whose field values were extracted by the loader.
    Object {
        type_name: String,
        fields: BTreeMap<String, LiteralValue>,
    },
    /// An opaque static constant, e.g. an enum member.
    Constant {
        owner: String,
        name: String,
    },
}

impl ValueKind {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueKind::Bool | ValueKind::Int | ValueKind::Long | ValueKind::Float | ValueKind::Double
        )
    }

    pub fn numeric(&self) -> Option<NumericKind> {
        match self {
            ValueKind::Int => Some(NumericKind::Int),
            ValueKind::Long => Some(NumericKind::Long),
            ValueKind::Float => Some(NumericKind::Float),
            ValueKind::Double => Some(NumericKind::Double),
            _ => None,
        }
    }

    /// Whether a value of kind `other` may be bound where `self` is declared.
    /// Reference kinds accept null, and `Unknown` accepts anything.
    pub fn accepts(&self, other: &ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Unknown, _) | (_, ValueKind::Unknown) => true,
            (ValueKind::Object(_) | ValueKind::Str | ValueKind::Array(_), ValueKind::Null) => true,
            // booleans travel as ints on the operand stack
            (ValueKind::Bool, ValueKind::Int) | (ValueKind::Int, ValueKind::Bool) => true,
            (ValueKind::Object(expected), ValueKind::Object(actual)) => expected == actual,
            (ValueKind::Array(expected), ValueKind::Array(actual)) => expected.accepts(actual),
            (expected, actual) => expected == actual,
        }
    }
}

impl From<NumericKind> for ValueKind {
    fn from(kind: NumericKind) -> Self {
        match kind {
            NumericKind::Int => ValueKind::Int,
            NumericKind::Long => ValueKind::Long,
            NumericKind::Float => ValueKind::Float,
            NumericKind::Double => ValueKind::Double,
        }
    }
}

impl NumericKind {
    /// Float and Double are decimal kinds; Int and Long are integral.
    pub fn is_decimal(self) -> bool {
        matches!(self, NumericKind::Float | NumericKind::Double)
    }

    /// Widening promotion: the wider of the two kinds wins, so any decimal
    /// operand makes the result decimal.
    pub fn promote(self, other: NumericKind) -> NumericKind {
        self.max(other)
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NumericKind::Int => "int",
            NumericKind::Long => "long",
            NumericKind::Float => "float",
            NumericKind::Double => "double",
        };
        f.write_str(name)
    }
}

impl LiteralValue {
    /// Infers the kind of this literal value.
    /// Empty arrays, and arrays with mixed element kinds, are Array(Unknown).
    pub fn kind(&self) -> ValueKind {
        match self {
            LiteralValue::Null => ValueKind::Null,
            LiteralValue::Bool(_) => ValueKind::Bool,
            LiteralValue::Int(_) => ValueKind::Int,
            LiteralValue::Long(_) => ValueKind::Long,
            LiteralValue::Float(_) => ValueKind::Float,
            LiteralValue::Double(_) => ValueKind::Double,
            LiteralValue::Str(_) => ValueKind::Str,
            LiteralValue::Array(vals) => {
                let mut kinds = vals.iter().map(LiteralValue::kind);
                match kinds.next() {
                    Some(first) if kinds.all(|k| k == first) => ValueKind::Array(Box::new(first)),
                    _ => ValueKind::Array(Box::new(ValueKind::Unknown)),
                }
            }
            LiteralValue::Object { type_name, .. } => ValueKind::Object(type_name.clone()),
            LiteralValue::Constant { owner, .. } => ValueKind::Object(owner.clone()),
        }
    }

    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            LiteralValue::Int(_) => Some(NumericKind::Int),
            LiteralValue::Long(_) => Some(NumericKind::Long),
            LiteralValue::Float(_) => Some(NumericKind::Float),
            LiteralValue::Double(_) => Some(NumericKind::Double),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LiteralValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            LiteralValue::Int(v) => *v == 0,
            LiteralValue::Long(v) => *v == 0,
            LiteralValue::Float(v) => *v == 0.0,
            LiteralValue::Double(v) => *v == 0.0,
            _ => false,
        }
    }
}

// Floats compare by bit pattern: NaN equals itself and 0.0 differs from -0.0.
// This keeps Eq and Hash consistent for cache keys; numeric comparison
// semantics live in the constant folder instead.
impl PartialEq for LiteralValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LiteralValue::Null, LiteralValue::Null) => true,
            (LiteralValue::Bool(a), LiteralValue::Bool(b)) => a == b,
            (LiteralValue::Int(a), LiteralValue::Int(b)) => a == b,
            (LiteralValue::Long(a), LiteralValue::Long(b)) => a == b,
            (LiteralValue::Float(a), LiteralValue::Float(b)) => a.to_bits() == b.to_bits(),
            (LiteralValue::Double(a), LiteralValue::Double(b)) => a.to_bits() == b.to_bits(),
            (LiteralValue::Str(a), LiteralValue::Str(b)) => a == b,
            (LiteralValue::Array(a), LiteralValue::Array(b)) => a == b,
            (
                LiteralValue::Object { type_name: ta, fields: fa },
                LiteralValue::Object { type_name: tb, fields: fb },
            ) => ta == tb && fa == fb,
            (
                LiteralValue::Constant { owner: oa, name: na },
                LiteralValue::Constant { owner: ob, name: nb },
            ) => oa == ob && na == nb,
            _ => false,
        }
    }
}

impl Eq for LiteralValue {}

impl Hash for LiteralValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            LiteralValue::Null => {}
            LiteralValue::Bool(b) => b.hash(state),
            LiteralValue::Int(v) => v.hash(state),
            LiteralValue::Long(v) => v.hash(state),
            LiteralValue::Float(v) => v.to_bits().hash(state),
            LiteralValue::Double(v) => v.to_bits().hash(state),
            LiteralValue::Str(s) => s.hash(state),
            LiteralValue::Array(vals) => vals.hash(state),
            LiteralValue::Object { type_name, fields } => {
                type_name.hash(state);
                fields.hash(state);
            }
            LiteralValue::Constant { owner, name } => {
                owner.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Null => f.write_str("null"),
            LiteralValue::Bool(b) => write!(f, "{}", b),
            LiteralValue::Int(v) => write!(f, "{}", v),
            LiteralValue::Long(v) => write!(f, "{}L", v),
            LiteralValue::Float(v) => write!(f, "{:?}f", v),
            LiteralValue::Double(v) => write!(f, "{:?}", v),
            LiteralValue::Str(s) => write!(f, "{:?}", s),
            LiteralValue::Array(vals) => {
                f.write_str("{")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("}")
            }
            LiteralValue::Object { type_name, .. } => write!(f, "<{}>", type_name),
            LiteralValue::Constant { owner, name } => write!(f, "{}.{}", simple_name(owner), name),
        }
    }
}

/// `com/acme/Status` -> `Status`
pub(crate) fn simple_name(internal: &str) -> &str {
    internal.rsplit(['/', '.']).next().unwrap_or(internal)
}
