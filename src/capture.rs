//! Capture module: values bound into a closure when it was created.
//!
//! This module provides CapturedArgument and the Captures table that seeds
//! the simulator's local slots.

use crate::instruction::Slot;
use crate::types::{LiteralValue, ValueKind};
use crate::{AnalysisError, ErrorReason, Result};
use serde::{Serialize, Deserialize};

/// One captured outer value: the local slot it occupies in the compiled body,
/// its runtime value and its declared kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapturedArgument {
    pub slot: Slot,
    pub value: LiteralValue,
    pub declared: ValueKind,
}

impl CapturedArgument {
    pub fn new(slot: Slot, value: LiteralValue, declared: ValueKind) -> Self {
        Self { slot, value, declared }
    }

    /// Capture whose declared kind is inferred from the value.
    pub fn inferred(slot: Slot, value: LiteralValue) -> Self {
        let declared = value.kind();
        Self { slot, value, declared }
    }
}

/// Validated, ordered capture table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Captures {
    args: Vec<CapturedArgument>,
}

impl Captures {
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Builds a table, rejecting duplicate slots and values that do not fit
    /// their declared kind.
    pub fn from_args(args: Vec<CapturedArgument>) -> Result<Self> {
        let mut captures = Self::new();
        for arg in args {
            captures.push(arg)?;
        }
        Ok(captures)
    }

    pub fn push(&mut self, arg: CapturedArgument) -> Result<()> {
        if self.get(arg.slot).is_some() {
            return Err(AnalysisError::structural(
                ErrorReason::UnresolvableCapture,
                format!("slot {} is captured twice", arg.slot),
            ));
        }
        let actual = arg.value.kind();
        if !arg.declared.accepts(&actual) {
            return Err(AnalysisError::structural(
                ErrorReason::UnresolvableCapture,
                format!(
                    "capture in slot {}: expected {:?}, got {:?}",
                    arg.slot, arg.declared, actual
                ),
            ));
        }
        self.args.push(arg);
        Ok(())
    }

    pub fn get(&self, slot: Slot) -> Option<&CapturedArgument> {
        self.args.iter().find(|a| a.slot == slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapturedArgument> {
        self.args.iter()
    }

    /// Captured values in declaration order; part of the analysis cache key.
    pub fn values(&self) -> Vec<LiteralValue> {
        self.args.iter().map(|a| a.value.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn test_push_and_get() {
        let mut captures = Captures::new();
        captures.push(CapturedArgument::new(1, LiteralValue::Int(42), ValueKind::Int)).unwrap();
        assert_eq!(captures.get(1).map(|a| &a.value), Some(&LiteralValue::Int(42)));
        assert!(captures.get(0).is_none());
    }

    #[test]
    fn test_type_checking() {
        let mut captures = Captures::new();
        let res = captures.push(CapturedArgument::new(0, LiteralValue::Str("x".into()), ValueKind::Int));
        let err = res.unwrap_err();
        assert_eq!(err.reason, ErrorReason::UnresolvableCapture);
        assert!(err.offset.is_none());
        // null fits a reference slot
        assert!(captures.push(CapturedArgument::new(0, LiteralValue::Null, ValueKind::Str)).is_ok());
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let res = Captures::from_args(vec![
            CapturedArgument::inferred(0, LiteralValue::Int(1)),
            CapturedArgument::inferred(0, LiteralValue::Int(2)),
        ]);
        assert!(matches!(res, Err(AnalysisError { reason: ErrorReason::UnresolvableCapture, .. })));
    }

    #[test]
    fn test_values_preserve_order() {
        let captures = Captures::from_args(vec![
            CapturedArgument::inferred(2, LiteralValue::Str("b".into())),
            CapturedArgument::inferred(0, LiteralValue::Long(7)),
        ])
        .unwrap();
        assert_eq!(captures.values(), vec![LiteralValue::Str("b".into()), LiteralValue::Long(7)]);
        assert_eq!(captures.len(), 2);
    }

    #[test]
    fn test_serialization_deserialization() {
        let captures = Captures::from_args(vec![CapturedArgument::inferred(1, LiteralValue::Int(123))]).unwrap();
        let json = serde_json::to_string(&captures).unwrap();
        let deserialized: Captures = serde_json::from_str(&json).unwrap();
        assert_eq!(captures, deserialized);
    }
}
