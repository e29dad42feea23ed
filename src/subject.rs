//! Subject module: the declared type of the predicate's input parameter.
//!
//! This module provides SubjectType, its builder, and SubjectParam which pins
//! the subject to a local slot of the compiled body.

use crate::instruction::Slot;
use crate::types::ValueKind;
use std::collections::HashMap;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SubjectType {
    name: String,
    fields: HashMap<String, ValueKind>,
}

impl SubjectType {
    /// A subject type with no field metadata.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: HashMap::new() }
    }

    /// Internal class name, e.g. `com/acme/Person`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_kind(&self, field: &str) -> Option<&ValueKind> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &HashMap<String, ValueKind> {
        &self.fields
    }

    pub fn kind(&self) -> ValueKind {
        ValueKind::Object(self.name.clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SubjectTypeBuilder {
    name: String,
    fields: HashMap<String, ValueKind>,
}

impl SubjectTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fields: HashMap::new() }
    }
    pub fn field(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.fields.insert(name.into(), kind);
        self
    }
    pub fn build(self) -> SubjectType {
        SubjectType { name: self.name, fields: self.fields }
    }
}

/// Where the subject lives in the compiled body. Capturing lambdas are
/// usually compiled with their captures first, pushing the subject to a
/// later slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectParam {
    pub slot: Slot,
    pub ty: SubjectType,
}

impl SubjectParam {
    pub fn new(slot: Slot, ty: SubjectType) -> Self {
        Self { slot, ty }
    }

    /// Subject in slot 0, the layout of a non-capturing lambda.
    pub fn first(ty: SubjectType) -> Self {
        Self { slot: 0, ty }
    }
}
