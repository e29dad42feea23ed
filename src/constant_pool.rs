//! Constant pool supplied by the class loader, already resolved.
//!
//! Indices are 1-based as in the class-file format. Unlike the on-disk format,
//! long and double entries occupy a single index here: the loader hands us a
//! resolved table, not the raw pool.

use serde::{Serialize, Deserialize};

/// A resolved reference to a field or method: owner class (internal name),
/// member name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into(), descriptor: descriptor.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
    FieldRef(MemberRef),
    MethodRef(MemberRef),
    InterfaceMethodRef(MemberRef),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Appends an entry and returns its 1-based index.
    pub fn push(&mut self, constant: Constant) -> u16 {
        self.entries.push(constant);
        self.entries.len() as u16
    }

    /// Builder-style variant of [`ConstantPool::push`] for fixtures.
    pub fn with(mut self, constant: Constant) -> Self {
        self.push(constant);
        self
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        (index as usize).checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn field_ref(&self, index: u16) -> Option<&MemberRef> {
        match self.get(index)? {
            Constant::FieldRef(r) => Some(r),
            _ => None,
        }
    }

    /// Method or interface-method reference.
    pub fn method_ref(&self, index: u16) -> Option<&MemberRef> {
        match self.get(index)? {
            Constant::MethodRef(r) | Constant::InterfaceMethodRef(r) => Some(r),
            _ => None,
        }
    }

    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_one_based() {
        let mut pool = ConstantPool::new();
        let idx = pool.push(Constant::Integer(42));
        assert_eq!(idx, 1);
        assert_eq!(pool.get(1), Some(&Constant::Integer(42)));
        assert_eq!(pool.get(0), None);
        assert_eq!(pool.get(2), None);
    }

    #[test]
    fn test_typed_lookups() {
        let pool = ConstantPool::new()
            .with(Constant::FieldRef(MemberRef::new("Person", "age", "I")))
            .with(Constant::InterfaceMethodRef(MemberRef::new("java/util/List", "size", "()I")))
            .with(Constant::Class("java/lang/String".into()));
        assert_eq!(pool.field_ref(1).map(|r| r.name.as_str()), Some("age"));
        assert!(pool.field_ref(2).is_none());
        assert_eq!(pool.method_ref(2).map(|r| r.owner.as_str()), Some("java/util/List"));
        assert_eq!(pool.class_name(3), Some("java/lang/String"));
        assert_eq!(pool.len(), 3);
    }
}
