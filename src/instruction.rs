//! Instruction model for predicate bodies.
//!
//! This module defines the decoded instruction form consumed by the simulator.
//! Opcodes are grouped into a closed set of categories so every consumer must
//! match exhaustively.

use crate::constant_pool::MemberRef;
use crate::types::{LiteralValue, NumericKind, ValueKind};
use serde::{Serialize, Deserialize};

/// Byte offset of an instruction within its method body.
pub type Offset = u32;
/// Index into the local-variable table.
pub type Slot = u16;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub offset: Offset,
    pub op: Op,
}

impl Instruction {
    pub fn new(offset: Offset, op: Op) -> Self {
        Self { offset, op }
    }

    /// Branch or jump target, if this instruction transfers control.
    pub fn target(&self) -> Option<Offset> {
        match self.op {
            Op::BranchIf { target, .. } | Op::Goto { target } => Some(target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Op {
    Nop,
    /// Push a constant (`iconst_*`, `bipush`, `ldc`, `aconst_null`, ...).
    LoadConst(LiteralValue),
    /// Push the value bound to a local slot.
    LoadLocal { slot: Slot, kind: ValueKind },
    /// Pop a value into a local slot.
    StoreLocal { slot: Slot, kind: ValueKind },
    /// Pop a receiver, push one of its fields.
    GetField(MemberRef),
    /// Push a static field.
    GetStatic(MemberRef),
    /// Pop arguments (and receiver unless static), push the result.
    Invoke { kind: InvokeKind, method: MemberRef },
    /// Pop two, push the result.
    Arithmetic { op: ArithOp, kind: NumericKind },
    Negate(NumericKind),
    Convert { from: NumericKind, to: NumericKind },
    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`: pop two, push -1/0/1.
    CompareThreeWay { kind: NumericKind, nan: NanBias },
    BranchIf { cond: BranchCond, target: Offset },
    Goto { target: Offset },
    /// `None` for a void return.
    Return(Option<ValueKind>),
    ArrayLoad(ValueKind),
    ArrayLength,
    /// `Integer.valueOf(int)` and friends.
    Box(ValueKind),
    /// `Integer.intValue()` and friends.
    Unbox(ValueKind),
    CheckCast(String),
    Dup,
    Pop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Result pushed by a floating-point three-way compare when an operand is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NanBias {
    None, // lcmp
    Less,
    Greater,
}

/// Relational operator as encoded in a branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// What a conditional branch tests before jumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchCond {
    /// `if<op>`: pop one int and compare it with zero.
    Zero(CmpOp),
    /// `if_icmp<op>`: pop two ints.
    IntCmp(CmpOp),
    /// `if_acmpeq` / `if_acmpne`: pop two references.
    RefCmp(CmpOp),
    Null,
    NonNull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_only_for_control_transfer() {
        let branch = Instruction::new(3, Op::BranchIf { cond: BranchCond::Null, target: 10 });
        assert_eq!(branch.target(), Some(10));
        assert_eq!(Instruction::new(4, Op::Goto { target: 12 }).target(), Some(12));
        assert_eq!(Instruction::new(5, Op::Dup).target(), None);
    }
}
