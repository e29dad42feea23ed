//! Operand-stack simulator.
//!
//! Executes one instruction at a time over symbolic values. The frame is
//! threaded by value: [`Simulator::step`] consumes it and hands it back inside
//! the resulting [`Effect`].

use crate::capture::Captures;
use crate::constant_pool::MemberRef;
use crate::descriptor::parse_method_descriptor;
use crate::expr::{accessor_property, ComparisonOp};
use crate::instruction::*;
use crate::intrinsics::{Intrinsic, IntrinsicRegistry};
use crate::numeric::convert;
use crate::symbolic::{BinaryOperator, SymbolicValue};
use crate::types::{LiteralValue, ValueKind};
use crate::{AnalysisError, ErrorReason, Result};
use std::collections::BTreeMap;

/// Operand stack plus local-variable bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub stack: Vec<SymbolicValue>,
    pub locals: BTreeMap<Slot, SymbolicValue>,
}

impl Frame {
    /// Entry frame: the subject slot is symbolic, captured slots hold their
    /// values. A capture may not occupy the subject's slot.
    pub fn initial(subject: Slot, captures: &Captures) -> Result<Self> {
        if captures.get(subject).is_some() {
            return Err(AnalysisError::structural(
                ErrorReason::UnresolvableCapture,
                format!("slot {} holds both the subject and a captured value", subject),
            ));
        }
        let mut locals = BTreeMap::new();
        for arg in captures.iter() {
            locals.insert(arg.slot, SymbolicValue::Literal(arg.value.clone()));
        }
        locals.insert(subject, SymbolicValue::VariableRef(subject));
        Ok(Self { stack: Vec::new(), locals })
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn push(&mut self, value: SymbolicValue) {
        self.stack.push(value);
    }

    fn pop(&mut self, offset: Offset) -> Result<SymbolicValue> {
        self.stack
            .pop()
            .ok_or_else(|| AnalysisError::at(ErrorReason::StackUnderflow, offset, "pop from an empty operand stack"))
    }

    /// Pops `n` values, returned in push order.
    fn pop_n(&mut self, n: usize, offset: Offset) -> Result<Vec<SymbolicValue>> {
        if self.stack.len() < n {
            return Err(AnalysisError::at(
                ErrorReason::StackUnderflow,
                offset,
                format!("need {} operands, stack holds {}", n, self.stack.len()),
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }
}

/// What executing one instruction did to control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Continue(Frame),
    Jump { target: Offset, frame: Frame },
    /// `test` holds exactly when control transfers to `target`.
    Branch { test: SymbolicValue, target: Offset, frame: Frame },
    Return(SymbolicValue),
}

pub struct Simulator<'a> {
    intrinsics: &'a IntrinsicRegistry,
}

impl<'a> Simulator<'a> {
    pub fn new(intrinsics: &'a IntrinsicRegistry) -> Self {
        Self { intrinsics }
    }

    pub fn step(&self, mut frame: Frame, instr: &Instruction) -> Result<Effect> {
        let offset = instr.offset;
        match &instr.op {
            Op::Nop | Op::Box(_) | Op::CheckCast(_) => {}
            Op::Unbox(kind) => {
                let value = frame.pop(offset)?;
                frame.push(match value {
                    literal @ SymbolicValue::Literal(_) => literal,
                    value if value.kind() == *kind => value,
                    value => SymbolicValue::Unboxed { value: Box::new(value), kind: kind.clone() },
                });
            }
            Op::LoadConst(value) => frame.push(SymbolicValue::Literal(value.clone())),
            Op::LoadLocal { slot, .. } => {
                let value = frame.locals.get(slot).cloned().ok_or_else(|| {
                    AnalysisError::at(ErrorReason::UnresolvableCapture, offset, format!("local slot {} is unbound", slot))
                })?;
                frame.push(value);
            }
            Op::StoreLocal { slot, .. } => {
                let value = frame.pop(offset)?;
                frame.locals.insert(*slot, value);
            }
            Op::GetField(field) => {
                let receiver = frame.pop(offset)?;
                let value = match receiver {
                    SymbolicValue::Literal(LiteralValue::Object { type_name, fields }) => {
                        let value = fields.get(&field.name).cloned().ok_or_else(|| {
                            AnalysisError::at(
                                ErrorReason::UnresolvableCapture,
                                offset,
                                format!("captured {} has no field {}", type_name, field.name),
                            )
                        })?;
                        SymbolicValue::Literal(value)
                    }
                    SymbolicValue::Literal(other) => {
                        return Err(AnalysisError::at(
                            ErrorReason::UnresolvableCapture,
                            offset,
                            format!("cannot read field {} of literal {}", field.name, other),
                        ))
                    }
                    receiver => SymbolicValue::FieldAccess { receiver: Box::new(receiver), field: field.clone() },
                };
                frame.push(value);
            }
            Op::GetStatic(field) => frame.push(SymbolicValue::Literal(LiteralValue::Constant {
                owner: field.owner.clone(),
                name: field.name.clone(),
            })),
            Op::Invoke { kind, method } => {
                let value = self.invoke(&mut frame, *kind, method, offset)?;
                frame.push(value);
            }
            Op::Arithmetic { op, kind } => {
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                frame.push(SymbolicValue::BinaryOp {
                    op: BinaryOperator::Arithmetic((*op).into(), *kind),
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }
            Op::Negate(kind) => {
                let operand = frame.pop(offset)?;
                frame.push(SymbolicValue::UnaryOp { operand: Box::new(operand), kind: *kind });
            }
            Op::Convert { from, to } => {
                let value = frame.pop(offset)?;
                let converted = match value {
                    SymbolicValue::Literal(lit) => {
                        let folded = convert(&lit, *to).ok_or_else(|| {
                            AnalysisError::at(ErrorReason::UnsupportedOpcode, offset, format!("cannot convert {} to {}", lit, to))
                        })?;
                        SymbolicValue::Literal(folded)
                    }
                    value if to > from => value,
                    _ => {
                        return Err(AnalysisError::at(
                            ErrorReason::UnsupportedOpcode,
                            offset,
                            format!("narrowing {} to {} of a non-constant", from, to),
                        ))
                    }
                };
                frame.push(converted);
            }
            Op::CompareThreeWay { nan, .. } => {
                let right = frame.pop(offset)?;
                let left = frame.pop(offset)?;
                frame.push(SymbolicValue::ThreeWay { left: Box::new(left), right: Box::new(right), nan: *nan });
            }
            Op::BranchIf { cond, target } => {
                let test = branch_test(&mut frame, *cond, offset)?;
                return Ok(Effect::Branch { test, target: *target, frame });
            }
            Op::Goto { target } => return Ok(Effect::Jump { target: *target, frame }),
            Op::Return(None) => {
                return Err(AnalysisError::at(ErrorReason::UnsupportedOpcode, offset, "predicate body returns void"))
            }
            Op::Return(Some(_)) => return Ok(Effect::Return(frame.pop(offset)?)),
            Op::ArrayLoad(kind) => {
                let index = frame.pop(offset)?;
                let array = frame.pop(offset)?;
                let value = match (array, index) {
                    (SymbolicValue::Literal(LiteralValue::Array(items)), SymbolicValue::Literal(LiteralValue::Int(i))) => {
                        let item = usize::try_from(i).ok().and_then(|i| items.get(i)).cloned().ok_or_else(|| {
                            AnalysisError::at(
                                ErrorReason::UnresolvableCapture,
                                offset,
                                format!("index {} out of bounds for captured array of length {}", i, items.len()),
                            )
                        })?;
                        SymbolicValue::Literal(item)
                    }
                    (SymbolicValue::Literal(LiteralValue::Null), _) => {
                        return Err(AnalysisError::at(ErrorReason::UnresolvableCapture, offset, "array load from null"))
                    }
                    (array, index) => SymbolicValue::ArrayElement {
                        array: Box::new(array),
                        index: Box::new(index),
                        kind: kind.clone(),
                    },
                };
                frame.push(value);
            }
            Op::ArrayLength => {
                let value = match frame.pop(offset)? {
                    SymbolicValue::Literal(LiteralValue::Array(items)) => {
                        SymbolicValue::Literal(LiteralValue::Int(items.len() as i32))
                    }
                    SymbolicValue::Literal(other) => {
                        return Err(AnalysisError::at(
                            ErrorReason::UnresolvableCapture,
                            offset,
                            format!("length of non-array literal {}", other),
                        ))
                    }
                    array => SymbolicValue::ArrayLength(Box::new(array)),
                };
                frame.push(value);
            }
            Op::Dup => {
                let value = frame.pop(offset)?;
                frame.push(value.clone());
                frame.push(value);
            }
            Op::Pop => {
                frame.pop(offset)?;
            }
        }
        Ok(Effect::Continue(frame))
    }

    fn invoke(&self, frame: &mut Frame, kind: InvokeKind, method: &MemberRef, offset: Offset) -> Result<SymbolicValue> {
        let (params, ret) = parse_method_descriptor(&method.descriptor).ok_or_else(|| {
            AnalysisError::at(
                ErrorReason::UnsupportedOpcode,
                offset,
                format!("malformed method descriptor {}", method.descriptor),
            )
        })?;
        if ret == ValueKind::Void {
            return Err(AnalysisError::at(
                ErrorReason::UnsupportedOpcode,
                offset,
                format!("void call {}.{} in a predicate", method.owner, method.name),
            ));
        }
        let mut args = frame.pop_n(params.len(), offset)?;
        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(frame.pop(offset)?),
        };

        if let Some(Intrinsic::Equals) = self.intrinsics.get(method) {
            let operands = match receiver {
                Some(r) if args.len() == 1 => Some((r, args.remove(0))),
                None if args.len() == 2 => {
                    let right = args.remove(1);
                    Some((args.remove(0), right))
                }
                _ => None,
            };
            if let Some((left, right)) = operands {
                log::trace!("lowering {}.{} to equality", method.owner, method.name);
                return Ok(SymbolicValue::compare(ComparisonOp::Eq, left, right));
            }
            return Err(AnalysisError::at(
                ErrorReason::UnsupportedOpcode,
                offset,
                format!("equality intrinsic {} has unexpected arity", method.name),
            ));
        }

        if let Some(SymbolicValue::Literal(LiteralValue::Object { fields, .. })) = &receiver {
            if args.is_empty() {
                let resolved = accessor_property(&method.name).and_then(|prop| fields.get(&prop));
                if let Some(value) = resolved {
                    return Ok(SymbolicValue::Literal(value.clone()));
                }
            }
        }

        Ok(SymbolicValue::MethodCall { receiver: receiver.map(Box::new), method: method.clone(), args, kind: ret })
    }
}

fn branch_test(frame: &mut Frame, cond: BranchCond, offset: Offset) -> Result<SymbolicValue> {
    let test = match cond {
        BranchCond::Zero(op) => {
            let value = frame.pop(offset)?;
            match value {
                SymbolicValue::ThreeWay { left, right, nan } => three_way_test(op.into(), *left, *right, nan),
                value if value.is_bool() && op == CmpOp::Eq => SymbolicValue::negation(value),
                value if value.is_bool() && op == CmpOp::Ne => value,
                value => SymbolicValue::compare(op.into(), value, SymbolicValue::Literal(LiteralValue::Int(0))),
            }
        }
        BranchCond::IntCmp(op) | BranchCond::RefCmp(op) => {
            let right = frame.pop(offset)?;
            let left = frame.pop(offset)?;
            SymbolicValue::compare(op.into(), left, right)
        }
        BranchCond::Null => {
            let value = frame.pop(offset)?;
            SymbolicValue::compare(ComparisonOp::Eq, value, SymbolicValue::Literal(LiteralValue::Null))
        }
        BranchCond::NonNull => {
            let value = frame.pop(offset)?;
            SymbolicValue::compare(ComparisonOp::Ne, value, SymbolicValue::Literal(LiteralValue::Null))
        }
    };
    Ok(test)
}

/// A branch on a three-way compare tests `left op right` directly. When the
/// NaN bias satisfies the branch, an unordered pair must also take it, which
/// `!(left negated-op right)` captures.
fn three_way_test(op: ComparisonOp, left: SymbolicValue, right: SymbolicValue, nan: NanBias) -> SymbolicValue {
    let nan_result = match nan {
        NanBias::None => return SymbolicValue::compare(op, left, right),
        NanBias::Less => -1,
        NanBias::Greater => 1,
    };
    let nan_taken = match op {
        ComparisonOp::Eq => nan_result == 0,
        ComparisonOp::Ne => nan_result != 0,
        ComparisonOp::Lt => nan_result < 0,
        ComparisonOp::Le => nan_result <= 0,
        ComparisonOp::Gt => nan_result > 0,
        ComparisonOp::Ge => nan_result >= 0,
    };
    if nan_taken {
        SymbolicValue::negation(SymbolicValue::compare(op.negate(), left, right))
    } else {
        SymbolicValue::compare(op, left, right)
    }
}
