//! Decoder: turns raw method-body bytes into the instruction model.
//!
//! Only the opcode subset that can appear in an expression-bodied predicate is
//! recognized; anything else fails closed with `UnsupportedOpcode`.

use crate::constant_pool::{Constant, ConstantPool, MemberRef};
use crate::descriptor::parse_field_descriptor;
use crate::instruction::*;
use crate::intrinsics::{Intrinsic, IntrinsicRegistry};
use crate::types::{LiteralValue, NumericKind, ValueKind};
use crate::{AnalysisError, ErrorReason, Result};

/// Decodes `code` against `pool`, recognizing boxing intrinsics from `intrinsics`.
pub fn decode(code: &[u8], pool: &ConstantPool, intrinsics: &IntrinsicRegistry) -> Result<Vec<Instruction>> {
    let mut decoder = Decoder { code, pos: 0, pool, intrinsics };
    let mut out = Vec::new();
    while decoder.pos < code.len() {
        out.push(decoder.next_instruction()?);
    }
    log::trace!("decoded {} instructions from {} bytes", out.len(), code.len());
    Ok(out)
}

struct Decoder<'a> {
    code: &'a [u8],
    pos: usize,
    pool: &'a ConstantPool,
    intrinsics: &'a IntrinsicRegistry,
}

const NUMERIC: [NumericKind; 4] = [NumericKind::Int, NumericKind::Long, NumericKind::Float, NumericKind::Double];
const ARITH: [ArithOp; 5] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div, ArithOp::Rem];
const CMP: [CmpOp; 6] = [CmpOp::Eq, CmpOp::Ne, CmpOp::Lt, CmpOp::Ge, CmpOp::Gt, CmpOp::Le];

fn local_kind(group: u8) -> ValueKind {
    match group {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        _ => ValueKind::Unknown,
    }
}

impl<'a> Decoder<'a> {
    fn next_instruction(&mut self) -> Result<Instruction> {
        let offset = self.pos as Offset;
        let opcode = self.u8(offset)?;
        let op = match opcode {
            0x00 => Op::Nop,
            0x01 => Op::LoadConst(LiteralValue::Null),
            0x02..=0x08 => Op::LoadConst(LiteralValue::Int(opcode as i32 - 3)),
            0x09 | 0x0a => Op::LoadConst(LiteralValue::Long((opcode - 0x09) as i64)),
            0x0b..=0x0d => Op::LoadConst(LiteralValue::Float((opcode - 0x0b) as f32)),
            0x0e | 0x0f => Op::LoadConst(LiteralValue::Double((opcode - 0x0e) as f64)),
            0x10 => Op::LoadConst(LiteralValue::Int(self.u8(offset)? as i8 as i32)),
            0x11 => Op::LoadConst(LiteralValue::Int(self.i16(offset)? as i32)),
            0x12 => {
                let index = self.u8(offset)? as u16;
                self.load_constant(offset, index, false)?
            }
            0x13 | 0x14 => {
                let index = self.u16(offset)?;
                self.load_constant(offset, index, opcode == 0x14)?
            }
            0x15..=0x18 => Op::LoadLocal { slot: self.u8(offset)? as Slot, kind: local_kind(opcode - 0x15) },
            0x19 => Op::LoadLocal { slot: self.u8(offset)? as Slot, kind: ValueKind::Unknown },
            0x1a..=0x29 => {
                let n = opcode - 0x1a;
                Op::LoadLocal { slot: (n % 4) as Slot, kind: local_kind(n / 4) }
            }
            0x2a..=0x2d => Op::LoadLocal { slot: (opcode - 0x2a) as Slot, kind: ValueKind::Unknown },
            0x2e..=0x35 => Op::ArrayLoad(match opcode {
                0x2e | 0x33 | 0x34 | 0x35 => ValueKind::Int,
                0x2f => ValueKind::Long,
                0x30 => ValueKind::Float,
                0x31 => ValueKind::Double,
                _ => ValueKind::Unknown,
            }),
            0x36..=0x39 => Op::StoreLocal { slot: self.u8(offset)? as Slot, kind: local_kind(opcode - 0x36) },
            0x3a => Op::StoreLocal { slot: self.u8(offset)? as Slot, kind: ValueKind::Unknown },
            0x3b..=0x4a => {
                let n = opcode - 0x3b;
                Op::StoreLocal { slot: (n % 4) as Slot, kind: local_kind(n / 4) }
            }
            0x4b..=0x4e => Op::StoreLocal { slot: (opcode - 0x4b) as Slot, kind: ValueKind::Unknown },
            0x57 => Op::Pop,
            0x59 => Op::Dup,
            0x60..=0x73 => {
                let n = (opcode - 0x60) as usize;
                Op::Arithmetic { op: ARITH[n / 4], kind: NUMERIC[n % 4] }
            }
            0x74..=0x77 => Op::Negate(NUMERIC[(opcode - 0x74) as usize]),
            0x85..=0x90 => {
                // i2l i2f i2d | l2i l2f l2d | f2i f2l f2d | d2i d2l d2f
                let n = (opcode - 0x85) as usize;
                let from = NUMERIC[n / 3];
                let targets: Vec<NumericKind> = NUMERIC.iter().copied().filter(|k| *k != from).collect();
                Op::Convert { from, to: targets[n % 3] }
            }
            0x94 => Op::CompareThreeWay { kind: NumericKind::Long, nan: NanBias::None },
            0x95 => Op::CompareThreeWay { kind: NumericKind::Float, nan: NanBias::Less },
            0x96 => Op::CompareThreeWay { kind: NumericKind::Float, nan: NanBias::Greater },
            0x97 => Op::CompareThreeWay { kind: NumericKind::Double, nan: NanBias::Less },
            0x98 => Op::CompareThreeWay { kind: NumericKind::Double, nan: NanBias::Greater },
            0x99..=0x9e => {
                let target = self.branch_target(offset)?;
                Op::BranchIf { cond: BranchCond::Zero(CMP[(opcode - 0x99) as usize]), target }
            }
            0x9f..=0xa4 => {
                let target = self.branch_target(offset)?;
                Op::BranchIf { cond: BranchCond::IntCmp(CMP[(opcode - 0x9f) as usize]), target }
            }
            0xa5 | 0xa6 => {
                let target = self.branch_target(offset)?;
                Op::BranchIf { cond: BranchCond::RefCmp(CMP[(opcode - 0xa5) as usize]), target }
            }
            0xa7 => Op::Goto { target: self.branch_target(offset)? },
            0xac => Op::Return(Some(ValueKind::Int)),
            0xad => Op::Return(Some(ValueKind::Long)),
            0xae => Op::Return(Some(ValueKind::Float)),
            0xaf => Op::Return(Some(ValueKind::Double)),
            0xb0 => Op::Return(Some(ValueKind::Unknown)),
            0xb1 => Op::Return(None),
            0xb2 => Op::GetStatic(self.field_ref(offset)?),
            0xb4 => Op::GetField(self.field_ref(offset)?),
            0xb6 => self.invoke(offset, InvokeKind::Virtual)?,
            0xb7 => self.invoke(offset, InvokeKind::Special)?,
            0xb8 => self.invoke(offset, InvokeKind::Static)?,
            0xb9 => {
                let op = self.invoke(offset, InvokeKind::Interface)?;
                // count and a reserved zero byte
                self.u8(offset)?;
                self.u8(offset)?;
                op
            }
            0xbe => Op::ArrayLength,
            0xc0 => {
                let index = self.u16(offset)?;
                let class = self.pool.class_name(index).ok_or_else(|| {
                    unresolved(offset, format!("constant #{} is not a class", index))
                })?;
                Op::CheckCast(class.to_string())
            }
            0xc6 => Op::BranchIf { cond: BranchCond::Null, target: self.branch_target(offset)? },
            0xc7 => Op::BranchIf { cond: BranchCond::NonNull, target: self.branch_target(offset)? },
            0xc8 => {
                let rel = self.i32(offset)?;
                Op::Goto { target: relative(offset, rel as i64)? }
            }
            other => {
                return Err(AnalysisError::at(
                    ErrorReason::UnsupportedOpcode,
                    offset,
                    format!("opcode 0x{:02x} is not supported in predicates", other),
                ))
            }
        };
        Ok(Instruction::new(offset, op))
    }

    /// `ldc`/`ldc_w` load one-word constants, `ldc2_w` only longs and doubles.
    fn load_constant(&self, offset: Offset, index: u16, wide: bool) -> Result<Op> {
        let constant = self.pool.get(index);
        let two_words = matches!(constant, Some(Constant::Long(_) | Constant::Double(_)));
        if constant.is_some() && two_words != wide {
            return Err(AnalysisError::at(
                ErrorReason::UnsupportedOpcode,
                offset,
                format!("constant #{} does not match the width of {}", index, if wide { "ldc2_w" } else { "ldc" }),
            ));
        }
        let lit = match constant {
            Some(Constant::Integer(v)) => LiteralValue::Int(*v),
            Some(Constant::Long(v)) => LiteralValue::Long(*v),
            Some(Constant::Float(v)) => LiteralValue::Float(*v),
            Some(Constant::Double(v)) => LiteralValue::Double(*v),
            Some(Constant::String(s)) => LiteralValue::Str(s.clone()),
            Some(Constant::Class(name)) => {
                return Err(AnalysisError::at(
                    ErrorReason::UnsupportedOpcode,
                    offset,
                    format!("class literal {} is not supported", name),
                ))
            }
            _ => return Err(unresolved(offset, format!("constant #{} is not loadable", index))),
        };
        Ok(Op::LoadConst(lit))
    }

    fn field_ref(&mut self, offset: Offset) -> Result<MemberRef> {
        let index = self.u16(offset)?;
        self.pool
            .field_ref(index)
            .cloned()
            .ok_or_else(|| unresolved(offset, format!("constant #{} is not a field reference", index)))
    }

    fn invoke(&mut self, offset: Offset, kind: InvokeKind) -> Result<Op> {
        let index = self.u16(offset)?;
        let method = self
            .pool
            .method_ref(index)
            .cloned()
            .ok_or_else(|| unresolved(offset, format!("constant #{} is not a method reference", index)))?;
        let op = match self.intrinsics.get(&method) {
            Some(Intrinsic::Box(k)) if kind == InvokeKind::Static => Op::Box(k.clone()),
            Some(Intrinsic::Unbox(k)) if kind != InvokeKind::Static => Op::Unbox(k.clone()),
            _ => Op::Invoke { kind, method },
        };
        Ok(op)
    }

    fn branch_target(&mut self, offset: Offset) -> Result<Offset> {
        let rel = self.i16(offset)?;
        relative(offset, rel as i64)
    }

    fn u8(&mut self, offset: Offset) -> Result<u8> {
        let b = *self.code.get(self.pos).ok_or_else(|| truncated(offset))?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self, offset: Offset) -> Result<u16> {
        Ok(u16::from_be_bytes([self.u8(offset)?, self.u8(offset)?]))
    }

    fn i16(&mut self, offset: Offset) -> Result<i16> {
        Ok(self.u16(offset)? as i16)
    }

    fn i32(&mut self, offset: Offset) -> Result<i32> {
        let hi = self.u16(offset)? as u32;
        let lo = self.u16(offset)? as u32;
        Ok(((hi << 16) | lo) as i32)
    }
}

fn relative(offset: Offset, rel: i64) -> Result<Offset> {
    let target = offset as i64 + rel;
    Offset::try_from(target).map_err(|_| {
        AnalysisError::at(
            ErrorReason::InvalidBranchTarget,
            offset,
            format!("branch target {} is outside the method body", target),
        )
    })
}

fn truncated(offset: Offset) -> AnalysisError {
    AnalysisError::at(ErrorReason::UnsupportedOpcode, offset, "instruction operands are truncated")
}

fn unresolved(offset: Offset, message: String) -> AnalysisError {
    AnalysisError::at(ErrorReason::UnresolvableCapture, offset, message)
}

/// Kind of the value a `getfield`/`getstatic` pushes.
pub(crate) fn field_kind(field: &MemberRef) -> ValueKind {
    parse_field_descriptor(&field.descriptor).unwrap_or(ValueKind::Unknown)
}
