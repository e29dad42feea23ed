//! Control-flow reconstruction.
//!
//! Predicate bodies are acyclic: every branch jumps forward. Each conditional
//! branch is simulated arm by arm up to its merge point (the immediate
//! post-dominator), and the two resulting frames are joined. Boolean values
//! that differ between the arms are rebuilt as `&&`/`||`; anything else becomes
//! a [`SymbolicValue::Conditional`].
//!
//! Short-circuit code reaches the same block from several branches with the
//! same frame, so arm results are memoized per (start, stop, frame).

use crate::expr::LogicalOp;
use crate::instruction::{Instruction, Offset, Op};
use crate::simulate::{Effect, Frame, Simulator};
use crate::symbolic::SymbolicValue;
use crate::{AnalysisError, ErrorReason, Result};
use std::cell::RefCell;
use std::collections::HashMap;

/// A validated, acyclic instruction stream with its post-dominator tree.
#[derive(Debug, Clone)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    index: HashMap<Offset, usize>,
    /// Immediate post-dominator per instruction index; `len()` is the exit.
    ipdom: Vec<usize>,
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Result<Self> {
        let mut index = HashMap::with_capacity(instructions.len());
        for (i, instr) in instructions.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| instructions[p].offset) {
                if instr.offset <= prev {
                    return Err(AnalysisError::at(
                        ErrorReason::InvalidBranchTarget,
                        instr.offset,
                        format!("offset {} does not follow {}", instr.offset, prev),
                    ));
                }
            }
            index.insert(instr.offset, i);
        }
        let mut stream = Self { instructions, index, ipdom: Vec::new() };
        stream.ipdom = stream.post_dominators()?;
        Ok(stream)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    fn index_of(&self, target: Offset, from: Offset) -> Result<usize> {
        self.index.get(&target).copied().ok_or_else(|| {
            AnalysisError::at(
                ErrorReason::InvalidBranchTarget,
                from,
                format!("branch target {} is not an instruction boundary", target),
            )
        })
    }

    /// Successor indices of instruction `i`; the exit is `len()`.
    fn successors(&self, i: usize) -> Result<Vec<usize>> {
        let instr = &self.instructions[i];
        let exit = self.instructions.len();
        let fallthrough = || {
            if i + 1 < exit {
                Ok(i + 1)
            } else {
                Err(AnalysisError::at(
                    ErrorReason::InvalidBranchTarget,
                    instr.offset,
                    "control falls past the last instruction",
                ))
            }
        };
        let jump = |target: Offset| {
            if target <= instr.offset {
                return Err(AnalysisError::at(
                    ErrorReason::UnsupportedLoop,
                    instr.offset,
                    format!("backward branch to {}", target),
                ));
            }
            self.index_of(target, instr.offset)
        };
        match &instr.op {
            Op::Return(_) => Ok(vec![exit]),
            Op::Goto { target } => Ok(vec![jump(*target)?]),
            Op::BranchIf { target, .. } => Ok(vec![fallthrough()?, jump(*target)?]),
            _ => Ok(vec![fallthrough()?]),
        }
    }

    /// Cooper-Harvey-Kennedy over the reversed CFG. Every edge goes to a
    /// higher index, so walking indices downwards visits successors first and
    /// one sweep suffices.
    fn post_dominators(&self) -> Result<Vec<usize>> {
        let exit = self.instructions.len();
        let mut ipdom = vec![exit; exit + 1];
        for i in (0..exit).rev() {
            let succs = self.successors(i)?;
            let mut dom = succs[0];
            for &s in &succs[1..] {
                dom = intersect(&ipdom, dom, s);
            }
            ipdom[i] = dom;
        }
        Ok(ipdom)
    }

    /// Merge point of the branch at index `i`.
    pub fn merge_point(&self, i: usize) -> Option<usize> {
        self.ipdom.get(i).copied()
    }
}

fn intersect(ipdom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a < b {
            a = ipdom[a];
        }
        while b < a {
            b = ipdom[b];
        }
    }
    a
}

#[derive(Clone)]
enum Outcome {
    /// Control arrived at the stop index with this frame.
    Reached(Frame),
    Returned(SymbolicValue),
}

/// Simulates `stream` from its first instruction and returns the symbolic
/// value the body returns.
pub fn reconstruct(stream: &InstructionStream, simulator: &Simulator<'_>, frame: Frame) -> Result<SymbolicValue> {
    let walker = Walker { stream, simulator, memo: RefCell::new(HashMap::new()) };
    match walker.run(0, frame, stream.len())? {
        Outcome::Returned(value) => Ok(value),
        Outcome::Reached(_) => Err(AnalysisError::structural(
            ErrorReason::InvalidBranchTarget,
            "body ends without returning a value",
        )),
    }
}

struct Walker<'s, 'a> {
    stream: &'s InstructionStream,
    simulator: &'s Simulator<'a>,
    memo: RefCell<HashMap<(usize, usize), Vec<(Frame, Outcome)>>>,
}

impl Walker<'_, '_> {
    fn run(&self, start: usize, frame: Frame, stop: usize) -> Result<Outcome> {
        let cached = self
            .memo
            .borrow()
            .get(&(start, stop))
            .and_then(|seen| seen.iter().find(|(f, _)| *f == frame).map(|(_, outcome)| outcome.clone()));
        if let Some(outcome) = cached {
            return Ok(outcome);
        }
        let outcome = self.walk(start, frame.clone(), stop)?;
        self.memo.borrow_mut().entry((start, stop)).or_default().push((frame, outcome.clone()));
        Ok(outcome)
    }

    fn walk(&self, mut i: usize, mut frame: Frame, stop: usize) -> Result<Outcome> {
        loop {
            if i == stop {
                return Ok(Outcome::Reached(frame));
            }
            let instr = self.stream.instructions.get(i).ok_or_else(|| {
                AnalysisError::structural(ErrorReason::InvalidBranchTarget, "control left the method body")
            })?;
            match self.simulator.step(frame, instr)? {
                Effect::Continue(next) => {
                    frame = next;
                    i += 1;
                }
                Effect::Jump { target, frame: next } => {
                    frame = next;
                    i = self.stream.index_of(target, instr.offset)?;
                }
                Effect::Return(value) => return Ok(Outcome::Returned(value)),
                Effect::Branch { test, target, frame: next } => {
                    let merge = self.stream.ipdom[i];
                    log::trace!("branch at {} merges at index {}", instr.offset, merge);
                    let taken = self.run(self.stream.index_of(target, instr.offset)?, next.clone(), merge)?;
                    let fallthrough = self.run(i + 1, next, merge)?;
                    match (taken, fallthrough) {
                        (Outcome::Returned(a), Outcome::Returned(b)) => {
                            return Ok(Outcome::Returned(join_values(test, a, b)));
                        }
                        (Outcome::Reached(a), Outcome::Reached(b)) => {
                            frame = join_frames(test, a, b, instr.offset)?;
                            i = merge;
                        }
                        _ => {
                            return Err(AnalysisError::at(
                                ErrorReason::NonConvergentBranch,
                                instr.offset,
                                "one arm returns while the other continues",
                            ))
                        }
                    }
                }
            }
        }
    }
}

/// Joins the value an arm produced when the branch was taken with the value
/// of the fall-through arm.
fn join_values(test: SymbolicValue, taken: SymbolicValue, fallthrough: SymbolicValue) -> SymbolicValue {
    if taken == fallthrough {
        return taken;
    }
    if taken.is_boolean_shaped() && fallthrough.is_boolean_shaped() {
        return join_booleans(test, taken.into_bool(), fallthrough.into_bool());
    }
    let (taken, fallthrough) = if taken.is_bool() || fallthrough.is_bool() {
        (taken.into_bool(), fallthrough.into_bool())
    } else {
        (taken, fallthrough)
    };
    SymbolicValue::conditional(test, taken, fallthrough)
}

/// `test ? taken : fallthrough` over booleans, without a conditional.
///
/// An arm that is a literal absorbs into a single `&&`/`||`. Arms of the form
/// `x` and `b op x` share their tail, which is kept once so chains of groups
/// stay linear:
/// - `c ? x : (b && x)` is `(c || b) && x`
/// - `c ? x : (b || x)` is `(!c && b) || x`
/// - `c ? (b && x) : x` is `(!c || b) && x`
/// - `c ? (b || x) : x` is `(c && b) || x`
///
/// Otherwise the result is `(c && taken) || (!c && fallthrough)`.
fn join_booleans(test: SymbolicValue, taken: SymbolicValue, fallthrough: SymbolicValue) -> SymbolicValue {
    use LogicalOp::{And, Or};
    let not = SymbolicValue::negation;
    let both = SymbolicValue::logical;
    match (taken.as_bool_literal(), fallthrough.as_bool_literal()) {
        (Some(true), Some(false)) => return test,
        (Some(false), Some(true)) => return not(test),
        (Some(true), _) => return both(Or, test, fallthrough),
        (Some(false), _) => return both(And, not(test), fallthrough),
        (_, Some(true)) => return both(Or, not(test), taken),
        (_, Some(false)) => return both(And, test, taken),
        _ => {}
    }
    if let Some((op, b)) = fallthrough.split_tail(&taken) {
        return match op {
            And => both(And, both(Or, test, b), taken),
            Or => both(Or, both(And, not(test), b), taken),
        };
    }
    if let Some((op, b)) = taken.split_tail(&fallthrough) {
        return match op {
            And => both(And, both(Or, not(test), b), fallthrough),
            Or => both(Or, both(And, test, b), fallthrough),
        };
    }
    both(Or, both(And, test.clone(), taken), both(And, not(test), fallthrough))
}

fn join_frames(test: SymbolicValue, taken: Frame, fallthrough: Frame, offset: Offset) -> Result<Frame> {
    if taken.depth() != fallthrough.depth() {
        return Err(AnalysisError::at(
            ErrorReason::NonConvergentBranch,
            offset,
            format!("arms reach the merge with stack depths {} and {}", taken.depth(), fallthrough.depth()),
        ));
    }
    let stack = taken
        .stack
        .into_iter()
        .zip(fallthrough.stack)
        .map(|(a, b)| join_values(test.clone(), a, b))
        .collect();
    let mut other = fallthrough.locals;
    // a slot bound in only one arm cannot be read after the merge
    let locals = taken
        .locals
        .into_iter()
        .filter_map(|(slot, a)| other.remove(&slot).map(|b| (slot, join_values(test.clone(), a, b))))
        .collect();
    Ok(Frame { stack, locals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Captures;
    use crate::constant_pool::MemberRef;
    use crate::expr::ComparisonOp;
    use crate::instruction::{BranchCond, CmpOp};
    use crate::intrinsics::IntrinsicRegistry;
    use crate::types::{LiteralValue, ValueKind};

    fn at(offset: Offset, op: Op) -> Instruction {
        Instruction::new(offset, op)
    }

    fn analyze(instrs: Vec<Instruction>) -> Result<SymbolicValue> {
        let registry = IntrinsicRegistry::with_builtins();
        let simulator = Simulator::new(&registry);
        let stream = InstructionStream::new(instrs)?;
        reconstruct(&stream, &simulator, Frame::initial(0, &Captures::new())?)
    }

    fn load_subject(offset: Offset) -> Instruction {
        at(offset, Op::LoadLocal { slot: 0, kind: ValueKind::Unknown })
    }

    fn int(offset: Offset, v: i32) -> Instruction {
        at(offset, Op::LoadConst(LiteralValue::Int(v)))
    }

    fn ret(offset: Offset) -> Instruction {
        at(offset, Op::Return(Some(ValueKind::Int)))
    }

    fn age() -> SymbolicValue {
        SymbolicValue::FieldAccess {
            receiver: Box::new(SymbolicValue::VariableRef(0)),
            field: MemberRef::new("Person", "age", "I"),
        }
    }

    #[test]
    fn test_diamond_with_two_returns() {
        // x > 0 ? true : false, compiled as ifle to the false arm
        let value = analyze(vec![
            load_subject(0),
            at(1, Op::GetField(MemberRef::new("Person", "age", "I"))),
            at(4, Op::BranchIf { cond: BranchCond::Zero(CmpOp::Le), target: 9 }),
            int(7, 1),
            ret(8),
            int(9, 0),
            ret(10),
        ])
        .unwrap();
        let test = SymbolicValue::compare(ComparisonOp::Le, age(), SymbolicValue::literal(LiteralValue::Int(0)));
        assert_eq!(value, SymbolicValue::negation(test));
    }

    #[test]
    fn test_diamond_merging_on_stack() {
        // age < 18 ? 0 : 1 via goto to a shared ireturn
        let value = analyze(vec![
            load_subject(0),
            at(1, Op::GetField(MemberRef::new("Person", "age", "I"))),
            at(4, Op::LoadConst(LiteralValue::Int(18))),
            at(6, Op::BranchIf { cond: BranchCond::IntCmp(CmpOp::Lt), target: 13 }),
            int(9, 1),
            at(10, Op::Goto { target: 14 }),
            int(13, 0),
            ret(14),
        ])
        .unwrap();
        let test = SymbolicValue::compare(ComparisonOp::Lt, age(), SymbolicValue::literal(LiteralValue::Int(18)));
        assert_eq!(value, SymbolicValue::negation(test));
    }

    #[test]
    fn test_equal_arms_collapse_without_conditional() {
        let value = analyze(vec![
            load_subject(0),
            at(1, Op::BranchIf { cond: BranchCond::Null, target: 6 }),
            int(4, 1),
            at(5, Op::Goto { target: 7 }),
            int(6, 1),
            ret(7),
        ])
        .unwrap();
        assert_eq!(value, SymbolicValue::literal(LiteralValue::Int(1)));
    }

    #[test]
    fn test_backward_branch_is_a_loop() {
        let err = analyze(vec![int(0, 1), at(1, Op::Goto { target: 0 }), ret(4)]).unwrap_err();
        assert_eq!(err.reason, ErrorReason::UnsupportedLoop);
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn test_branch_to_missing_offset() {
        let err = analyze(vec![int(0, 1), at(1, Op::BranchIf { cond: BranchCond::Zero(CmpOp::Eq), target: 5 }), int(4, 0), ret(6)])
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidBranchTarget);
        assert_eq!(err.offset, Some(1));
    }

    #[test]
    fn test_fall_off_end() {
        let err = analyze(vec![int(0, 1)]).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidBranchTarget);
        let err = analyze(vec![int(0, 1), int(1, 2)]).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidBranchTarget);
    }

    #[test]
    fn test_unordered_offsets_rejected() {
        let err = InstructionStream::new(vec![int(0, 1), int(0, 2), ret(1)]).unwrap_err();
        assert_eq!(err.reason, ErrorReason::InvalidBranchTarget);
    }

    #[test]
    fn test_unequal_stack_depths_do_not_converge() {
        let err = analyze(vec![
            int(0, 1),
            load_subject(1),
            at(2, Op::BranchIf { cond: BranchCond::Null, target: 7 }),
            int(5, 2),
            at(6, Op::Nop),
            ret(7),
        ])
        .unwrap_err();
        assert_eq!(err.reason, ErrorReason::NonConvergentBranch);
        assert_eq!(err.offset, Some(2));
    }

    #[test]
    fn test_post_dominators_of_short_circuit() {
        // a && b: two branches sharing the false block
        let stream = InstructionStream::new(vec![
            load_subject(0),
            at(1, Op::BranchIf { cond: BranchCond::Null, target: 10 }),
            load_subject(4),
            at(5, Op::BranchIf { cond: BranchCond::Null, target: 10 }),
            int(8, 1),
            at(9, Op::Goto { target: 11 }),
            int(10, 0),
            ret(11),
        ])
        .unwrap();
        assert_eq!(stream.merge_point(1), Some(7));
        assert_eq!(stream.merge_point(3), Some(7));
        assert_eq!(stream.merge_point(7), Some(8));
    }

    #[test]
    fn test_boolean_arm_absorbs_int_literal() {
        let test = SymbolicValue::VariableRef(0);
        let older = SymbolicValue::compare(ComparisonOp::Gt, age(), SymbolicValue::literal(LiteralValue::Int(1)));
        let value = join_values(test.clone(), SymbolicValue::literal(LiteralValue::Int(0)), older.clone());
        assert_eq!(value, SymbolicValue::logical(LogicalOp::And, SymbolicValue::negation(test), older));
    }

    #[test]
    fn test_non_boolean_arms_stay_conditional() {
        let test = SymbolicValue::VariableRef(0);
        let value = join_values(test.clone(), SymbolicValue::literal(LiteralValue::Int(2)), age());
        assert_eq!(value, SymbolicValue::conditional(test, SymbolicValue::literal(LiteralValue::Int(2)), age()));
    }

    fn field(name: &str) -> SymbolicValue {
        SymbolicValue::FieldAccess { receiver: Box::new(SymbolicValue::VariableRef(0)), field: MemberRef::new("Person", name, "I") }
    }

    fn positive(name: &str) -> SymbolicValue {
        SymbolicValue::compare(ComparisonOp::Gt, field(name), SymbolicValue::literal(LiteralValue::Int(0)))
    }

    #[test]
    fn test_shared_tail_rebuilds_conjunction() {
        // c ? x : (b && x)  is  (c || b) && x
        let (c, b, x) = (positive("a"), positive("b"), positive("c"));
        let value = join_booleans(c.clone(), x.clone(), SymbolicValue::logical(LogicalOp::And, b.clone(), x.clone()));
        assert_eq!(
            value,
            SymbolicValue::logical(LogicalOp::And, SymbolicValue::logical(LogicalOp::Or, c.clone(), b.clone()), x.clone())
        );
        // c ? (b || x) : x  is  (c && b) || x
        let value = join_booleans(c.clone(), SymbolicValue::logical(LogicalOp::Or, b.clone(), x.clone()), x.clone());
        assert_eq!(
            value,
            SymbolicValue::logical(LogicalOp::Or, SymbolicValue::logical(LogicalOp::And, c.clone(), b.clone()), x.clone())
        );
        // unrelated arms select on the test
        let value = join_booleans(c.clone(), b.clone(), x.clone());
        assert_eq!(
            value,
            SymbolicValue::logical(
                LogicalOp::Or,
                SymbolicValue::logical(LogicalOp::And, c.clone(), b),
                SymbolicValue::logical(LogicalOp::And, SymbolicValue::negation(c), x),
            )
        );
    }

    /// `(f0 > 0 || g0 > 0) && (f1 > 0 || g1 > 0) && ...` in the layout javac
    /// emits: every group jumps to the next one or to a shared false block.
    fn or_groups(groups: usize) -> Vec<Instruction> {
        let true_block = (groups * 6) as Offset;
        let false_block = true_block + 2;
        let mut code = Vec::new();
        for g in 0..groups {
            let base = (g * 6) as Offset;
            code.push(load_subject(base));
            code.push(at(base + 1, Op::GetField(MemberRef::new("Person", &format!("f{}", g), "I"))));
            code.push(at(base + 2, Op::BranchIf { cond: BranchCond::Zero(CmpOp::Gt), target: base + 6 }));
            code.push(load_subject(base + 3));
            code.push(at(base + 4, Op::GetField(MemberRef::new("Person", &format!("g{}", g), "I"))));
            code.push(at(base + 5, Op::BranchIf { cond: BranchCond::Zero(CmpOp::Le), target: false_block }));
        }
        code.push(int(true_block, 1));
        code.push(at(true_block + 1, Op::Goto { target: false_block + 1 }));
        code.push(int(false_block, 0));
        code.push(ret(false_block + 1));
        code
    }

    #[test]
    fn test_or_group_shares_the_trailing_operand() {
        let value = analyze(or_groups(1)).unwrap();
        let SymbolicValue::Logical { op: LogicalOp::Or, .. } = &value else { panic!("expected disjunction, got {:?}", value) };

        let value = analyze(or_groups(2)).unwrap();
        let SymbolicValue::Logical { op: LogicalOp::And, left, right } = &value else {
            panic!("expected conjunction, got {:?}", value)
        };
        assert!(matches!(**left, SymbolicValue::Logical { op: LogicalOp::Or, .. }));
        assert!(matches!(**right, SymbolicValue::Logical { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn test_chained_or_groups_stay_linear() {
        let groups = 24;
        let value = analyze(or_groups(groups)).unwrap();
        let nodes = value.lower(0).unwrap().node_count();
        assert!(nodes <= 12 * groups, "{} nodes for {} groups", nodes, groups);
    }
}
