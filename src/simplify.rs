//! Canonicalizing simplifier.
//!
//! Rewrites run bottom-up and are repeated until a pass changes nothing:
//! - Constant folding (`2 + 3` → `5`, `1 < 2` → `true`)
//! - Negation normalization (`!!x` → `x`, `!(a < b)` → `a >= b`, `a != b` → `!(a == b)`)
//! - De Morgan, pushing negations toward the leaves
//! - Boolean literal absorption and flattening of nested AND/OR
//! - Folding of boolean-valued conditionals into AND/OR; a conditional whose
//!   arms are both predicates never survives
//!
//! The result is canonical: equivalent predicates written with different
//! negation placement simplify to equal trees.

use crate::expr::{ArithmeticOp, ComparisonOp, Expression, LogicalOp};
use crate::numeric::{fold_arithmetic, fold_comparison, fold_negate};
use crate::types::{LiteralValue, NumericKind};
use crate::Result;

pub const DEFAULT_MAX_PASSES: usize = 64;

#[derive(Debug, Clone)]
pub struct Simplifier {
    max_passes: usize,
}

impl Default for Simplifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSES)
    }
}

impl Simplifier {
    pub fn new(max_passes: usize) -> Self {
        Self { max_passes: max_passes.max(1) }
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Simplifies to a fixed point. Running it again on the result is a no-op.
    pub fn simplify(&self, expr: Expression) -> Result<Expression> {
        let mut current = expr;
        for pass in 1..=self.max_passes {
            let next = rewrite(current.clone())?;
            if next == current {
                log::trace!("simplifier converged after {} pass(es)", pass);
                return Ok(next);
            }
            current = next;
        }
        log::warn!("simplifier stopped after {} passes without reaching a fixed point", self.max_passes);
        Ok(current)
    }
}

/// One bottom-up pass.
fn rewrite(expr: Expression) -> Result<Expression> {
    let expr = match expr {
        Expression::Comparison { op, left, right } => {
            let (l, r) = (rewrite(*left)?, rewrite(*right)?);
            comparison(op, l, r)
        }
        Expression::BooleanCombination { op, operands } => {
            let operands = operands.into_iter().map(rewrite).collect::<Result<Vec<_>>>()?;
            combination(op, operands)
        }
        Expression::Not(inner) => negate(rewrite(*inner)?),
        Expression::Arithmetic { op, kind, operands } => {
            let operands = operands.into_iter().map(rewrite).collect::<Result<Vec<_>>>()?;
            arithmetic(op, kind, operands)?
        }
        Expression::MethodInvocation { target, method, args } => Expression::MethodInvocation {
            target: target.map(|t| rewrite(*t)).transpose()?.map(Box::new),
            method,
            args: args.into_iter().map(rewrite).collect::<Result<Vec<_>>>()?,
        },
        Expression::Conditional { test, then_branch, else_branch } => {
            conditional(rewrite(*test)?, rewrite(*then_branch)?, rewrite(*else_branch)?)
        }
        leaf => leaf,
    };
    Ok(expr)
}

fn comparison(op: ComparisonOp, left: Expression, right: Expression) -> Expression {
    if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
        if let Some(result) = fold_comparison(op, l, r) {
            return Expression::boolean(result);
        }
    }
    let (op, left, right) = if left.as_literal().is_some() && right.as_literal().is_none() {
        (op.mirror(), right, left)
    } else {
        (op, left, right)
    };
    match op {
        ComparisonOp::Ne => Expression::not(Expression::compare(ComparisonOp::Eq, left, right)),
        op => Expression::compare(op, left, right),
    }
}

/// Negation of an already simplified operand.
fn negate(inner: Expression) -> Expression {
    match inner {
        Expression::Literal(LiteralValue::Bool(b)) => Expression::boolean(!b),
        Expression::Not(x) => *x,
        Expression::Comparison { op: ComparisonOp::Eq, left, right } => {
            Expression::not(Expression::Comparison { op: ComparisonOp::Eq, left, right })
        }
        Expression::Comparison { op, left, right } => Expression::Comparison { op: op.negate(), left, right },
        Expression::BooleanCombination { op, operands } => Expression::BooleanCombination {
            op: op.flip(),
            operands: operands.into_iter().map(Expression::not).collect(),
        },
        other => Expression::not(other),
    }
}

fn combination(op: LogicalOp, operands: Vec<Expression>) -> Expression {
    let mut flat = Vec::with_capacity(operands.len());
    for operand in operands {
        match operand {
            Expression::BooleanCombination { op: inner, operands } if inner == op => flat.extend(operands),
            Expression::Literal(LiteralValue::Bool(b)) if b == op.identity() => {}
            Expression::Literal(LiteralValue::Bool(_)) => return Expression::boolean(!op.identity()),
            other => flat.push(other),
        }
    }
    match flat.len() {
        0 => Expression::boolean(op.identity()),
        1 => flat.remove(0),
        _ => Expression::BooleanCombination { op, operands: flat },
    }
}

fn arithmetic(op: ArithmeticOp, kind: NumericKind, operands: Vec<Expression>) -> Result<Expression> {
    match (op, operands.as_slice()) {
        (ArithmeticOp::Neg, [Expression::Literal(v)]) => return Ok(Expression::Literal(fold_negate(v)?)),
        (_, [Expression::Literal(l), Expression::Literal(r)]) => {
            if let Some(v) = fold_arithmetic(op, l, r)? {
                return Ok(Expression::Literal(v));
            }
        }
        _ => {}
    }
    Ok(Expression::Arithmetic { op, kind, operands })
}

fn conditional(test: Expression, then_branch: Expression, else_branch: Expression) -> Expression {
    if let Some(b) = test.as_bool_literal() {
        return if b { then_branch } else { else_branch };
    }
    if then_branch == else_branch {
        return then_branch;
    }
    match (then_branch.as_bool_literal(), else_branch.as_bool_literal()) {
        (Some(true), Some(false)) => test,
        (Some(false), Some(true)) => Expression::not(test),
        (Some(true), _) => Expression::or(vec![test, else_branch]),
        (Some(false), _) => Expression::and(vec![Expression::not(test), else_branch]),
        (_, Some(true)) => Expression::or(vec![Expression::not(test), then_branch]),
        (_, Some(false)) => Expression::and(vec![test, then_branch]),
        _ if is_predicate(&then_branch) && is_predicate(&else_branch) => select(test, then_branch, else_branch),
        _ => Expression::conditional(test, then_branch, else_branch),
    }
}

fn is_predicate(expr: &Expression) -> bool {
    match expr {
        Expression::Comparison { .. } | Expression::BooleanCombination { .. } | Expression::Not(_) => true,
        other => other.as_bool_literal().is_some(),
    }
}

/// `test ? x : y` for predicate arms. When one arm is `b op x` for the other
/// arm `x`, the shared operand is kept once.
fn select(test: Expression, then_branch: Expression, else_branch: Expression) -> Expression {
    if let Some((op, b)) = split_tail(&else_branch, &then_branch) {
        return match op {
            // c ? x : (b && x)  ->  (c || b) && x
            LogicalOp::And => Expression::and(vec![Expression::or(vec![test, b]), then_branch]),
            // c ? x : (b || x)  ->  (!c && b) || x
            LogicalOp::Or => Expression::or(vec![Expression::and(vec![Expression::not(test), b]), then_branch]),
        };
    }
    if let Some((op, b)) = split_tail(&then_branch, &else_branch) {
        return match op {
            LogicalOp::And => Expression::and(vec![Expression::or(vec![Expression::not(test), b]), else_branch]),
            LogicalOp::Or => Expression::or(vec![Expression::and(vec![test, b]), else_branch]),
        };
    }
    Expression::or(vec![
        Expression::and(vec![test.clone(), then_branch]),
        Expression::and(vec![Expression::not(test), else_branch]),
    ])
}

/// Splits `b1 op .. op bn op tail` into `op` and `b1 op .. op bn`.
fn split_tail(expr: &Expression, tail: &Expression) -> Option<(LogicalOp, Expression)> {
    match expr {
        Expression::BooleanCombination { op, operands } if operands.len() >= 2 && operands.last() == Some(tail) => {
            Some((*op, combination(*op, operands[..operands.len() - 1].to_vec())))
        }
        _ => None,
    }
}
