//! Expression (AST) module: the public, query-ready form of an analyzed predicate.
//!
//! This module provides the Expression type and related node types. Trees are
//! immutable once built; rewrites always produce new nodes.

use crate::constant_pool::MemberRef;
use crate::types::{simple_name, LiteralValue, NumericKind};
use serde::{Serialize, Deserialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Expression {
    Literal(LiteralValue),
    /// Field/accessor chain rooted at the predicate's subject parameter.
    ArgumentPath(ArgumentPath),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Operands keep source order, which is also evaluation order.
    BooleanCombination {
        op: LogicalOp,
        operands: Vec<Expression>,
    },
    Not(Box<Expression>),
    Arithmetic {
        op: ArithmeticOp,
        kind: NumericKind,
        operands: Vec<Expression>,
    },
    MethodInvocation {
        target: Option<Box<Expression>>,
        method: MemberRef,
        args: Vec<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        then_branch: Box<Expression>,
        else_branch: Box<Expression>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgumentPath {
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PathSegment {
    Field(String),
    /// Zero-argument accessor such as `getName()`.
    Method(String),
    /// Constant array index.
    Index(u32),
    /// Array length.
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
}

impl ComparisonOp {
    /// The operator testing the opposite outcome: `!(a < b)` is `a >= b`.
    pub fn negate(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::Ne,
            ComparisonOp::Ne => ComparisonOp::Eq,
            ComparisonOp::Lt => ComparisonOp::Ge,
            ComparisonOp::Le => ComparisonOp::Gt,
            ComparisonOp::Gt => ComparisonOp::Le,
            ComparisonOp::Ge => ComparisonOp::Lt,
        }
    }

    /// The operator with swapped operands: `a < b` is `b > a`.
    pub fn mirror(self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Le => ComparisonOp::Ge,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Ge => ComparisonOp::Le,
            same => same,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

impl LogicalOp {
    pub fn flip(self) -> Self {
        match self {
            LogicalOp::And => LogicalOp::Or,
            LogicalOp::Or => LogicalOp::And,
        }
    }

    /// The literal that leaves a combination unchanged (`true` for AND).
    pub fn identity(self) -> bool {
        matches!(self, LogicalOp::And)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub | ArithmeticOp::Neg => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Rem => "%",
        }
    }
}

impl PathSegment {
    /// Property name the segment reads: fields map to themselves and
    /// `getX()`/`isX()` accessors map to `x`.
    pub fn property_name(&self) -> Option<String> {
        match self {
            PathSegment::Field(name) => Some(name.clone()),
            PathSegment::Method(name) => accessor_property(name),
            PathSegment::Index(_) | PathSegment::Length => None,
        }
    }
}

pub(crate) fn accessor_property(method: &str) -> Option<String> {
    let rest = method
        .strip_prefix("get")
        .or_else(|| method.strip_prefix("is"))
        .filter(|r| r.chars().next().is_some_and(char::is_uppercase))?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    Some(first.to_lowercase().chain(chars).collect())
}

impl ArgumentPath {
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    /// Dotted property path (`address.city`), or `None` when a segment has
    /// no property meaning.
    pub fn dotted(&self) -> Option<String> {
        let names: Option<Vec<String>> = self.segments.iter().map(PathSegment::property_name).collect();
        names.map(|n| n.join("."))
    }
}

impl Expression {
    pub fn literal(value: LiteralValue) -> Self {
        Expression::Literal(value)
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(LiteralValue::Bool(value))
    }

    /// Path of plain field reads: `Expression::path(&["address", "city"])`.
    pub fn path(fields: &[&str]) -> Self {
        Expression::ArgumentPath(ArgumentPath {
            segments: fields.iter().map(|f| PathSegment::Field(f.to_string())).collect(),
        })
    }

    pub fn compare(op: ComparisonOp, left: Expression, right: Expression) -> Self {
        Expression::Comparison { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::BooleanCombination { op: LogicalOp::And, operands }
    }

    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::BooleanCombination { op: LogicalOp::Or, operands }
    }

    pub fn not(operand: Expression) -> Self {
        Expression::Not(Box::new(operand))
    }

    pub fn arithmetic(op: ArithmeticOp, kind: NumericKind, operands: Vec<Expression>) -> Self {
        Expression::Arithmetic { op, kind, operands }
    }

    pub fn conditional(test: Expression, then_branch: Expression, else_branch: Expression) -> Self {
        Expression::Conditional {
            test: Box::new(test),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Expression::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool_literal(&self) -> Option<bool> {
        self.as_literal().and_then(LiteralValue::as_bool)
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_) | Expression::ArgumentPath(_) => Vec::new(),
            Expression::Comparison { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expression::BooleanCombination { operands, .. } | Expression::Arithmetic { operands, .. } => {
                operands.iter().collect()
            }
            Expression::Not(inner) => vec![inner.as_ref()],
            Expression::MethodInvocation { target, args, .. } => {
                target.iter().map(|t| t.as_ref()).chain(args.iter()).collect()
            }
            Expression::Conditional { test, then_branch, else_branch } => {
                vec![test.as_ref(), then_branch.as_ref(), else_branch.as_ref()]
            }
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a, V: ExprVisitor<'a> + ?Sized>(&'a self, visitor: &mut V) {
        visitor.visit(self);
        for child in self.children() {
            child.walk(visitor);
        }
    }

    /// Every argument path referenced by the tree, in traversal order.
    pub fn argument_paths(&self) -> Vec<&ArgumentPath> {
        struct Collector<'a>(Vec<&'a ArgumentPath>);
        impl<'a> ExprVisitor<'a> for Collector<'a> {
            fn visit(&mut self, expr: &'a Expression) {
                if let Expression::ArgumentPath(p) = expr {
                    self.0.push(p);
                }
            }
        }
        let mut collector = Collector(Vec::new());
        self.walk(&mut collector);
        collector.0
    }

    pub fn node_count(&self) -> usize {
        struct Counter(usize);
        impl<'a> ExprVisitor<'a> for Counter {
            fn visit(&mut self, _expr: &'a Expression) {
                self.0 += 1;
            }
        }
        let mut counter = Counter(0);
        self.walk(&mut counter);
        counter.0
    }
}

/// Visitor for [`Expression::walk`]. The lifetime lets visitors keep
/// references into the tree they walk.
pub trait ExprVisitor<'a> {
    fn visit(&mut self, expr: &'a Expression);
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{}", name),
            PathSegment::Method(name) => write!(f, ".{}()", name),
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::Length => f.write_str(".length"),
        }
    }
}

impl fmt::Display for ArgumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("it")?;
        for segment in &self.segments {
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "{}", v),
            Expression::ArgumentPath(p) => write!(f, "{}", p),
            Expression::Comparison { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::BooleanCombination { op, operands } => {
                f.write_str("(")?;
                write_list(f, operands, &format!(" {} ", op.symbol()))?;
                f.write_str(")")
            }
            Expression::Not(inner) => write!(f, "!{}", inner),
            Expression::Arithmetic { op: ArithmeticOp::Neg, operands, .. } => {
                f.write_str("-")?;
                write_list(f, operands, ", ")
            }
            Expression::Arithmetic { op, operands, .. } => {
                f.write_str("(")?;
                write_list(f, operands, &format!(" {} ", op.symbol()))?;
                f.write_str(")")
            }
            Expression::MethodInvocation { target, method, args } => {
                match target {
                    Some(t) => write!(f, "{}.{}(", t, method.name)?,
                    None => write!(f, "{}.{}(", simple_name(&method.owner), method.name)?,
                }
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Expression::Conditional { test, then_branch, else_branch } => {
                write!(f, "({} ? {} : {})", test, then_branch, else_branch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn adult_named() -> Expression {
        Expression::and(vec![
            Expression::compare(ComparisonOp::Ge, Expression::path(&["age"]), Expression::literal(LiteralValue::Int(18))),
            Expression::not(Expression::compare(
                ComparisonOp::Eq,
                Expression::path(&["name"]),
                Expression::literal(LiteralValue::Null),
            )),
        ])
    }

    #[test]
    fn test_display_rendering() {
        assert_eq!(adult_named().to_string(), "((it.age >= 18) && !(it.name == null))");
        let call = Expression::MethodInvocation {
            target: Some(Box::new(Expression::path(&["name"]))),
            method: MemberRef::new("java/lang/String", "startsWith", "(Ljava/lang/String;)Z"),
            args: vec![Expression::literal(LiteralValue::Str("A".into()))],
        };
        assert_eq!(call.to_string(), "it.name.startsWith(\"A\")");
        let neg = Expression::arithmetic(ArithmeticOp::Neg, NumericKind::Int, vec![Expression::path(&["x"])]);
        assert_eq!(neg.to_string(), "-it.x");
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(adult_named());
        assert!(set.contains(&adult_named()));
        assert_ne!(adult_named(), Expression::and(vec![]));
    }

    #[test]
    fn test_comparison_op_negate_and_mirror() {
        assert_eq!(ComparisonOp::Lt.negate(), ComparisonOp::Ge);
        assert_eq!(ComparisonOp::Le.negate(), ComparisonOp::Gt);
        assert_eq!(ComparisonOp::Eq.negate(), ComparisonOp::Ne);
        assert_eq!(ComparisonOp::Lt.mirror(), ComparisonOp::Gt);
        assert_eq!(ComparisonOp::Eq.mirror(), ComparisonOp::Eq);
        for op in [ComparisonOp::Eq, ComparisonOp::Ne, ComparisonOp::Lt, ComparisonOp::Le, ComparisonOp::Gt, ComparisonOp::Ge] {
            assert_eq!(op.negate().negate(), op);
            assert_eq!(op.mirror().mirror(), op);
        }
    }

    #[test]
    fn test_property_names() {
        assert_eq!(PathSegment::Method("getFirstName".into()).property_name(), Some("firstName".into()));
        assert_eq!(PathSegment::Method("isActive".into()).property_name(), Some("active".into()));
        assert_eq!(PathSegment::Method("size".into()).property_name(), None);
        assert_eq!(PathSegment::Method("getter".into()).property_name(), None);
        let path = ArgumentPath::root()
            .child(PathSegment::Method("getAddress".into()))
            .child(PathSegment::Field("city".into()));
        assert_eq!(path.dotted(), Some("address.city".into()));
        assert_eq!(path.child(PathSegment::Length).dotted(), None);
    }

    #[test]
    fn test_argument_paths_and_visitor() {
        let expr = adult_named();
        let paths: Vec<String> = expr.argument_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["it.age", "it.name"]);
        // and, ge, age, 18, not, eq, name, null
        assert_eq!(expr.node_count(), 8);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let expr = adult_named();
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
