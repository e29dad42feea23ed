//! Lambdaquery: recovers canonical expression trees from compiled predicate closures.
//!
//! A predicate such as `p -> p.age >= 18 && p.name != null` reaches us as the
//! instruction stream of its compiled body plus the values it captured. This
//! crate decompiles that stream back into an [`Expression`] that a query
//! translator can pattern-match to build a database filter.
//!
//! # Pipeline
//! - Decoding raw method-body bytes into [`Instruction`]s
//! - Operand-stack simulation over symbolic values
//! - Control-flow reconstruction (branch diamonds become conditionals)
//! - Lowering into the public AST
//! - Canonicalizing simplification to a fixed point
//! - A cached [`Analyzer`] façade tying it together

mod types;
mod constant_pool;
mod descriptor;
mod instruction;
mod decode;
mod intrinsics;
mod capture;
mod subject;
mod symbolic;
mod simulate;
mod flow;
mod expr;
mod numeric;
mod simplify;
mod config;
mod analyzer;

pub use types::*;
pub use constant_pool::*;
pub use descriptor::*;
pub use instruction::*;
pub use decode::*;
pub use intrinsics::*;
pub use capture::*;
pub use subject::*;
pub use symbolic::*;
pub use simulate::*;
pub use flow::*;
pub use expr::*;
pub use numeric::*;
pub use simplify::*;
pub use config::*;
pub use analyzer::*;

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Why an analysis failed. Every reason is fatal for the closure being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    UnsupportedOpcode,
    StackUnderflow,
    InvalidBranchTarget,
    UnsupportedLoop,
    NonConvergentBranch,
    DivisionByZeroLiteral,
    UnrepresentableNumericNegation,
    UnresolvableCapture,
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorReason::UnsupportedOpcode => "unsupported opcode",
            ErrorReason::StackUnderflow => "stack underflow",
            ErrorReason::InvalidBranchTarget => "invalid branch target",
            ErrorReason::UnsupportedLoop => "unsupported loop",
            ErrorReason::NonConvergentBranch => "non-convergent branch",
            ErrorReason::DivisionByZeroLiteral => "division by zero literal",
            ErrorReason::UnrepresentableNumericNegation => "unrepresentable numeric negation",
            ErrorReason::UnresolvableCapture => "unresolvable capture",
        };
        f.write_str(s)
    }
}

/// Unified error type for analysis failures.
///
/// `offset` is the instruction offset that triggered the failure, or `None`
/// for structural failures detected after simulation (simplification, lowering).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at {}: {message}", Location(.offset))]
pub struct AnalysisError {
    pub reason: ErrorReason,
    pub offset: Option<u32>,
    pub message: String,
}

impl AnalysisError {
    pub fn new(reason: ErrorReason, offset: Option<u32>, message: impl Into<String>) -> Self {
        Self { reason, offset, message: message.into() }
    }

    pub fn at(reason: ErrorReason, offset: u32, message: impl Into<String>) -> Self {
        Self::new(reason, Some(offset), message)
    }

    pub fn structural(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self::new(reason, None, message)
    }
}

struct Location<'a>(&'a Option<u32>);

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(offset) => write!(f, "offset {}", offset),
            None => f.write_str("offset none"),
        }
    }
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_with_offset() {
        let err = AnalysisError::at(ErrorReason::StackUnderflow, 7, "pop on empty stack");
        assert_eq!(err.to_string(), "stack underflow at offset 7: pop on empty stack");
    }

    #[test]
    fn test_error_display_without_offset() {
        let err = AnalysisError::structural(ErrorReason::DivisionByZeroLiteral, "1 / 0");
        assert_eq!(err.to_string(), "division by zero literal at offset none: 1 / 0");
    }
}
