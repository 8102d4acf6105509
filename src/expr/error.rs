use thiserror::Error;

/// Error kinds raised by the expression language.
///
/// Mirrors the source's `ErrorCode` enum plus two additions
/// (`ArithmeticOverflow`, `DivideByZero`) that replace its `LOG(FATAL)`
/// calls -- see DESIGN.md and SPEC_FULL.md §7 for the rationale.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    /// Variable lookup found nothing under that name.
    #[error("variable not found")]
    Null,

    #[error("unknown value type")]
    UnknownType,

    #[error("unknown operator")]
    UnknownOp,

    /// Operator exists but is not valid for the operand types
    /// (e.g. comparing an Int to a String).
    #[error("unsupported operator for these operand types")]
    UnsupportedOp,

    #[error("bad parameters: {0}")]
    BadParams(String),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("division by zero")]
    DivideByZero,

    #[error("parse error: {0}")]
    Parse(String),
}

pub type ValueOrErr = Result<crate::expr::Value, ExprError>;
