//! 错误类型
//!
//! - `IrError`: 结构错误（未定义的名字、越界参数、畸形 BRANCH …）
//! - `EvalError`: 求值错误（解释器与常量折叠）
//! - `TypeError`: 类型检查错误

use thiserror::Error;

use crate::program::{Literal, Name, PrimOp, Type};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("unbound continuation name `{0}`")]
    UnboundName(Name),

    #[error("parameter index {index} out of range for `{name}` (arity {arity})")]
    ParameterOutOfRange {
        name: Name,
        index: usize,
        arity: usize,
    },

    #[error("BRANCH expects 3 arguments, got {0}")]
    MalformedBranch(usize),

    #[error("duplicate label `{0}`")]
    DuplicateLabel(Name),

    #[error("body of `{name}` must be a Call or Intrinsic, got {kind}")]
    NotABody { name: Name, kind: &'static str },

    #[error("expected an expression, got {kind}")]
    NotAnExpression { kind: &'static str },

    #[error("argument mapping index {index} out of range (arity {arity})")]
    ArgumentMapping { index: usize, arity: usize },

    #[error("invalid type `{0}`")]
    InvalidType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{op} expects {expected} operands, got {actual}")]
    Arity {
        op: PrimOp,
        expected: usize,
        actual: usize,
    },

    #[error("expected an int, got {0}")]
    ExpectedInt(Literal),

    #[error("expected a bool, got {0}")]
    ExpectedBool(Literal),

    #[error("cannot cast {value} to {to}")]
    InvalidCast { value: Literal, to: Type },

    #[error("callee is not a closure: {0}")]
    NotAClosure(String),

    #[error("expected a literal, got a closure")]
    NotALiteral,

    #[error("parameter {index} of `{name}` is not bound")]
    UnboundParameter { name: Name, index: usize },

    #[error("`{name}` expects {expected} arguments, got {actual}")]
    ArgumentCount {
        name: Name,
        expected: usize,
        actual: usize,
    },

    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("in `{continuation}`: expected {expected}, got {actual}")]
    Mismatch {
        continuation: Name,
        expected: Type,
        actual: Type,
    },

    #[error("in `{continuation}`: {op} expects {expected} operands, got {actual}")]
    Arity {
        continuation: Name,
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("in `{continuation}`: unsupported cast from {from} to {to}")]
    UnsupportedCast {
        continuation: Name,
        from: Type,
        to: Type,
    },

    #[error("in `{continuation}`: callee of type {actual} is not callable")]
    NotCallable { continuation: Name, actual: Type },

    #[error("in `{continuation}`: callee expects {expected} arguments, got {actual}")]
    ArgumentCount {
        continuation: Name,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = IrError::UnboundName(Name::from("head"));
        assert_eq!(err.to_string(), "unbound continuation name `head`");

        let err = EvalError::from(IrError::MalformedBranch(2));
        assert_eq!(err.to_string(), "BRANCH expects 3 arguments, got 2");

        let err = EvalError::InvalidCast {
            value: Literal::Int(1),
            to: Type::Int,
        };
        assert_eq!(err.to_string(), "cannot cast 1 to int");
    }
}
