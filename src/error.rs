//! Errors produced while building or running a program.
//!
//! Construction-time errors (unknown callees, signature and type mismatches,
//! statically invalid ranges) are returned synchronously. Runtime errors
//! settle the producing value as failed and travel through the graph by
//! short-circuiting every dependent operation.

use miette::Diagnostic;
use thiserror::Error;

use crate::program::types::{Symbol, Type};

#[derive(Clone, Debug, PartialEq, Error, Diagnostic)]
pub enum Error {
    #[error("unknown callee `@{0}`")]
    #[diagnostic(code(hostflow::unknown_callee))]
    UnknownCallee(Symbol),

    #[error("signature mismatch in `{op}`: {detail}")]
    #[diagnostic(code(hostflow::signature_mismatch))]
    SignatureMismatch { op: String, detail: String },

    #[error("type mismatch in `{op}`: expected {expected}, found {found}")]
    #[diagnostic(code(hostflow::type_mismatch))]
    TypeMismatch {
        op: String,
        expected: Type,
        found: Type,
    },

    #[error("divide by zero")]
    #[diagnostic(code(hostflow::divide_by_zero))]
    DivideByZero,

    #[error("invalid range [{start}, {end}) with block size {block_size}")]
    #[diagnostic(
        code(hostflow::invalid_range),
        help("block size must be positive and end must not precede start")
    )]
    InvalidRange {
        start: i64,
        end: i64,
        block_size: i64,
    },

    #[error("value was dropped before it settled")]
    #[diagnostic(code(hostflow::abandoned))]
    Abandoned,

    #[error("worker pool rejected a task: {0}")]
    #[diagnostic(code(hostflow::spawn))]
    Spawn(String),
}

impl Error {
    pub(crate) fn signature(op: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            op: op.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn type_mismatch(op: impl Into<String>, expected: &Type, found: &Type) -> Self {
        Self::TypeMismatch {
            op: op.into(),
            expected: expected.clone(),
            found: found.clone(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
