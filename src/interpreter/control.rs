//! Non-local control flow signals for the evaluator.
//!
//! `BEQUEATH` and runtime errors are two different unwinding signals.
//! `ATTEMPT` catches errors (binding the bare message) and must let
//! `BEQUEATH` pass through untouched; a rite call consumes `BEQUEATH` and
//! turns it into the call's result.

use crate::error::{AthError, ErrorKind, Span};

use super::value::Value;

/// Signal unwinding through statement and expression evaluation.
#[derive(Debug)]
pub enum Flow {
    /// A runtime error, catchable by `ATTEMPT`/`SALVAGE`.
    Error(AthError),
    /// A `BEQUEATH` escaping to the nearest enclosing rite invocation.
    Bequeath(Value),
}

impl Flow {
    /// Runtime type error at a position.
    pub fn type_error(message: impl Into<String>, span: Span) -> Flow {
        Flow::Error(AthError::type_error(message, span))
    }

    /// Runtime lookup error at a position.
    pub fn lookup(message: impl Into<String>, span: Span) -> Flow {
        Flow::Error(AthError::lookup(message, span))
    }

    /// Runtime constraint error at a position.
    pub fn constraint(message: impl Into<String>, span: Span) -> Flow {
        Flow::Error(AthError::constraint(message, span))
    }

    /// Convert into a plain error. A `BEQUEATH` reaching a task boundary has
    /// escaped every rite, which is itself a constraint violation.
    pub fn into_error(self, span: Span) -> AthError {
        match self {
            Flow::Error(err) => err,
            Flow::Bequeath(_) => {
                AthError::new(ErrorKind::Constraint, "BEQUEATH outside of a rite", span)
            }
        }
    }
}

impl From<AthError> for Flow {
    fn from(err: AthError) -> Self {
        Flow::Error(err)
    }
}

/// Result alias for statement execution.
pub type ExecResult = Result<(), Flow>;
/// Result alias for expression evaluation.
pub type EvalResult = Result<Value, Flow>;
