//! Error types for the !~ATH interpreter
//!
//! Every phase (lexing, parsing, evaluation) reports through the same
//! positioned error type so the user-visible rendering is uniform:
//! `[line L, col C] <kind>: <message>`, position omitted when unknown.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Source position, 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number, starting at 1, reset on `\n`.
    pub column: u32,
}

impl Span {
    /// Create a span from a line/column pair.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.column)
    }
}

/// Classification of an interpreter error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Lexical error: unterminated string, unknown escape, stray character.
    Lex,
    /// Syntax error: unexpected or missing token.
    Parse,
    /// Wrong operand kind for an operator, built-in, or index.
    Type,
    /// Undefined variable, unknown entity, unknown map key.
    Lookup,
    /// Division by zero, constant reassignment, arity mismatch, and the
    /// other semantic constraints of the runtime.
    Constraint,
    /// User-raised via `CONDEMN`.
    Condemn,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Type => "type error",
            ErrorKind::Lookup => "lookup error",
            ErrorKind::Constraint => "constraint error",
            ErrorKind::Condemn => "condemned",
        }
    }
}

/// A positioned interpreter error.
///
/// `SALVAGE` binds only `message`; the kind and position are part of the
/// top-level rendering, not of the catchable value.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct AthError {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message, without position prefix.
    pub message: String,
    /// Position, when one is available.
    pub span: Option<Span>,
}

impl AthError {
    /// Construct an error of the given kind with a position.
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    /// Construct an error of the given kind with no position.
    pub fn unpositioned(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    /// Lexical error at a position.
    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lex, message, span)
    }

    /// Parse error at a position.
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message, span)
    }

    /// Runtime type error at a position.
    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, message, span)
    }

    /// Runtime lookup error at a position.
    pub fn lookup(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lookup, message, span)
    }

    /// Runtime constraint error at a position.
    pub fn constraint(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Constraint, message, span)
    }

    /// User-raised error carrying the condemned message.
    pub fn condemn(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Condemn, message, span)
    }

    /// Attach a position if the error does not already carry one. Built-in
    /// rites raise unpositioned errors; call sites fill in their own span.
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

}

impl fmt::Display for AthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "[{}] {}: {}", span, self.kind.label(), self.message),
            None => write!(f, "{}: {}", self.kind.label(), self.message),
        }
    }
}

/// Errors surfaced by host adapter operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The host does not provide this capability.
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    /// I/O failure reported by the host.
    #[error("{0}")]
    Io(String),
}

impl HostError {
    /// Convert into an unpositioned runtime error; the evaluator attaches
    /// the span of the statement that touched the host.
    pub fn into_ath(self) -> AthError {
        let kind = match self {
            HostError::Unsupported(_) => ErrorKind::Constraint,
            HostError::Io(_) => ErrorKind::Constraint,
        };
        AthError::unpositioned(kind, self.to_string())
    }
}

/// Result type using AthError.
pub type Result<T> = std::result::Result<T, AthError>;
