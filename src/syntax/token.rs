//! Token definitions for the !~ATH lexer.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Span;

/// Unit of a duration literal such as `100ms` or `2h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    /// Milliseconds, the minimum resolvable unit.
    Millis,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
}

impl DurationUnit {
    /// Convert a count of this unit to milliseconds. Integer math throughout
    /// so `2h` is exactly `7_200_000`.
    pub fn to_millis(self, value: i64) -> i64 {
        match self {
            DurationUnit::Millis => value,
            DurationUnit::Seconds => value * 1_000,
            DurationUnit::Minutes => value * 60 * 1_000,
            DurationUnit::Hours => value * 60 * 60 * 1_000,
        }
    }

    /// Source suffix for this unit.
    pub fn suffix(self) -> &'static str {
        match self {
            DurationUnit::Millis => "ms",
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
            DurationUnit::Hours => "h",
        }
    }
}

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Float(f64),
    Str(String),
    Duration { unit: DurationUnit, value: i64 },
    Identifier(String),

    // Structure keywords
    Import,
    Bifurcate,
    Execute,
    Die,
    This,
    /// The `~ATH` marker.
    TildeAth,

    // Entity classes
    Timer,
    Process,
    Connection,
    Watcher,

    // Expression keywords
    Birth,
    Entomb,
    With,
    Alive,
    Dead,
    Void,
    Should,
    Lest,
    Rite,
    Bequeath,
    Attempt,
    Salvage,
    Condemn,
    And,
    Or,
    Not,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Assign,

    // Entity operators, valid only inside `~ATH(...)`
    AmpAmp,
    PipePipe,
    Bang,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    Colon,

    Eof,
}

impl TokenKind {
    /// Keyword lookup for an identifier-shaped lexeme. Keywords are
    /// case-sensitive.
    pub fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "import" => TokenKind::Import,
            "bifurcate" => TokenKind::Bifurcate,
            "EXECUTE" => TokenKind::Execute,
            "DIE" => TokenKind::Die,
            "THIS" => TokenKind::This,
            "timer" => TokenKind::Timer,
            "process" => TokenKind::Process,
            "connection" => TokenKind::Connection,
            "watcher" => TokenKind::Watcher,
            "BIRTH" => TokenKind::Birth,
            "ENTOMB" => TokenKind::Entomb,
            "WITH" => TokenKind::With,
            "ALIVE" => TokenKind::Alive,
            "DEAD" => TokenKind::Dead,
            "VOID" => TokenKind::Void,
            "SHOULD" => TokenKind::Should,
            "LEST" => TokenKind::Lest,
            "RITE" => TokenKind::Rite,
            "BEQUEATH" => TokenKind::Bequeath,
            "ATTEMPT" => TokenKind::Attempt,
            "SALVAGE" => TokenKind::Salvage,
            "CONDEMN" => TokenKind::Condemn,
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            _ => return None,
        })
    }

    /// Whether a token of this kind can terminate an expression. Drives the
    /// context-sensitive negative-number rule: after one of these, `-` is
    /// subtraction, not a sign.
    pub fn terminates_expression(&self) -> bool {
        matches!(
            self,
            TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::Duration { .. }
                | TokenKind::Identifier(_)
                | TokenKind::Alive
                | TokenKind::Dead
                | TokenKind::Void
                | TokenKind::RParen
                | TokenKind::RBracket
        )
    }

    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(n) => format!("integer {}", n),
            TokenKind::Float(x) => format!("float {}", x),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Duration { unit, value } => format!("duration {}{}", value, unit.suffix()),
            TokenKind::Identifier(name) => format!("identifier '{}'", name),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Token kind and payload.
    pub kind: TokenKind,
    /// Position of the token's first character.
    pub span: Span,
}

impl Token {
    /// Construct a token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind.describe(), self.span)
    }
}
