//! Lexical and syntactic analysis for the !~ATH language.
//!
//! `source → Lexer → tokens → Parser → AST`. Positions are tracked from the
//! first character and attached to every token and AST node.

/// Abstract syntax tree node definitions.
pub mod ast;
/// UTF-8 source scanner.
pub mod lexer;
/// Recursive-descent parser.
pub mod parser;
/// Token and duration-unit definitions.
pub mod token;

pub use ast::{
    BinaryOp, DieTarget, DurationLit, EntityClass, EntityExpr, Expr, ImportArgs, Literal, Program,
    Stmt, UnaryOp,
};
pub use lexer::Lexer;
pub use parser::{parse_source, Parser};
pub use token::{DurationUnit, Token, TokenKind};
