//! Abstract syntax tree for !~ATH programs.
//!
//! One tagged-variant tree covers statements, value expressions, entity
//! expressions (the distinct sub-grammar inside `~ATH(...)`), and DIE
//! targets. Every node carries the source position of its first token.

use serde::{Deserialize, Serialize};

use crate::error::Span;

use super::token::DurationUnit;

/// A parsed program: the top-level statement stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Top-level statements in source order.
    pub statements: Vec<Stmt>,
}

/// The entity class named in an `import` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityClass {
    /// `timer`: dies after a duration.
    Timer,
    /// `process`: dies when the child process exits.
    Process,
    /// `connection`: dies when the socket closes.
    Connection,
    /// `watcher`: dies when the watched path is deleted.
    Watcher,
}

impl EntityClass {
    /// Source keyword for this class.
    pub fn keyword(self) -> &'static str {
        match self {
            EntityClass::Timer => "timer",
            EntityClass::Process => "process",
            EntityClass::Connection => "connection",
            EntityClass::Watcher => "watcher",
        }
    }
}

/// A duration literal, e.g. `100ms` or `2h`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationLit {
    /// Magnitude in `unit`s.
    pub value: i64,
    /// The literal's unit.
    pub unit: DurationUnit,
    /// Source position.
    pub span: Span,
}

impl DurationLit {
    /// The duration in milliseconds, computed at integer width.
    pub fn millis(&self) -> i64 {
        self.unit.to_millis(self.value)
    }
}

/// Arguments of an `import` statement. Timers take a single duration
/// literal; the other entity classes take an expression list validated at
/// evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportArgs {
    /// Timer duration.
    Duration(DurationLit),
    /// Constructor expressions for process/connection/watcher.
    Exprs(Vec<Expr>),
}

/// Statement nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `import <class> <name>(<args>);`
    Import {
        class: EntityClass,
        name: String,
        args: ImportArgs,
        span: Span,
    },

    /// `bifurcate <entity>[<left>, <right>];`
    Bifurcate {
        entity: String,
        left: String,
        right: String,
        span: Span,
    },

    /// `~ATH(<entity-expr>) { <body> } EXECUTE(<execute>);`
    AthLoop {
        condition: EntityExpr,
        body: Vec<Stmt>,
        execute: Vec<Stmt>,
        span: Span,
    },

    /// `<target>.DIE();`
    Die { target: DieTarget, span: Span },

    /// `BIRTH <name> WITH <expr>;`
    VarDecl { name: String, value: Expr, span: Span },

    /// `ENTOMB <name> WITH <expr>;`
    ConstDecl { name: String, value: Expr, span: Span },

    /// `<lvalue> = <expr>;` where the target is an identifier, index, or
    /// member expression, validated at evaluation.
    Assign { target: Expr, value: Expr, span: Span },

    /// `RITE <name>(<params>) { <body> }`
    RiteDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        span: Span,
    },

    /// `SHOULD <cond> { … } [LEST { … } | LEST SHOULD …]`
    Conditional {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        span: Span,
    },

    /// `ATTEMPT { … } SALVAGE <name> { … }`
    Attempt {
        body: Vec<Stmt>,
        error_name: String,
        salvage: Vec<Stmt>,
        span: Span,
    },

    /// `CONDEMN <expr>;`
    Condemn { message: Expr, span: Span },

    /// `BEQUEATH [<expr>];`
    Bequeath { value: Option<Expr>, span: Span },

    /// Bare expression statement.
    Expr { expr: Expr, span: Span },
}

impl Stmt {
    /// Position of the statement's first token.
    pub fn span(&self) -> Span {
        match self {
            Stmt::Import { span, .. }
            | Stmt::Bifurcate { span, .. }
            | Stmt::AthLoop { span, .. }
            | Stmt::Die { span, .. }
            | Stmt::VarDecl { span, .. }
            | Stmt::ConstDecl { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::RiteDef { span, .. }
            | Stmt::Conditional { span, .. }
            | Stmt::Attempt { span, .. }
            | Stmt::Condemn { span, .. }
            | Stmt::Bequeath { span, .. }
            | Stmt::Expr { span, .. } => *span,
        }
    }
}

/// Literal payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Str(String),
    Boolean(bool),
    Void,
}

/// Binary operators of the value-expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Source spelling, used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "OR",
            BinaryOp::And => "AND",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Boolean negation (`NOT`).
    Not,
    /// Numeric negation.
    Neg,
}

/// Value expression nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal { value: Literal, span: Span },
    Identifier { name: String, span: Span },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Member {
        object: Box<Expr>,
        member: String,
        span: Span,
    },
    Array { elements: Vec<Expr>, span: Span },
    /// Map literal; keys are identifiers or string literals, both denoting
    /// string keys, in source order.
    Map {
        entries: Vec<(String, Expr)>,
        span: Span,
    },
}

impl Expr {
    /// Position of the expression's first token.
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Index { span, .. }
            | Expr::Member { span, .. }
            | Expr::Array { span, .. }
            | Expr::Map { span, .. } => *span,
        }
    }
}

/// Entity expressions, valid only inside `~ATH(...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityExpr {
    /// A named entity (including `THIS`).
    Ident { name: String, span: Span },
    /// Dead when both operands are dead.
    And {
        left: Box<EntityExpr>,
        right: Box<EntityExpr>,
        span: Span,
    },
    /// Dead when either operand is dead.
    Or {
        left: Box<EntityExpr>,
        right: Box<EntityExpr>,
        span: Span,
    },
    /// Dead as soon as it is observed (next scheduler tick).
    Not { operand: Box<EntityExpr>, span: Span },
}

impl EntityExpr {
    /// Position of the expression's first token.
    pub fn span(&self) -> Span {
        match self {
            EntityExpr::Ident { span, .. }
            | EntityExpr::And { span, .. }
            | EntityExpr::Or { span, .. }
            | EntityExpr::Not { span, .. } => *span,
        }
    }
}

/// Target of a DIE statement: an identifier or an arbitrarily nested pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DieTarget {
    /// Single entity by name (including `THIS`).
    Ident { name: String, span: Span },
    /// `[left, right]`: kills every leaf, order unspecified.
    Pair {
        left: Box<DieTarget>,
        right: Box<DieTarget>,
        span: Span,
    },
}

impl DieTarget {
    /// Position of the target's first token.
    pub fn span(&self) -> Span {
        match self {
            DieTarget::Ident { span, .. } | DieTarget::Pair { span, .. } => *span,
        }
    }
}
