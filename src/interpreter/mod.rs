//! The tree-walking interpreter: values, scopes, control-flow signals, the
//! built-in rite library, and the evaluator that drives programs against
//! the entity runtime.

/// Built-in rites.
pub mod builtins;
/// Control-flow signals (`BEQUEATH` versus runtime errors).
pub mod control;
/// The evaluator.
pub mod eval;
/// Variable environments.
pub mod scope;
/// Runtime values.
pub mod value;

pub use builtins::BuiltinRite;
pub use control::Flow;
pub use eval::Interpreter;
pub use scope::{Scope, ScopeRef};
pub use value::{UserRite, Value};
