//! An interpreter for **!~ATH**, an esoteric language whose only control
//! flow is waiting for entities to die.
//!
//! Programs import mortal entities (timers, processes, connections, path
//! watchers), wait on their deaths with `~ATH(...) { } EXECUTE(...)`, and
//! fork concurrent branches with `bifurcate`. The pipeline is
//! `source → lexer → parser → AST → evaluator`, with the evaluator running
//! on a single-threaded cooperative scheduler that delivers death signals
//! between ticks.
//!
//! ```no_run
//! use std::rc::Rc;
//! use tildeath::{run_source, SystemHost};
//!
//! let program = r#"
//!     import timer T(1ms);
//!     ~ATH(T) { } EXECUTE(UTTER("Hello, world!"));
//!     THIS.DIE();
//! "#;
//! run_source(program, Rc::new(SystemHost::new())).unwrap();
//! ```
//!
//! Embedders supply a [`Host`] adapter for output, input, files, timers,
//! and the other external resources; [`SystemHost`] binds the real machine
//! and [`SimHost`] runs deterministically on a virtual clock. A host that
//! offers only timers is a valid deployment; the optional `import` kinds
//! then fail with a clear runtime error.

/// Positioned error types.
pub mod error;
/// Values, scopes, built-ins, and the evaluator.
pub mod interpreter;
/// Entities, scheduler, and host adapter.
pub mod runtime;
/// Lexer, parser, and AST.
pub mod syntax;

pub use error::{AthError, ErrorKind, HostError, Result, Span};
pub use interpreter::{Interpreter, Value};
pub use runtime::{Host, SimHost, SystemHost};
pub use syntax::{parse_source, Program};

use std::rc::Rc;

/// Lex, parse, and run a program against the given host.
pub fn run_source(source: &str, host: Rc<dyn Host>) -> Result<()> {
    let program = parse_source(source)?;
    Interpreter::new(host).run(&program)
}
