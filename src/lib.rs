#[macro_use]
mod macros;

pub mod bst;
pub mod runtime;

pub use bst::{CompileError, Compiler, EvalError, Interpreter, Program, Session, Style};
pub use runtime::{Config, Entry, Machine, RunError, RunSummary, Value};
