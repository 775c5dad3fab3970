/// bst/tests
///
/// Tests for reading styles, the interpreter and the compiler. Most tests
/// run a small style against a handful of entries; the ones in `cross_mode`
/// check that the interpreter, the IR runner with and without optimizations
/// agree on everything a run produces.

mod utils;
mod eval_builtins;
mod cross_mode;
mod program;

pub(crate) use utils::{strings, Tester}; // the testing harness
pub(crate) use crate::runtime::{ArgKind, Config, Entry, Value}; // to build inputs
