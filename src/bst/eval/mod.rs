/// eval
///
/// Interpreter of loaded styles. Function bodies are executed token by token
/// against an operand stack. Pending tokens, branches and loop tests sit on an
/// explicit instruction stack, so a user function activation does not use the
/// host stack and the call depth is only bounded by the configuration.
///
/// Every top-level call made by a run command (`EXECUTE`, `ITERATE`,
/// `REVERSE`) starts with an empty operand stack. Values left behind are
/// reported as a warning and dropped.
///
/// Stack underflow and type mismatches do not stop the interpreter: the
/// problem is recorded at the locator of the offending token, a placeholder
/// (`0` or `""`) stands in for the missing value and execution continues. The
/// tally of errors is reported at the end of the run. Unknown functions and
/// exceeding the call depth or loop limit are fatal.

mod error;
mod executor;

pub use error::{EvalError, EvalFrame};
pub use executor::{EntryOutput, Interpreter};
