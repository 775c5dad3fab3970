use std::fmt;

use derive_more::Display;

/// An engine bug: a token or IR node reached a place where it is structurally
/// impossible on valid input. Carries the backtrace of where it was detected.
#[derive(Clone)]
pub struct InvariantViolation {
    pub message: String,
    pub backtrace: backtrace::Backtrace,
}

impl InvariantViolation {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self{ message: message.into(), backtrace: backtrace::Backtrace::new() }
    }
}

impl fmt::Debug for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "InvariantViolation({:?})", self.message)?;
        write!(f, "{:?}", self.backtrace)
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Fatal errors of a run, shared by the interpreter, the IR runner and
/// generated programs.
#[derive(Debug, Clone, Display)]
pub enum RunError {
    #[display(fmt = "unknown function '{}'", name)]
    UnknownFunction { name: String },
    #[display(fmt = "maximum call depth of {} exceeded in '{}'", depth, function)]
    RecursionLimitExceeded { depth: usize, function: String },
    #[display(fmt = "while$ loop did not terminate within {} iterations", iterations)]
    LoopLimitExceeded { iterations: u64 },
    #[display(fmt = "internal invariant violated: {}", _0)]
    InternalInvariantViolation(InvariantViolation),
}

impl std::error::Error for RunError {}

impl From<InvariantViolation> for RunError {
    fn from(v: InvariantViolation) -> Self {
        RunError::InternalInvariantViolation(v)
    }
}
