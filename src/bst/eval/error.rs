use std::fmt;

use crate::bst::token::Locator;
use crate::runtime::RunError;

/// A user function activation recorded in an error
#[derive(Debug, Clone)]
pub struct EvalFrame {
    pub function: String,
    // Where the function was called from
    pub locator: Locator,
}

impl fmt::Display for EvalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {} called at {}", self.function, self.locator)
    }
}

/// Fatal error of the interpreter. Contains the error, the token that caused
/// it and the function activations at the time it occurred.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub error: RunError,
    pub locator: Option<Locator>,
    pub frames: Vec<EvalFrame>,
}

impl EvalError {
    pub fn is_unknown_function(&self) -> bool {
        matches!(self.error, RunError::UnknownFunction{ .. })
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ERROR: ")?;
        if let Some(locator) = &self.locator {
            write!(f, "{}: ", locator)?;
        }
        write!(f, "{}", self.error)?;

        // Display stack trace
        if !self.frames.is_empty() {
            writeln!(f)?;
            writeln!(f, " +-  Stack trace:")?;
            for frame in self.frames.iter().rev() {
                write!(f, " | ")?;
                frame.fmt(f)?;
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for EvalError {}
