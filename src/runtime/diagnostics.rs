use std::fmt;

use super::logging::{DummyLogger, Logger};
use crate::bst::token::Locator;

/// Identifies the kind of a diagnostic message. The message text is produced
/// from the id and the arguments, see `Diagnostic`'s `Display` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    // args: function
    StackUnderflow,
    // args: function, expected kind, found value
    TypeMismatch,
    // args: function, argument
    NegativeArgument,
    // args: function, argument
    InvalidCharacter,
    // args: string
    NotSingleCharacter,
    // args: case specification
    IllegalCaseSpec,
    // args: name index, name list
    NameIndexOutOfRange,
    // args: name, name list
    TooManyCommas,
    // args: function
    NoCurrentEntry,
    // args: name
    NotAVariable,
    // args: number of values, function
    LeftoverStack,
    // args: message
    UserWarning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found by a built-in while computing its result. It does not yet
/// know where it happened: the machine attaches the locator of the token that
/// is being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub id: MessageId,
    pub args: Vec<String>,
}

impl Problem {
    pub fn new(id: MessageId, args: Vec<String>) -> Self {
        Self{ id, args }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub id: MessageId,
    pub args: Vec<String>,
    pub locator: Option<Locator>,
}

impl Diagnostic {
    fn arg(&self, idx: usize) -> &str {
        self.args.get(idx).map(|v| v.as_str()).unwrap_or("")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(locator) = &self.locator {
            write!(f, "{}: ", locator)?;
        }
        match self.id {
            MessageId::StackUnderflow =>
                write!(f, "stack underflow in {}", self.arg(0)),
            MessageId::TypeMismatch =>
                write!(f, "{} expected {} but found {}", self.arg(0), self.arg(1), self.arg(2)),
            MessageId::NegativeArgument =>
                write!(f, "{}: negative argument {}", self.arg(0), self.arg(1)),
            MessageId::InvalidCharacter =>
                write!(f, "{}: {} isn't a valid character", self.arg(0), self.arg(1)),
            MessageId::NotSingleCharacter =>
                write!(f, "chr.to.int$: \"{}\" isn't a single character", self.arg(0)),
            MessageId::IllegalCaseSpec =>
                write!(f, "change.case$: \"{}\" is an illegal case-conversion string", self.arg(0)),
            MessageId::NameIndexOutOfRange =>
                write!(f, "format.name$: there is no name {} in \"{}\"", self.arg(0), self.arg(1)),
            MessageId::TooManyCommas =>
                write!(f, "format.name$: too many commas in name \"{}\" of \"{}\"", self.arg(0), self.arg(1)),
            MessageId::NoCurrentEntry =>
                write!(f, "{}: there is no current entry", self.arg(0)),
            MessageId::NotAVariable =>
                write!(f, "{} is not a variable", self.arg(0)),
            MessageId::LeftoverStack =>
                write!(f, "{} value(s) left on the stack after {}", self.arg(0), self.arg(1)),
            MessageId::UserWarning =>
                write!(f, "Warning--{}", self.arg(0)),
        }
    }
}

/// Collects diagnostics of a run, writes them to the logger as they arrive
/// and keeps the error and warning tallies.
#[derive(Debug)]
pub struct Diagnostics {
    logger: Box<dyn Logger>,
    records: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Box::new(DummyLogger))
    }
}

impl Diagnostics {
    pub fn new(logger: Box<dyn Logger>) -> Self {
        Self{ logger, records: Vec::new(), errors: 0, warnings: 0 }
    }

    pub fn error(&mut self, id: MessageId, args: Vec<String>, locator: Option<Locator>) {
        self.errors += 1;
        self.push(Diagnostic{ severity: Severity::Error, id, args, locator });
    }

    pub fn warning(&mut self, id: MessageId, args: Vec<String>, locator: Option<Locator>) {
        self.warnings += 1;
        self.push(Diagnostic{ severity: Severity::Warning, id, args, locator });
    }

    pub fn problem(&mut self, problem: Problem, locator: Option<Locator>) {
        self.error(problem.id, problem.args, locator);
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        log!(self.logger, "{}", diagnostic);
        self.records.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    /// Writes the tally of the run to the logger and returns it
    pub fn report_tally(&mut self) -> String {
        let tally = tally_message(self.errors, self.warnings);
        if !tally.is_empty() {
            log!(self.logger, "{}", tally);
        }
        tally
    }
}

pub fn tally_message(errors: usize, warnings: usize) -> String {
    match (errors, warnings) {
        (0, 0) => String::new(),
        (0, 1) => String::from("(There was 1 warning)"),
        (0, n) => format!("(There were {} warnings)", n),
        (1, _) => String::from("(There was 1 error)"),
        (n, _) => format!("(There were {} errors)", n),
    }
}
