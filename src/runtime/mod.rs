/// runtime
///
/// State of a running style that outlives a single function call: the output
/// text, global variables, the entry list with the current entry, the
/// preamble, the loop and call-depth guards and the diagnostics. The
/// interpreter, the IR runner and generated programs all execute against a
/// `Machine`, so writing, variable access, built-in computation and error
/// counting behave identically in every mode.

pub mod diagnostics;
pub mod entry;
pub mod error;
pub mod logging;
pub mod value;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use crate::bst::token::{LocalKind, Locator};
use diagnostics::{Diagnostics, MessageId};

pub use crate::bst::builtins::{ArgKind, Primitive};
pub use entry::{resolve_crossrefs, Entry};
pub use error::{InvariantViolation, RunError};
pub use logging::{DummyLogger, FileLogger, Logger, VecLogger};
pub use value::{Value, ValueKind};

/// Name of the implicit entry variable that `SORT` orders by
pub const SORT_KEY: &str = "sort.key$";

/// Globals every machine starts with, together with their values
pub const PREDECLARED_GLOBALS: [(&str, i64); 2] = [("entry.max$", 250), ("global.max$", 5000)];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_call_depth: usize,
    pub max_loop_iterations: u64,
    pub optimize: bool,
    pub tie: String,
}

impl Default for Config {
    fn default() -> Self {
        Self{
            max_call_depth: 1000,
            max_loop_iterations: 10_000_000,
            optimize: true,
            tie: String::from("~"),
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_loop_iterations(mut self, iterations: u64) -> Self {
        self.max_loop_iterations = iterations;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_tie(mut self, tie: &str) -> Self {
        self.tie = tie.to_string();
        self
    }
}

/// Orders entries for `SORT` by their sort keys. The default compares the
/// keys bytewise, a collation engine can be plugged in instead.
pub trait EntrySorter: Debug {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

#[derive(Debug, Default)]
pub struct DefaultSorter;

impl EntrySorter for DefaultSorter {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: String,
    pub errors: usize,
    pub warnings: usize,
    // "(There were N errors)" or empty
    pub tally: String,
}

#[derive(Debug)]
pub struct Machine {
    config: Config,
    output: String,
    globals: HashMap<Rc<str>, Value>,
    entry_layout: HashMap<Rc<str>, LocalKind>,
    entries: Vec<Entry>,
    current: Option<usize>,
    preamble: Rc<str>,
    diagnostics: Diagnostics,
    // Token that is being executed, attached to diagnostics
    locator: Option<Locator>,
    depth: usize,
    sorter: Box<dyn EntrySorter>,
}

impl Machine {
    pub fn new(config: Config) -> Self {
        let mut machine = Self{
            config,
            output: String::new(),
            globals: HashMap::new(),
            entry_layout: HashMap::new(),
            entries: Vec::new(),
            current: None,
            preamble: Rc::from(""),
            diagnostics: Diagnostics::default(),
            locator: None,
            depth: 0,
            sorter: Box::new(DefaultSorter),
        };
        for (name, value) in PREDECLARED_GLOBALS.iter() {
            machine.declare_global(name, Value::Integer(*value));
        }
        machine.declare_entry_var(SORT_KEY, LocalKind::String);
        machine
    }

    pub fn with_logger(mut self, logger: Box<dyn Logger>) -> Self {
        self.diagnostics = Diagnostics::new(logger);
        self
    }

    pub fn with_sorter(mut self, sorter: Box<dyn EntrySorter>) -> Self {
        self.sorter = sorter;
        self
    }

    pub fn with_entries(mut self, entries: Vec<Entry>) -> Self {
        self.entries = entries;
        self
    }

    pub fn with_preamble(mut self, preamble: &str) -> Self {
        self.preamble = Rc::from(preamble);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push_entry(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn set_current(&mut self, current: Option<usize>) {
        debug_assert!(current.map_or(true, |idx| idx < self.entries.len()));
        self.current = current;
    }

    pub fn set_locator(&mut self, locator: Option<Locator>) {
        self.locator = locator;
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    // --- Declarations

    pub fn declare_global(&mut self, name: &str, initial: Value) {
        self.globals.insert(Rc::from(name), initial);
    }

    pub fn declare_entry_var(&mut self, name: &str, kind: LocalKind) {
        self.entry_layout.insert(Rc::from(name), kind);
    }

    // --- Diagnostics

    pub fn error(&mut self, id: MessageId, args: Vec<String>) {
        let locator = self.locator.clone();
        self.diagnostics.error(id, args, locator);
    }

    pub fn report_leftover(&mut self, count: usize, function: &str) {
        let locator = self.locator.clone();
        self.diagnostics.warning(
            MessageId::LeftoverStack, vec![count.to_string(), function.to_string()], locator
        );
    }

    // --- Entry access

    fn current_entry(&mut self, function: &str) -> Option<usize> {
        if self.current.is_none() {
            self.error(MessageId::NoCurrentEntry, vec![function.to_string()]);
        }
        self.current
    }

    /// Reads a field of the current entry
    pub fn field(&mut self, name: &str) -> Value {
        match self.current_entry(name) {
            Some(idx) => match self.entries[idx].field(name) {
                Some(v) => Value::String(v.clone()),
                None => Value::Missing(Rc::from(name)),
            },
            None => Value::Missing(Rc::from(name)),
        }
    }

    fn entry_default(&self, name: &str) -> Value {
        match self.entry_layout.get(name) {
            Some(LocalKind::Integer) => Value::Integer(0),
            _ => Value::empty_string(),
        }
    }

    pub fn entry_var(&mut self, name: &str) -> Value {
        match self.current_entry(name) {
            Some(idx) => match self.entries[idx].vars.get(name) {
                Some(v) => v.clone(),
                None => self.entry_default(name),
            },
            None => self.entry_default(name),
        }
    }

    pub fn set_entry_var(&mut self, name: &str, value: Value) {
        if let Some(idx) = self.current_entry(name) {
            self.entries[idx].vars.insert(Rc::from(name), value.into_stored());
        }
    }

    pub fn cite(&mut self) -> Value {
        match self.current_entry("cite$") {
            Some(idx) => Value::String(self.entries[idx].key().clone()),
            None => Value::empty_string(),
        }
    }

    pub fn entry_type(&mut self) -> Value {
        match self.current_entry("type$") {
            Some(idx) => Value::String(self.entries[idx].entry_type().clone()),
            None => Value::empty_string(),
        }
    }

    /// Entry type used by `call.type$`, `None` without a current entry
    pub fn dispatch_type(&mut self) -> Option<Rc<str>> {
        self.current_entry("call.type$")
            .map(|idx| self.entries[idx].entry_type().clone())
    }

    pub fn preamble(&self) -> Value {
        Value::String(self.preamble.clone())
    }

    // --- Globals

    pub fn global(&self, name: &str) -> Value {
        match self.globals.get(name) {
            Some(v) => v.clone(),
            None => Value::Integer(0),
        }
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        match self.globals.get_mut(name) {
            Some(slot) => *slot = value.into_stored(),
            None => {
                self.globals.insert(Rc::from(name), value.into_stored());
            }
        }
    }

    // --- Output

    pub fn write(&mut self, value: Value) {
        self.output.push_str(value.as_str());
    }

    pub fn newline(&mut self) {
        self.output.push('\n');
    }

    pub fn warning(&mut self, value: Value) {
        let locator = self.locator.clone();
        self.diagnostics.warning(MessageId::UserWarning, vec![value.as_str().to_string()], locator);
    }

    // --- Built-ins and guards

    /// Applies a primitive, problems are recorded as errors at the current
    /// locator.
    pub fn prim(&mut self, primitive: Primitive, args: Vec<Value>) -> Value {
        let mut problems = Vec::new();
        let result = primitive.apply(&args, &self.config.tie, &mut problems);
        for problem in problems {
            let locator = self.locator.clone();
            self.diagnostics.problem(problem, locator);
        }
        result
    }

    /// Checks the kind of a value taken by a built-in. A mismatch is recorded
    /// as an error and `None` is returned.
    pub fn accept(&mut self, kind: ArgKind, value: Value, function: &str) -> Option<Value> {
        if kind.accepts(&value) {
            return Some(value);
        }
        self.error(MessageId::TypeMismatch, vec![function.to_string(), kind.to_string(), value.to_string()]);
        None
    }

    /// Like `accept`, substituting the placeholder of the kind on a mismatch
    pub fn coerce(&mut self, kind: ArgKind, value: Value, function: &str) -> Value {
        self.accept(kind, value, function).unwrap_or_else(|| kind.placeholder())
    }

    /// Counts one iteration of a `while$` loop
    pub fn loop_guard(&mut self, iterations: &mut u64) -> Result<(), RunError> {
        *iterations += 1;
        if *iterations > self.config.max_loop_iterations {
            return Err(RunError::LoopLimitExceeded{ iterations: self.config.max_loop_iterations });
        }
        Ok(())
    }

    /// Enters a user function; must be paired with `leave`
    pub fn enter(&mut self, function: &str) -> Result<(), RunError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RunError::RecursionLimitExceeded{
                depth: self.config.max_call_depth,
                function: function.to_string(),
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `f` as the body of the named function, bounded by the call depth
    pub fn call<T, F>(&mut self, function: &str, f: F) -> Result<T, RunError>
        where F: FnOnce(&mut Machine) -> Result<T, RunError>
    {
        self.enter(function)?;
        let result = f(self);
        self.leave();
        result
    }

    pub fn leave(&mut self) {
        debug_assert!(self.depth > 0);
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // --- Run commands

    /// `EXECUTE`: runs once without a current entry
    pub fn execute<E, F>(&mut self, mut f: F) -> Result<(), E>
        where F: FnMut(&mut Machine) -> Result<(), E>
    {
        self.current = None;
        f(self)
    }

    /// `ITERATE`: runs once for every entry, in order
    pub fn iterate<E, F>(&mut self, f: F) -> Result<(), E>
        where F: FnMut(&mut Machine) -> Result<(), E>
    {
        let order: Vec<usize> = (0..self.entries.len()).collect();
        self.run_over(order, f)
    }

    /// `REVERSE`: runs once for every entry, in reverse order
    pub fn reverse<E, F>(&mut self, f: F) -> Result<(), E>
        where F: FnMut(&mut Machine) -> Result<(), E>
    {
        let order: Vec<usize> = (0..self.entries.len()).rev().collect();
        self.run_over(order, f)
    }

    fn run_over<E, F>(&mut self, order: Vec<usize>, mut f: F) -> Result<(), E>
        where F: FnMut(&mut Machine) -> Result<(), E>
    {
        for idx in order {
            self.current = Some(idx);
            if let Err(e) = f(self) {
                self.current = None;
                return Err(e);
            }
        }
        self.current = None;
        Ok(())
    }

    /// `SORT`: stable sort of the entries by their sort key
    pub fn sort(&mut self) {
        let sorter = &self.sorter;
        self.entries.sort_by(|a, b| {
            let key_a = a.var(SORT_KEY).map_or("", |v| v.as_str());
            let key_b = b.var(SORT_KEY).map_or("", |v| v.as_str());
            sorter.compare(key_a, key_b)
        });
        self.current = None;
    }

    pub fn summary(&mut self) -> RunSummary {
        let tally = self.diagnostics.report_tally();
        RunSummary{
            output: self.output.clone(),
            errors: self.diagnostics.error_count(),
            warnings: self.diagnostics.warning_count(),
            tally,
        }
    }
}
