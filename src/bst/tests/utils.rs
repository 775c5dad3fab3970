use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::bst::{
    *,
    builtins::ArgKind,
    compiler::ir::IrFunction,
    input_source::ParseError,
};
use crate::runtime::{
    diagnostics::{Diagnostic, MessageId, Severity},
    Config, Entry, Machine, RunError, RunSummary, Value,
};

//------------------------------------------------------------------------------
// Interface for reading a style
//------------------------------------------------------------------------------

pub(crate) struct Tester {
    test_name: String,
    source: String,
    entries: Vec<Entry>,
    preamble: String,
    config: Config,
}

impl Tester {
    /// Constructs a new tester, entries and configuration may be added
    /// before the style is read
    pub(crate) fn new<S: ToString>(test_name: S) -> Self {
        Self{
            test_name: test_name.to_string(),
            source: String::new(),
            entries: Vec::new(),
            preamble: String::new(),
            config: Config::default(),
        }
    }

    /// Utility for quick tests that read a single style and expect reading
    /// it to succeed.
    pub(crate) fn new_single_source_expect_ok<T: ToString, S: ToString>(test_name: T, source: S) -> StyleTester {
        Self::new(test_name)
            .with_source(source)
            .parse()
            .expect_ok()
    }

    /// Utility for quick tests that read a single style and expect reading
    /// it to fail.
    pub(crate) fn new_single_source_expect_err<T: ToString, S: ToString>(test_name: T, source: S) -> ParseErrTester {
        Self::new(test_name)
            .with_source(source)
            .parse()
            .expect_err()
    }

    pub(crate) fn with_source<S: ToString>(mut self, source: S) -> Self {
        self.source = source.to_string();
        self
    }

    pub(crate) fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub(crate) fn with_preamble(mut self, preamble: &str) -> Self {
        self.preamble = preamble.to_string();
        self
    }

    pub(crate) fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn parse(self) -> StyleTesterResult {
        match Style::parse("test.bst", &self.source) {
            Ok(style) => StyleTesterResult::Ok(StyleTester{
                test_name: self.test_name,
                style,
                entries: self.entries,
                preamble: self.preamble,
                config: self.config,
            }),
            Err(error) => StyleTesterResult::Err(ParseErrTester{ test_name: self.test_name, error }),
        }
    }
}

pub(crate) enum StyleTesterResult {
    Ok(StyleTester),
    Err(ParseErrTester),
}

impl StyleTesterResult {
    pub(crate) fn expect_ok(self) -> StyleTester {
        match self {
            StyleTesterResult::Ok(v) => v,
            StyleTesterResult::Err(err) => {
                println!("DEBUG: Full error:\n{}", &err.error);
                assert!(
                    false,
                    "[{}] Expected reading the style to succeed, but it failed with '{}'",
                    err.test_name, err.error.message()
                );
                unreachable!();
            }
        }
    }

    pub(crate) fn expect_err(self) -> ParseErrTester {
        match self {
            StyleTesterResult::Ok(ok) => {
                assert!(false, "[{}] Expected reading the style to fail, but it succeeded", ok.test_name);
                unreachable!();
            },
            StyleTesterResult::Err(err) => err,
        }
    }
}

//------------------------------------------------------------------------------
// Interface for a style that was read successfully
//------------------------------------------------------------------------------

pub(crate) struct StyleTester {
    test_name: String,
    style: Style,
    entries: Vec<Entry>,
    preamble: String,
    config: Config,
}

impl StyleTester {
    pub(crate) fn for_style<F: Fn(&Style)>(self, f: F) -> Self {
        f(&self.style);
        self
    }

    fn session(&self, config: Config) -> Session {
        Session::load(&self.style, config)
    }

    fn prepare(&self, machine: Machine) -> Machine {
        machine
            .with_entries(self.entries.clone())
            .with_preamble(&self.preamble)
    }

    /// Runs the style with the interpreter, expecting it to finish
    pub(crate) fn interpret(&self) -> RunTester {
        let session = self.session(self.config.clone());
        let mut interpreter = Interpreter::with_machine(&session, self.prepare(session.new_machine()));
        match interpreter.run() {
            Ok(summary) => RunTester::new(&self.test_name, "interpreter", summary, interpreter.machine()),
            Err(error) => {
                println!("DEBUG: Full error:\n{}", &error);
                assert!(false, "[{}] Expected the interpreter to finish, but it failed with '{}'", self.test_name, error.error);
                unreachable!();
            }
        }
    }

    /// Runs the style with the interpreter, expecting a fatal error
    pub(crate) fn interpret_err(&self) -> EvalErrTester {
        let session = self.session(self.config.clone());
        let mut interpreter = Interpreter::with_machine(&session, self.prepare(session.new_machine()));
        match interpreter.run() {
            Ok(summary) => {
                assert!(
                    false, "[{}] Expected the interpreter to fail, but it finished with output '{}'",
                    self.test_name, summary.output
                );
                unreachable!();
            },
            Err(error) => EvalErrTester{ test_name: self.test_name.clone(), error },
        }
    }

    /// Calls a function with the interpreter and returns the stack it leaves
    pub(crate) fn interpreter_call(&self, name: &str, stack: Vec<Value>) -> Vec<Value> {
        let session = self.session(self.config.clone());
        let mut interpreter = Interpreter::new(&session);
        match interpreter.call(name, stack) {
            Ok(stack) => stack,
            Err(error) => {
                assert!(false, "[{}] Expected calling '{}' to succeed, but it failed with '{}'", self.test_name, name, error);
                unreachable!();
            }
        }
    }

    pub(crate) fn compile(&self) -> ProgramTester {
        self.compile_with(self.config.clone())
    }

    pub(crate) fn compile_with(&self, config: Config) -> ProgramTester {
        let session = self.session(config.clone());
        let result = Compiler::new(&session).compile();
        match result {
            Ok(program) => ProgramTester{
                test_name: self.test_name.clone(),
                program,
                entries: self.entries.clone(),
                preamble: self.preamble.clone(),
                config,
            },
            Err(error) => {
                assert!(false, "[{}] Expected compilation to succeed, but it failed with '{}'", self.test_name, error);
                unreachable!();
            }
        }
    }

    pub(crate) fn compile_err(&self) -> CompileErrTester {
        let session = self.session(self.config.clone());
        let result = Compiler::new(&session).compile();
        match result {
            Ok(_) => {
                assert!(false, "[{}] Expected compilation to fail, but it succeeded", self.test_name);
                unreachable!();
            },
            Err(error) => CompileErrTester{ test_name: self.test_name.clone(), error },
        }
    }

    /// Analyzes a single function in a fresh session
    pub(crate) fn for_function<F: Fn(FunctionTester)>(self, name: &str, f: F) -> Self {
        let session = self.session(self.config.clone());
        let result = Compiler::new(&session).analyze_function(name);
        match result {
            Ok(function) => f(FunctionTester{ test_name: &self.test_name, function: &function }),
            Err(error) => {
                assert!(false, "[{}] Expected analysis of '{}' to succeed, but it failed with '{}'", self.test_name, name, error);
            }
        }
        self
    }

    pub(crate) fn analyze_err(&self, name: &str) -> CompileErrTester {
        let session = self.session(self.config.clone());
        let result = Compiler::new(&session).analyze_function(name);
        match result {
            Ok(_) => {
                assert!(false, "[{}] Expected analysis of '{}' to fail, but it succeeded", self.test_name, name);
                unreachable!();
            },
            Err(error) => CompileErrTester{ test_name: self.test_name.clone(), error },
        }
    }

    /// Runs the style with the interpreter and as a compiled program, with
    /// and without optimizations, and checks that all runs produce the same
    /// output, tallies and diagnostics. Returns the interpreter's run.
    pub(crate) fn assert_modes_agree(&self) -> RunTester {
        let interpreted = self.interpret();
        for optimize in [true, false] {
            let compiled = self.compile_with(self.config.clone().with_optimize(optimize)).run();
            assert_eq!(
                interpreted.summary, compiled.summary,
                "[{}] Interpreter and {} disagree on the run", self.test_name, compiled.mode
            );
            assert_eq!(
                interpreted.messages(), compiled.messages(),
                "[{}] Interpreter and {} disagree on the diagnostics", self.test_name, compiled.mode
            );
        }
        interpreted
    }
}

//------------------------------------------------------------------------------
// Interface for compiled programs
//------------------------------------------------------------------------------

pub(crate) struct ProgramTester {
    test_name: String,
    program: Program,
    entries: Vec<Entry>,
    preamble: String,
    config: Config,
}

impl ProgramTester {
    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    fn machine(&self) -> Machine {
        self.program.new_machine(self.config.clone())
            .with_entries(self.entries.clone())
            .with_preamble(&self.preamble)
    }

    fn mode(&self) -> &'static str {
        if self.config.optimize { "optimized program" } else { "unoptimized program" }
    }

    pub(crate) fn run(&self) -> RunTester {
        let mut machine = self.machine();
        match self.program.run(&mut machine) {
            Ok(summary) => RunTester::new(&self.test_name, self.mode(), summary, &machine),
            Err(error) => {
                assert!(false, "[{}] Expected the {} to finish, but it failed with '{}'", self.test_name, self.mode(), error);
                unreachable!();
            }
        }
    }

    /// Runs the program expecting a fatal error, returns its message
    pub(crate) fn run_err(&self) -> String {
        let mut machine = self.machine();
        match self.program.run(&mut machine) {
            Ok(summary) => {
                assert!(
                    false, "[{}] Expected the {} to fail, but it finished with output '{}'",
                    self.test_name, self.mode(), summary.output
                );
                unreachable!();
            },
            Err(error) => error.to_string(),
        }
    }

    pub(crate) fn call(&self, name: &str, args: Vec<Value>) -> Option<Value> {
        let mut machine = self.program.new_machine(self.config.clone());
        match self.program.call(&mut machine, name, args) {
            Ok(result) => result,
            Err(error) => {
                assert!(false, "[{}] Expected calling '{}' to succeed, but it failed with '{}'", self.test_name, name, error);
                unreachable!();
            }
        }
    }

    pub(crate) fn for_function<F: Fn(FunctionTester)>(self, name: &str, f: F) -> Self {
        match self.program.function(name) {
            Some(function) => f(FunctionTester{ test_name: &self.test_name, function }),
            None => assert!(false, "[{}] Program has no function '{}'", self.test_name, name),
        }
        self
    }

    pub(crate) fn assert_emits(self, fragments: &[&str]) -> Self {
        let source = self.program.emit_rust();
        for fragment in fragments {
            assert!(
                source.contains(fragment),
                "[{}] Expected emitted source to contain '{}', got:\n{}", self.test_name, fragment, source
            );
        }
        self
    }
}

//------------------------------------------------------------------------------
// Interface for analyzed functions
//------------------------------------------------------------------------------

pub(crate) struct FunctionTester<'a> {
    test_name: &'a str,
    function: &'a IrFunction,
}

impl<'a> FunctionTester<'a> {
    pub(crate) fn assert_params(&self, expected: usize) -> &Self {
        assert_eq!(
            self.function.params, expected,
            "[{}] Expected '{}' to take {} parameters", self.test_name, self.function.name, expected
        );
        self
    }

    pub(crate) fn assert_returns(&self, expected: Option<ArgKind>) -> &Self {
        assert_eq!(
            self.function.returns, expected,
            "[{}] Unexpected result kind of '{}'", self.test_name, self.function.name
        );
        self
    }

    pub(crate) fn assert_touches_entry(&self, expected: bool) -> &Self {
        assert_eq!(
            self.function.touches_entry, expected,
            "[{}] Unexpected entry access of '{}'", self.test_name, self.function.name
        );
        self
    }

    pub(crate) fn assert_calls(&self, expected: &[&str]) -> &Self {
        let callees: Vec<String> = self.function.callees().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            callees, expected,
            "[{}] Unexpected callees of '{}'", self.test_name, self.function.name
        );
        self
    }

    pub(crate) fn assert_body_len(&self, expected: usize) -> &Self {
        assert_eq!(
            self.function.body.len(), expected,
            "[{}] Unexpected body of '{}': {:?}", self.test_name, self.function.name, self.function.body
        );
        self
    }
}

//------------------------------------------------------------------------------
// Interface for finished runs
//------------------------------------------------------------------------------

pub(crate) struct RunTester {
    test_name: String,
    mode: &'static str,
    summary: RunSummary,
    records: Vec<Diagnostic>,
}

impl RunTester {
    fn new(test_name: &str, mode: &'static str, summary: RunSummary, machine: &Machine) -> Self {
        Self{
            test_name: test_name.to_string(),
            mode,
            summary,
            records: machine.diagnostics().records().to_vec(),
        }
    }

    // Diagnostics without their locators
    fn messages(&self) -> Vec<(Severity, MessageId, Vec<String>)> {
        self.records.iter()
            .map(|d| (d.severity, d.id, d.args.clone()))
            .collect()
    }

    pub(crate) fn output(&self) -> &str {
        &self.summary.output
    }

    pub(crate) fn assert_output(&self, expected: &str) -> &Self {
        assert_eq!(
            self.summary.output, expected,
            "[{}] Unexpected output of the {}", self.test_name, self.mode
        );
        self
    }

    pub(crate) fn assert_output_has(&self, fragment: &str) -> &Self {
        assert!(
            self.summary.output.contains(fragment),
            "[{}] Expected output of the {} to contain '{}', got:\n{}",
            self.test_name, self.mode, fragment, self.summary.output
        );
        self
    }

    pub(crate) fn assert_errors(&self, expected: usize) -> &Self {
        assert_eq!(
            self.summary.errors, expected,
            "[{}] Unexpected error count of the {}: {:?}", self.test_name, self.mode, self.records
        );
        self
    }

    pub(crate) fn assert_warnings(&self, expected: usize) -> &Self {
        assert_eq!(
            self.summary.warnings, expected,
            "[{}] Unexpected warning count of the {}: {:?}", self.test_name, self.mode, self.records
        );
        self
    }

    pub(crate) fn assert_tally(&self, expected: &str) -> &Self {
        assert_eq!(
            self.summary.tally, expected,
            "[{}] Unexpected tally of the {}", self.test_name, self.mode
        );
        self
    }

    pub(crate) fn assert_any_diagnostic_has(&self, fragment: &str) -> &Self {
        let rendered: Vec<String> = self.records.iter().map(|d| d.to_string()).collect();
        assert!(
            rendered.iter().any(|d| d.contains(fragment)),
            "[{}] Expected a diagnostic of the {} containing '{}', got: {:?}",
            self.test_name, self.mode, fragment, rendered
        );
        self
    }

    /// Checks every diagnostic, in the order they were recorded
    pub(crate) fn assert_diagnostics_in_order(&self, fragments: &[&str]) -> &Self {
        let rendered: Vec<String> = self.records.iter().map(|d| d.to_string()).collect();
        let matching = rendered.len() == fragments.len() &&
            rendered.iter().zip(fragments.iter()).all(|(d, fragment)| d.contains(fragment));
        assert!(
            matching,
            "[{}] Expected diagnostics of the {} matching {:?}, got: {:?}",
            self.test_name, self.mode, fragments, rendered
        );
        self
    }

    pub(crate) fn assert_diagnostic_at(&self, idx: usize, line: u32, column: u32) -> &Self {
        let locator = self.records.get(idx).and_then(|d| d.locator.as_ref());
        match locator {
            Some(locator) => assert_eq!(
                (locator.line, locator.column), (line, column),
                "[{}] Unexpected position of diagnostic {}", self.test_name, idx
            ),
            None => assert!(false, "[{}] Diagnostic {} has no position: {:?}", self.test_name, idx, self.records),
        }
        self
    }
}

//------------------------------------------------------------------------------
// Interface for errors
//------------------------------------------------------------------------------

pub(crate) struct ParseErrTester {
    test_name: String,
    error: ParseError,
}

impl ParseErrTester {
    pub(crate) fn assert_position(&self, line: u32, column: u32) -> &Self {
        assert_eq!(
            self.error.position(), (line, column),
            "[{}] Unexpected position of '{}'", self.test_name, self.error.message()
        );
        self
    }

    pub(crate) fn assert_msg_has(&self, fragment: &str) -> &Self {
        assert!(
            self.error.message().contains(fragment),
            "[{}] Expected error message to contain '{}', got '{}'",
            self.test_name, fragment, self.error.message()
        );
        self
    }
}

pub(crate) struct EvalErrTester {
    test_name: String,
    error: EvalError,
}

impl EvalErrTester {
    pub(crate) fn assert_msg_has(&self, fragment: &str) -> &Self {
        let message = self.error.to_string();
        assert!(
            message.contains(fragment),
            "[{}] Expected error message to contain '{}', got '{}'", self.test_name, fragment, message
        );
        self
    }

    pub(crate) fn error<F: Fn(&RunError) -> bool>(&self, f: F) -> &Self {
        assert!(f(&self.error.error), "[{}] Unexpected runtime error: {:?}", self.test_name, self.error);
        self
    }

    /// Checks the active functions, outermost first
    pub(crate) fn assert_frames(&self, expected: &[&str]) -> &Self {
        let frames: Vec<&str> = self.error.frames.iter().map(|f| f.function.as_str()).collect();
        assert_eq!(frames, expected, "[{}] Unexpected stack trace", self.test_name);
        self
    }
}

pub(crate) struct CompileErrTester {
    test_name: String,
    error: CompileError,
}

impl CompileErrTester {
    pub(crate) fn assert_msg_has(&self, fragment: &str) -> &Self {
        let message = self.error.to_string();
        assert!(
            message.contains(fragment),
            "[{}] Expected error message to contain '{}', got '{}'", self.test_name, fragment, message
        );
        self
    }

    pub(crate) fn error<F: Fn(&CompileError) -> bool>(&self, f: F) -> &Self {
        assert!(f(&self.error), "[{}] Unexpected compile error: {:?}", self.test_name, self.error);
        self
    }

    pub(crate) fn assert_at(&self, line: u32, column: u32) -> &Self {
        let locator = self.error.locator().map(|l| (l.line, l.column));
        assert_eq!(locator, Some((line, column)), "[{}] Unexpected position of '{}'", self.test_name, self.error);
        self
    }
}

pub(crate) fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::String(Rc::from(*v))).collect()
}
