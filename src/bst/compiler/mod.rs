/// compiler
///
/// Partial evaluator of loaded styles. Every function reachable from the run
/// commands is executed once against a symbolic stack and a symbolic entry:
/// values become deferred IR expressions, effects become IR statements. The
/// result of analyzing a function is memoized in its slot of the session's
/// function table.
///
/// Popping from an empty symbolic stack turns into a parameter of the
/// function, a function must leave at most one value. The branches of `if$`
/// and `while$` and the target of `:=` must be known at compile time. Unlike
/// the interpreter the compiler does not recover from errors: any problem
/// found during analysis aborts the compilation.
///
/// The analyzed functions form a `Program` that can be run directly or
/// emitted as Rust source.

mod builtins;
mod emit;
pub mod ir;
mod optimize;
mod processor;
mod program;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use derive_more::Display;

use crate::bst::session::{Code, RunCommand, Session, UserFunction};
use crate::bst::token::{LocalDecl, Locator, Token};
use crate::runtime::InvariantViolation;
use ir::IrFunction;
use processor::Processor;

pub use processor::EvalMode;
pub use program::{Program, ProgramCommand};

#[derive(Debug, Display)]
pub enum CompileError {
    #[display(fmt = "{}: unknown function '{}'", locator, name)]
    UnknownFunction { name: String, locator: Locator },
    #[display(fmt = "{}: function '{}' leaves {} values on the stack", locator, function, count)]
    ComplexFunction { function: String, count: usize, locator: Locator },
    #[display(fmt = "{}: '{}' takes {} values from the empty stack of a run command", locator, function, count)]
    StackUnderflow { function: String, count: usize, locator: Locator },
    #[display(fmt = "{}: {} in '{}' expects {}, found {}", locator, builtin, function, expected, found)]
    TypeMismatch { function: String, builtin: String, expected: String, found: String, locator: Locator },
    #[display(fmt = "{}: {} in '{}' leaves stacks of different shapes", locator, builtin, function)]
    UnbalancedBranches { function: String, builtin: String, locator: Locator },
    #[display(fmt = "{}: function '{}' is called recursively", locator, function)]
    RecursiveFunction { function: String, locator: Locator },
    #[display(fmt = "{}: {} in '{}' must be a quoted function or a block", locator, what, function)]
    NotConstant { function: String, what: String, locator: Locator },
    #[display(fmt = "{}: a quoted function or block cannot be {} in '{}'", locator, what, function)]
    UnsupportedValue { function: String, what: String, locator: Locator },
    #[display(fmt = "{}: '{}' is assigned to in '{}' but is not a variable", locator, name, function)]
    NotAVariable { name: String, function: String, locator: Locator },
    #[display(fmt = "internal invariant violated: {}", _0)]
    InternalInvariantViolation(InvariantViolation),
}

impl std::error::Error for CompileError {}

impl From<InvariantViolation> for CompileError {
    fn from(v: InvariantViolation) -> Self {
        CompileError::InternalInvariantViolation(v)
    }
}

impl CompileError {
    pub fn locator(&self) -> Option<&Locator> {
        use CompileError::*;
        match self {
            UnknownFunction{ locator, .. } | ComplexFunction{ locator, .. } |
            StackUnderflow{ locator, .. } | TypeMismatch{ locator, .. } |
            UnbalancedBranches{ locator, .. } | RecursiveFunction{ locator, .. } |
            NotConstant{ locator, .. } | UnsupportedValue{ locator, .. } |
            NotAVariable{ locator, .. } => Some(locator),
            InternalInvariantViolation(_) => None,
        }
    }
}

pub struct Compiler<'s> {
    session: &'s Session,
    // Functions whose analysis has started but not finished, outermost first
    in_progress: Vec<Rc<str>>,
    // Functions synthesized for run commands that do not name a user
    // function, e.g. `ITERATE {call.type$}`
    wrappers: HashMap<Rc<str>, Rc<IrFunction>>,
}

impl<'s> Compiler<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self{ session, in_progress: Vec::new(), wrappers: HashMap::new() }
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Analyzes a user function by name. The result is memoized, asking again
    /// returns the same analysis.
    pub fn analyze_function(&mut self, name: &str) -> Result<Rc<IrFunction>, CompileError> {
        let session = self.session;
        match session.user_function(name) {
            Some(function) => self.analyze(function, &function.locator),
            None => Err(CompileError::UnknownFunction{ name: name.to_string(), locator: Locator::builtin() }),
        }
    }

    pub(crate) fn analyze(&mut self, function: &Rc<UserFunction>, locator: &Locator) -> Result<Rc<IrFunction>, CompileError> {
        if let Some(analysis) = function.analysis() {
            return Ok(analysis.clone());
        }
        if self.in_progress.contains(&function.name) {
            return Err(CompileError::RecursiveFunction{
                function: function.name.to_string(),
                locator: locator.clone(),
            });
        }

        debug_log!("compile", "analyzing '{}'", function.name);
        self.in_progress.push(function.name.clone());
        let result = Processor::new(self, function.name.clone(), function.locals.clone())
            .analyze(&function.body_tokens(), &function.locator);
        self.in_progress.pop();

        let analysis = Rc::new(self.finish(result?));
        function.memoize(analysis.clone())?;
        Ok(analysis)
    }

    fn finish(&self, mut function: IrFunction) -> IrFunction {
        let config = self.session.config();
        if config.optimize {
            optimize::optimize(&mut function, &config.tie);
        }
        function
    }

    fn analyze_run_target(&mut self, name: &Rc<str>, locator: &Locator) -> Result<Rc<IrFunction>, CompileError> {
        let session = self.session;
        match session.lookup(name) {
            None => Err(CompileError::UnknownFunction{ name: name.to_string(), locator: locator.clone() }),
            Some(Code::Function(function)) => self.analyze(function, locator),
            Some(_) => {
                if let Some(wrapper) = self.wrappers.get(name) {
                    return Ok(wrapper.clone());
                }
                let body = [Token::function_ref(name, locator.clone())];
                let function = Processor::new(self, name.clone(), Vec::new()).analyze(&body, locator)?;
                let wrapper = Rc::new(self.finish(function));
                self.wrappers.insert(name.clone(), wrapper.clone());
                Ok(wrapper)
            },
        }
    }

    /// The functions `call.type$` may dispatch to: every function without
    /// parameters and result, in definition order. Functions that cannot be
    /// analyzed, or whose analysis is in progress, are left out.
    pub(crate) fn type_candidates(&mut self) -> Result<Vec<Rc<str>>, CompileError> {
        let session = self.session;
        let mut candidates = Vec::new();
        for function in session.functions() {
            if self.in_progress.contains(&function.name) {
                continue;
            }
            match self.analyze(function, &function.locator) {
                Ok(analysis) => {
                    if analysis.params == 0 && analysis.returns.is_none() {
                        candidates.push(function.name.clone());
                    }
                },
                Err(CompileError::InternalInvariantViolation(v)) => {
                    return Err(CompileError::InternalInvariantViolation(v));
                },
                Err(_) => {},
            }
        }
        Ok(candidates)
    }

    fn analysis_of(&self, name: &str) -> Result<Rc<IrFunction>, CompileError> {
        if let Some(analysis) = self.session.user_function(name).and_then(|f| f.analysis()) {
            return Ok(analysis.clone());
        }
        match self.wrappers.get(name) {
            Some(wrapper) => Ok(wrapper.clone()),
            None => Err(InvariantViolation::new(format!("function '{}' was called but never analyzed", name)).into()),
        }
    }

    // Adds the function after everything it calls
    fn collect(&self, function: &Rc<IrFunction>, seen: &mut HashSet<Rc<str>>, out: &mut Vec<IrFunction>) -> Result<(), CompileError> {
        if !seen.insert(function.name.clone()) {
            return Ok(());
        }
        for callee in function.callees() {
            let analysis = self.analysis_of(&callee)?;
            self.collect(&analysis, seen, out)?;
        }
        out.push(IrFunction::clone(function));
        Ok(())
    }

    /// Compiles the run commands of the style and every function they reach
    pub fn compile(&mut self) -> Result<Program, CompileError> {
        let session = self.session;
        let mut commands = Vec::new();
        let mut targets = Vec::new();
        for command in session.commands() {
            let (name, locator) = match command {
                RunCommand::Read => continue,
                RunCommand::Sort => {
                    commands.push(ProgramCommand::Sort);
                    continue;
                },
                RunCommand::Execute(name, locator) |
                RunCommand::Iterate(name, locator) |
                RunCommand::Reverse(name, locator) => (name, locator),
            };

            let target = self.analyze_run_target(name, locator)?;
            if target.params != 0 {
                return Err(CompileError::StackUnderflow{
                    function: name.to_string(),
                    count: target.params,
                    locator: locator.clone(),
                });
            }
            commands.push(match command {
                RunCommand::Execute(..) => ProgramCommand::Execute(target.name.clone()),
                RunCommand::Iterate(..) => ProgramCommand::Iterate(target.name.clone()),
                _ => ProgramCommand::Reverse(target.name.clone()),
            });
            targets.push(target);
        }

        let mut seen = HashSet::new();
        let mut functions = Vec::new();
        for target in targets.iter() {
            self.collect(target, &mut seen, &mut functions)?;
        }

        Ok(Program{
            filename: session.filename().clone(),
            globals: session.user_globals(),
            entry_vars: session.entry_vars().iter()
                .map(|(name, kind)| LocalDecl{ name: name.clone(), kind: *kind })
                .collect(),
            functions,
            commands,
        })
    }
}
