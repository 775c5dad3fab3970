use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::emit;
use super::ir::{Expr, IrFunction, Stmt, Target};
use crate::bst::token::{LocalDecl, LocalKind};
use crate::runtime::{Config, InvariantViolation, Machine, RunError, RunSummary, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramCommand {
    Execute(Rc<str>),
    Iterate(Rc<str>),
    Reverse(Rc<str>),
    Sort,
}

/// A compiled style: the analyzed functions, every callee before its
/// callers, and the run commands naming them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub filename: Rc<str>,
    // Declared by the style, without the predeclared globals
    pub globals: Vec<LocalDecl>,
    pub entry_vars: Vec<LocalDecl>,
    pub functions: Vec<IrFunction>,
    pub commands: Vec<ProgramCommand>,
}

fn default_value(kind: LocalKind) -> Value {
    match kind {
        LocalKind::Integer => Value::Integer(0),
        LocalKind::String => Value::empty_string(),
    }
}

impl Program {
    // Returns the bincode configuration programs are stored with
    fn bincode_opts() -> impl bincode::config::Options {
        bincode::config::DefaultOptions::default()
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        use bincode::config::Options;
        Self::bincode_opts().serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Program, bincode::Error> {
        use bincode::config::Options;
        Self::bincode_opts().deserialize(bytes)
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name.as_ref() == name)
    }

    /// Declares the variables of the program in the machine
    pub fn declare(&self, machine: &mut Machine) {
        for decl in self.globals.iter() {
            machine.declare_global(&decl.name, default_value(decl.kind));
        }
        for decl in self.entry_vars.iter() {
            machine.declare_entry_var(&decl.name, decl.kind);
        }
    }

    pub fn new_machine(&self, config: Config) -> Machine {
        let mut machine = Machine::new(config);
        self.declare(&mut machine);
        machine
    }

    /// Runs the commands of the program against the machine's entries
    pub fn run(&self, machine: &mut Machine) -> Result<RunSummary, RunError> {
        let runner = Runner::new(self);
        for command in self.commands.iter() {
            match command {
                ProgramCommand::Execute(name) => machine.execute(|m| runner.run_target(m, name))?,
                ProgramCommand::Iterate(name) => machine.iterate(|m| runner.run_target(m, name))?,
                ProgramCommand::Reverse(name) => machine.reverse(|m| runner.run_target(m, name))?,
                ProgramCommand::Sort => machine.sort(),
            }
        }
        Ok(machine.summary())
    }

    /// Calls a single function. `args[n]` is passed as parameter `n`, i.e.
    /// the top of the stack comes first.
    pub fn call(&self, machine: &mut Machine, name: &str, args: Vec<Value>) -> Result<Option<Value>, RunError> {
        let runner = Runner::new(self);
        let function = runner.function(name)?;
        if args.len() != function.params {
            return Err(InvariantViolation::new(format!(
                "function '{}' takes {} parameters, {} given", name, function.params, args.len()
            )).into());
        }
        runner.call(machine, function, args)
    }

    /// Renders the program as the source of a Rust module
    pub fn emit_rust(&self) -> String {
        emit::emit(self)
    }
}

struct Frame {
    params: Vec<Value>,
    temps: Vec<Value>,
    locals: Vec<(Rc<str>, Value)>,
}

impl Frame {
    fn local_mut(&mut self, name: &str) -> Result<&mut Value, InvariantViolation> {
        self.locals.iter_mut().rev()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v)
            .ok_or_else(|| InvariantViolation::new(format!("local variable '{}' is not declared", name)))
    }

    fn temp_mut(&mut self, temp: usize) -> Result<&mut Value, InvariantViolation> {
        self.temps.get_mut(temp)
            .ok_or_else(|| InvariantViolation::new(format!("temporary {} is out of range", temp)))
    }
}

/// Executes IR functions directly against a machine
struct Runner<'p> {
    functions: HashMap<&'p str, &'p IrFunction>,
}

impl<'p> Runner<'p> {
    fn new(program: &'p Program) -> Self {
        let functions = program.functions.iter().map(|f| (f.name.as_ref(), f)).collect();
        Self{ functions }
    }

    fn function(&self, name: &str) -> Result<&'p IrFunction, RunError> {
        self.functions.get(name).copied()
            .ok_or_else(|| RunError::UnknownFunction{ name: name.to_string() })
    }

    fn run_target(&self, m: &mut Machine, name: &str) -> Result<(), RunError> {
        let function = self.function(name)?;
        if self.call(m, function, Vec::new())?.is_some() {
            m.report_leftover(1, name);
        }
        Ok(())
    }

    fn call(&self, m: &mut Machine, function: &'p IrFunction, args: Vec<Value>) -> Result<Option<Value>, RunError> {
        m.call(&function.name, move |m| {
            let mut frame = Frame{
                params: args,
                temps: vec![Value::Integer(0); function.temps],
                locals: function.locals.iter().map(|d| (d.name.clone(), default_value(d.kind))).collect(),
            };
            self.block(m, &mut frame, &function.body)?;
            match &function.result {
                Some(result) => Ok(Some(self.eval(m, &mut frame, result)?)),
                None => Ok(None),
            }
        })
    }

    fn eval(&self, m: &mut Machine, frame: &mut Frame, expr: &Expr) -> Result<Value, RunError> {
        let value = match expr {
            Expr::Const(c) => c.to_value(),
            Expr::Field(name) => m.field(name),
            Expr::Global(name) => m.global(name),
            Expr::EntryVar(name) => m.entry_var(name),
            Expr::Local(name) => frame.local_mut(name)?.clone(),
            Expr::Param(n) => match frame.params.get(*n) {
                Some(value) => value.clone(),
                None => return Err(InvariantViolation::new(format!("parameter {} was not passed", n)).into()),
            },
            Expr::Temp(t) => frame.temp_mut(*t)?.clone(),
            Expr::Cite => m.cite(),
            Expr::Type => m.entry_type(),
            Expr::Preamble => m.preamble(),
            Expr::Prim(primitive, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(m, frame, arg)?);
                }
                m.prim(*primitive, values)
            },
            Expr::Coerce(kind, inner, function) => {
                let value = self.eval(m, frame, inner)?;
                m.coerce(*kind, value, function)
            },
            Expr::Cond(cond, then, otherwise) => {
                if self.eval(m, frame, cond)?.is_true() {
                    self.eval(m, frame, then)?
                } else {
                    self.eval(m, frame, otherwise)?
                }
            },
        };
        Ok(value)
    }

    fn store(&self, m: &mut Machine, frame: &mut Frame, target: &Target, value: Value) -> Result<(), RunError> {
        match target {
            Target::Temp(t) => *frame.temp_mut(*t)? = value,
            Target::Local(name) => *frame.local_mut(name)? = value.into_stored(),
            Target::Global(name) => m.set_global(name, value),
            Target::EntryVar(name) => m.set_entry_var(name, value),
        }
        Ok(())
    }

    fn block(&self, m: &mut Machine, frame: &mut Frame, stmts: &'p [Stmt]) -> Result<(), RunError> {
        for stmt in stmts {
            match stmt {
                Stmt::Assign{ target, value, check } => {
                    let value = self.eval(m, frame, value)?;
                    let value = match check {
                        Some(kind) => match m.accept(*kind, value, ":=") {
                            Some(value) => value,
                            None => continue,
                        },
                        None => value,
                    };
                    self.store(m, frame, target, value)?;
                },
                Stmt::Eval(expr) => {
                    self.eval(m, frame, expr)?;
                },
                Stmt::Call{ function, args, result } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.eval(m, frame, arg)?);
                    }
                    let callee = self.function(function)?;
                    let returned = self.call(m, callee, values)?;
                    if let Some(t) = result {
                        let value = returned.ok_or_else(|| InvariantViolation::new(
                            format!("function '{}' returned no value", function)
                        ))?;
                        *frame.temp_mut(*t)? = value;
                    }
                },
                Stmt::CallType{ candidates, default } => {
                    if let Some(entry_type) = m.dispatch_type() {
                        let target = candidates.iter()
                            .find(|name| **name == entry_type)
                            .or_else(|| default.as_ref());
                        if let Some(name) = target {
                            let callee = self.function(name)?;
                            self.call(m, callee, Vec::new())?;
                        }
                    }
                },
                Stmt::Write(expr) => {
                    let value = self.eval(m, frame, expr)?;
                    m.write(value);
                },
                Stmt::Newline => m.newline(),
                Stmt::Warning(expr) => {
                    let value = self.eval(m, frame, expr)?;
                    m.warning(value);
                },
                Stmt::If{ cond, then, otherwise } => {
                    if self.eval(m, frame, cond)?.is_true() {
                        self.block(m, frame, then)?;
                    } else {
                        self.block(m, frame, otherwise)?;
                    }
                },
                Stmt::Loop{ head, test, body } => {
                    let mut iterations = 0;
                    loop {
                        self.block(m, frame, head)?;
                        if !self.eval(m, frame, test)?.is_true() {
                            break;
                        }
                        m.loop_guard(&mut iterations)?;
                        self.block(m, frame, body)?;
                    }
                },
            }
        }
        Ok(())
    }
}
