use std::rc::Rc;

use super::error::{EvalError, EvalFrame};
use crate::bst::builtins::{ArgKind, Builtin};
use crate::bst::session::{Code, RunCommand, Session, UserFunction};
use crate::bst::token::{LocalKind, Locator, Token, TokenKind};
use crate::runtime::diagnostics::MessageId;
use crate::runtime::{Entry, InvariantViolation, Machine, RunError, RunSummary, Value};

/// Text written and errors recorded while processing a single entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutput {
    pub text: String,
    pub errors: usize,
}

#[derive(Debug)]
struct Frame {
    function: Rc<str>,
    locator: Locator,
    locals: Vec<(Rc<str>, LocalKind, Value)>,
}

impl Frame {
    fn local(&self, name: &str) -> Option<&(Rc<str>, LocalKind, Value)> {
        self.locals.iter().rev().find(|(n, _, _)| n.as_ref() == name)
    }
}

fn default_value(kind: LocalKind) -> Value {
    match kind {
        LocalKind::Integer => Value::Integer(0),
        LocalKind::String => Value::empty_string(),
    }
}

type Stack = Vec<Value>;

// Pending work of the interpreter, executed by popping from the back. User
// functions do not recurse on the host stack: an activation pushes its body
// and a `Leave`, so the call depth is bounded by the configured limit alone.
#[derive(Debug)]
enum Instruction {
    // Executes `tokens[next..]` within the innermost activation
    Tokens{ tokens: Rc<[Token]>, next: usize },
    // Runs the branch of an `if$` or `while$`
    Branch{ branch: Value, builtin: &'static str, locator: Locator },
    // The condition of a `while$` has left its result on the stack
    WhileTest{ condition: Value, body: Value, locator: Locator, iterations: u64 },
    // Ends the innermost activation
    Leave,
}

pub struct Interpreter<'s> {
    session: &'s Session,
    machine: Machine,
    // One frame per active user function, the innermost last
    frames: Vec<Frame>,
    instructions: Vec<Instruction>,
}

impl<'s> Interpreter<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self::with_machine(session, session.new_machine())
    }

    /// Uses a machine that was prepared by the caller, e.g. with entries, a
    /// preamble or a logger. It should have been created by
    /// `Session::new_machine`.
    pub fn with_machine(session: &'s Session, machine: Machine) -> Self {
        Self{ session, machine, frames: Vec::new(), instructions: Vec::new() }
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    pub fn into_machine(self) -> Machine {
        self.machine
    }

    /// Executes all run commands of the style against the machine's entries
    pub fn run(&mut self) -> Result<RunSummary, EvalError> {
        let session = self.session;
        for command in session.commands() {
            match command {
                RunCommand::Read => {},
                RunCommand::Execute(name, locator) => {
                    self.machine.set_current(None);
                    self.call_top(name, locator)?;
                },
                RunCommand::Iterate(name, locator) => {
                    for idx in 0..self.machine.entries().len() {
                        self.machine.set_current(Some(idx));
                        self.call_top(name, locator)?;
                    }
                },
                RunCommand::Reverse(name, locator) => {
                    for idx in (0..self.machine.entries().len()).rev() {
                        self.machine.set_current(Some(idx));
                        self.call_top(name, locator)?;
                    }
                },
                RunCommand::Sort => self.machine.sort(),
            }
        }
        self.machine.set_current(None);

        Ok(self.machine.summary())
    }

    /// Runs the per-entry commands (`ITERATE` and `REVERSE`) against a single
    /// entry, which is appended to the machine's entries.
    pub fn execute_entry(&mut self, entry: Entry) -> Result<EntryOutput, EvalError> {
        let errors_before = self.machine.diagnostics().error_count();
        let output_before = self.machine.output().len();
        let idx = self.machine.push_entry(entry);

        let session = self.session;
        for command in session.commands() {
            match command {
                RunCommand::Iterate(name, locator) | RunCommand::Reverse(name, locator) => {
                    self.machine.set_current(Some(idx));
                    self.call_top(name, locator)?;
                },
                _ => {},
            }
        }
        self.machine.set_current(None);

        Ok(EntryOutput{
            text: self.machine.output()[output_before..].to_string(),
            errors: self.machine.diagnostics().error_count() - errors_before,
        })
    }

    /// Calls a function with the given operand stack and returns the stack
    /// it leaves behind.
    pub fn call(&mut self, name: &str, stack: Vec<Value>) -> Result<Vec<Value>, EvalError> {
        let mut stack = stack;
        let locator = Locator::builtin();
        self.run_to_end(name, &locator, &mut stack)?;
        Ok(stack)
    }

    fn call_top(&mut self, name: &str, locator: &Locator) -> Result<(), EvalError> {
        debug_assert!(self.frames.is_empty());
        debug_log!("exec", "run command calls '{}'", name);
        let mut stack = Stack::new();
        self.run_to_end(name, locator, &mut stack)?;
        if !stack.is_empty() {
            self.machine.set_locator(Some(locator.clone()));
            self.machine.report_leftover(stack.len(), name);
        }
        Ok(())
    }

    fn fail(&self, error: RunError, locator: &Locator) -> EvalError {
        let frames = self.frames.iter()
            .map(|frame| EvalFrame{ function: frame.function.to_string(), locator: frame.locator.clone() })
            .collect();
        EvalError{ error, locator: Some(locator.clone()), frames }
    }

    // Calls `name` and executes instructions until it has returned. After a
    // fatal error the pending activations are dropped.
    fn run_to_end(&mut self, name: &str, locator: &Locator, stack: &mut Stack) -> Result<(), EvalError> {
        debug_assert!(self.instructions.is_empty());
        let result = self.call_name(name, locator, stack)
            .and_then(|()| self.execute_instructions(stack));
        if result.is_err() {
            while let Some(instruction) = self.instructions.pop() {
                if let Instruction::Leave = instruction {
                    self.leave();
                }
            }
        }
        result
    }

    fn execute_instructions(&mut self, stack: &mut Stack) -> Result<(), EvalError> {
        while let Some(instruction) = self.instructions.pop() {
            match instruction {
                Instruction::Tokens{ tokens, next } => {
                    let token = match tokens.get(next) {
                        Some(token) => token,
                        None => continue,
                    };
                    if next + 1 < tokens.len() {
                        self.instructions.push(Instruction::Tokens{ tokens: tokens.clone(), next: next + 1 });
                    }
                    self.execute_token(token, stack)?;
                },
                Instruction::Branch{ branch, builtin, locator } => {
                    self.run_branch(branch, builtin, &locator, stack)?;
                },
                Instruction::WhileTest{ condition, body, locator, mut iterations } => {
                    self.machine.set_locator(Some(locator.clone()));
                    if !self.pop_kind(stack, ArgKind::Integer, "while$").is_true() {
                        continue;
                    }
                    self.machine.loop_guard(&mut iterations).map_err(|e| self.fail(e, &locator))?;
                    // The body runs first, then the condition again
                    self.instructions.push(Instruction::WhileTest{
                        condition: condition.clone(), body: body.clone(), locator: locator.clone(), iterations,
                    });
                    self.instructions.push(Instruction::Branch{ branch: condition, builtin: "while$", locator: locator.clone() });
                    self.instructions.push(Instruction::Branch{ branch: body, builtin: "while$", locator });
                },
                Instruction::Leave => self.leave(),
            }
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.frames.pop();
        self.machine.leave();
    }

    fn execute_token(&mut self, token: &Token, stack: &mut Stack) -> Result<(), EvalError> {
        match &token.kind {
            TokenKind::IntegerLiteral(v) => stack.push(Value::Integer(*v)),
            TokenKind::StringLiteral(v) => stack.push(Value::String(v.clone())),
            TokenKind::QuoteLiteral(v) => stack.push(Value::Function(v.clone())),
            TokenKind::Block(tokens) => stack.push(Value::Block(tokens.clone())),
            TokenKind::TokenList(tokens) => {
                self.instructions.push(Instruction::Tokens{ tokens: tokens.clone(), next: 0 });
            },
            TokenKind::FieldRef(name) => {
                self.machine.set_locator(Some(token.locator.clone()));
                let value = self.machine.field(name);
                stack.push(value);
            },
            TokenKind::LocalInteger(name) | TokenKind::LocalString(name) => {
                let value = match self.frames.last().and_then(|frame| frame.local(name)) {
                    Some((_, _, value)) => value.clone(),
                    None => {
                        let violation = InvariantViolation::new(
                            format!("local variable '{}' used outside of its function", name)
                        );
                        return Err(self.fail(violation.into(), &token.locator));
                    }
                };
                stack.push(value);
            },
            TokenKind::FunctionRef(name) => self.call_name(name, &token.locator, stack)?,
        }
        Ok(())
    }

    fn call_name(&mut self, name: &str, locator: &Locator, stack: &mut Stack) -> Result<(), EvalError> {
        let session = self.session;
        let code = match session.lookup(name) {
            Some(code) => code,
            None => return Err(self.fail(RunError::UnknownFunction{ name: name.to_string() }, locator)),
        };

        self.machine.set_locator(Some(locator.clone()));
        match code {
            Code::Builtin(builtin) => self.builtin(*builtin, locator, stack)?,
            Code::Function(function) => self.call_function(function, locator)?,
            Code::GlobalInteger | Code::GlobalString => stack.push(self.machine.global(name)),
            Code::Field => {
                let value = self.machine.field(name);
                stack.push(value);
            },
            Code::EntryInteger | Code::EntryString => {
                let value = self.machine.entry_var(name);
                stack.push(value);
            },
        }
        Ok(())
    }

    fn call_function(&mut self, function: &Rc<UserFunction>, locator: &Locator) -> Result<(), EvalError> {
        self.machine.enter(&function.name).map_err(|e| self.fail(e, locator))?;
        debug_log!("exec", "enter '{}' at depth {}", function.name, self.machine.depth());

        let locals = function.locals.iter()
            .map(|decl| (decl.name.clone(), decl.kind, default_value(decl.kind)))
            .collect();
        self.frames.push(Frame{ function: function.name.clone(), locator: locator.clone(), locals });
        self.instructions.push(Instruction::Leave);
        self.instructions.push(Instruction::Tokens{ tokens: function.body_tokens(), next: 0 });
        Ok(())
    }

    // --- Popping with recovery

    fn pop_any(&mut self, stack: &mut Stack, function: &str) -> Value {
        match stack.pop() {
            Some(value) => value,
            None => {
                self.machine.error(MessageId::StackUnderflow, vec![function.to_string()]);
                Value::empty_string()
            }
        }
    }

    fn pop_kind(&mut self, stack: &mut Stack, kind: ArgKind, function: &str) -> Value {
        match stack.pop() {
            Some(value) => self.machine.coerce(kind, value, function),
            None => {
                self.machine.error(MessageId::StackUnderflow, vec![function.to_string()]);
                kind.placeholder()
            },
        }
    }

    // --- Built-ins

    fn builtin(&mut self, builtin: Builtin, locator: &Locator, stack: &mut Stack) -> Result<(), EvalError> {
        match builtin {
            Builtin::Primitive(primitive) => {
                let params = primitive.params();
                let mut args = vec![Value::Integer(0); params.len()];
                for idx in (0..params.len()).rev() {
                    args[idx] = self.pop_kind(stack, params[idx], primitive.name());
                }
                let result = self.machine.prim(primitive, args);
                stack.push(result);
            },
            Builtin::Assign => self.assign(locator, stack)?,
            Builtin::CallType => {
                let session = self.session;
                if let Some(entry_type) = self.machine.dispatch_type() {
                    let function = session.user_function(&entry_type)
                        .or_else(|| session.user_function("default.type"));
                    if let Some(function) = function {
                        self.call_function(function, locator)?;
                    }
                }
            },
            Builtin::Cite => stack.push(self.machine.cite()),
            Builtin::Type => stack.push(self.machine.entry_type()),
            Builtin::Preamble => stack.push(self.machine.preamble()),
            Builtin::Quote => stack.push(Value::string("\"")),
            Builtin::Duplicate => {
                let value = self.pop_any(stack, "duplicate$");
                stack.push(value.clone());
                stack.push(value);
            },
            Builtin::Pop => {
                self.pop_any(stack, "pop$");
            },
            Builtin::Swap => {
                let top = self.pop_any(stack, "swap$");
                let below = self.pop_any(stack, "swap$");
                stack.push(top);
                stack.push(below);
            },
            Builtin::Skip | Builtin::Stack | Builtin::Top => {},
            Builtin::If => {
                let otherwise = self.pop_any(stack, "if$");
                let then = self.pop_any(stack, "if$");
                let condition = self.pop_kind(stack, ArgKind::Integer, "if$");
                let branch = if condition.is_true() { then } else { otherwise };
                self.run_branch(branch, "if$", locator, stack)?;
            },
            Builtin::While => {
                let body = self.pop_any(stack, "while$");
                let condition = self.pop_any(stack, "while$");
                self.instructions.push(Instruction::WhileTest{
                    condition: condition.clone(), body, locator: locator.clone(), iterations: 0,
                });
                self.instructions.push(Instruction::Branch{ branch: condition, builtin: "while$", locator: locator.clone() });
            },
            Builtin::Write => {
                let value = self.pop_kind(stack, ArgKind::String, "write$");
                self.machine.write(value);
            },
            Builtin::Newline => self.machine.newline(),
            Builtin::Warning => {
                let value = self.pop_kind(stack, ArgKind::String, "warning$");
                self.machine.warning(value);
            },
        }
        Ok(())
    }

    // Runs the branch of an `if$` or `while$`: a quoted function name or a
    // block, which runs within the current activation.
    fn run_branch(&mut self, branch: Value, function: &str, locator: &Locator, stack: &mut Stack) -> Result<(), EvalError> {
        match branch {
            Value::Block(tokens) => {
                self.instructions.push(Instruction::Tokens{ tokens, next: 0 });
                Ok(())
            },
            Value::Function(name) => {
                let local = self.frames.last().and_then(|frame| frame.local(&name)).map(|(_, _, v)| v.clone());
                match local {
                    Some(value) => {
                        stack.push(value);
                        Ok(())
                    },
                    None => self.call_name(&name, locator, stack),
                }
            },
            other => {
                self.machine.set_locator(Some(locator.clone()));
                self.machine.error(MessageId::TypeMismatch, vec![
                    function.to_string(), String::from("function"), other.to_string()
                ]);
                Ok(())
            },
        }
    }

    fn assign(&mut self, locator: &Locator, stack: &mut Stack) -> Result<(), EvalError> {
        let target = self.pop_any(stack, ":=");
        let value = self.pop_any(stack, ":=");
        let name = match target {
            Value::Function(name) => name,
            other => {
                self.machine.error(MessageId::TypeMismatch, vec![
                    String::from(":="), String::from("function"), other.to_string()
                ]);
                return Ok(());
            }
        };

        // Locals of the current activation shadow everything else
        if let Some(frame) = self.frames.last_mut() {
            if let Some(slot) = frame.locals.iter_mut().rev().find(|(n, _, _)| *n == name) {
                let kind = match slot.1 {
                    LocalKind::Integer => ArgKind::Integer,
                    LocalKind::String => ArgKind::String,
                };
                if let Some(value) = self.machine.accept(kind, value, ":=") {
                    slot.2 = value.into_stored();
                }
                return Ok(());
            }
        }

        let session = self.session;
        let (kind, is_global) = match session.lookup(&name) {
            None => return Err(self.fail(RunError::UnknownFunction{ name: name.to_string() }, locator)),
            Some(Code::GlobalInteger) => (ArgKind::Integer, true),
            Some(Code::GlobalString) => (ArgKind::String, true),
            Some(Code::EntryInteger) => (ArgKind::Integer, false),
            Some(Code::EntryString) => (ArgKind::String, false),
            Some(_) => {
                self.machine.error(MessageId::NotAVariable, vec![name.to_string()]);
                return Ok(());
            }
        };
        let value = match self.machine.accept(kind, value, ":=") {
            Some(value) => value,
            None => return Ok(()),
        };
        if is_global {
            self.machine.set_global(&name, value);
        } else {
            self.machine.set_entry_var(&name, value);
        }
        Ok(())
    }
}
