use std::ops::Range;
use std::rc::Rc;

use super::ir::{Expr, IrFunction, Stmt, Target};
use super::{CompileError, Compiler};
use crate::bst::builtins::ArgKind;
use crate::bst::session::Code;
use crate::bst::token::{LocalDecl, LocalKind, Locator, Token, TokenKind};
use crate::runtime::InvariantViolation;

/// How the processor treats quoted names and blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Resolves a quoted name and calls it, runs the tokens of a block. Used
    /// for the branches of `if$` and `while$`.
    Full,
    /// Pushes quoted names and blocks as compile-time values
    Partial,
}

/// A value on the symbolic stack
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Sym {
    Value(Expr, ArgKind),
    Quote(Rc<str>),
    Block(Rc<[Token]>),
}

impl Sym {
    pub(super) fn describe(&self) -> String {
        match self {
            Sym::Value(_, kind) => kind.to_string(),
            Sym::Quote(name) => format!("function '{}", name),
            Sym::Block(_) => String::from("block"),
        }
    }
}

/// Symbolic state of the function under analysis
#[derive(Debug, Default)]
pub(super) struct ProcessorState {
    pub(super) stack: Vec<Sym>,
    pub(super) stmts: Vec<Stmt>,
    pub(super) params: usize,
    pub(super) temps: usize,
    // Lowest stack height seen since it was last reset. Popping from an empty
    // stack sets it to zero.
    pub(super) low_water: usize,
    pub(super) touches_entry: bool,
}

#[derive(Debug, Clone)]
pub(super) struct Checkpoint {
    stack: Vec<Sym>,
    stmts: usize,
    temps: usize,
    low_water: usize,
}

/// Parameters in the order they sit on the stack, deepest first
pub(super) fn param_syms(range: Range<usize>) -> Vec<Sym> {
    range.rev().map(|p| Sym::Value(Expr::Param(p), ArgKind::Any)).collect()
}

pub(super) fn local_kind(kind: LocalKind) -> ArgKind {
    match kind {
        LocalKind::Integer => ArgKind::Integer,
        LocalKind::String => ArgKind::String,
    }
}

pub(super) struct Processor<'c, 's> {
    pub(super) compiler: &'c mut Compiler<'s>,
    pub(super) function: Rc<str>,
    pub(super) locals: Vec<LocalDecl>,
    pub(super) state: ProcessorState,
}

impl<'c, 's> Processor<'c, 's> {
    pub(super) fn new(compiler: &'c mut Compiler<'s>, function: Rc<str>, locals: Vec<LocalDecl>) -> Self {
        Self{ compiler, function, locals, state: ProcessorState::default() }
    }

    /// Analyzes a function body against an empty stack
    pub(super) fn analyze(mut self, tokens: &[Token], locator: &Locator) -> Result<IrFunction, CompileError> {
        for token in tokens {
            self.process(token, EvalMode::Partial)?;
        }

        let mut stack = std::mem::take(&mut self.state.stack);
        let (returns, result) = match stack.len() {
            0 => (None, None),
            1 => match stack.pop() {
                Some(Sym::Value(expr, kind)) => (Some(kind), Some(expr)),
                _ => return Err(self.unsupported("returned", locator)),
            },
            count => return Err(CompileError::ComplexFunction{
                function: self.function.to_string(),
                count,
                locator: locator.clone(),
            }),
        };

        Ok(IrFunction{
            name: self.function,
            returns,
            params: self.state.params,
            locals: self.locals,
            temps: self.state.temps,
            body: self.state.stmts,
            result,
            touches_entry: self.state.touches_entry,
        })
    }

    pub(super) fn process(&mut self, token: &Token, mode: EvalMode) -> Result<(), CompileError> {
        debug_log!("compile", "{} {:?}: {}", self.function, mode, token.describe());
        match &token.kind {
            TokenKind::IntegerLiteral(v) => self.push(Expr::integer(*v), ArgKind::Integer),
            TokenKind::StringLiteral(v) => self.push(Expr::string(v), ArgKind::String),
            TokenKind::QuoteLiteral(name) => match mode {
                EvalMode::Partial => self.state.stack.push(Sym::Quote(name.clone())),
                EvalMode::Full => self.call_name(name, &token.locator)?,
            },
            TokenKind::Block(tokens) => match mode {
                EvalMode::Partial => self.state.stack.push(Sym::Block(tokens.clone())),
                EvalMode::Full => {
                    for token in tokens.iter() {
                        self.process(token, EvalMode::Partial)?;
                    }
                },
            },
            TokenKind::TokenList(_) => {
                return Err(InvariantViolation::new(format!(
                    "{}: token list within the body of '{}'", token.locator, self.function
                )).into());
            },
            TokenKind::FieldRef(name) => {
                self.state.touches_entry = true;
                self.push(Expr::Field(name.clone()), ArgKind::String);
            },
            TokenKind::LocalInteger(name) | TokenKind::LocalString(name) => {
                let kind = match self.local(name) {
                    Some(decl) => local_kind(decl.kind),
                    None => return Err(InvariantViolation::new(format!(
                        "{}: local variable '{}' is not declared in '{}'", token.locator, name, self.function
                    )).into()),
                };
                self.push(Expr::Local(name.clone()), kind);
            },
            TokenKind::FunctionRef(name) => self.call_name(name, &token.locator)?,
        }
        Ok(())
    }

    pub(super) fn call_name(&mut self, name: &Rc<str>, locator: &Locator) -> Result<(), CompileError> {
        if let Some(decl) = self.local(name) {
            let kind = local_kind(decl.kind);
            self.push(Expr::Local(name.clone()), kind);
            return Ok(());
        }

        let session = self.compiler.session();
        match session.lookup(name) {
            None => return Err(CompileError::UnknownFunction{ name: name.to_string(), locator: locator.clone() }),
            Some(Code::Builtin(builtin)) => self.builtin(*builtin, locator)?,
            Some(Code::Function(function)) => self.call_user(function, locator)?,
            Some(Code::GlobalInteger) => self.push(Expr::Global(name.clone()), ArgKind::Integer),
            Some(Code::GlobalString) => self.push(Expr::Global(name.clone()), ArgKind::String),
            Some(Code::Field) => {
                self.state.touches_entry = true;
                self.push(Expr::Field(name.clone()), ArgKind::String);
            },
            Some(Code::EntryInteger) => {
                self.state.touches_entry = true;
                self.push(Expr::EntryVar(name.clone()), ArgKind::Integer);
            },
            Some(Code::EntryString) => {
                self.state.touches_entry = true;
                self.push(Expr::EntryVar(name.clone()), ArgKind::String);
            },
        }
        Ok(())
    }

    /// Runs the branch of `if$` or `while$`
    pub(super) fn run_branch(&mut self, branch: &Sym, builtin: &str, locator: &Locator) -> Result<(), CompileError> {
        let token = match branch {
            Sym::Quote(name) => Token::new(TokenKind::QuoteLiteral(name.clone()), locator.clone()),
            Sym::Block(tokens) => Token::new(TokenKind::Block(tokens.clone()), locator.clone()),
            Sym::Value(..) => return Err(self.not_constant(&format!("the branch of {}", builtin), locator)),
        };
        self.process(&token, EvalMode::Full)
    }

    pub(super) fn local(&self, name: &str) -> Option<&LocalDecl> {
        self.locals.iter().rev().find(|decl| decl.name.as_ref() == name)
    }

    // --- Stack

    pub(super) fn push(&mut self, expr: Expr, kind: ArgKind) {
        self.state.stack.push(Sym::Value(expr, kind));
    }

    pub(super) fn pop(&mut self) -> Sym {
        match self.state.stack.pop() {
            Some(sym) => {
                self.state.low_water = self.state.low_water.min(self.state.stack.len());
                sym
            },
            None => {
                self.state.low_water = 0;
                let param = self.state.params;
                self.state.params += 1;
                Sym::Value(Expr::Param(param), ArgKind::Any)
            },
        }
    }

    /// Pops a value of the given kind. Values whose kind is only known at
    /// runtime are checked when the function runs.
    pub(super) fn pop_value(&mut self, kind: ArgKind, builtin: &str, locator: &Locator) -> Result<Expr, CompileError> {
        match self.pop() {
            Sym::Value(expr, found) => match (kind, found) {
                (ArgKind::Any, _) => Ok(expr),
                (_, ArgKind::Any) => Ok(Expr::Coerce(kind, Box::new(expr), Rc::from(builtin))),
                (kind, found) if kind == found => Ok(expr),
                (kind, found) => Err(self.type_mismatch(builtin, kind.to_string(), found.to_string(), locator)),
            },
            other => Err(self.type_mismatch(builtin, kind.to_string(), other.describe(), locator)),
        }
    }

    pub(super) fn pop_branch(&mut self, builtin: &str, locator: &Locator) -> Result<Sym, CompileError> {
        match self.pop() {
            Sym::Value(..) => Err(self.not_constant(&format!("the branch of {}", builtin), locator)),
            branch => Ok(branch),
        }
    }

    pub(super) fn new_temp(&mut self) -> usize {
        self.state.temps += 1;
        self.state.temps - 1
    }

    /// Stores the stack values that satisfy `pred` in temporaries, so their
    /// value is fixed before a statement that could change it.
    pub(super) fn spill_where<F: Fn(&Expr) -> bool>(&mut self, pred: F) {
        for idx in 0..self.state.stack.len() {
            let (expr, kind) = match &self.state.stack[idx] {
                Sym::Value(expr, kind) if !expr.is_atomic() && pred(expr) => (expr.clone(), *kind),
                _ => continue,
            };
            let temp = self.new_temp();
            self.state.stmts.push(Stmt::assign(Target::Temp(temp), expr));
            self.state.stack[idx] = Sym::Value(Expr::Temp(temp), kind);
        }
    }

    /// Evaluates the stack values that could record a diagnostic. Called
    /// before every statement, so diagnostics keep the order in which the
    /// interpreter records them.
    pub(super) fn spill_effects(&mut self) {
        self.spill_where(|expr| !expr.is_quiet());
    }

    // --- Nested statement lists

    /// Runs `f` collecting the statements it produces separately
    pub(super) fn in_block<T, F>(&mut self, f: F) -> Result<(T, Vec<Stmt>), CompileError>
        where F: FnOnce(&mut Self) -> Result<T, CompileError>
    {
        let outer = std::mem::take(&mut self.state.stmts);
        let result = f(self);
        let stmts = std::mem::replace(&mut self.state.stmts, outer);
        Ok((result?, stmts))
    }

    /// Runs `f` against the given stack, returning the resulting stack and
    /// statements. The current stack is restored afterwards.
    pub(super) fn in_branch<F>(&mut self, stack: Vec<Sym>, f: F) -> Result<(Vec<Sym>, Vec<Stmt>), CompileError>
        where F: FnOnce(&mut Self) -> Result<(), CompileError>
    {
        let outer = std::mem::replace(&mut self.state.stack, stack);
        let result = self.in_block(f);
        let stack = std::mem::replace(&mut self.state.stack, outer);
        let ((), stmts) = result?;
        Ok((stack, stmts))
    }

    pub(super) fn checkpoint(&self) -> Checkpoint {
        Checkpoint{
            stack: self.state.stack.clone(),
            stmts: self.state.stmts.len(),
            temps: self.state.temps,
            low_water: self.state.low_water,
        }
    }

    /// Forgets everything since the checkpoint except created parameters
    pub(super) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.state.stack = checkpoint.stack;
        self.state.stmts.truncate(checkpoint.stmts);
        self.state.temps = checkpoint.temps;
        self.state.low_water = checkpoint.low_water;
    }

    // --- Errors

    pub(super) fn type_mismatch(&self, builtin: &str, expected: String, found: String, locator: &Locator) -> CompileError {
        CompileError::TypeMismatch{
            function: self.function.to_string(),
            builtin: builtin.to_string(),
            expected,
            found,
            locator: locator.clone(),
        }
    }

    pub(super) fn not_constant(&self, what: &str, locator: &Locator) -> CompileError {
        CompileError::NotConstant{ function: self.function.to_string(), what: what.to_string(), locator: locator.clone() }
    }

    pub(super) fn unsupported(&self, what: &str, locator: &Locator) -> CompileError {
        CompileError::UnsupportedValue{ function: self.function.to_string(), what: what.to_string(), locator: locator.clone() }
    }

    pub(super) fn unbalanced(&self, builtin: &str, locator: &Locator) -> CompileError {
        CompileError::UnbalancedBranches{ function: self.function.to_string(), builtin: builtin.to_string(), locator: locator.clone() }
    }
}
