use std::rc::Rc;

use super::ir::{Constant, Expr, Stmt, Target};
use super::processor::{local_kind, param_syms, Processor, Sym};
use super::CompileError;
use crate::bst::builtins::{ArgKind, Builtin, Primitive};
use crate::bst::session::{Code, UserFunction};
use crate::bst::token::Locator;
use crate::runtime::InvariantViolation;

type Branch = (Vec<Sym>, Vec<Stmt>);

impl<'c, 's> Processor<'c, 's> {
    pub(super) fn builtin(&mut self, builtin: Builtin, locator: &Locator) -> Result<(), CompileError> {
        match builtin {
            Builtin::Primitive(primitive) => self.primitive(primitive, locator)?,
            Builtin::Assign => self.assign(locator)?,
            Builtin::CallType => self.call_type()?,
            Builtin::Cite => {
                self.state.touches_entry = true;
                self.push(Expr::Cite, ArgKind::String);
            },
            Builtin::Type => {
                self.state.touches_entry = true;
                self.push(Expr::Type, ArgKind::String);
            },
            Builtin::Preamble => self.push(Expr::Preamble, ArgKind::String),
            Builtin::Quote => self.push(Expr::string("\""), ArgKind::String),
            Builtin::Skip | Builtin::Stack | Builtin::Top => {},
            Builtin::Duplicate => {
                self.spill_effects();
                let top = match self.pop() {
                    Sym::Value(expr, kind) if !expr.is_atomic() => {
                        let temp = self.new_temp();
                        self.state.stmts.push(Stmt::assign(Target::Temp(temp), expr));
                        Sym::Value(Expr::Temp(temp), kind)
                    },
                    sym => sym,
                };
                self.state.stack.push(top.clone());
                self.state.stack.push(top);
            },
            Builtin::Swap => {
                let top = self.pop();
                // The older value must still be evaluated first
                if let Sym::Value(expr, _) = &top {
                    if !expr.is_quiet() {
                        self.spill_effects();
                    }
                }
                let below = self.pop();
                self.state.stack.push(top);
                self.state.stack.push(below);
            },
            Builtin::Pop => {
                if let Sym::Value(expr, _) = self.pop() {
                    if !expr.is_quiet() {
                        self.spill_effects();
                        self.state.stmts.push(Stmt::Eval(expr));
                    }
                }
            },
            Builtin::Write => {
                let value = self.pop_value(ArgKind::String, "write$", locator)?;
                self.spill_effects();
                self.state.stmts.push(Stmt::Write(value));
            },
            Builtin::Newline => {
                self.spill_effects();
                self.state.stmts.push(Stmt::Newline);
            },
            Builtin::Warning => {
                let value = self.pop_value(ArgKind::String, "warning$", locator)?;
                self.spill_effects();
                self.state.stmts.push(Stmt::Warning(value));
            },
            Builtin::If => self.if_then_else(locator)?,
            Builtin::While => self.while_loop(locator)?,
        }
        Ok(())
    }

    fn primitive(&mut self, primitive: Primitive, locator: &Locator) -> Result<(), CompileError> {
        let params = primitive.params();
        let mut args = vec![Expr::integer(0); params.len()];
        for idx in (0..params.len()).rev() {
            args[idx] = self.pop_value(params[idx], primitive.name(), locator)?;
        }
        self.push(Expr::Prim(primitive, args), primitive.result());
        Ok(())
    }

    // --- Variables

    fn resolve_target(&mut self, name: &Rc<str>, locator: &Locator) -> Result<(Target, ArgKind), CompileError> {
        if let Some(decl) = self.local(name) {
            let kind = local_kind(decl.kind);
            return Ok((Target::Local(name.clone()), kind));
        }

        let session = self.compiler.session();
        match session.lookup(name) {
            None => Err(CompileError::UnknownFunction{ name: name.to_string(), locator: locator.clone() }),
            Some(Code::GlobalInteger) => Ok((Target::Global(name.clone()), ArgKind::Integer)),
            Some(Code::GlobalString) => Ok((Target::Global(name.clone()), ArgKind::String)),
            Some(Code::EntryInteger) => {
                self.state.touches_entry = true;
                Ok((Target::EntryVar(name.clone()), ArgKind::Integer))
            },
            Some(Code::EntryString) => {
                self.state.touches_entry = true;
                Ok((Target::EntryVar(name.clone()), ArgKind::String))
            },
            Some(_) => Err(CompileError::NotAVariable{
                name: name.to_string(),
                function: self.function.to_string(),
                locator: locator.clone(),
            }),
        }
    }

    fn assign(&mut self, locator: &Locator) -> Result<(), CompileError> {
        let name = match self.pop() {
            Sym::Quote(name) => name,
            other => return Err(self.type_mismatch(":=", String::from("function"), other.describe(), locator)),
        };
        let (value, kind) = match self.pop() {
            Sym::Value(expr, kind) => (expr, kind),
            _ => return Err(self.unsupported("assigned", locator)),
        };

        let (target, expected) = self.resolve_target(&name, locator)?;
        let check = match kind {
            ArgKind::Any => Some(expected),
            kind if kind == expected => None,
            kind => return Err(self.type_mismatch(":=", expected.to_string(), kind.to_string(), locator)),
        };

        // Values still on the stack keep the value they had when pushed
        self.spill_effects();
        self.spill_where(|expr| expr.reads_target(&target));
        self.state.stmts.push(Stmt::Assign{ target, value, check });
        Ok(())
    }

    // --- Calls

    pub(super) fn call_user(&mut self, function: &Rc<UserFunction>, locator: &Locator) -> Result<(), CompileError> {
        let callee = self.compiler.analyze(function, locator)?;

        // Functions like `FUNCTION {mid.sentence} { #2 }` are replaced by
        // their value
        if let (0, true, Some(Expr::Const(c))) = (callee.params, callee.body.is_empty(), &callee.result) {
            self.push(Expr::Const(c.clone()), c.kind());
            return Ok(());
        }

        // Arguments are passed top first, they are evaluated in the order
        // they were pushed
        self.spill_effects();
        let mut args = Vec::with_capacity(callee.params);
        for _ in 0..callee.params {
            match self.pop() {
                Sym::Value(expr, _) => args.push(expr),
                _ => return Err(self.unsupported("passed to a function", locator)),
            }
        }

        self.spill_where(Expr::reads_shared_variables);
        self.state.touches_entry |= callee.touches_entry;
        let result = callee.returns.map(|_| self.new_temp());
        self.state.stmts.push(Stmt::Call{ function: callee.name.clone(), args, result });
        if let (Some(temp), Some(kind)) = (result, callee.returns) {
            self.push(Expr::Temp(temp), kind);
        }
        Ok(())
    }

    fn call_type(&mut self) -> Result<(), CompileError> {
        let candidates = self.compiler.type_candidates()?;
        let default = candidates.iter().find(|name| name.as_ref() == "default.type").cloned();

        self.spill_effects();
        self.spill_where(Expr::reads_shared_variables);
        self.state.touches_entry = true;
        self.state.stmts.push(Stmt::CallType{ candidates, default });
        Ok(())
    }

    // --- Control flow

    fn if_then_else(&mut self, locator: &Locator) -> Result<(), CompileError> {
        let otherwise = self.pop_branch("if$", locator)?;
        let then = self.pop_branch("if$", locator)?;
        let cond = self.pop_value(ArgKind::Integer, "if$", locator)?;

        let session = self.compiler.session();
        if let Expr::Const(Constant::Integer(v)) = cond.clone().fold(&session.config().tie) {
            let branch = if v != 0 { then } else { otherwise };
            return self.run_branch(&branch, "if$", locator);
        }

        self.spill_effects();
        let base = std::mem::take(&mut self.state.stack);
        let first = self.state.params;
        let (then_stack, then_stmts) = self.in_branch(base.clone(), |p| p.run_branch(&then, "if$", locator))?;

        // Parameters created by one branch are below the stack of the other
        let second = self.state.params;
        let mut else_base = param_syms(first..second);
        else_base.extend(base);
        let (else_stack, else_stmts) = self.in_branch(else_base, |p| p.run_branch(&otherwise, "if$", locator))?;
        let mut then_full = param_syms(second..self.state.params);
        then_full.extend(then_stack);

        let (stack, then, otherwise) = self.merge((then_full, then_stmts), (else_stack, else_stmts), "if$", locator)?;
        self.state.stack = stack;
        self.state.stmts.push(Stmt::If{ cond, then, otherwise });
        Ok(())
    }

    // Joins the stacks left by two branches. Positions that differ are
    // assigned to a temporary at the end of each branch.
    fn merge(&mut self, a: Branch, b: Branch, builtin: &str, locator: &Locator) -> Result<(Vec<Sym>, Vec<Stmt>, Vec<Stmt>), CompileError> {
        let (a_stack, mut a_stmts) = a;
        let (b_stack, mut b_stmts) = b;
        if a_stack.len() != b_stack.len() {
            return Err(self.unbalanced(builtin, locator));
        }

        let mut merged = Vec::with_capacity(a_stack.len());
        for (x, y) in a_stack.into_iter().zip(b_stack) {
            if x == y {
                merged.push(x);
                continue;
            }
            match (x, y) {
                (Sym::Value(ex, kx), Sym::Value(ey, ky)) => {
                    let temp = self.new_temp();
                    a_stmts.push(Stmt::assign(Target::Temp(temp), ex));
                    b_stmts.push(Stmt::assign(Target::Temp(temp), ey));
                    let kind = if kx == ky { kx } else { ArgKind::Any };
                    merged.push(Sym::Value(Expr::Temp(temp), kind));
                },
                _ => return Err(self.unsupported("left by only one branch", locator)),
            }
        }
        Ok((merged, a_stmts, b_stmts))
    }

    // Runs the condition and the body once. Returns the loop test, the
    // statements of the condition, the stack the loop exits with and the
    // statements of the body.
    fn loop_pass(&mut self, cond: &Sym, body: &Sym, locator: &Locator) -> Result<(Expr, Vec<Stmt>, Vec<Sym>, Vec<Stmt>), CompileError> {
        let (test, head) = self.in_block(|p| {
            p.run_branch(cond, "while$", locator)?;
            p.pop_value(ArgKind::Integer, "while$", locator)
        })?;
        let exit = self.state.stack.clone();
        let ((), body) = self.in_block(|p| p.run_branch(body, "while$", locator))?;
        Ok((test, head, exit, body))
    }

    fn while_loop(&mut self, locator: &Locator) -> Result<(), CompileError> {
        let body = self.pop_branch("while$", locator)?;
        let cond = self.pop_branch("while$", locator)?;
        self.spill_where(|_| true);
        let outer_low = self.state.low_water;

        // A trial pass finds how deep the loop reaches into the stack and
        // the kinds of the values it leaves there
        let checkpoint = self.checkpoint();
        let first = self.state.params;
        self.state.low_water = self.state.stack.len();
        let trial = self.loop_pass(&cond, &body, locator).map(|_| self.state.stack.clone());
        let created = first..self.state.params;
        let low = if created.is_empty() { self.state.low_water } else { 0 };
        self.rollback(checkpoint);
        let trial_end = trial?;

        let mut start = param_syms(created);
        start.extend(std::mem::take(&mut self.state.stack));
        if trial_end.len() != start.len() {
            return Err(self.unbalanced("while$", locator));
        }
        let kinds: Vec<ArgKind> = start.iter().zip(trial_end.iter())
            .map(|pair| match pair {
                (Sym::Value(_, a), Sym::Value(_, b)) if a == b => *a,
                _ => ArgKind::Any,
            })
            .collect();

        self.state.stack = start;
        let checkpoint = self.checkpoint();
        if !self.emit_loop(&cond, &body, low, &kinds, locator)? {
            self.rollback(checkpoint);
            let kinds = vec![ArgKind::Any; kinds.len()];
            if !self.emit_loop(&cond, &body, low, &kinds, locator)? {
                return Err(InvariantViolation::new(format!(
                    "{}: loop in '{}' has conflicting kinds without kind constraints", locator, self.function
                )).into());
            }
        }

        self.state.low_water = outer_low.min(low);
        Ok(())
    }

    // Emits the loop with the stack positions from `low` upwards carried in
    // temporaries of the given kinds. Returns false if the body leaves a
    // value of another kind in a carried position.
    fn emit_loop(&mut self, cond: &Sym, body: &Sym, low: usize, kinds: &[ArgKind], locator: &Locator) -> Result<bool, CompileError> {
        let params = self.state.params;
        let mut carried = Vec::new();
        for pos in low..self.state.stack.len() {
            let expr = match &self.state.stack[pos] {
                Sym::Value(expr, _) => expr.clone(),
                _ => continue,
            };
            let temp = self.new_temp();
            self.state.stmts.push(Stmt::assign(Target::Temp(temp), expr));
            self.state.stack[pos] = Sym::Value(Expr::Temp(temp), kinds[pos]);
            carried.push((pos, temp));
        }
        let start = self.state.stack.clone();

        let (test, head, exit, mut stmts) = self.loop_pass(cond, body, locator)?;
        let end = std::mem::take(&mut self.state.stack);
        if end.len() != start.len() || self.state.params != params {
            return Err(self.unbalanced("while$", locator));
        }

        let mut updates = Vec::new();
        for (pos, (before, after)) in start.iter().zip(end).enumerate() {
            if *before == after {
                continue;
            }
            let temp = match carried.iter().find(|(p, _)| *p == pos) {
                Some((_, temp)) => *temp,
                None => return Err(self.unbalanced("while$", locator)),
            };
            match after {
                Sym::Value(expr, kind) => {
                    if kinds[pos] != ArgKind::Any && kind != kinds[pos] {
                        return Ok(false);
                    }
                    updates.push((temp, expr));
                },
                _ => return Err(self.unsupported("carried around a loop", locator)),
            }
        }

        // Every update reads the values of the previous iteration
        if updates.len() == 1 {
            for (temp, expr) in updates {
                stmts.push(Stmt::assign(Target::Temp(temp), expr));
            }
        } else {
            let mut staged = Vec::with_capacity(updates.len());
            for (temp, expr) in updates {
                let stage = self.new_temp();
                stmts.push(Stmt::assign(Target::Temp(stage), expr));
                staged.push((temp, stage));
            }
            for (temp, stage) in staged {
                stmts.push(Stmt::assign(Target::Temp(temp), Expr::Temp(stage)));
            }
        }

        self.state.stmts.push(Stmt::Loop{ head, test, body: stmts });
        self.state.stack = exit;
        Ok(true)
    }
}
