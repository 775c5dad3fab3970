use super::ir::{Constant, Expr, IrFunction, Stmt, Target};

/// Simplifies an analyzed function without changing what it writes, assigns
/// or reports.
pub(super) fn optimize(function: &mut IrFunction, tie: &str) {
    function.body = fold_block(std::mem::take(&mut function.body), tie);
    function.result = function.result.take().map(|result| result.fold(tie));

    loop {
        let formed = form_conditionals(&mut function.body);
        let inlined = inline_single_use(function);
        let removed = remove_dead_temps(function);
        if !formed && !inlined && !removed {
            break;
        }
    }

    function.body = fold_block(std::mem::take(&mut function.body), tie);
    function.result = function.result.take().map(|result| result.fold(tie));
}

fn fold_block(stmts: Vec<Stmt>, tie: &str) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt {
            Stmt::Assign{ target, value, check } => {
                let value = value.fold(tie);
                let check = match (check, &value) {
                    (Some(kind), Expr::Const(c)) if kind.accepts(&c.to_value()) => None,
                    (check, _) => check,
                };
                out.push(Stmt::Assign{ target, value, check });
            },
            Stmt::Eval(expr) => {
                let expr = expr.fold(tie);
                if !expr.is_quiet() {
                    out.push(Stmt::Eval(expr));
                }
            },
            Stmt::Call{ function, args, result } => {
                let args = args.into_iter().map(|arg| arg.fold(tie)).collect();
                out.push(Stmt::Call{ function, args, result });
            },
            Stmt::Write(expr) => out.push(Stmt::Write(expr.fold(tie))),
            Stmt::Warning(expr) => out.push(Stmt::Warning(expr.fold(tie))),
            Stmt::If{ cond, then, otherwise } => match cond.fold(tie) {
                Expr::Const(Constant::Integer(v)) => {
                    let taken = if v != 0 { then } else { otherwise };
                    out.extend(fold_block(taken, tie));
                },
                cond => {
                    let then = fold_block(then, tie);
                    let otherwise = fold_block(otherwise, tie);
                    if then.is_empty() && otherwise.is_empty() {
                        if !cond.is_quiet() {
                            out.push(Stmt::Eval(cond));
                        }
                    } else {
                        out.push(Stmt::If{ cond, then, otherwise });
                    }
                },
            },
            Stmt::Loop{ head, test, body } => {
                let head = fold_block(head, tie);
                match test.fold(tie) {
                    // Never enters the body
                    Expr::Const(Constant::Integer(0)) => out.extend(head),
                    test => out.push(Stmt::Loop{ head, test, body: fold_block(body, tie) }),
                }
            },
            stmt @ Stmt::CallType{ .. } | stmt @ Stmt::Newline => out.push(stmt),
        }
    }
    out
}

// Turns an `if$` whose branches only assign the same target into a
// conditional expression
fn form_conditionals(stmts: &mut Vec<Stmt>) -> bool {
    let mut changed = false;
    for stmt in stmts.iter_mut() {
        let replacement = match stmt {
            Stmt::If{ cond, then, otherwise } => {
                changed |= form_conditionals(then);
                changed |= form_conditionals(otherwise);
                match (then.as_slice(), otherwise.as_slice()) {
                    (
                        [Stmt::Assign{ target: a, value: va, check: None }],
                        [Stmt::Assign{ target: b, value: vb, check: None }],
                    ) if a == b => Some(Stmt::assign(
                        a.clone(),
                        Expr::Cond(Box::new(cond.clone()), Box::new(va.clone()), Box::new(vb.clone())),
                    )),
                    _ => None,
                }
            },
            Stmt::Loop{ head, body, .. } => {
                changed |= form_conditionals(head);
                changed |= form_conditionals(body);
                None
            },
            _ => None,
        };
        if let Some(replacement) = replacement {
            *stmt = replacement;
            changed = true;
        }
    }
    changed
}

fn single_use_temp(stmt: &Stmt, single: &dyn Fn(usize) -> bool) -> Option<usize> {
    match stmt {
        Stmt::Assign{ target: Target::Temp(t), check: None, .. } if single(*t) => Some(*t),
        _ => None,
    }
}

// Moves the value of a temporary that is written and read once into the
// statement right after its assignment, when that statement evaluates it
// before anything that could record a diagnostic.
fn inline_single_use(function: &mut IrFunction) -> bool {
    let reads: Vec<usize> = (0..function.temps).map(|t| function.temp_reads(t)).collect();
    let writes: Vec<usize> = (0..function.temps).map(|t| function.temp_writes(t)).collect();
    let single = |t: usize| reads[t] == 1 && writes[t] == 1;

    let mut changed = inline_block(&mut function.body, &single);

    let last = function.body.last().and_then(|stmt| single_use_temp(stmt, &single));
    if let (Some(temp), Some(result)) = (last, function.result.as_mut()) {
        if result.temp_reads(temp, true) == 1 && result.reads_temp_first(temp) {
            if let Some(Stmt::Assign{ value, .. }) = function.body.pop() {
                result.substitute(temp, &value);
                changed = true;
            }
        }
    }
    changed
}

fn inline_block(stmts: &mut Vec<Stmt>, single: &dyn Fn(usize) -> bool) -> bool {
    let mut changed = false;
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::If{ then, otherwise, .. } => {
                changed |= inline_block(then, single);
                changed |= inline_block(otherwise, single);
            },
            Stmt::Loop{ head, body, .. } => {
                changed |= inline_block(head, single);
                changed |= inline_block(body, single);
            },
            _ => {},
        }
    }

    let mut idx = 0;
    while idx + 1 < stmts.len() {
        if let Some(temp) = single_use_temp(&stmts[idx], single) {
            let strict: usize = stmts[idx + 1].leading_exprs_mut().iter()
                .map(|expr| expr.temp_reads(temp, true))
                .sum();
            if strict == 1 && stmts[idx + 1].reads_temp_first(temp) {
                if let Stmt::Assign{ value, .. } = stmts.remove(idx) {
                    for expr in stmts[idx].leading_exprs_mut() {
                        expr.substitute(temp, &value);
                    }
                }
                changed = true;
                continue;
            }
        }
        idx += 1;
    }
    changed
}

// Drops assignments to temporaries nobody reads, keeping the evaluation of
// values that may report a diagnostic
fn remove_dead_temps(function: &mut IrFunction) -> bool {
    let reads: Vec<usize> = (0..function.temps).map(|t| function.temp_reads(t)).collect();
    remove_dead_in(&mut function.body, &reads)
}

fn remove_dead_in(stmts: &mut Vec<Stmt>, reads: &[usize]) -> bool {
    let mut changed = false;
    let mut out = Vec::with_capacity(stmts.len());
    for mut stmt in stmts.drain(..) {
        match &mut stmt {
            Stmt::Assign{ target: Target::Temp(t), value, .. } if reads[*t] == 0 => {
                changed = true;
                if !value.is_quiet() {
                    out.push(Stmt::Eval(value.clone()));
                }
                continue;
            },
            Stmt::Call{ result, .. } => {
                if let Some(t) = *result {
                    if reads[t] == 0 {
                        *result = None;
                        changed = true;
                    }
                }
            },
            Stmt::If{ cond, then, otherwise } => {
                changed |= remove_dead_in(then, reads);
                changed |= remove_dead_in(otherwise, reads);
                if then.is_empty() && otherwise.is_empty() {
                    changed = true;
                    if !cond.is_quiet() {
                        out.push(Stmt::Eval(cond.clone()));
                    }
                    continue;
                }
            },
            Stmt::Loop{ head, body, .. } => {
                changed |= remove_dead_in(head, reads);
                changed |= remove_dead_in(body, reads);
            },
            _ => {},
        }
        out.push(stmt);
    }
    *stmts = out;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bst::builtins::{ArgKind, Primitive};
    use std::rc::Rc;

    fn function(temps: usize, body: Vec<Stmt>, result: Option<Expr>) -> IrFunction {
        IrFunction{
            temps,
            returns: result.as_ref().map(|_| ArgKind::String),
            body,
            result,
            ..IrFunction::empty(Rc::from("f"))
        }
    }

    #[test]
    fn test_chains_of_temporaries_are_inlined() {
        let title = Expr::Field(Rc::from("title"));
        let mut f = function(2, vec![
            Stmt::assign(Target::Temp(0), title.clone()),
            Stmt::assign(Target::Temp(1), Expr::Prim(Primitive::AddPeriod, vec![Expr::Temp(0)])),
            Stmt::Write(Expr::Temp(1)),
        ], None);
        optimize(&mut f, "~");

        let expected = Expr::Prim(Primitive::AddPeriod, vec![title]);
        assert_eq!(f.body, vec![Stmt::Write(expected)]);
    }

    #[test]
    fn test_branches_assigning_one_temporary_become_a_conditional() {
        let cond = Expr::Prim(Primitive::Empty, vec![Expr::Field(Rc::from("title"))]);
        let mut f = function(1, vec![
            Stmt::If{
                cond: cond.clone(),
                then: vec![Stmt::assign(Target::Temp(0), Expr::string("none"))],
                otherwise: vec![Stmt::assign(Target::Temp(0), Expr::Field(Rc::from("title")))],
            },
        ], Some(Expr::Temp(0)));
        optimize(&mut f, "~");

        assert!(f.body.is_empty());
        assert_eq!(f.result, Some(Expr::Cond(
            Box::new(cond), Box::new(Expr::string("none")), Box::new(Expr::Field(Rc::from("title")))
        )));
    }

    #[test]
    fn test_unread_values_are_still_evaluated() {
        let mut f = function(2, vec![
            Stmt::assign(Target::Temp(0), Expr::Cite),
            Stmt::assign(Target::Temp(1), Expr::Global(Rc::from("x"))),
            Stmt::Call{ function: Rc::from("g"), args: Vec::new(), result: Some(1) },
        ], None);
        optimize(&mut f, "~");

        assert_eq!(f.body, vec![
            Stmt::Eval(Expr::Cite),
            Stmt::Call{ function: Rc::from("g"), args: Vec::new(), result: None },
        ]);
    }

    #[test]
    fn test_constant_conditions_are_resolved() {
        let mut f = function(0, vec![
            Stmt::If{
                cond: Expr::Prim(Primitive::Greater, vec![Expr::integer(2), Expr::integer(1)]),
                then: vec![Stmt::Write(Expr::string("a"))],
                otherwise: vec![Stmt::Write(Expr::string("b"))],
            },
            Stmt::Loop{
                head: vec![Stmt::Newline],
                test: Expr::integer(0),
                body: vec![Stmt::Write(Expr::string("c"))],
            },
        ], None);
        optimize(&mut f, "~");

        assert_eq!(f.body, vec![Stmt::Write(Expr::string("a")), Stmt::Newline]);
    }
}
