use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bst::builtins::{ArgKind, Primitive};
use crate::bst::token::LocalDecl;
use crate::runtime::Value;

/// A value known at compile time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constant {
    Integer(i64),
    String(Rc<str>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Integer(v) => Value::Integer(*v),
            Constant::String(v) => Value::String(v.clone()),
        }
    }

    /// Only integers and strings are constants, a missing field is not
    pub fn from_value(value: &Value) -> Option<Constant> {
        match value {
            Value::Integer(v) => Some(Constant::Integer(*v)),
            Value::String(v) => Some(Constant::String(v.clone())),
            _ => None,
        }
    }

    pub fn kind(&self) -> ArgKind {
        match self {
            Constant::Integer(_) => ArgKind::Integer,
            Constant::String(_) => ArgKind::String,
        }
    }
}

/// A deferred computation. Evaluating an expression has no effect other than
/// possibly recording diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(Constant),
    // A field of the current entry
    Field(Rc<str>),
    Global(Rc<str>),
    EntryVar(Rc<str>),
    // A local variable of the function
    Local(Rc<str>),
    // Parameter `n` is the `n`-th value from the top of the caller's stack
    Param(usize),
    Temp(usize),
    Cite,
    Type,
    Preamble,
    Prim(Primitive, Vec<Expr>),
    // Kind check of a value whose kind is only known at runtime. Carries the
    // name of the built-in for the diagnostic.
    Coerce(ArgKind, Box<Expr>, Rc<str>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn integer(v: i64) -> Expr {
        Expr::Const(Constant::Integer(v))
    }

    pub fn string(v: &str) -> Expr {
        Expr::Const(Constant::String(Rc::from(v)))
    }

    /// Atomic expressions are evaluated without cost and keep their value
    /// while they sit on the symbolic stack.
    pub fn is_atomic(&self) -> bool {
        matches!(self, Expr::Const(_) | Expr::Param(_) | Expr::Temp(_))
    }

    /// Whether evaluating the expression can never record a diagnostic
    pub fn is_quiet(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Param(_) | Expr::Temp(_) |
            Expr::Local(_) | Expr::Global(_) | Expr::Preamble => true,
            Expr::Field(_) | Expr::EntryVar(_) | Expr::Cite | Expr::Type |
            Expr::Prim(..) | Expr::Coerce(..) => false,
            Expr::Cond(c, a, b) => c.is_quiet() && a.is_quiet() && b.is_quiet(),
        }
    }

    /// Whether the expression or any of its subexpressions satisfies `f`
    pub fn any(&self, f: &dyn Fn(&Expr) -> bool) -> bool {
        if f(self) {
            return true;
        }
        match self {
            Expr::Prim(_, args) => args.iter().any(|arg| arg.any(f)),
            Expr::Coerce(_, inner, _) => inner.any(f),
            Expr::Cond(c, a, b) => c.any(f) || a.any(f) || b.any(f),
            _ => false,
        }
    }

    /// Whether the value depends on a variable that statements may assign
    pub fn reads_variables(&self) -> bool {
        self.any(&|e| matches!(e, Expr::Global(_) | Expr::EntryVar(_) | Expr::Local(_)))
    }

    /// Whether the value depends on a variable a called function may assign
    pub fn reads_shared_variables(&self) -> bool {
        self.any(&|e| matches!(e, Expr::Global(_) | Expr::EntryVar(_)))
    }

    pub fn reads_target(&self, target: &Target) -> bool {
        self.any(&|e| match (e, target) {
            (Expr::Global(a), Target::Global(b)) |
            (Expr::EntryVar(a), Target::EntryVar(b)) |
            (Expr::Local(a), Target::Local(b)) => a == b,
            (Expr::Temp(a), Target::Temp(b)) => a == b,
            _ => false,
        })
    }

    /// Number of reads of the temporary. With `strict` only the reads that
    /// are evaluated whenever the expression is, i.e. not within the
    /// branches of a conditional, are counted.
    pub fn temp_reads(&self, temp: usize, strict: bool) -> usize {
        match self {
            Expr::Temp(t) => (*t == temp) as usize,
            Expr::Prim(_, args) => args.iter().map(|arg| arg.temp_reads(temp, strict)).sum(),
            Expr::Coerce(_, inner, _) => inner.temp_reads(temp, strict),
            Expr::Cond(c, a, b) => {
                let mut reads = c.temp_reads(temp, strict);
                if !strict {
                    reads += a.temp_reads(temp, strict) + b.temp_reads(temp, strict);
                }
                reads
            },
            _ => 0,
        }
    }

    /// Whether the temporary is read before anything that could record a
    /// diagnostic is evaluated
    pub fn reads_temp_first(&self, temp: usize) -> bool {
        self.first_read(temp) == Some(true)
    }

    // Walks the expression in evaluation order. `Some(false)` when a value
    // that could record a diagnostic comes first, `None` when there is
    // neither.
    fn first_read(&self, temp: usize) -> Option<bool> {
        match self {
            Expr::Temp(t) if *t == temp => Some(true),
            Expr::Prim(_, args) => args.iter()
                .find_map(|arg| arg.first_read(temp))
                .or(Some(false)),
            Expr::Coerce(_, inner, _) => inner.first_read(temp).or(Some(false)),
            Expr::Cond(c, _, _) => c.first_read(temp).or(Some(false)),
            Expr::Field(_) | Expr::EntryVar(_) | Expr::Cite | Expr::Type => Some(false),
            _ => None,
        }
    }

    /// Replaces reads of the temporary by `replacement`
    pub fn substitute(&mut self, temp: usize, replacement: &Expr) {
        match self {
            Expr::Temp(t) if *t == temp => *self = replacement.clone(),
            Expr::Prim(_, args) => args.iter_mut().for_each(|arg| arg.substitute(temp, replacement)),
            Expr::Coerce(_, inner, _) => inner.substitute(temp, replacement),
            Expr::Cond(c, a, b) => {
                c.substitute(temp, replacement);
                a.substitute(temp, replacement);
                b.substitute(temp, replacement);
            },
            _ => {},
        }
    }

    /// Folds constant subexpressions. Primitives are only folded when they
    /// would not record a diagnostic.
    pub fn fold(self, tie: &str) -> Expr {
        match self {
            Expr::Prim(primitive, args) => {
                let args: Vec<Expr> = args.into_iter().map(|arg| arg.fold(tie)).collect();
                let constants: Option<Vec<Value>> = args.iter()
                    .map(|arg| match arg {
                        Expr::Const(c) => Some(c.to_value()),
                        _ => None,
                    })
                    .collect();
                let folded = constants
                    .and_then(|values| primitive.try_fold(&values, tie))
                    .and_then(|value| Constant::from_value(&value));
                match folded {
                    Some(constant) => Expr::Const(constant),
                    None => Expr::Prim(primitive, args),
                }
            },
            Expr::Coerce(kind, inner, function) => match inner.fold(tie) {
                Expr::Const(c) if kind.accepts(&c.to_value()) => Expr::Const(c),
                inner => Expr::Coerce(kind, Box::new(inner), function),
            },
            Expr::Cond(c, a, b) => match c.fold(tie) {
                Expr::Const(Constant::Integer(v)) => if v != 0 { a.fold(tie) } else { b.fold(tie) },
                c => Expr::Cond(Box::new(c), Box::new(a.fold(tie)), Box::new(b.fold(tie))),
            },
            expr => expr,
        }
    }
}

/// Something a value can be assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Temp(usize),
    Global(Rc<str>),
    EntryVar(Rc<str>),
    Local(Rc<str>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    // With `check` set the value's kind is verified at runtime, a mismatch is
    // recorded and skips the assignment.
    Assign{ target: Target, value: Expr, check: Option<ArgKind> },
    Eval(Expr),
    // `args[n]` is passed as parameter `n`
    Call{ function: Rc<str>, args: Vec<Expr>, result: Option<usize> },
    // Calls the candidate named by the type of the current entry, else the
    // default
    CallType{ candidates: Vec<Rc<str>>, default: Option<Rc<str>> },
    Write(Expr),
    Newline,
    Warning(Expr),
    If{ cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    // Runs `head`, leaves the loop unless `test` holds and runs `body`
    Loop{ head: Vec<Stmt>, test: Expr, body: Vec<Stmt> },
}

impl Stmt {
    pub fn assign(target: Target, value: Expr) -> Stmt {
        Stmt::Assign{ target, value, check: None }
    }

    /// Calls `f` for every expression within the statement, including the
    /// ones in nested statements.
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::Assign{ value, .. } => f(value),
            Stmt::Eval(e) | Stmt::Write(e) | Stmt::Warning(e) => f(e),
            Stmt::Call{ args, .. } => args.iter().for_each(|arg| f(arg)),
            Stmt::CallType{ .. } | Stmt::Newline => {},
            Stmt::If{ cond, then, otherwise } => {
                f(cond);
                then.iter().chain(otherwise.iter()).for_each(|stmt| stmt.for_each_expr(f));
            },
            Stmt::Loop{ head, test, body } => {
                head.iter().for_each(|stmt| stmt.for_each_expr(f));
                f(test);
                body.iter().for_each(|stmt| stmt.for_each_expr(f));
            },
        }
    }

    /// The expressions that are evaluated first when the statement runs,
    /// before any of its effects take place.
    pub fn leading_exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::Assign{ value, .. } => vec![value],
            Stmt::Eval(e) | Stmt::Write(e) | Stmt::Warning(e) => vec![e],
            Stmt::Call{ args, .. } => args.iter_mut().collect(),
            Stmt::If{ cond, .. } => vec![cond],
            Stmt::CallType{ .. } | Stmt::Newline | Stmt::Loop{ .. } => Vec::new(),
        }
    }

    /// Whether the statement reads the temporary before it evaluates anything
    /// that could record a diagnostic
    pub fn reads_temp_first(&mut self, temp: usize) -> bool {
        self.leading_exprs_mut().iter()
            .find_map(|expr| expr.first_read(temp))
            .unwrap_or(false)
    }

    /// Calls `f` for every assignment target within the statement
    pub fn for_each_target(&self, f: &mut dyn FnMut(&Target)) {
        match self {
            Stmt::Assign{ target, .. } => f(target),
            Stmt::Call{ result: Some(t), .. } => f(&Target::Temp(*t)),
            Stmt::If{ then, otherwise, .. } => {
                then.iter().chain(otherwise.iter()).for_each(|stmt| stmt.for_each_target(f));
            },
            Stmt::Loop{ head, body, .. } => {
                head.iter().chain(body.iter()).for_each(|stmt| stmt.for_each_target(f));
            },
            _ => {},
        }
    }
}

/// A fully analyzed function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: Rc<str>,
    // `None` for functions that leave nothing on the stack
    pub returns: Option<ArgKind>,
    pub params: usize,
    pub locals: Vec<LocalDecl>,
    pub temps: usize,
    pub body: Vec<Stmt>,
    // Evaluated after the body, present exactly when `returns` is
    pub result: Option<Expr>,
    pub touches_entry: bool,
}

impl IrFunction {
    pub fn empty(name: Rc<str>) -> Self {
        Self{
            name,
            returns: None,
            params: 0,
            locals: Vec::new(),
            temps: 0,
            body: Vec::new(),
            result: None,
            touches_entry: false,
        }
    }

    /// Names of the functions called by this function, in order of their
    /// first appearance.
    pub fn callees(&self) -> Vec<Rc<str>> {
        fn collect(stmts: &[Stmt], out: &mut Vec<Rc<str>>) {
            let add = |name: &Rc<str>, out: &mut Vec<Rc<str>>| {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            };
            for stmt in stmts {
                match stmt {
                    Stmt::Call{ function, .. } => add(function, out),
                    Stmt::CallType{ candidates, default } => {
                        candidates.iter().chain(default.iter()).for_each(|name| add(name, out));
                    },
                    Stmt::If{ then, otherwise, .. } => {
                        collect(then, out);
                        collect(otherwise, out);
                    },
                    Stmt::Loop{ head, body, .. } => {
                        collect(head, out);
                        collect(body, out);
                    },
                    _ => {},
                }
            }
        }

        let mut callees = Vec::new();
        collect(&self.body, &mut callees);
        callees
    }

    /// Total number of reads of a temporary in the function
    pub fn temp_reads(&self, temp: usize) -> usize {
        let mut reads = 0;
        for stmt in self.body.iter() {
            stmt.for_each_expr(&mut |e| reads += e.temp_reads(temp, false));
        }
        if let Some(result) = &self.result {
            reads += result.temp_reads(temp, false);
        }
        reads
    }

    /// Total number of assignments to a temporary in the function
    pub fn temp_writes(&self, temp: usize) -> usize {
        let mut writes = 0;
        for stmt in self.body.iter() {
            stmt.for_each_target(&mut |t| if *t == Target::Temp(temp) { writes += 1 });
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_skips_primitives_with_problems() {
        let folded = Expr::Prim(Primitive::Plus, vec![Expr::integer(2), Expr::integer(3)]).fold("~");
        assert_eq!(folded, Expr::integer(5));

        let negative = Expr::Prim(Primitive::IntToChr, vec![Expr::integer(-1)]);
        assert_eq!(negative.clone().fold("~"), negative);

        let cond = Expr::Cond(Box::new(Expr::integer(0)), Box::new(Expr::Cite), Box::new(Expr::string("x")));
        assert_eq!(cond.fold("~"), Expr::string("x"));
    }

    #[test]
    fn test_strict_reads_skip_conditional_branches() {
        let expr = Expr::Cond(Box::new(Expr::Temp(0)), Box::new(Expr::Temp(1)), Box::new(Expr::Temp(1)));
        assert_eq!(expr.temp_reads(0, true), 1);
        assert_eq!(expr.temp_reads(1, true), 0);
        assert_eq!(expr.temp_reads(1, false), 2);
    }
}
