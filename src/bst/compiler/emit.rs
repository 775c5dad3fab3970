/// emit
///
/// Renders a `Program` as a Rust module against the `bst_rs` runtime. The
/// module has a `declare` function for the variables, one function per IR
/// function and a `run` function for the commands. Every call into the
/// machine is bound to its own `let`, so evaluation order is the one of the
/// IR runner. Output only depends on the program, emitting twice gives the
/// same text.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use super::ir::{Constant, Expr, IrFunction, Stmt, Target};
use super::program::{Program, ProgramCommand};
use crate::bst::token::LocalKind;

const INDENT: usize = 4;

struct CodeWriter {
    buffer: String,
    indent: usize,
}

impl CodeWriter {
    fn new() -> Self {
        Self{ buffer: String::with_capacity(4096), indent: 0 }
    }

    fn line<S: AsRef<str>>(&mut self, text: S) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent * INDENT {
                self.buffer.push(' ');
            }
            self.buffer.push_str(text);
        }
        self.buffer.push('\n');
    }

    fn open<S: AsRef<str>>(&mut self, text: S) {
        self.line(text);
        self.indent += 1;
    }

    fn close<S: AsRef<str>>(&mut self, text: S) {
        self.indent -= 1;
        self.line(text);
    }

    // A line like `} else {` between two indented blocks
    fn middle<S: AsRef<str>>(&mut self, text: S) {
        self.indent -= 1;
        self.line(text);
        self.indent += 1;
    }
}

/// Assigns unique Rust identifiers to BST names
#[derive(Default)]
struct Mangler {
    names: HashMap<String, String>,
    used: HashSet<String>,
}

impl Mangler {
    fn get(&mut self, prefix: &str, name: &str) -> String {
        if let Some(mangled) = self.names.get(name) {
            return mangled.clone();
        }
        let base: String = name.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let base = format!("{}{}", prefix, base);
        let mut mangled = base.clone();
        let mut suffix = 2;
        while self.used.contains(&mangled) {
            mangled = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.used.insert(mangled.clone());
        self.names.insert(name.to_string(), mangled.clone());
        mangled
    }
}

fn constant(c: &Constant) -> String {
    match c {
        Constant::Integer(i64::MIN) => String::from("Value::Integer(i64::MIN)"),
        Constant::Integer(v) => format!("Value::Integer({})", v),
        Constant::String(v) if v.is_empty() => String::from("Value::empty_string()"),
        Constant::String(v) => format!("Value::string({:?})", v),
    }
}

fn default_value(kind: LocalKind) -> &'static str {
    match kind {
        LocalKind::Integer => "Value::Integer(0)",
        LocalKind::String => "Value::empty_string()",
    }
}

fn used_temps(function: &IrFunction) -> Vec<usize> {
    (0..function.temps)
        .filter(|t| function.temp_reads(*t) > 0 || function.temp_writes(*t) > 0)
        .collect()
}

pub(super) fn emit(program: &Program) -> String {
    let mut functions = Mangler::default();
    for function in program.functions.iter() {
        functions.get("f_", &function.name);
    }

    let mut w = CodeWriter::new();
    w.line(format!("// Generated from {}. Do not edit.", program.filename));
    w.line("#![allow(unused_mut, unused_variables, unused_assignments, unused_imports, dead_code)]");
    w.line("");
    w.line("use bst_rs::bst::token::LocalKind;");
    w.line("use bst_rs::runtime::{ArgKind, Machine, Primitive, RunError, Value};");
    w.line("");

    w.open("pub fn declare(m: &mut Machine) {");
    for decl in program.globals.iter() {
        w.line(format!("m.declare_global({:?}, {});", decl.name, default_value(decl.kind)));
    }
    for decl in program.entry_vars.iter() {
        w.line(format!("m.declare_entry_var({:?}, LocalKind::{:?});", decl.name, decl.kind));
    }
    w.close("}");

    for function in program.functions.iter() {
        w.line("");
        FunctionEmitter::new(&mut w, &mut functions, function).emit();
    }

    w.line("");
    w.open("pub fn run(m: &mut Machine) -> Result<(), RunError> {");
    for command in program.commands.iter() {
        let (method, name) = match command {
            ProgramCommand::Execute(name) => ("execute", name),
            ProgramCommand::Iterate(name) => ("iterate", name),
            ProgramCommand::Reverse(name) => ("reverse", name),
            ProgramCommand::Sort => {
                w.line("m.sort();");
                continue;
            },
        };
        let returns = program.function(name).map_or(false, |f| f.returns.is_some());
        let mangled = functions.get("f_", name);
        if returns {
            w.open(format!("m.{}(|m| -> Result<(), RunError> {{", method));
            w.line(format!("{}(m)?;", mangled));
            w.line(format!("m.report_leftover(1, {:?});", name));
            w.line("Ok(())");
            w.close("})?;");
        } else {
            w.line(format!("m.{}(|m| {}(m))?;", method, mangled));
        }
    }
    w.line("Ok(())");
    w.close("}");

    w.buffer
}

struct FunctionEmitter<'w, 'p> {
    w: &'w mut CodeWriter,
    functions: &'w mut Mangler,
    locals: Mangler,
    function: &'p IrFunction,
    next_binding: usize,
    next_guard: usize,
}

impl<'w, 'p> FunctionEmitter<'w, 'p> {
    fn new(w: &'w mut CodeWriter, functions: &'w mut Mangler, function: &'p IrFunction) -> Self {
        Self{ w, functions, locals: Mangler::default(), function, next_binding: 0, next_guard: 0 }
    }

    fn emit(mut self) {
        let f = self.function;
        let mangled = self.functions.get("f_", &f.name);
        let mut params = String::from("m: &mut Machine");
        for p in 0..f.params {
            let _ = write!(params, ", p{}: Value", p);
        }
        let returns = if f.returns.is_some() { "Value" } else { "()" };

        self.w.open(format!("fn {}({}) -> Result<{}, RunError> {{", mangled, params, returns));
        self.w.open(format!("m.call({:?}, move |m: &mut Machine| {{", f.name));
        for t in used_temps(f) {
            self.w.line(format!("let mut t{} = Value::Integer(0);", t));
        }
        for decl in f.locals.iter() {
            let local = self.locals.get("l_", &decl.name);
            self.w.line(format!("let mut {} = {};", local, default_value(decl.kind)));
        }

        self.block(&f.body);
        match &f.result {
            Some(result) => {
                let value = self.expr(result);
                self.w.line(format!("Ok({})", value));
            },
            None => self.w.line("Ok(())"),
        }
        self.w.close("})");
        self.w.close("}");
    }

    // Binds a machine call to a fresh variable
    fn bind(&mut self, call: String) -> String {
        let name = format!("e{}", self.next_binding);
        self.next_binding += 1;
        self.w.line(format!("let {} = {};", name, call));
        name
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Const(c) => constant(c),
            Expr::Param(p) => format!("p{}.clone()", p),
            Expr::Temp(t) => format!("t{}.clone()", t),
            Expr::Local(name) => format!("{}.clone()", self.locals.get("l_", name)),
            Expr::Field(name) => self.bind(format!("m.field({:?})", name)),
            Expr::Global(name) => self.bind(format!("m.global({:?})", name)),
            Expr::EntryVar(name) => self.bind(format!("m.entry_var({:?})", name)),
            Expr::Cite => self.bind(String::from("m.cite()")),
            Expr::Type => self.bind(String::from("m.entry_type()")),
            Expr::Preamble => self.bind(String::from("m.preamble()")),
            Expr::Prim(primitive, args) => {
                let args: Vec<String> = args.iter().map(|arg| self.expr(arg)).collect();
                self.bind(format!("m.prim(Primitive::{:?}, vec![{}])", primitive, args.join(", ")))
            },
            Expr::Coerce(kind, inner, function) => {
                let value = self.expr(inner);
                self.bind(format!("m.coerce(ArgKind::{:?}, {}, {:?})", kind, value, function))
            },
            Expr::Cond(cond, then, otherwise) => {
                let cond = self.expr(cond);
                let name = format!("e{}", self.next_binding);
                self.next_binding += 1;
                self.w.open(format!("let {} = if {}.is_true() {{", name, cond));
                let then = self.expr(then);
                self.w.line(then);
                self.w.middle("} else {");
                let otherwise = self.expr(otherwise);
                self.w.line(otherwise);
                self.w.close("};");
                name
            },
        }
    }

    fn store(&mut self, target: &Target, value: &str) {
        let line = match target {
            Target::Temp(t) => format!("t{} = {};", t, value),
            Target::Local(name) => format!("{} = {}.into_stored();", self.locals.get("l_", name), value),
            Target::Global(name) => format!("m.set_global({:?}, {});", name, value),
            Target::EntryVar(name) => format!("m.set_entry_var({:?}, {});", name, value),
        };
        self.w.line(line);
    }

    fn call_args(&mut self, args: &[Expr]) -> String {
        let mut out = String::from("m");
        for arg in args {
            let value = self.expr(arg);
            out.push_str(", ");
            out.push_str(&value);
        }
        out
    }

    fn block(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Assign{ target, value, check } => {
                let value = self.expr(value);
                match check {
                    None => self.store(target, &value),
                    Some(kind) => {
                        self.w.open(format!("if let Some(v) = m.accept(ArgKind::{:?}, {}, \":=\") {{", kind, value));
                        self.store(target, "v");
                        self.w.close("}");
                    },
                }
            },
            Stmt::Eval(expr) => {
                let value = self.expr(expr);
                self.w.line(format!("let _ = {};", value));
            },
            Stmt::Call{ function, args, result } => {
                let args = self.call_args(args);
                let callee = self.functions.get("f_", function);
                match result {
                    Some(t) => self.w.line(format!("t{} = {}({})?;", t, callee, args)),
                    None => self.w.line(format!("{}({})?;", callee, args)),
                }
            },
            Stmt::CallType{ candidates, default } => {
                self.w.open("if let Some(entry_type) = m.dispatch_type() {");
                self.w.open("match &*entry_type {");
                for name in candidates {
                    let callee = self.functions.get("f_", name);
                    self.w.line(format!("{:?} => {}(m)?,", name, callee));
                }
                match default {
                    Some(name) => {
                        let callee = self.functions.get("f_", name);
                        self.w.line(format!("_ => {}(m)?,", callee));
                    },
                    None => self.w.line("_ => {},"),
                }
                self.w.close("}");
                self.w.close("}");
            },
            Stmt::Write(expr) => {
                let value = self.expr(expr);
                self.w.line(format!("m.write({});", value));
            },
            Stmt::Newline => self.w.line("m.newline();"),
            Stmt::Warning(expr) => {
                let value = self.expr(expr);
                self.w.line(format!("m.warning({});", value));
            },
            Stmt::If{ cond, then, otherwise } => {
                let cond = self.expr(cond);
                self.w.open(format!("if {}.is_true() {{", cond));
                self.block(then);
                if !otherwise.is_empty() {
                    self.w.middle("} else {");
                    self.block(otherwise);
                }
                self.w.close("}");
            },
            Stmt::Loop{ head, test, body } => {
                let guard = format!("g{}", self.next_guard);
                self.next_guard += 1;
                self.w.line(format!("let mut {} = 0;", guard));
                self.w.open("loop {");
                self.block(head);
                let test = self.expr(test);
                self.w.open(format!("if !{}.is_true() {{", test));
                self.w.line("break;");
                self.w.close("}");
                self.w.line(format!("m.loop_guard(&mut {})?;", guard));
                self.block(body);
                self.w.close("}");
            },
        }
    }
}
