use std::cell::OnceCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::builtins::Builtin;
use super::compiler::ir::IrFunction;
use super::token::{LocalDecl, LocalKind, Locator, Token};
use super::{CommandKind, Style};
use crate::runtime::{Config, InvariantViolation, Machine, Value, PREDECLARED_GLOBALS, SORT_KEY};

/// What a name in the function table stands for
#[derive(Debug, Clone)]
pub enum Code {
    Builtin(Builtin),
    Function(Rc<UserFunction>),
    GlobalInteger,
    GlobalString,
    Field,
    EntryInteger,
    EntryString,
}

/// A function declared by `FUNCTION`. The compiler's analysis result is
/// memoized in the function itself, it is set at most once.
#[derive(Debug)]
pub struct UserFunction {
    pub name: Rc<str>,
    // A `TokenList`
    pub body: Token,
    pub locals: Vec<LocalDecl>,
    pub locator: Locator,
    analysis: OnceCell<Rc<IrFunction>>,
}

impl UserFunction {
    pub fn analysis(&self) -> Option<&Rc<IrFunction>> {
        self.analysis.get()
    }

    pub(crate) fn memoize(&self, function: Rc<IrFunction>) -> Result<(), InvariantViolation> {
        self.analysis.set(function).map_err(|_| InvariantViolation::new(
            format!("function '{}' was analyzed twice", self.name)
        ))
    }

    pub fn body_tokens(&self) -> Rc<[Token]> {
        match &self.body.kind {
            super::token::TokenKind::TokenList(tokens) => tokens.clone(),
            _ => Rc::from(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunCommand {
    Read,
    Execute(Rc<str>, Locator),
    Iterate(Rc<str>, Locator),
    Reverse(Rc<str>, Locator),
    Sort,
}

/// All state declared by a style: the function table with every name in the
/// single global namespace, the variable declarations and the run commands.
/// Created once per run and shared by the interpreter and the compiler.
///
/// All declarations of the style are registered before any command runs.
/// A name declared twice refers to its last declaration everywhere.
#[derive(Debug)]
pub struct Session {
    config: Config,
    filename: Rc<str>,
    table: HashMap<Rc<str>, Code>,
    // Current user functions in the order of their (last) definition
    functions: Vec<Rc<UserFunction>>,
    globals: Vec<(Rc<str>, LocalKind)>,
    entry_fields: Vec<Rc<str>>,
    entry_vars: Vec<(Rc<str>, LocalKind)>,
    // Read by the entry database reader, which expands them in field values.
    // Styles cannot refer to them.
    macros: HashMap<Rc<str>, Rc<str>>,
    commands: Vec<RunCommand>,
}

impl Session {
    pub fn load(style: &Style, config: Config) -> Self {
        let mut session = Self{
            config,
            filename: style.filename.clone(),
            table: HashMap::new(),
            functions: Vec::new(),
            globals: Vec::new(),
            entry_fields: Vec::new(),
            entry_vars: Vec::new(),
            macros: HashMap::new(),
            commands: Vec::new(),
        };

        for (name, builtin) in Builtin::all() {
            session.table.insert(Rc::from(name), Code::Builtin(builtin));
        }
        for (name, _) in PREDECLARED_GLOBALS.iter() {
            session.declare_global(Rc::from(*name), LocalKind::Integer);
        }
        session.declare_entry_var(Rc::from(SORT_KEY), LocalKind::String);
        session.declare_field(Rc::from("crossref"));

        for command in style.commands.iter() {
            match &command.kind {
                CommandKind::Entry{ fields, integers, strings } => {
                    for name in fields {
                        session.declare_field(name.clone());
                    }
                    for name in integers {
                        session.declare_entry_var(name.clone(), LocalKind::Integer);
                    }
                    for name in strings {
                        session.declare_entry_var(name.clone(), LocalKind::String);
                    }
                },
                CommandKind::Integers(names) => {
                    for name in names {
                        session.declare_global(name.clone(), LocalKind::Integer);
                    }
                },
                CommandKind::Strings(names) => {
                    for name in names {
                        session.declare_global(name.clone(), LocalKind::String);
                    }
                },
                CommandKind::Macro{ name, text } => {
                    session.macros.insert(name.clone(), text.clone());
                },
                CommandKind::Function{ name, body, locals } => {
                    let function = Rc::new(UserFunction{
                        name: name.clone(),
                        body: body.clone(),
                        locals: locals.clone(),
                        locator: command.locator.clone(),
                        analysis: OnceCell::new(),
                    });
                    session.forget(name);
                    session.functions.push(function.clone());
                    session.table.insert(name.clone(), Code::Function(function));
                },
                CommandKind::Read => session.commands.push(RunCommand::Read),
                CommandKind::Execute(name) =>
                    session.commands.push(RunCommand::Execute(name.clone(), command.locator.clone())),
                CommandKind::Iterate(name) =>
                    session.commands.push(RunCommand::Iterate(name.clone(), command.locator.clone())),
                CommandKind::Reverse(name) =>
                    session.commands.push(RunCommand::Reverse(name.clone(), command.locator.clone())),
                CommandKind::Sort => session.commands.push(RunCommand::Sort),
            }
        }

        session
    }

    // Drops every earlier declaration of the name
    fn forget(&mut self, name: &Rc<str>) {
        self.functions.retain(|f| f.name != *name);
        self.globals.retain(|(n, _)| n != name);
        self.entry_vars.retain(|(n, _)| n != name);
        self.entry_fields.retain(|n| n != name);
    }

    fn declare_global(&mut self, name: Rc<str>, kind: LocalKind) {
        self.forget(&name);
        self.globals.push((name.clone(), kind));
        let code = match kind {
            LocalKind::Integer => Code::GlobalInteger,
            LocalKind::String => Code::GlobalString,
        };
        self.table.insert(name, code);
    }

    fn declare_entry_var(&mut self, name: Rc<str>, kind: LocalKind) {
        self.forget(&name);
        self.entry_vars.push((name.clone(), kind));
        let code = match kind {
            LocalKind::Integer => Code::EntryInteger,
            LocalKind::String => Code::EntryString,
        };
        self.table.insert(name, code);
    }

    fn declare_field(&mut self, name: Rc<str>) {
        self.forget(&name);
        self.entry_fields.push(name.clone());
        self.table.insert(name, Code::Field);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filename(&self) -> &Rc<str> {
        &self.filename
    }

    pub fn lookup(&self, name: &str) -> Option<&Code> {
        self.table.get(name)
    }

    pub fn user_function(&self, name: &str) -> Option<&Rc<UserFunction>> {
        match self.table.get(name) {
            Some(Code::Function(function)) => Some(function),
            _ => None,
        }
    }

    /// User functions in definition order
    pub fn functions(&self) -> &[Rc<UserFunction>] {
        &self.functions
    }

    /// Global variables in declaration order, including the predeclared ones
    pub fn globals(&self) -> &[(Rc<str>, LocalKind)] {
        &self.globals
    }

    pub fn entry_fields(&self) -> &[Rc<str>] {
        &self.entry_fields
    }

    /// Entry variables in declaration order, including `sort.key$`
    pub fn entry_vars(&self) -> &[(Rc<str>, LocalKind)] {
        &self.entry_vars
    }

    /// Text of a `MACRO`, for the entry database reader that expands macro
    /// names in field values. The name is case-insensitive.
    pub fn macro_text(&self, name: &str) -> Option<&Rc<str>> {
        self.macros.get(&*name.to_lowercase())
    }

    pub fn commands(&self) -> &[RunCommand] {
        &self.commands
    }

    /// Creates the runtime state for a run of this style
    pub fn new_machine(&self) -> Machine {
        let mut machine = Machine::new(self.config.clone());
        for decl in self.user_globals() {
            let initial = match decl.kind {
                LocalKind::Integer => Value::Integer(0),
                LocalKind::String => Value::empty_string(),
            };
            machine.declare_global(&decl.name, initial);
        }
        for (name, kind) in self.entry_vars.iter() {
            machine.declare_entry_var(name, *kind);
        }
        machine
    }

    /// Globals declared by the style, without the ones every machine
    /// predeclares
    pub fn user_globals(&self) -> Vec<LocalDecl> {
        self.globals.iter()
            .filter(|(name, _)| !PREDECLARED_GLOBALS.iter().any(|(p, _)| *p == name.as_ref()))
            .map(|(name, kind)| LocalDecl{ name: name.clone(), kind: *kind })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_share_one_namespace() {
        let style = Style::parse("test.bst", r#"
            ENTRY { title } { count } { label }
            INTEGERS { total }
            STRINGS { heading }
            FUNCTION { total } { #1 }
            MACRO { jan } { "January" }
            EXECUTE { total }
        "#).unwrap();
        let session = Session::load(&style, Config::default());

        // The later declaration wins
        assert!(matches!(session.lookup("total"), Some(Code::Function(_))));
        assert!(matches!(session.lookup("title"), Some(Code::Field)));
        assert!(matches!(session.lookup("heading"), Some(Code::GlobalString)));
        assert!(matches!(session.lookup("label"), Some(Code::EntryString)));
        assert!(matches!(session.lookup("count"), Some(Code::EntryInteger)));
        assert!(matches!(session.lookup("crossref"), Some(Code::Field)));
        assert!(matches!(session.lookup("sort.key$"), Some(Code::EntryString)));
        assert!(matches!(session.lookup("write$"), Some(Code::Builtin(Builtin::Write))));
        assert_eq!(session.macro_text("JAN").map(|v| v.as_ref()), Some("January"));
        assert!(session.lookup("jan").is_none());
        assert_eq!(session.functions().len(), 1);
        assert_eq!(session.commands().len(), 1);
    }

    #[test]
    fn test_memoize_twice_is_an_invariant_violation() {
        let style = Style::parse("test.bst", "FUNCTION { f } { }").unwrap();
        let session = Session::load(&style, Config::default());
        let function = session.user_function("f").unwrap();
        let ir = Rc::new(IrFunction::empty(Rc::from("f")));
        assert!(function.memoize(ir.clone()).is_ok());
        assert!(function.memoize(ir).is_err());
    }
}
