/// bst
///
/// The BST style language. A style is read into a `Style` (its commands with
/// token trees as function bodies), loaded into a `Session` and then either
/// interpreted directly against entries (`eval`) or compiled into a
/// `Program` (`compiler`) that can be run or emitted as Rust source.
///
/// Both modes share the token model, the built-in table and the runtime
/// `Machine`, and produce identical output for the same style and entries.

pub mod builtins;
pub mod compiler;
pub mod eval;
pub mod input_source;
mod reader;
pub mod session;
pub mod token;

#[cfg(test)]
mod tests;

use std::rc::Rc;

use derive_more::{Display, From};

use input_source::{InputSource, ParseError};
use token::{LocalDecl, Locator, Token};

pub use compiler::{CompileError, Compiler, Program};
pub use eval::{EntryOutput, EvalError, Interpreter};
pub use session::Session;

#[derive(Debug, Clone)]
pub enum CommandKind {
    Entry{ fields: Vec<Rc<str>>, integers: Vec<Rc<str>>, strings: Vec<Rc<str>> },
    Integers(Vec<Rc<str>>),
    Strings(Vec<Rc<str>>),
    Macro{ name: Rc<str>, text: Rc<str> },
    // `body` is a `TokenList`
    Function{ name: Rc<str>, body: Token, locals: Vec<LocalDecl> },
    Read,
    Execute(Rc<str>),
    Iterate(Rc<str>),
    Reverse(Rc<str>),
    Sort,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub locator: Locator,
}

/// A parsed style file: its commands in source order
#[derive(Debug, Clone)]
pub struct Style {
    pub filename: Rc<str>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Display, From)]
pub enum LoadError {
    #[display(fmt = "failed to read style: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "{}", _0)]
    Parse(ParseError),
}

impl std::error::Error for LoadError {}

impl Style {
    pub fn parse(filename: &str, source: &str) -> Result<Style, ParseError> {
        let mut source = InputSource::new(filename, Vec::from(source.as_bytes()));
        reader::Reader::new().read(&mut source)
    }

    /// Reads the file into memory, closing it, before parsing
    pub fn parse_file<P: AsRef<std::path::Path>>(path: P) -> Result<Style, LoadError> {
        let path = path.as_ref();
        let input = std::fs::read(path)?;
        let filename = path.to_string_lossy();
        let mut source = InputSource::new(&filename, input);
        Ok(reader::Reader::new().read(&mut source)?)
    }

    /// User functions in definition order
    pub fn functions(&self) -> impl Iterator<Item = (&Rc<str>, &Token)> {
        self.commands.iter().filter_map(|command| match &command.kind {
            CommandKind::Function{ name, body, .. } => Some((name, body)),
            _ => None,
        })
    }
}
