use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Position of a token within a style file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Locator {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Self {
        Self{ file, line, column }
    }

    /// Locator for tokens that do not originate from a source file, e.g. the
    /// synthesized call of a function named by a run command.
    pub fn builtin() -> Self {
        Self{ file: Rc::from("<builtin>"), line: 0, column: 0 }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}:{}", self.line, self.column)
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}

/// The closed set of token variants. The reader produces these after
/// resolving which identifiers are entry fields and which are locals of the
/// enclosing function. All names are lowercase.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    IntegerLiteral(i64),
    StringLiteral(Rc<str>),
    QuoteLiteral(Rc<str>),
    FieldRef(Rc<str>),
    LocalInteger(Rc<str>),
    LocalString(Rc<str>),
    FunctionRef(Rc<str>),
    // A `{ ... }` within a function body: pushed as a value, run by `if$`
    // and `while$`
    Block(Rc<[Token]>),
    // The body of a function: executed inline
    TokenList(Rc<[Token]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub locator: Locator,
}

impl Token {
    pub fn new(kind: TokenKind, locator: Locator) -> Self {
        Self{ kind, locator }
    }

    pub fn function_ref(name: &str, locator: Locator) -> Self {
        Self::new(TokenKind::FunctionRef(Rc::from(name)), locator)
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::IntegerLiteral(v) => format!("#{}", v),
            TokenKind::StringLiteral(v) => format!("\"{}\"", v),
            TokenKind::QuoteLiteral(v) => format!("'{}", v),
            TokenKind::FieldRef(v) |
            TokenKind::LocalInteger(v) |
            TokenKind::LocalString(v) |
            TokenKind::FunctionRef(v) => v.to_string(),
            TokenKind::Block(tokens) => format!("{{ {} tokens }}", tokens.len()),
            TokenKind::TokenList(tokens) => format!("[ {} tokens ]", tokens.len()),
        }
    }
}

/// Kind of a declared local variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalKind {
    Integer,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDecl {
    pub name: Rc<str>,
    pub kind: LocalKind,
}
