use std::fmt;
use std::rc::Rc;

use crate::bst::token::Token;

/// Runtime value on the operand stack, in a variable or passed between
/// compiled functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    String(Rc<str>),
    // A field that is absent from the current entry. Carries the field name
    // and pops as the empty string.
    Missing(Rc<str>),
    // Produced by quote literals only
    Function(Rc<str>),
    // Produced by `{ ... }` within a function body only
    Block(Rc<[Token]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    String,
    Missing,
    Function,
    Block,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "integer",
            ValueKind::String => "string",
            ValueKind::Missing => "missing field",
            ValueKind::Function => "function",
            ValueKind::Block => "block",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn string(text: &str) -> Self {
        Value::String(Rc::from(text))
    }

    pub fn empty_string() -> Self {
        Value::String(Rc::from(""))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Integer(_) => ValueKind::Integer,
            Value::String(_) => ValueKind::String,
            Value::Missing(_) => ValueKind::Missing,
            Value::Function(_) => ValueKind::Function,
            Value::Block(_) => ValueKind::Block,
        }
    }

    /// Whether this value may be used where a string is expected. Missing
    /// fields count as the empty string.
    pub fn is_string_like(&self) -> bool {
        matches!(self, Value::String(_) | Value::Missing(_))
    }

    /// Condition of `if$` and `while$`: any nonzero integer
    pub fn is_true(&self) -> bool {
        match self {
            Value::Integer(v) => *v != 0,
            _ => false,
        }
    }

    pub fn as_integer(&self) -> i64 {
        match self {
            Value::Integer(v) => *v,
            _ => 0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::String(v) => v,
            _ => "",
        }
    }

    /// Returns the underlying string allocation, or a fresh empty string for
    /// non-string values.
    pub fn to_rc_str(&self) -> Rc<str> {
        match self {
            Value::String(v) => v.clone(),
            _ => Rc::from(""),
        }
    }

    /// The value that is stored when this value is assigned to a variable.
    /// Missing fields are stored as the empty string.
    pub fn into_stored(self) -> Value {
        match self {
            Value::Missing(_) => Value::empty_string(),
            v => v,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Rc::from(v))
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Value::String(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Missing(v) => write!(f, "missing field '{}'", v),
            Value::Function(v) => write!(f, "'{}", v),
            Value::Block(v) => write!(f, "{{ {} tokens }}", v.len()),
        }
    }
}
