use std::fmt;

use serde::{Deserialize, Serialize};

use super::{names, text};
use crate::runtime::diagnostics::{MessageId, Problem};
use crate::runtime::value::Value;

/// The built-ins that compute a value from their arguments only. They are
/// shared verbatim by the interpreter, constant folding in the compiler, the
/// IR runner and generated programs, which keeps the modes in agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Greater,
    Less,
    Equals,
    Plus,
    Minus,
    Concat,
    AddPeriod,
    ChangeCase,
    ChrToInt,
    Empty,
    FormatName,
    IntToChr,
    IntToStr,
    Missing,
    NumNames,
    Purify,
    Substring,
    TextLength,
    TextPrefix,
    Width,
}

/// Kind of an argument or result of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    Integer,
    // Strings and missing fields
    String,
    // Integer or string, `=` only
    Any,
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Integer => f.write_str("integer"),
            ArgKind::String => f.write_str("string"),
            ArgKind::Any => f.write_str("integer or string"),
        }
    }
}

impl ArgKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgKind::Integer => matches!(value, Value::Integer(_)),
            ArgKind::String => value.is_string_like(),
            ArgKind::Any => matches!(value, Value::Integer(_)) || value.is_string_like(),
        }
    }

    /// Value substituted for an argument of this kind that could not be
    /// popped
    pub fn placeholder(&self) -> Value {
        match self {
            ArgKind::Integer => Value::Integer(0),
            ArgKind::String | ArgKind::Any => Value::empty_string(),
        }
    }
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        use Primitive::*;
        match self {
            Greater => ">",
            Less => "<",
            Equals => "=",
            Plus => "+",
            Minus => "-",
            Concat => "*",
            AddPeriod => "add.period$",
            ChangeCase => "change.case$",
            ChrToInt => "chr.to.int$",
            Empty => "empty$",
            FormatName => "format.name$",
            IntToChr => "int.to.chr$",
            IntToStr => "int.to.str$",
            Missing => "missing$",
            NumNames => "num.names$",
            Purify => "purify$",
            Substring => "substring$",
            TextLength => "text.length$",
            TextPrefix => "text.prefix$",
            Width => "width$",
        }
    }

    /// Kinds of the arguments, deepest stack value first
    pub fn params(&self) -> &'static [ArgKind] {
        use Primitive::*;
        use ArgKind::{Integer as I, String as S, Any as A};
        match self {
            Greater | Less | Plus | Minus => &[I, I],
            Equals => &[A, A],
            Concat | ChangeCase => &[S, S],
            AddPeriod | ChrToInt | Empty | Missing | NumNames | Purify | TextLength | Width => &[S],
            FormatName => &[S, I, S],
            IntToChr | IntToStr => &[I],
            Substring => &[S, I, I],
            TextPrefix => &[S, I],
        }
    }

    pub fn arity(&self) -> usize {
        self.params().len()
    }

    pub fn result(&self) -> ArgKind {
        use Primitive::*;
        match self {
            Greater | Less | Equals | Plus | Minus | ChrToInt | Empty | Missing |
            NumNames | TextLength | Width => ArgKind::Integer,
            Concat | AddPeriod | ChangeCase | FormatName | IntToChr | IntToStr |
            Purify | Substring | TextPrefix => ArgKind::String,
        }
    }

    /// Computes the result. `args` holds the arguments in push order. Problems
    /// are appended to `problems`; a result is produced regardless.
    pub fn apply(&self, args: &[Value], tie: &str, problems: &mut Vec<Problem>) -> Value {
        debug_assert_eq!(args.len(), self.arity());
        let int = |idx: usize| args[idx].as_integer();
        let string = |idx: usize| args[idx].to_rc_str();

        match self {
            Primitive::Greater => Value::Integer((int(0) > int(1)) as i64),
            Primitive::Less => Value::Integer((int(0) < int(1)) as i64),
            Primitive::Equals => {
                let equal = match (&args[0], &args[1]) {
                    (Value::Integer(a), Value::Integer(b)) => a == b,
                    (a, b) if a.is_string_like() && b.is_string_like() => a.as_str() == b.as_str(),
                    (a, b) => {
                        problems.push(Problem::new(MessageId::TypeMismatch, vec![
                            "=".to_string(), a.kind().to_string(), b.to_string()
                        ]));
                        false
                    }
                };
                Value::Integer(equal as i64)
            },
            Primitive::Plus => Value::Integer(int(0).wrapping_add(int(1))),
            Primitive::Minus => Value::Integer(int(0).wrapping_sub(int(1))),
            Primitive::Concat => {
                let (a, b) = (string(0), string(1));
                if b.is_empty() {
                    Value::String(a)
                } else if a.is_empty() {
                    Value::String(b)
                } else {
                    let mut result = String::with_capacity(a.len() + b.len());
                    result.push_str(&a);
                    result.push_str(&b);
                    Value::from(result)
                }
            },
            Primitive::AddPeriod => Value::String(text::add_period(&string(0))),
            Primitive::ChangeCase => {
                let spec = string(1);
                match text::CaseMode::from_spec(&spec) {
                    Some(mode) => Value::String(text::change_case(&string(0), mode)),
                    None => {
                        problems.push(Problem::new(MessageId::IllegalCaseSpec, vec![spec.to_string()]));
                        Value::String(string(0))
                    }
                }
            },
            Primitive::ChrToInt => match text::chr_to_int(&string(0)) {
                Ok(v) => Value::Integer(v),
                Err(problem) => {
                    problems.push(problem);
                    Value::Integer(0)
                }
            },
            Primitive::Empty => {
                let empty = match &args[0] {
                    Value::Missing(_) => true,
                    Value::String(v) => text::is_blank(v),
                    _ => false,
                };
                Value::Integer(empty as i64)
            },
            Primitive::FormatName => {
                let (result, problem) = names::format_name(&string(0), int(1), &string(2), tie);
                problems.extend(problem);
                Value::from(result)
            },
            Primitive::IntToChr => match text::int_to_chr(int(0)) {
                Ok(v) => Value::String(v),
                Err(problem) => {
                    problems.push(problem);
                    Value::empty_string()
                }
            },
            Primitive::IntToStr => Value::from(int(0).to_string()),
            Primitive::Missing => Value::Integer(matches!(args[0], Value::Missing(_)) as i64),
            Primitive::NumNames => Value::Integer(names::num_names(&string(0))),
            Primitive::Purify => Value::String(text::purify(&string(0))),
            Primitive::Substring => Value::String(text::substring(&string(0), int(1), int(2))),
            Primitive::TextLength => Value::Integer(text::text_length(&string(0))),
            Primitive::TextPrefix => Value::String(text::text_prefix(&string(0), int(1))),
            Primitive::Width => Value::Integer(text::width(&string(0))),
        }
    }

    /// Applies the primitive when no problem is reported, used for constant
    /// folding.
    pub fn try_fold(&self, args: &[Value], tie: &str) -> Option<Value> {
        let mut problems = Vec::new();
        let result = self.apply(args, tie, &mut problems);
        if problems.is_empty() {
            Some(result)
        } else {
            None
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

