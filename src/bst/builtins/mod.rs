/// builtins
///
/// The 37 standard built-in functions of BST. Each built-in has one runtime
/// behaviour (in the interpreter's executor and the `Machine`) and one
/// symbolic behaviour (in the compiler's processor). The built-ins that only
/// compute a value from their arguments are `Primitive`s, their behaviour is
/// implemented once in `Primitive::apply` and shared by every mode.

pub mod names;
pub mod primitive;
pub mod text;

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use maplit::hashmap;

pub use primitive::{ArgKind, Primitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Primitive(Primitive),
    // `:=`
    Assign,
    CallType,
    Cite,
    Duplicate,
    If,
    Newline,
    Pop,
    Preamble,
    Quote,
    Skip,
    Stack,
    Swap,
    Top,
    Type,
    Warning,
    While,
    Write,
}

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin> = {
        use Builtin::*;
        use self::Primitive as P;
        hashmap!{
            ">" => Primitive(P::Greater),
            "<" => Primitive(P::Less),
            "=" => Primitive(P::Equals),
            "+" => Primitive(P::Plus),
            "-" => Primitive(P::Minus),
            "*" => Primitive(P::Concat),
            ":=" => Assign,
            "add.period$" => Primitive(P::AddPeriod),
            "call.type$" => CallType,
            "change.case$" => Primitive(P::ChangeCase),
            "chr.to.int$" => Primitive(P::ChrToInt),
            "cite$" => Cite,
            "duplicate$" => Duplicate,
            "empty$" => Primitive(P::Empty),
            "format.name$" => Primitive(P::FormatName),
            "if$" => If,
            "int.to.chr$" => Primitive(P::IntToChr),
            "int.to.str$" => Primitive(P::IntToStr),
            "missing$" => Primitive(P::Missing),
            "newline$" => Newline,
            "num.names$" => Primitive(P::NumNames),
            "pop$" => Pop,
            "preamble$" => Preamble,
            "purify$" => Primitive(P::Purify),
            "quote$" => Quote,
            "skip$" => Skip,
            "stack$" => Stack,
            "substring$" => Primitive(P::Substring),
            "swap$" => Swap,
            "text.length$" => Primitive(P::TextLength),
            "text.prefix$" => Primitive(P::TextPrefix),
            "top$" => Top,
            "type$" => Type,
            "warning$" => Warning,
            "while$" => While,
            "width$" => Primitive(P::Width),
            "write$" => Write,
        }
    };
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        BUILTINS.get(name).copied()
    }

    /// All built-ins, sorted by name
    pub fn all() -> Vec<(&'static str, Builtin)> {
        let mut all: Vec<_> = BUILTINS.iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Primitive(p) => p.name(),
            Builtin::Assign => ":=",
            Builtin::CallType => "call.type$",
            Builtin::Cite => "cite$",
            Builtin::Duplicate => "duplicate$",
            Builtin::If => "if$",
            Builtin::Newline => "newline$",
            Builtin::Pop => "pop$",
            Builtin::Preamble => "preamble$",
            Builtin::Quote => "quote$",
            Builtin::Skip => "skip$",
            Builtin::Stack => "stack$",
            Builtin::Swap => "swap$",
            Builtin::Top => "top$",
            Builtin::Type => "type$",
            Builtin::Warning => "warning$",
            Builtin::While => "while$",
            Builtin::Write => "write$",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
