use std::rc::Rc;

use super::input_source::{InputPosition, InputSource, InputSpan, ParseError};
use super::token::{LocalDecl, LocalKind, Token, TokenKind};
use super::{Command, CommandKind, Style};

/// Item of a brace group before identifiers are classified. Classification
/// needs every `ENTRY` field of the style, so it happens after all commands
/// have been read.
#[derive(Debug)]
enum RawKind {
    Integer(i64),
    Str(Rc<str>),
    Quote(Rc<str>),
    Ident(Rc<str>),
    Group(Vec<Raw>),
}

#[derive(Debug)]
struct Raw {
    kind: RawKind,
    span: InputSpan,
}

fn is_blank(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' || c == 0x0C
}

fn is_identifier_char(c: u8) -> bool {
    !is_blank(c) && !matches!(c, b'{' | b'}' | b'"' | b'#' | b'%' | b'\'' | b'(' | b')' | b',')
}

/// Reads a style file. Commands and their brace-delimited arguments are read
/// in a single pass. Function bodies are classified afterwards: names declared
/// as entry fields become field references, names declared by `INTEGERS` or
/// `STRINGS` at the top level of a body become locals of that function.
pub(crate) struct Reader {
    // Positions of the currently open curly braces, the innermost last
    curly_stack: Vec<InputPosition>,
}

struct PendingFunction {
    name: Rc<str>,
    body: Raw,
    position: InputPosition,
}

impl Reader {
    pub(crate) fn new() -> Self {
        Self{ curly_stack: Vec::with_capacity(16) }
    }

    pub(crate) fn read(&mut self, source: &mut InputSource) -> Result<Style, ParseError> {
        debug_assert_eq!(source.pos().offset, 0);

        // Commands in source order, functions are filled in after all fields
        // are known.
        let mut commands: Vec<Option<Command>> = Vec::new();
        let mut pending: Vec<(usize, PendingFunction)> = Vec::new();
        let mut fields: Vec<Rc<str>> = vec![Rc::from("crossref")];

        loop {
            skip_blank(source);
            let c = match source.next() {
                Some(c) => c,
                None => break,
            };
            if c == b'}' {
                return Err(ParseError::at(
                    source, source.pos(), "unmatched closing curly brace '}'"
                ));
            }
            if !is_identifier_char(c) {
                return Err(ParseError::at(
                    source, source.pos(), "expected a command"
                ));
            }

            let start = source.pos();
            let keyword = consume_identifier(source);
            let span = InputSpan::from_positions(start, source.pos());
            let locator = source.locator(start);

            let kind = match keyword.as_ref() {
                "entry" => {
                    let entry_fields = self.consume_names(source, &keyword)?;
                    let integers = self.consume_names(source, &keyword)?;
                    let strings = self.consume_names(source, &keyword)?;
                    fields.extend(entry_fields.iter().cloned());
                    CommandKind::Entry{ fields: entry_fields, integers, strings }
                },
                "integers" => CommandKind::Integers(self.consume_names(source, &keyword)?),
                "strings" => CommandKind::Strings(self.consume_names(source, &keyword)?),
                "macro" => {
                    let name = self.consume_single_name(source, &keyword)?;
                    let text = self.consume_macro_text(source)?;
                    CommandKind::Macro{ name, text }
                },
                "function" => {
                    let name = self.consume_single_name(source, &keyword)?;
                    let body = self.consume_argument(source, &keyword)?;
                    pending.push((commands.len(), PendingFunction{ name, body, position: start }));
                    commands.push(None);
                    continue;
                },
                "read" => CommandKind::Read,
                "execute" => CommandKind::Execute(self.consume_single_name(source, &keyword)?),
                "iterate" => CommandKind::Iterate(self.consume_single_name(source, &keyword)?),
                "reverse" => CommandKind::Reverse(self.consume_single_name(source, &keyword)?),
                "sort" => CommandKind::Sort,
                _ => {
                    return Err(ParseError::spanning(
                        source, span, format!("unknown command '{}'", keyword)
                    ));
                }
            };
            commands.push(Some(Command{ kind, locator }));
        }

        debug_assert!(self.curly_stack.is_empty());

        for (idx, function) in pending {
            let mut locals = Vec::new();
            let items = match function.body.kind {
                RawKind::Group(items) => items,
                _ => unreachable!("function body is always a group"),
            };
            let tokens = classify(source, &items, &fields, &mut locals, true)?;
            let body = Token::new(
                TokenKind::TokenList(Rc::from(tokens)),
                source.locator(function.body.span.begin),
            );
            commands[idx] = Some(Command{
                kind: CommandKind::Function{ name: function.name, body, locals },
                locator: source.locator(function.position),
            });
        }

        Ok(Style{
            filename: source.filename.clone(),
            commands: commands.into_iter().flatten().collect(),
        })
    }

    fn consume_argument(&mut self, source: &mut InputSource, keyword: &str) -> Result<Raw, ParseError> {
        skip_blank(source);
        if source.next() != Some(b'{') {
            return Err(ParseError::at(
                source, source.pos(), format!("expected '{{' to start an argument of {}", keyword.to_uppercase())
            ));
        }
        self.consume_group(source)
    }

    fn consume_names(&mut self, source: &mut InputSource, keyword: &str) -> Result<Vec<Rc<str>>, ParseError> {
        let group = self.consume_argument(source, keyword)?;
        names_of_group(source, group)
    }

    fn consume_single_name(&mut self, source: &mut InputSource, keyword: &str) -> Result<Rc<str>, ParseError> {
        let group = self.consume_argument(source, keyword)?;
        let span = group.span;
        let mut names = names_of_group(source, group)?;
        if names.len() != 1 {
            return Err(ParseError::spanning(
                source, span, format!("expected a single name as argument of {}", keyword.to_uppercase())
            ));
        }
        Ok(names.remove(0))
    }

    fn consume_macro_text(&mut self, source: &mut InputSource) -> Result<Rc<str>, ParseError> {
        let group = self.consume_argument(source, "macro")?;
        let span = group.span;
        if let RawKind::Group(mut items) = group.kind {
            if items.len() == 1 {
                if let RawKind::Str(text) = items.remove(0).kind {
                    return Ok(text);
                }
            }
        }
        Err(ParseError::spanning(
            source, span, "expected a single string as the text of MACRO"
        ))
    }

    // Consumes a brace group, the current character must be the opening brace
    fn consume_group(&mut self, source: &mut InputSource) -> Result<Raw, ParseError> {
        debug_assert_eq!(source.next(), Some(b'{'));
        let begin = source.pos();
        self.curly_stack.push(begin);
        source.consume();

        let mut items = Vec::new();
        loop {
            skip_blank(source);
            let c = match source.next() {
                Some(c) => c,
                None => {
                    return Err(ParseError::at(
                        source, begin, "unterminated brace group: missing '}'"
                    ));
                }
            };

            let start = source.pos();
            let kind = match c {
                b'}' => {
                    source.consume();
                    self.curly_stack.pop();
                    return Ok(Raw{
                        kind: RawKind::Group(items),
                        span: InputSpan::from_positions(begin, source.pos()),
                    });
                },
                b'{' => {
                    items.push(self.consume_group(source)?);
                    continue;
                },
                b'"' => RawKind::Str(consume_string(source)?),
                b'#' => RawKind::Integer(consume_integer(source)?),
                b'\'' => {
                    source.consume();
                    match source.next() {
                        Some(c) if is_identifier_char(c) => RawKind::Quote(consume_identifier(source)),
                        _ => return Err(ParseError::at(
                            source, start, "expected a function name after the quote"
                        )),
                    }
                },
                c if is_identifier_char(c) => RawKind::Ident(consume_identifier(source)),
                _ => {
                    let message = format!("unexpected character '{}'", c as char);
                    return Err(ParseError::at(source, start, message));
                },
            };
            items.push(Raw{ kind, span: InputSpan::from_positions(start, source.pos()) });
        }
    }
}

fn skip_blank(source: &mut InputSource) {
    while let Some(c) = source.next() {
        if is_blank(c) {
            source.consume();
        } else if c == b'%' {
            while let Some(c) = source.next() {
                if c == b'\n' {
                    break;
                }
                source.consume();
            }
        } else {
            break;
        }
    }
}

// Identifiers are case-insensitive and stored lowercased
fn consume_identifier(source: &mut InputSource) -> Rc<str> {
    let start = source.pos();
    while let Some(c) = source.next() {
        if !is_identifier_char(c) {
            break;
        }
        source.consume();
    }
    let text = String::from_utf8_lossy(source.section(start, source.pos()));
    Rc::from(text.to_lowercase())
}

fn consume_string(source: &mut InputSource) -> Result<Rc<str>, ParseError> {
    let start = source.pos();
    source.consume();
    let text_start = source.pos();
    loop {
        match source.next() {
            Some(b'"') => break,
            Some(_) => source.consume(),
            None => {
                return Err(ParseError::at(
                    source, start, "unterminated string literal: missing '\"'"
                ));
            }
        }
    }
    let text = String::from_utf8_lossy(source.section(text_start, source.pos())).into_owned();
    source.consume();
    Ok(Rc::from(text))
}

fn consume_integer(source: &mut InputSource) -> Result<i64, ParseError> {
    let start = source.pos();
    source.consume();
    let digits_start = source.pos();
    if matches!(source.next(), Some(b'+') | Some(b'-')) {
        source.consume();
    }
    while let Some(c) = source.next() {
        if !is_identifier_char(c) {
            break;
        }
        source.consume();
    }
    let end = source.pos();
    let text = String::from_utf8_lossy(source.section(digits_start, end)).into_owned();
    let text = text.strip_prefix('+').unwrap_or(&text);
    match text.parse::<i64>() {
        Ok(v) => Ok(v),
        Err(_) => Err(ParseError::spanning(
            source, InputSpan::from_positions(start, end),
            format!("invalid integer literal '#{}'", text)
        )),
    }
}

fn names_of_group(source: &InputSource, group: Raw) -> Result<Vec<Rc<str>>, ParseError> {
    let items = match group.kind {
        RawKind::Group(items) => items,
        _ => unreachable!("argument is always a group"),
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        match item.kind {
            RawKind::Ident(name) => names.push(name),
            _ => {
                return Err(ParseError::spanning(
                    source, item.span, "expected a name"
                ));
            }
        }
    }
    Ok(names)
}

fn classify(
    source: &InputSource, items: &[Raw], fields: &[Rc<str>], locals: &mut Vec<LocalDecl>,
    top_level: bool,
) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::with_capacity(items.len());
    let mut idx = 0;
    while idx < items.len() {
        let item = &items[idx];
        let locator = source.locator(item.span.begin);
        idx += 1;

        let kind = match &item.kind {
            RawKind::Ident(name) if top_level && (name.as_ref() == "integers" || name.as_ref() == "strings") &&
                matches!(items.get(idx).map(|v| &v.kind), Some(RawKind::Group(_))) =>
            {
                let kind = if name.as_ref() == "integers" { LocalKind::Integer } else { LocalKind::String };
                if let RawKind::Group(declared) = &items[idx].kind {
                    for raw in declared {
                        match &raw.kind {
                            RawKind::Ident(local) => locals.push(LocalDecl{ name: local.clone(), kind }),
                            _ => return Err(ParseError::spanning(
                                source, raw.span, "expected the name of a local variable"
                            )),
                        }
                    }
                }
                idx += 1;
                continue;
            },
            RawKind::Integer(v) => TokenKind::IntegerLiteral(*v),
            RawKind::Str(v) => TokenKind::StringLiteral(v.clone()),
            RawKind::Quote(v) => TokenKind::QuoteLiteral(v.clone()),
            RawKind::Ident(name) => {
                match locals.iter().rev().find(|decl| decl.name == *name) {
                    Some(LocalDecl{ kind: LocalKind::Integer, .. }) => TokenKind::LocalInteger(name.clone()),
                    Some(LocalDecl{ kind: LocalKind::String, .. }) => TokenKind::LocalString(name.clone()),
                    None if fields.contains(name) => TokenKind::FieldRef(name.clone()),
                    None => TokenKind::FunctionRef(name.clone()),
                }
            },
            RawKind::Group(inner) => {
                let inner = classify(source, inner, fields, locals, false)?;
                TokenKind::Block(Rc::from(inner))
            },
        };
        tokens.push(Token::new(kind, locator));
    }
    Ok(tokens)
}
