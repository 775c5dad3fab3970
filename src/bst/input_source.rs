use std::cell::OnceCell;
use std::fmt;
use std::fmt::Write;
use std::rc::Rc;

use super::token::Locator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputPosition {
    pub line: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct InputSpan {
    pub begin: InputPosition,
    pub end: InputPosition,
}

impl InputSpan {
    #[inline]
    pub fn from_positions(begin: InputPosition, end: InputPosition) -> Self {
        Self { begin, end }
    }
}

/// A style file being read, with the cursor of the reader
pub struct InputSource {
    pub(crate) filename: Rc<str>,
    input: Vec<u8>,
    line: u32,
    offset: usize,
    // Offsets at which the lines start, built when the first locator or
    // error is created
    line_starts: OnceCell<Vec<u32>>,
}

impl InputSource {
    pub fn new(filename: &str, input: Vec<u8>) -> Self {
        Self{
            filename: Rc::from(filename),
            input,
            line: 1,
            offset: 0,
            line_starts: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub fn new_test(input: &str) -> Self {
        Self::new("test.bst", Vec::from(input.as_bytes()))
    }

    #[inline]
    pub fn pos(&self) -> InputPosition {
        InputPosition { line: self.line, offset: self.offset as u32 }
    }

    pub fn next(&self) -> Option<u8> {
        self.input.get(self.offset).copied()
    }

    #[inline]
    pub fn section(&self, start: InputPosition, end: InputPosition) -> &[u8] {
        &self.input[start.offset as usize..end.offset as usize]
    }

    // Consumes the next character. `\r\n` counts as a single newline.
    pub fn consume(&mut self) {
        match self.next() {
            Some(b'\n') => {
                self.line += 1;
                self.offset += 1;
            },
            Some(_) => {
                self.offset += 1;
            },
            None => {},
        }

        debug_assert!(self.offset < u32::max_value() as usize);
    }

    /// Builds a token locator for a position in this source
    pub fn locator(&self, position: InputPosition) -> Locator {
        let column = position.offset as usize - self.line_start(position.line) + 1;
        Locator::new(self.filename.clone(), position.line, column as u32)
    }

    fn line_start(&self, line: u32) -> usize {
        let starts = self.line_starts.get_or_init(|| {
            let mut starts = vec![0];
            starts.extend(self.input.iter().enumerate()
                .filter(|(_, c)| **c == b'\n')
                .map(|(idx, _)| idx as u32 + 1));
            starts
        });
        let idx = (line.max(1) as usize - 1).min(starts.len() - 1);
        starts[idx] as usize
    }

    /// Text of a line without its line terminator
    pub fn line_text(&self, line: u32) -> String {
        let start = self.line_start(line).min(self.input.len());
        let end = self.input[start..].iter()
            .position(|c| *c == b'\n')
            .map_or(self.input.len(), |len| start + len);
        let text = &self.input[start..end];
        let text = text.strip_suffix(&b"\r"[..]).unwrap_or(text);
        String::from_utf8_lossy(text).into_owned()
    }
}

/// Error produced while reading a style: where it was found, the message and
/// the source line it is on. The offending text is marked below the line.
#[derive(Debug, Clone)]
pub struct ParseError {
    locator: Locator,
    message: String,
    line_text: String,
    // Number of marked characters, at least one
    width: u32,
}

impl ParseError {
    pub fn at<S: Into<String>>(source: &InputSource, position: InputPosition, message: S) -> Self {
        Self::spanning(source, InputSpan::from_positions(position, position), message)
    }

    /// Marks the span, or only its first character if it covers several
    /// lines
    pub fn spanning<S: Into<String>>(source: &InputSource, span: InputSpan, message: S) -> Self {
        debug_assert!(span.end.offset >= span.begin.offset);
        let width = if span.end.line == span.begin.line && span.end.offset > span.begin.offset {
            span.end.offset - span.begin.offset
        } else {
            1
        };

        Self{
            locator: source.locator(span.begin),
            message: message.into(),
            line_text: source.line_text(span.begin.line),
            width,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Line and column of the error
    pub fn position(&self) -> (u32, u32) {
        (self.locator.line, self.locator.column)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}: {}", self.locator, self.message)?;
        writeln!(f, " | {}", self.line_text)?;

        // Tabs are kept so the marker lines up with the text above it
        f.write_str(" | ")?;
        for c in self.line_text.chars().take(self.locator.column as usize - 1) {
            f.write_char(if c == '\t' { '\t' } else { ' ' })?;
        }
        f.write_char('^')?;
        for _ in 1..self.width {
            f.write_char('~')?;
        }
        writeln!(f)
    }
}

impl std::error::Error for ParseError {}
