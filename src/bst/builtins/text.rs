/// text.rs
///
/// The string algorithms behind the text manipulating built-ins. They operate
/// on characters, track the brace level and treat a special character (a
/// brace group at level 0 that starts with a backslash, e.g. `{\"o}`) as a
/// single text character where BibTeX does.

use std::rc::Rc;

use crate::runtime::diagnostics::{MessageId, Problem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    Title,
    Lower,
    Upper,
}

impl CaseMode {
    pub fn from_spec(spec: &str) -> Option<CaseMode> {
        let mut chars = spec.chars();
        let mode = match chars.next()? {
            't' | 'T' => CaseMode::Title,
            'l' | 'L' => CaseMode::Lower,
            'u' | 'U' => CaseMode::Upper,
            _ => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(mode)
    }
}

/// Appends a period unless the string, ignoring trailing right braces, already
/// ends in `.`, `!` or `?`. The empty string is returned unchanged.
pub fn add_period(text: &Rc<str>) -> Rc<str> {
    if text.is_empty() {
        return text.clone();
    }

    match text.trim_end_matches('}').chars().last() {
        Some('.') | Some('!') | Some('?') => text.clone(),
        _ => {
            let mut result = String::with_capacity(text.len() + 1);
            result.push_str(text);
            result.push('.');
            Rc::from(result)
        }
    }
}

/// Converts the case of the characters at brace level 0. Title case keeps the
/// first character of the string and the first character that follows a
/// colon and whitespace.
pub fn change_case(text: &Rc<str>, mode: CaseMode) -> Rc<str> {
    let mut result = String::with_capacity(text.len());
    let mut level = 0usize;
    let mut after_colon = false;
    let mut prev_white = false;

    for (idx, c) in text.chars().enumerate() {
        match c {
            '{' => {
                level += 1;
                result.push(c);
            },
            '}' => {
                level = level.saturating_sub(1);
                result.push(c);
            },
            _ if level > 0 => result.push(c),
            _ => match mode {
                CaseMode::Lower => result.extend(c.to_lowercase()),
                CaseMode::Upper => result.extend(c.to_uppercase()),
                CaseMode::Title => {
                    if idx == 0 || (after_colon && prev_white) {
                        result.push(c);
                    } else {
                        result.extend(c.to_lowercase());
                    }
                },
            },
        }

        if c == ':' {
            after_colon = true;
        } else if !c.is_whitespace() {
            after_colon = false;
        }
        prev_white = c.is_whitespace();
    }

    if result.as_str() == text.as_ref() {
        return text.clone();
    }
    Rc::from(result)
}

/// Character range selected by `substring$`, `None` if it is empty
fn substring_range(length: i64, start: i64, len: i64) -> Option<(i64, i64)> {
    if len <= 0 || start == 0 {
        return None;
    }

    let (begin, end) = if start > 0 {
        let begin = start - 1;
        (begin, begin.saturating_add(len).min(length))
    } else {
        let end = length + start + 1;
        (end.saturating_sub(len).max(0), end)
    };

    if begin >= end || begin >= length || end <= 0 {
        None
    } else {
        Some((begin, end))
    }
}

/// `substring$`: `start` is 1-based, a negative start counts from the end of
/// the string. Selecting the whole string returns the original allocation.
pub fn substring(text: &Rc<str>, start: i64, len: i64) -> Rc<str> {
    let length = text.chars().count() as i64;
    match substring_range(length, start, len) {
        None => Rc::from(""),
        Some((0, end)) if end == length => text.clone(),
        Some((begin, end)) => {
            let result: String = text.chars()
                .skip(begin as usize)
                .take((end - begin) as usize)
                .collect();
            Rc::from(result)
        }
    }
}

// Returns the index just past the brace group that starts at `start`, or the
// end of the input for an unbalanced group.
fn skip_group(chars: &[char], start: usize) -> usize {
    debug_assert_eq!(chars[start], '{');
    let mut level = 0usize;
    for (idx, c) in chars.iter().enumerate().skip(start) {
        match c {
            '{' => level += 1,
            '}' => {
                level -= 1;
                if level == 0 {
                    return idx + 1;
                }
            },
            _ => {},
        }
    }
    chars.len()
}

fn is_special_start(chars: &[char], idx: usize, level: usize) -> bool {
    level == 0 && chars[idx] == '{' && chars.get(idx + 1) == Some(&'\\')
}

// Contents of the special character spanning `start..end`, without the
// enclosing braces. Always starts with the backslash.
fn special_inner(chars: &[char], start: usize, end: usize) -> &[char] {
    if chars[end - 1] == '}' && end - 1 > start + 1 {
        &chars[start + 1..end - 1]
    } else {
        &chars[start + 1..end]
    }
}

/// `text.length$`: braces are not counted, a special character counts as one
pub fn text_length(text: &str) -> i64 {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    let mut level = 0usize;
    let mut idx = 0;
    while idx < chars.len() {
        if is_special_start(&chars, idx, level) {
            count += 1;
            idx = skip_group(&chars, idx);
            continue;
        }
        match chars[idx] {
            '{' => level += 1,
            '}' => level = level.saturating_sub(1),
            _ => count += 1,
        }
        idx += 1;
    }
    count
}

/// `text.prefix$`: the first `count` text characters, with braces copied and
/// any groups still open at the cut closed again.
pub fn text_prefix(text: &Rc<str>, count: i64) -> Rc<str> {
    if count <= 0 {
        return Rc::from("");
    }

    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut taken = 0;
    let mut level = 0usize;
    let mut idx = 0;
    while idx < chars.len() && taken < count {
        if is_special_start(&chars, idx, level) {
            let end = skip_group(&chars, idx);
            result.extend(&chars[idx..end]);
            taken += 1;
            idx = end;
            continue;
        }
        match chars[idx] {
            '{' => level += 1,
            '}' => level = level.saturating_sub(1),
            _ => taken += 1,
        }
        result.push(chars[idx]);
        idx += 1;
    }

    if idx == chars.len() && level == 0 {
        return text.clone();
    }
    for _ in 0..level {
        result.push('}');
    }
    Rc::from(result)
}

const FOREIGN_LETTERS: [&str; 13] = ["i", "j", "oe", "OE", "ae", "AE", "aa", "AA", "o", "O", "l", "L", "ss"];

/// `purify$`: keeps letters, digits and whitespace. Hyphens and ties become
/// spaces. Within a special character the control sequence is dropped unless
/// it names a foreign letter, like `\ae`.
pub fn purify(text: &str) -> Rc<str> {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut level = 0usize;
    let mut idx = 0;
    while idx < chars.len() {
        if is_special_start(&chars, idx, level) {
            let end = skip_group(&chars, idx);
            purify_special(special_inner(&chars, idx, end), &mut result);
            idx = end;
            continue;
        }
        let c = chars[idx];
        match c {
            '{' => level += 1,
            '}' => level = level.saturating_sub(1),
            '-' | '~' => result.push(' '),
            _ if c.is_whitespace() => result.push(c),
            _ if c.is_alphanumeric() => result.push(c),
            _ => {},
        }
        idx += 1;
    }
    Rc::from(result)
}

fn purify_special(inner: &[char], result: &mut String) {
    let mut idx = 0;
    while idx < inner.len() {
        if inner[idx] == '\\' {
            let name_start = idx + 1;
            let mut name_end = name_start;
            while name_end < inner.len() && inner[name_end].is_ascii_alphabetic() {
                name_end += 1;
            }
            let name: String = inner[name_start..name_end].iter().collect();
            if FOREIGN_LETTERS.contains(&name.as_str()) {
                result.push_str(&name);
            }
            // A control symbol such as `\"` is a single non-letter
            idx = if name_end == name_start { name_start + 1 } else { name_end };
            continue;
        }
        if inner[idx].is_alphanumeric() {
            result.push(inner[idx]);
        }
        idx += 1;
    }
}

fn char_width(c: char) -> i64 {
    match c {
        ' ' | '!' | '\'' | ',' | '.' | ':' | ';' | '[' | ']' | '`' => 278,
        '(' | ')' => 389,
        '"' | '$' | '*' | '/' | '\\' | '^' | '{' | '}' | '~' | '0'..='9' => 500,
        '#' | '%' => 833,
        '&' | '+' | '=' | '@' => 778,
        '-' => 333,
        '<' => 278,
        '>' | '?' => 472,
        '|' => 1000,
        '_' => 278,
        'A' | 'H' | 'N' | 'U' | 'V' | 'X' | 'Y' => 750,
        'B' => 708,
        'C' | 'T' => 722,
        'D' => 764,
        'E' | 'P' => 681,
        'F' => 653,
        'G' => 785,
        'I' => 361,
        'J' => 514,
        'K' | 'O' | 'Q' => 778,
        'L' => 625,
        'M' => 917,
        'R' => 736,
        'S' => 556,
        'W' => 1028,
        'Z' => 611,
        'a' | 'g' | 'o' => 500,
        'b' | 'd' | 'h' | 'n' | 'p' | 'u' => 556,
        'c' | 'e' | 'z' => 444,
        'f' | 'j' => 306,
        'i' | 'l' => 278,
        'k' | 'q' | 'v' | 'x' | 'y' => 528,
        'm' => 833,
        'r' => 392,
        's' => 394,
        't' => 389,
        'w' => 722,
        _ => 0,
    }
}

fn special_width(name: &str) -> Option<i64> {
    match name {
        "ss" => Some(500),
        "ae" => Some(722),
        "oe" => Some(778),
        "AE" => Some(903),
        "OE" => Some(1014),
        _ => None,
    }
}

/// `width$`: the width of the text in hundredths of a point when typeset in
/// cmr10. Characters without a known width count as zero.
pub fn width(text: &str) -> i64 {
    let chars: Vec<char> = text.chars().collect();
    let mut total = 0;
    let mut level = 0usize;
    let mut idx = 0;
    while idx < chars.len() {
        if is_special_start(&chars, idx, level) {
            let end = skip_group(&chars, idx);
            let inner = special_inner(&chars, idx, end);
            let name_end = inner.iter().skip(1).position(|c| !c.is_ascii_alphabetic())
                .map(|v| v + 1)
                .unwrap_or(inner.len());
            let name: String = inner[1..name_end].iter().collect();
            match special_width(&name) {
                Some(w) => total += w,
                None => {
                    total += inner[name_end..].iter()
                        .filter(|c| **c != '{' && **c != '}')
                        .map(|c| char_width(*c))
                        .sum::<i64>();
                }
            }
            idx = end;
            continue;
        }
        match chars[idx] {
            '{' => level += 1,
            '}' => level = level.saturating_sub(1),
            _ => {},
        }
        total += char_width(chars[idx]);
        idx += 1;
    }
    total
}

pub fn chr_to_int(text: &str) -> Result<i64, Problem> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c as i64),
        _ => Err(Problem::new(MessageId::NotSingleCharacter, vec![text.to_string()])),
    }
}

pub fn int_to_chr(value: i64) -> Result<Rc<str>, Problem> {
    if value < 0 {
        return Err(Problem::new(
            MessageId::NegativeArgument, vec!["int.to.chr$".to_string(), value.to_string()]
        ));
    }
    match u32::try_from(value).ok().and_then(char::from_u32) {
        Some(c) => Ok(Rc::from(c.to_string())),
        None => Err(Problem::new(
            MessageId::InvalidCharacter, vec!["int.to.chr$".to_string(), value.to_string()]
        )),
    }
}

/// `empty$` on a string: only whitespace
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}
