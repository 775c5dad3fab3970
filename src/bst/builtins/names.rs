/// names.rs
///
/// Splitting of name lists and the name formatting of `format.name$`. A name
/// is split into tokens at whitespace, ties and hyphens on brace level 0, and
/// into up to three comma-separated parts. The parts are then assigned to the
/// First, von, Last and Jr components following the BibTeX rules:
///
///  - `First von Last`: von starts at the first lowercase token (that is not
///    the last token) and ends after the last lowercase token before the last
///    token.
///  - `von Last, First`
///  - `von Last, Jr, First`

use crate::runtime::diagnostics::{MessageId, Problem};

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\n' || b == b'\r'
}

/// Splits a name list at the word `and` (case-insensitive) that is surrounded
/// by whitespace on brace level 0.
pub fn split_names(list: &str) -> Vec<&str> {
    // All delimiters are ASCII, so slicing at byte offsets is safe
    let bytes = list.as_bytes();
    let mut names = Vec::new();
    let mut level = 0usize;
    let mut start = 0;
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'{' => level += 1,
            b'}' => level = level.saturating_sub(1),
            _ => {},
        }
        if level == 0 && idx > 0 && is_space(bytes[idx - 1]) &&
            idx + 3 < bytes.len() && bytes[idx..idx + 3].eq_ignore_ascii_case(b"and") &&
            is_space(bytes[idx + 3])
        {
            names.push(list[start..idx].trim());
            idx += 3;
            start = idx;
            continue;
        }
        idx += 1;
    }
    names.push(list[start..].trim());
    names
}

/// `num.names$`: the number of names in a name list
pub fn num_names(list: &str) -> i64 {
    if list.trim().is_empty() {
        return 0;
    }
    split_names(list).len() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Space,
    Tie,
    Hyphen,
}

#[derive(Debug, Clone)]
struct NameToken {
    text: String,
    // Separator that followed the token in the source
    separator: Separator,
}

/// A name broken up into its four components
#[derive(Debug, Default)]
struct ParsedName {
    first: Vec<NameToken>,
    von: Vec<NameToken>,
    last: Vec<NameToken>,
    jr: Vec<NameToken>,
}

// Splits a single name into comma-separated parts of tokens
fn tokenize_name(name: &str) -> Vec<Vec<NameToken>> {
    let mut parts = vec![Vec::new()];
    let mut current = String::new();
    let mut level = 0usize;

    fn finish(parts: &mut Vec<Vec<NameToken>>, current: &mut String, separator: Separator) {
        if current.is_empty() {
            // Consecutive separators: a hyphen still wins over whitespace
            if separator == Separator::Hyphen {
                if let Some(last) = parts.last_mut().and_then(|v| v.last_mut()) {
                    last.separator = Separator::Hyphen;
                }
            }
            return;
        }
        let text = std::mem::take(current);
        if let Some(part) = parts.last_mut() {
            part.push(NameToken{ text, separator });
        }
    }

    for c in name.chars() {
        if level > 0 {
            match c {
                '{' => level += 1,
                '}' => level -= 1,
                _ => {},
            }
            current.push(c);
            continue;
        }
        match c {
            '{' => {
                level += 1;
                current.push(c);
            },
            '}' => current.push(c),
            ',' => {
                finish(&mut parts, &mut current, Separator::Space);
                parts.push(Vec::new());
            },
            '~' => finish(&mut parts, &mut current, Separator::Tie),
            '-' => finish(&mut parts, &mut current, Separator::Hyphen),
            _ if c.is_whitespace() => finish(&mut parts, &mut current, Separator::Space),
            _ => current.push(c),
        }
    }
    finish(&mut parts, &mut current, Separator::Space);
    parts
}

/// Whether a token starts with a lowercase letter. Brace groups are skipped,
/// except for special characters which are classified by the first letter
/// after their control sequence.
fn is_von_token(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if c == '{' {
            if chars.get(idx + 1) == Some(&'\\') {
                let mut inner = idx + 2;
                while inner < chars.len() && chars[inner].is_alphabetic() {
                    inner += 1;
                }
                let letter = chars[inner..].iter()
                    .take_while(|c| **c != '}')
                    .find(|c| c.is_alphabetic())
                    .or_else(|| chars.get(idx + 2).filter(|c| c.is_alphabetic()));
                return letter.map_or(false, |c| c.is_lowercase());
            }
            let mut level = 0usize;
            while idx < chars.len() {
                match chars[idx] {
                    '{' => level += 1,
                    '}' => {
                        level -= 1;
                        if level == 0 {
                            break;
                        }
                    },
                    _ => {},
                }
                idx += 1;
            }
        } else if c.is_alphabetic() {
            return c.is_lowercase();
        }
        idx += 1;
    }
    false
}

// Index after the last von token in `tokens[von_start..last_end - 1]`, or
// `von_start` if there is none.
fn von_end(tokens: &[NameToken], von_start: usize, last_end: usize) -> usize {
    let mut end = last_end.saturating_sub(1);
    while end > von_start {
        if is_von_token(&tokens[end - 1].text) {
            return end;
        }
        end -= 1;
    }
    von_start
}

fn parse_name(name: &str, list: &str) -> (ParsedName, Option<Problem>) {
    let mut parts = tokenize_name(name);
    let mut problem = None;
    if parts.len() > 3 {
        problem = Some(Problem::new(MessageId::TooManyCommas, vec![name.to_string(), list.to_string()]));
        parts.truncate(3);
    }

    let mut parsed = ParsedName::default();
    match parts.len() {
        1 => {
            let tokens = std::mem::take(&mut parts[0]);
            let n = tokens.len();
            if n == 0 {
                return (parsed, problem);
            }
            let von_start = tokens[..n - 1].iter().position(|t| is_von_token(&t.text));
            let (first_end, last_start) = match von_start {
                Some(start) => (start, von_end(&tokens, start, n).max(start + 1)),
                None => (n - 1, n - 1),
            };
            let mut tokens = tokens;
            parsed.last = tokens.split_off(last_start);
            parsed.von = tokens.split_off(first_end);
            parsed.first = tokens;
        },
        _ => {
            let mut tokens = std::mem::take(&mut parts[0]);
            let n = tokens.len();
            let end = von_end(&tokens, 0, n);
            parsed.last = tokens.split_off(end);
            parsed.von = tokens;
            if parts.len() == 3 {
                parsed.jr = std::mem::take(&mut parts[1]);
                parsed.first = std::mem::take(&mut parts[2]);
            } else {
                parsed.first = std::mem::take(&mut parts[1]);
            }
        },
    }
    (parsed, problem)
}

// First text character of a token, or the whole leading brace group
fn abbreviate(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if c == '{' {
            let mut level = 0usize;
            let start = idx;
            while idx < chars.len() {
                match chars[idx] {
                    '{' => level += 1,
                    '}' => {
                        level -= 1;
                        if level == 0 {
                            break;
                        }
                    },
                    _ => {},
                }
                idx += 1;
            }
            let end = (idx + 1).min(chars.len());
            return chars[start..end].iter().collect();
        }
        if c.is_alphanumeric() {
            return c.to_string();
        }
        idx += 1;
    }
    String::new()
}

fn text_chars(text: &str) -> usize {
    text.chars().filter(|c| *c != '{' && *c != '}').count()
}

// Shortest token or chunk that is considered long when placing ties
const LONG_TOKEN: usize = 3;

fn format_part(
    tokens: &[NameToken], abbreviated: bool, explicit_separator: Option<&str>,
    chunk: &mut String, tie: &str,
) {
    let chunk_start = chunk.len();
    for (idx, token) in tokens.iter().enumerate() {
        if abbreviated {
            chunk.push_str(&abbreviate(&token.text));
        } else {
            chunk.push_str(&token.text);
        }

        if idx + 1 == tokens.len() {
            break;
        }
        if let Some(separator) = explicit_separator {
            chunk.push_str(separator);
            continue;
        }
        if abbreviated {
            chunk.push('.');
        }
        match token.separator {
            Separator::Hyphen => chunk.push('-'),
            Separator::Tie => chunk.push_str(tie),
            Separator::Space => {
                if idx + 2 == tokens.len() || text_chars(&chunk[chunk_start..]) < LONG_TOKEN {
                    chunk.push_str(tie);
                } else {
                    chunk.push(' ');
                }
            },
        }
    }
}

fn format_one(parsed: &ParsedName, spec: &str, tie: &str) -> String {
    let chars: Vec<char> = spec.chars().collect();
    let mut result = String::with_capacity(spec.len() * 2);
    let mut idx = 0;
    while idx < chars.len() {
        if chars[idx] != '{' {
            // Outside of groups: copied verbatim, a stray `}` included
            result.push(chars[idx]);
            idx += 1;
            continue;
        }

        // A format group: pre text, part letters, optional `{separator}`,
        // post text
        let group_end = find_group_end(&chars, idx);
        let group = &chars[idx + 1..group_end.saturating_sub(1).max(idx + 1)];
        idx = group_end;
        format_group(parsed, group, tie, &mut result);
    }
    result
}

fn find_group_end(chars: &[char], start: usize) -> usize {
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

fn format_group(parsed: &ParsedName, group: &[char], tie: &str, result: &mut String) {
    let mut idx = 0;
    let mut pre = String::new();
    let mut part = None;
    while idx < group.len() {
        let c = group[idx];
        if c == '{' {
            let end = find_group_end(group, idx);
            pre.extend(&group[idx..end]);
            idx = end;
            continue;
        }
        if c.is_alphabetic() {
            part = Some(c.to_ascii_lowercase());
            break;
        }
        pre.push(c);
        idx += 1;
    }

    let tokens = match part {
        Some('f') => &parsed.first,
        Some('v') => &parsed.von,
        Some('l') => &parsed.last,
        Some('j') => &parsed.jr,
        // No part letter: the group is plain text
        _ => {
            result.push_str(&pre);
            return;
        },
    };
    let letter = group[idx];
    idx += 1;
    let mut abbreviated = true;
    if idx < group.len() && group[idx] == letter {
        abbreviated = false;
        idx += 1;
    }

    let mut explicit_separator = None;
    if idx < group.len() && group[idx] == '{' {
        let end = find_group_end(group, idx);
        let inner: String = group[idx + 1..end.saturating_sub(1).max(idx + 1)].iter().collect();
        explicit_separator = Some(inner);
        idx = end;
    }
    let post: String = group[idx..].iter().collect();

    if tokens.is_empty() {
        return;
    }

    let mut chunk = pre;
    format_part(tokens, abbreviated, explicit_separator.as_deref(), &mut chunk, tie);

    // A single trailing tie is discretionary: it becomes a space after long
    // chunks
    if post.ends_with('~') && !post.ends_with("~~") {
        chunk.push_str(&post[..post.len() - 1]);
        if text_chars(&chunk) >= LONG_TOKEN {
            chunk.push(' ');
        } else {
            chunk.push_str(tie);
        }
    } else {
        chunk.push_str(&post);
    }
    result.push_str(&chunk);
}

/// `format.name$`: formats name `index` (1-based) of `list` according to
/// `spec`. A missing name is reported and formats as the empty string.
pub fn format_name(list: &str, index: i64, spec: &str, tie: &str) -> (String, Option<Problem>) {
    let names = if list.trim().is_empty() { Vec::new() } else { split_names(list) };
    if index < 1 || index as usize > names.len() {
        return (String::new(), Some(Problem::new(
            MessageId::NameIndexOutOfRange, vec![index.to_string(), list.to_string()]
        )));
    }

    let (parsed, problem) = parse_name(names[index as usize - 1], list);
    (format_one(&parsed, spec, tie), problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(list: &str, index: i64, spec: &str) -> String {
        let (result, problem) = format_name(list, index, spec, "~");
        assert!(problem.is_none(), "unexpected problem {:?}", problem);
        result
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names("John Smith and Jane Doe"), vec!["John Smith", "Jane Doe"]);
        assert_eq!(split_names("A AND B and {C and D}"), vec!["A", "B", "{C and D}"]);
        assert_eq!(split_names("Alexander Sandoval"), vec!["Alexander Sandoval"]);
        assert_eq!(num_names(""), 0);
        assert_eq!(num_names("   "), 0);
        assert_eq!(num_names("Smith"), 1);
        assert_eq!(num_names("John Smith and Jane Doe"), 2);
    }

    #[test]
    fn test_name_parts() {
        assert_eq!(format("Ludwig van Beethoven", 1, "{vv~}{ll}"), "van Beethoven");
        assert_eq!(format("Jan de Vries", 1, "{vv~}{ll}"), "de~Vries");
        assert_eq!(format("van Beethoven, Ludwig", 1, "{ll}, {ff}"), "Beethoven, Ludwig");
        assert_eq!(format("Ford, Jr., Henry", 1, "{ff~}{ll}{, jj}"), "Henry Ford, Jr.");
        assert_eq!(format("Knuth", 1, "{ff~}{ll}"), "Knuth");
    }

    #[test]
    fn test_ties_and_abbreviations() {
        assert_eq!(format("Donald E. Knuth", 1, "{ff~}{vv~}{ll}{, jj}"), "Donald~E. Knuth");
        assert_eq!(format("Donald Ervin Knuth", 1, "{f.~}{ll}"), "D.~E. Knuth");
        assert_eq!(format("Al Gore", 1, "{ff~}{ll}"), "Al~Gore");
        assert_eq!(format("Jean-Pierre Serre", 1, "{f.~}{ll}"), "J.-P. Serre");
        assert_eq!(format("Donald Ervin Knuth", 1, "{f{}}{ll}"), "DEKnuth");
    }

    #[test]
    fn test_name_index_out_of_range() {
        let (result, problem) = format_name("Smith", 2, "{ll}", "~");
        assert_eq!(result, "");
        assert_eq!(problem.map(|p| p.id), Some(MessageId::NameIndexOutOfRange));
    }
}
