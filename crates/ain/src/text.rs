//! TEXT side channel (spec §6): a line-oriented assignment stream of the form
//!
//! ```text
//! s[12] = "new string"
//! m[3] = "new message"
//! ```
//!
//! grounded in `text.c`'s `ain_read_text`, which parses exactly these two
//! assignment kinds and overwrites the string/message pool by index,
//! bounds-checked against the pool's current length. This reader/writer pair
//! is line-based rather than grammar-generated (the original's `text_parser`
//! lexer/grammar files weren't part of the reference pack), but accepts the
//! identical surface syntax.

use crate::{AinFile, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTarget {
    Strings,
    Messages,
}

#[derive(Debug, Clone)]
pub struct TextAssignment {
    pub target: TextTarget,
    pub index: usize,
    pub text: String,
}

/// Unescape the handful of escapes the writer emits: `\"`, `\\`, `\n`, `\t`.
fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => return Err(Error::invalid_input(format!("unknown escape '\\{other}'"))),
            None => return Err(Error::invalid_input("trailing backslash in string literal")),
        }
    }
    Ok(out)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse one non-blank, non-comment line as `s[INDEX] = "TEXT"` or
/// `m[INDEX] = "TEXT"`.
fn parse_line(line: &str, line_no: u32) -> Result<TextAssignment> {
    let err = || Error::invalid_input(format!("line {line_no}: malformed TEXT assignment"));

    let (head, rest) = line.split_once('[').ok_or_else(err)?;
    let target = match head.trim() {
        "s" => TextTarget::Strings,
        "m" => TextTarget::Messages,
        _ => return Err(err()),
    };
    let (index_str, rest) = rest.split_once(']').ok_or_else(err)?;
    let index: usize = index_str.trim().parse().map_err(|_| err())?;

    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').ok_or_else(err)?.trim_start();
    let rest = rest.strip_prefix('"').ok_or_else(err)?;
    let rest = rest.strip_suffix('"').ok_or_else(err)?;

    Ok(TextAssignment { target, index, text: unescape(rest)? })
}

/// Parse a whole TEXT document: one assignment per non-blank, non-`#`-comment
/// line.
pub fn parse_text(source: &str) -> Result<Vec<TextAssignment>> {
    let mut out = Vec::new();
    for (i, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push(parse_line(line, i as u32 + 1)?);
    }
    Ok(out)
}

/// Parse and apply a TEXT document to `ain`'s string/message pools in one
/// step (spec §6), bounds-checking each assignment exactly as
/// `ain_read_text` does.
pub fn read_text(ain: &mut AinFile, source: &str) -> Result<()> {
    for assign in parse_text(source)? {
        let pool = match assign.target {
            TextTarget::Strings => &mut ain.strings,
            TextTarget::Messages => &mut ain.messages,
        };
        let slot = pool.get_mut(assign.index).ok_or_else(|| {
            Error::invalid_input(format!(
                "invalid {} index: {}",
                if assign.target == TextTarget::Strings { "string" } else { "message" },
                assign.index
            ))
        })?;
        *slot = crate::Str::from(assign.text);
    }
    Ok(())
}

/// Dump every string and message as a TEXT document, in pool order, suitable
/// for editing and feeding back through [`read_text`].
pub fn write_text(ain: &AinFile) -> String {
    let mut out = String::new();
    for (i, s) in ain.strings.iter().enumerate() {
        out.push_str(&format!("s[{i}] = \"{}\"\n", escape(s.as_str())));
    }
    for (i, m) in ain.messages.iter().enumerate() {
        out.push_str(&format!("m[{i}] = \"{}\"\n", escape(m.as_str())));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_message_assignments() {
        let doc = "s[0] = \"hello\"\n# a comment\nm[1] = \"world\\n\"\n";
        let assigns = parse_text(doc).unwrap();
        assert_eq!(assigns.len(), 2);
        assert_eq!(assigns[0].target, TextTarget::Strings);
        assert_eq!(assigns[0].index, 0);
        assert_eq!(assigns[0].text, "hello");
        assert_eq!(assigns[1].target, TextTarget::Messages);
        assert_eq!(assigns[1].text, "world\n");
    }

    #[test]
    fn read_text_rejects_out_of_range_index() {
        let mut ain = AinFile::new(6, 0);
        let err = read_text(&mut ain, "s[0] = \"x\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn read_text_applies_in_range_assignment() {
        let mut ain = AinFile::new(6, 0);
        ain.strings.push(crate::Str::from("old"));
        read_text(&mut ain, "s[0] = \"new\"\n").unwrap();
        assert_eq!(ain.strings[0].as_str(), "new");
    }

    #[test]
    fn write_text_round_trips_through_read_text() {
        let mut ain = AinFile::new(6, 0);
        ain.strings.push(crate::Str::from("a \"quoted\" value"));
        ain.messages.push(crate::Str::from("line1\nline2"));
        let dumped = write_text(&ain);

        let mut ain2 = AinFile::new(6, 0);
        ain2.strings.push(crate::Str::from("placeholder"));
        ain2.messages.push(crate::Str::from("placeholder"));
        read_text(&mut ain2, &dumped).unwrap();

        assert_eq!(ain2.strings[0].as_str(), "a \"quoted\" value");
        assert_eq!(ain2.messages[0].as_str(), "line1\nline2");
    }
}
