//! `require('...')` extraction for scripts
//!
//! A small scanner rather than a parser: it skips comments and string
//! literals and picks up `require` calls whose only argument is a string
//! literal. Dynamic requires are ignored. Regex literals are not recognized,
//! so a quote inside one can hide a require that follows it on the same line.

use super::{Extractor, Require};

const REQUIRE: &[u8] = b"require";

/// The default script extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct JsExtractor;

impl Extractor for JsExtractor {
    fn extract(&self, src: &str) -> Vec<Require> {
        requires(src).into_iter().map(Require::module).collect()
    }
}

/// Literal `require` arguments in source order
pub fn requires(src: &str) -> Vec<String> {
    let bytes = src.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = memchr(bytes, i, b'\n');
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match find(bytes, i + 2, b"*/") {
                    Some(end) => end + 2,
                    None => bytes.len(),
                };
            }
            b'"' | b'\'' | b'`' => i = skip_string(bytes, i),
            b'r' if bytes[i..].starts_with(REQUIRE) && !member_or_ident(bytes, i) => {
                match call_argument(bytes, i + REQUIRE.len()) {
                    Some((start, end, next)) => {
                        found.push(src[start..end].to_string());
                        i = next;
                    }
                    None => i += REQUIRE.len(),
                }
            }
            _ => i += 1,
        }
    }
    found
}

fn member_or_ident(bytes: &[u8], i: usize) -> bool {
    i > 0 && matches!(bytes[i - 1], b'.' | b'_' | b'$' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
}

/// Parses `( "literal" )` starting at `i`; returns the literal's span and the
/// index after the closing paren
fn call_argument(bytes: &[u8], i: usize) -> Option<(usize, usize, usize)> {
    let mut i = skip_ws(bytes, i);
    if bytes.get(i) != Some(&b'(') {
        return None;
    }
    i = skip_ws(bytes, i + 1);

    let quote = *bytes.get(i)?;
    if !matches!(quote, b'"' | b'\'' | b'`') {
        return None;
    }
    let start = i + 1;
    let mut end = start;
    while end < bytes.len() && bytes[end] != quote {
        match bytes[end] {
            b'\\' | b'\n' => return None,
            b'$' if quote == b'`' && bytes.get(end + 1) == Some(&b'{') => return None,
            _ => end += 1,
        }
    }
    if end >= bytes.len() {
        return None;
    }

    let close = skip_ws(bytes, end + 1);
    (bytes.get(close) == Some(&b')')).then_some((start, end, close + 1))
}

fn skip_string(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' if quote != b'`' => return j + 1,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn memchr(bytes: &[u8], from: usize, needle: u8) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == needle)
        .map_or(bytes.len(), |p| from + p)
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}
