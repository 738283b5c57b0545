//! `@import` and `url()` extraction for stylesheets
//!
//! Imports are modules: their rules get inlined. `url()` references are
//! assets. Both scanners report byte spans so the packer can rewrite the
//! exact occurrences it resolved.

use super::{Extractor, Require};
use crate::resolve::specifier::is_external;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid comment pattern"));

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@import\s+(?:url\(\s*)?(?:"([^"]*)"|'([^']*)'|([^\s;'")]+))\s*\)?[^;]*;[ \t]*\n?"#,
    )
    .expect("valid import pattern")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^\s'")]*))\s*\)"#).expect("valid url pattern")
});

/// The default stylesheet extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct CssExtractor;

impl Extractor for CssExtractor {
    fn extract(&self, src: &str) -> Vec<Require> {
        let mut requires: Vec<Require> = imports(src)
            .into_iter()
            .map(|m| Require::module(m.specifier))
            .collect();
        requires.extend(urls(src).into_iter().map(|m| Require::asset(m.specifier)));
        requires
    }
}

/// One `@import` or `url()` occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Span of the whole statement or `url(...)` token
    pub span: Range<usize>,
    /// The referenced specifier, unquoted
    pub specifier: String,
    /// Quote character the reference used, if any
    pub quote: Option<char>,
}

/// Local `@import`s in source order
pub fn imports(src: &str) -> Vec<Reference> {
    let comments = comment_spans(src);
    IMPORT
        .captures_iter(src)
        .filter_map(|caps| reference(&caps))
        .filter(|r| !inside(&comments, r.span.start))
        .filter(|r| !is_external(&r.specifier))
        .collect()
}

/// Local `url()` references outside imports, in source order. Every occurrence
/// is reported, including repeats.
pub fn urls(src: &str) -> Vec<Reference> {
    let mut skipped = comment_spans(src);
    skipped.extend(IMPORT.find_iter(src).map(|m| m.range()));
    URL.captures_iter(src)
        .filter_map(|caps| reference(&caps))
        .filter(|r| !inside(&skipped, r.span.start))
        .filter(|r| is_local_url(&r.specifier))
        .collect()
}

fn reference(caps: &regex::Captures<'_>) -> Option<Reference> {
    let whole = caps.get(0)?;
    let (value, quote) = if let Some(m) = caps.get(1) {
        (m.as_str(), Some('"'))
    } else if let Some(m) = caps.get(2) {
        (m.as_str(), Some('\''))
    } else {
        (caps.get(3)?.as_str(), None)
    };
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(Reference {
        span: whole.range(),
        specifier: value.to_string(),
        quote,
    })
}

fn is_local_url(url: &str) -> bool {
    !is_external(url) && !url.starts_with('#')
}

fn comment_spans(src: &str) -> Vec<Range<usize>> {
    COMMENT.find_iter(src).map(|m| m.range()).collect()
}

fn inside(spans: &[Range<usize>], at: usize) -> bool {
    spans.iter().any(|s| s.contains(&at))
}
