//! Require extraction
//!
//! Extractors find the specifiers a file requires in its post-transform
//! source. They are registered per content kind; kinds without an extractor
//! are leaves.

pub mod css;
pub mod js;

use crate::resolve::RequireKind;
use std::collections::HashMap;
use std::sync::Arc;

/// One require found in a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub specifier: String,
    pub kind: RequireKind,
}

impl Require {
    pub fn module(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            kind: RequireKind::Module,
        }
    }

    pub fn asset(specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            kind: RequireKind::Asset,
        }
    }
}

/// Finds requires in a source string
pub trait Extractor: Send + Sync {
    fn extract(&self, src: &str) -> Vec<Require>;
}

impl<F> Extractor for F
where
    F: Fn(&str) -> Vec<Require> + Send + Sync,
{
    fn extract(&self, src: &str) -> Vec<Require> {
        self(src)
    }
}

/// Extractors keyed by content kind
#[derive(Clone)]
pub struct Extractors {
    by_kind: HashMap<String, Arc<dyn Extractor>>,
}

impl Default for Extractors {
    fn default() -> Self {
        let mut extractors = Self {
            by_kind: HashMap::new(),
        };
        extractors.register("js", Arc::new(js::JsExtractor));
        extractors.register("css", Arc::new(css::CssExtractor));
        extractors
    }
}

impl Extractors {
    /// Register (or replace) the extractor for `kind`
    pub fn register(&mut self, kind: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.by_kind.insert(kind.into(), extractor);
    }

    /// Requires of `src` when read as `kind`, deduplicated in source order
    pub fn extract(&self, kind: &str, src: &str) -> Vec<Require> {
        let Some(extractor) = self.by_kind.get(kind) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        extractor
            .extract(src)
            .into_iter()
            .filter(|r| seen.insert(r.specifier.clone()))
            .collect()
    }

    pub fn has(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_are_leaves() {
        let extractors = Extractors::default();
        assert!(extractors.extract("json", r#"{"require": "x"}"#).is_empty());
        assert!(!extractors.has("coffee"));
    }

    #[test]
    fn duplicates_collapse() {
        let extractors = Extractors::default();
        let requires = extractors.extract("js", "require('a'); require('b'); require('a');");
        assert_eq!(requires, vec![Require::module("a"), Require::module("b")]);
    }

    #[test]
    fn custom_extractors_replace_defaults() {
        let mut extractors = Extractors::default();
        extractors.register(
            "js",
            Arc::new(|src: &str| {
                src.lines()
                    .filter_map(|l| l.strip_prefix("import "))
                    .map(Require::module)
                    .collect()
            }),
        );
        assert_eq!(
            extractors.extract("js", "import a\nrequire('b')"),
            vec![Require::module("a")]
        );
    }
}
