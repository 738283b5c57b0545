//! Version ranges
//!
//! Manifests use npm-style ranges: a bare `1.2.3` is exact, comparators are
//! space separated and alternatives are joined with `||`. Anything that isn't
//! a range is treated as a git ref and matched literally.

use semver::{Version, VersionReq};

/// A parsed manifest version range
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    /// `*`, `x`, `latest` or empty
    Any,
    /// One or more alternative semver requirements
    Semver(Vec<VersionReq>),
    /// A branch or tag name
    Ref(String),
}

impl Range {
    /// Parse a range string
    pub fn parse(range: &str) -> Self {
        let range = range.trim();
        if matches!(range, "" | "*" | "x" | "X" | "latest") {
            return Self::Any;
        }

        let reqs: Option<Vec<VersionReq>> = range.split("||").map(parse_requirement).collect();
        match reqs {
            Some(reqs) if !reqs.is_empty() => Self::Semver(reqs),
            _ => Self::Ref(range.to_string()),
        }
    }

    /// Whether `version` satisfies the range
    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => parse_version(version).is_some(),
            Self::Semver(reqs) => {
                parse_version(version).is_some_and(|v| reqs.iter().any(|req| req.matches(&v)))
            }
            Self::Ref(reference) => reference == version,
        }
    }

    /// The best candidate for the range: the highest matching version, or the
    /// literal ref
    pub fn pick<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
        match self {
            Self::Ref(reference) => candidates
                .into_iter()
                .find(|c| *c == reference.as_str())
                .map(str::to_string),
            _ => candidates
                .into_iter()
                .filter(|c| self.matches(c))
                .filter_map(|c| parse_version(c).map(|v| (v, c)))
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, c)| c.to_string()),
        }
    }
}

/// Lenient version parse: accepts a leading `v`
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let version = version.strip_prefix('v').unwrap_or(version);
    Version::parse(version).ok()
}

fn parse_requirement(alternative: &str) -> Option<VersionReq> {
    let alternative = alternative.trim();
    if alternative.is_empty() {
        return None;
    }

    // npm treats a bare version as exact, semver defaults to caret
    if let Some(version) = parse_version(alternative) {
        return VersionReq::parse(&format!("={}", version)).ok();
    }

    let comparators: Vec<String> = alternative
        .split_whitespace()
        .map(|c| c.strip_prefix('v').unwrap_or(c).to_string())
        .collect();
    VersionReq::parse(&comparators.join(", ")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_version_is_exact() {
        let range = Range::parse("0.0.1");
        assert!(range.matches("0.0.1"));
        assert!(!range.matches("0.0.2"));
    }

    #[test]
    fn caret_and_tilde() {
        assert!(Range::parse("^1.1.0").matches("1.2.0"));
        assert!(!Range::parse("~1.1.0").matches("1.2.0"));
        assert!(Range::parse("1.x").matches("v1.9.3"));
    }

    #[test]
    fn space_separated_and_alternatives() {
        let range = Range::parse(">=1.0.0 <2.0.0 || 3.0.0");
        assert!(range.matches("1.5.0"));
        assert!(!range.matches("2.0.0"));
        assert!(range.matches("3.0.0"));
    }

    #[test]
    fn refs_match_literally() {
        let range = Range::parse("master");
        assert_eq!(range, Range::Ref("master".into()));
        assert!(range.matches("master"));
        assert!(!range.matches("1.0.0"));
    }

    #[test]
    fn pick_highest_match() {
        let tags = ["0.0.1", "0.0.2", "1.0.0", "not-a-version"];
        assert_eq!(Range::parse("~0.0.1").pick(tags), Some("0.0.2".into()));
        assert_eq!(Range::parse("*").pick(tags), Some("1.0.0".into()));
        assert_eq!(Range::parse("0.0.1").pick(tags), Some("0.0.1".into()));
        assert_eq!(Range::parse("^2.0.0").pick(tags), None);
    }
}
