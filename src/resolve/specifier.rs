//! Require specifier parsing
//!
//! ```text
//! ./lib/foo            relative to the requiring file
//! /lib/foo             relative to the project root
//! user/repo            remote package, any version
//! user/repo@1.2.x      remote package, version range or git ref
//! user/repo@ref:path   file inside a remote package
//! emitter              bare name, looked up in the manifest
//! https://cdn/x.css    external, never resolved
//! ```

use std::fmt;

/// A parsed require specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier {
    /// `./x`, `../x`, `.` or `..`
    Relative(String),
    /// `/x`, resolved against the root
    Rooted(String),
    /// `user/repo[@ref][:path]`
    Remote(RemoteRef),
    /// `name[:path]`, resolved through the manifest or the includes
    Bare {
        name: String,
        subpath: Option<String>,
    },
    /// URLs that are left untouched
    External(String),
}

/// A reference to a remote package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub user: String,
    pub repo: String,
    pub reference: Option<String>,
    pub subpath: Option<String>,
}

impl RemoteRef {
    /// `user/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.user, self.repo)
    }
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.repo)?;
        if let Some(reference) = &self.reference {
            write!(f, "@{}", reference)?;
        }
        if let Some(subpath) = &self.subpath {
            write!(f, ":{}", subpath)?;
        }
        Ok(())
    }
}

impl Specifier {
    /// Classify a specifier string
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();

        if is_external(spec) {
            return Self::External(spec.to_string());
        }
        if spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../") {
            return Self::Relative(spec.to_string());
        }
        if let Some(rooted) = spec.strip_prefix('/') {
            return Self::Rooted(rooted.to_string());
        }
        if let Some(remote) = parse_remote(spec) {
            return Self::Remote(remote);
        }

        let (name, subpath) = match spec.split_once(':') {
            Some((name, path)) if !path.is_empty() => (name, Some(path.to_string())),
            _ => (spec, None),
        };
        Self::Bare {
            name: name.to_string(),
            subpath,
        }
    }

    /// Whether the specifier names a path rather than a package
    pub fn is_path(&self) -> bool {
        matches!(self, Self::Relative(_) | Self::Rooted(_))
    }
}

/// URLs and data URIs
pub fn is_external(spec: &str) -> bool {
    let lower = spec.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || lower.starts_with("data:")
}

/// Directory segment an installed package version lives in
pub fn package_dir_name(user: &str, repo: &str, version: &str) -> String {
    format!("{}-{}@{}", user, repo, version)
}

fn parse_remote(spec: &str) -> Option<RemoteRef> {
    let (user, rest) = spec.split_once('/')?;
    if user.is_empty() || !user.chars().all(is_slug_char) {
        return None;
    }

    let (head, subpath) = match rest.split_once(':') {
        Some((head, path)) => (head, Some(path.to_string()).filter(|p| !p.is_empty())),
        None => (rest, None),
    };
    let (repo, reference) = match head.split_once('@') {
        Some((repo, reference)) => (repo, Some(reference.to_string()).filter(|r| !r.is_empty())),
        None => (head, None),
    };
    if repo.is_empty() || !repo.chars().all(is_slug_char) {
        return None;
    }

    Some(RemoteRef {
        user: user.to_string(),
        repo: repo.to_string(),
        reference,
        subpath,
    })
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_rooted() {
        assert_eq!(Specifier::parse("./a"), Specifier::Relative("./a".into()));
        assert_eq!(Specifier::parse(".."), Specifier::Relative("..".into()));
        assert_eq!(Specifier::parse("/lib/a"), Specifier::Rooted("lib/a".into()));
        assert!(Specifier::parse("../x/y.js").is_path());
    }

    #[test]
    fn remote_with_ref_and_path() {
        let spec = Specifier::parse("duojs/logo@0.0.2:images/logo.svg");
        let Specifier::Remote(remote) = spec else {
            panic!("expected remote");
        };
        assert_eq!(remote.user, "duojs");
        assert_eq!(remote.repo, "logo");
        assert_eq!(remote.reference.as_deref(), Some("0.0.2"));
        assert_eq!(remote.subpath.as_deref(), Some("images/logo.svg"));
        assert_eq!(remote.to_string(), "duojs/logo@0.0.2:images/logo.svg");
    }

    #[test]
    fn remote_with_dotted_repo() {
        let Specifier::Remote(remote) = Specifier::parse("necolas/normalize.css") else {
            panic!("expected remote");
        };
        assert_eq!(remote.slug(), "necolas/normalize.css");
        assert!(remote.reference.is_none());
    }

    #[test]
    fn bare_names() {
        assert_eq!(
            Specifier::parse("emitter"),
            Specifier::Bare {
                name: "emitter".into(),
                subpath: None
            }
        );
        assert_eq!(
            Specifier::parse("emitter:lib/x.js"),
            Specifier::Bare {
                name: "emitter".into(),
                subpath: Some("lib/x.js".into())
            }
        );
    }

    #[test]
    fn externals() {
        assert!(matches!(
            Specifier::parse("https://fonts.example.com/a.css"),
            Specifier::External(_)
        ));
        assert!(matches!(Specifier::parse("//cdn/x.png"), Specifier::External(_)));
        assert!(matches!(
            Specifier::parse("data:image/png;base64,AAAA"),
            Specifier::External(_)
        ));
    }

    #[test]
    fn package_dirs_keep_owner() {
        assert_eq!(
            package_dir_name("segmentio", "json", "1.0.0"),
            "segmentio-json@1.0.0"
        );
        assert_ne!(
            package_dir_name("segmentio", "json", "1.0.0"),
            package_dir_name("yields", "json", "1.0.0")
        );
    }
}
