//! Package manifest parsing
//!
//! Every package (the project root and each installed remote package) may
//! carry a JSON manifest (`component.json` by default) naming its main
//! files and its remote dependencies.

use crate::cache::fingerprint;
use crate::error::{KnitError, KnitResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Parsed package manifest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Package name
    #[serde(default)]
    pub name: String,

    /// Package version
    #[serde(default)]
    pub version: String,

    /// Main file, or a main file per content kind
    #[serde(default)]
    pub main: Option<MainField>,

    /// Script files, the first one is the js fallback main
    #[serde(default)]
    pub scripts: Vec<String>,

    /// Style files, the first one is the css fallback main
    #[serde(default)]
    pub styles: Vec<String>,

    /// Remote dependencies: `user/repo` -> version range
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Remote dependencies only used while developing the package
    #[serde(default)]
    pub development: BTreeMap<String, String>,

    /// Digest of the manifest source, empty for a missing manifest
    #[serde(skip)]
    pub digest: String,
}

/// The `main` field: one path, or `{ "js": ..., "css": ... }`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MainField {
    File(String),
    ByKind(BTreeMap<String, String>),
}

/// A manifest dependency a bare name resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub user: String,
    pub repo: String,
    pub range: String,
}

impl Manifest {
    /// Parse a manifest file, returning the empty manifest when it doesn't exist
    pub async fn from_file(path: &Path) -> KnitResult<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(KnitError::io(
                    format!("reading manifest {}", path.display()),
                    e,
                ))
            }
        };
        Self::parse(&content, path)
    }

    /// Parse a manifest from a JSON string; `path` is only used for diagnostics
    pub fn parse(content: &str, path: &Path) -> KnitResult<Self> {
        let mut manifest: Manifest = serde_json::from_str(content)
            .map_err(|e| KnitError::manifest_syntax(path, &e))?;
        manifest.digest = fingerprint::digest(content.as_bytes());
        Ok(manifest)
    }

    /// Candidate main files for `kind`, most specific first
    pub fn main_candidates(&self, kind: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        match &self.main {
            Some(MainField::ByKind(by_kind)) => {
                if let Some(main) = by_kind.get(kind) {
                    candidates.push(main.clone());
                }
            }
            Some(MainField::File(main)) => {
                let ext = Path::new(main)
                    .extension()
                    .map(|e| e.to_string_lossy().to_ascii_lowercase());
                match ext.as_deref() {
                    Some(ext) if ext == kind => candidates.push(main.clone()),
                    None if kind == "js" => candidates.push(main.clone()),
                    _ => {}
                }
            }
            None => {}
        }

        let listed = match kind {
            "js" => self.scripts.first(),
            "css" => self.styles.first(),
            _ => None,
        };
        if let Some(file) = listed {
            candidates.push(file.clone());
        }

        candidates.push(format!("index.{}", kind));
        candidates.dedup();
        candidates
    }

    /// Find the dependency a bare `name` refers to.
    ///
    /// A name matches `user/repo`, `user-repo`, or just `repo`.
    pub fn lookup(&self, name: &str, development: bool) -> Option<Dependency> {
        let dev = self.development.iter().filter(|_| development);
        self.dependencies
            .iter()
            .chain(dev)
            .find_map(|(key, range)| {
                let (user, repo) = key.split_once('/')?;
                let matches = key == name || repo == name || format!("{}-{}", user, repo) == name;
                matches.then(|| Dependency {
                    user: user.to_string(),
                    repo: repo.to_string(),
                    range: range.clone(),
                })
            })
    }
}
