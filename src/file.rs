//! The unit of resolution: one source file or asset

use crate::error::{KnitError, KnitResult};
use crate::layout::in_install_dir;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One source unit in the dependency graph.
///
/// `id` is the cache key and the packer's module key. `kind` and `src` start
/// out as the file's extension and raw content and are rewritten by the
/// transform pipeline before dependencies are extracted.
#[derive(Debug, Clone)]
pub struct File {
    /// Stable identifier (root-relative path)
    pub id: String,

    /// Absolute location; may not exist for raw-source entries
    pub path: PathBuf,

    /// Original content, once read
    pub raw: Option<String>,

    /// Current, possibly transformed, content
    pub src: String,

    /// Content kind (`js`, `css`, `coffee`, ...)
    pub kind: String,

    /// Whether this file is the build root
    pub entry: bool,

    /// Binary or opaque file referenced from a stylesheet; never read or transformed
    pub asset: bool,

    /// Require specifier -> resolved id
    pub deps: BTreeMap<String, String>,

    /// Specifiers in `deps` that point at assets
    pub asset_deps: BTreeSet<String>,

    install_to: String,
}

impl File {
    /// A file backed by `path`; content is read on demand
    pub fn from_path(id: impl Into<String>, path: impl Into<PathBuf>, install_to: &str) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            kind: kind_of(&path),
            path,
            raw: None,
            src: String::new(),
            entry: false,
            asset: false,
            deps: BTreeMap::new(),
            asset_deps: BTreeSet::new(),
            install_to: install_to.to_string(),
        }
    }

    /// A file with in-memory content and an explicit kind
    pub fn from_source(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        raw: impl Into<String>,
        kind: impl Into<String>,
        install_to: &str,
    ) -> Self {
        let raw = raw.into();
        Self {
            id: id.into(),
            path: path.into(),
            src: raw.clone(),
            raw: Some(raw),
            kind: kind.into(),
            entry: false,
            asset: false,
            deps: BTreeMap::new(),
            asset_deps: BTreeSet::new(),
            install_to: install_to.to_string(),
        }
    }

    /// Whether the file lives in the project tree
    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    /// Whether the file lives inside an installed package
    pub fn is_remote(&self) -> bool {
        in_install_dir(&self.id, &self.install_to)
    }

    /// Whether the file has content available, in memory or on disk
    pub fn exists(&self) -> bool {
        self.raw.is_some() || self.path.is_file()
    }

    /// Directory relative specifiers resolve against
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    /// Read the file's content if it hasn't been loaded yet
    pub async fn read(&mut self) -> KnitResult<&str> {
        if self.raw.is_none() {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| KnitError::io(format!("reading {}", self.path.display()), e))?;
            self.src = content.clone();
            self.raw = Some(content);
        }
        Ok(self.raw.as_deref().unwrap_or_default())
    }
}

/// Content kind derived from a path's extension
pub fn kind_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}
