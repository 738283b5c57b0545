//! Require resolution
//!
//! Turns a specifier written in one file into the id of the file it names.
//! Resolution order for a specifier required from a file of kind `K`:
//! 1. Relative and rooted paths: the exact file, then `<path>.K`, then a
//!    directory's manifest main for `K`, then `<dir>/index.K`
//! 2. Bare names: in-memory includes, then the requesting package's manifest
//! 3. Remote packages: the best installed version matching the range, or a
//!    fetch request for the installer

pub mod specifier;
pub mod version;

pub use specifier::{package_dir_name, RemoteRef, Specifier};
pub use version::Range;

use crate::error::{KnitError, KnitResult};
use crate::file::File;
use crate::install::DEFAULT_REF;
use crate::layout::Layout;
use crate::manifest::Manifest;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a require points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequireKind {
    /// A module whose source is read, transformed and parsed
    Module,
    /// An opaque file materialized next to the output
    Asset,
}

/// A located file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub path: PathBuf,
}

/// A remote package that isn't installed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub user: String,
    pub repo: String,
    pub range: String,
    pub subpath: Option<String>,
}

impl FetchRequest {
    /// `user/repo`
    pub fn slug(&self) -> String {
        format!("{}/{}", self.user, self.repo)
    }
}

/// Outcome of resolving one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target exists on disk or as an include
    Found(Target),
    /// The target is in a remote package that must be fetched first
    Fetch(FetchRequest),
    /// A URL that is passed through untouched
    External,
    /// Nothing matches
    NotFound,
}

/// Resolves specifiers against the filesystem and the install directory
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    layout: &'a Layout,
    includes: &'a BTreeSet<String>,
    development: bool,
    update: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(
        layout: &'a Layout,
        includes: &'a BTreeSet<String>,
        development: bool,
        update: bool,
    ) -> Self {
        Self {
            layout,
            includes,
            development,
            update,
        }
    }

    /// Resolve `spec` as required from `from`, whose package manifest is `manifest`
    pub async fn resolve(
        &self,
        spec: &str,
        from: &File,
        manifest: &Manifest,
        kind: RequireKind,
    ) -> KnitResult<Resolution> {
        let specifier = Specifier::parse(spec);

        // Stylesheets and assets write plain paths without `./`
        if !specifier.is_path()
            && !matches!(specifier, Specifier::External(_))
            && (kind == RequireKind::Asset || from.kind == "css")
        {
            let local = self
                .resolve_path(&from.dir().join(strip_suffix(spec, kind)), &from.kind, kind)
                .await?;
            if let Resolution::Found(_) = local {
                debug!("Resolved {:?} from {} as a path", spec, from.id);
                return Ok(local);
            }
        }

        let resolution = match specifier {
            Specifier::External(_) => Resolution::External,
            Specifier::Relative(rel) => {
                self.resolve_path(&from.dir().join(strip_suffix(&rel, kind)), &from.kind, kind)
                    .await?
            }
            Specifier::Rooted(rel) => {
                self.resolve_path(&self.layout.path(strip_suffix(&rel, kind)), &from.kind, kind)
                    .await?
            }
            Specifier::Remote(remote) => {
                let request = FetchRequest {
                    user: remote.user,
                    repo: remote.repo,
                    range: remote.reference.unwrap_or_else(|| "*".to_string()),
                    subpath: remote.subpath,
                };
                self.resolve_remote(request, &from.kind, kind).await?
            }
            Specifier::Bare { name, subpath } => {
                if subpath.is_none() && self.includes.contains(&name) {
                    return Ok(Resolution::Found(Target {
                        path: self.layout.path(&name),
                        id: name,
                    }));
                }
                // Development dependencies only apply to the project itself
                let development = self.development && from.is_local();
                match manifest.lookup(&name, development) {
                    Some(dep) => {
                        let request = FetchRequest {
                            user: dep.user,
                            repo: dep.repo,
                            range: dep.range,
                            subpath,
                        };
                        self.resolve_remote(request, &from.kind, kind).await?
                    }
                    None => Resolution::NotFound,
                }
            }
        };

        debug!("Resolved {:?} from {} to {:?}", spec, from.id, resolution);
        Ok(resolution)
    }

    /// Resolve a file inside an installed package directory
    pub async fn resolve_in_package(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
        from_kind: &str,
        kind: RequireKind,
    ) -> KnitResult<Resolution> {
        match subpath {
            Some(subpath) => {
                self.resolve_path(&package_dir.join(strip_suffix(subpath, kind)), from_kind, kind)
                    .await
            }
            None => self.resolve_dir(package_dir, from_kind).await,
        }
    }

    /// Best installed directory for `user/repo` matching `range`
    pub async fn installed(&self, user: &str, repo: &str, range: &str) -> KnitResult<Option<PathBuf>> {
        let install_dir = self.layout.install_path("");
        let prefix = package_dir_name(user, repo, "");

        let mut entries = match tokio::fs::read_dir(&install_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KnitError::io("reading install directory", e)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KnitError::io("reading install directory entry", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(version) = name.strip_prefix(&prefix) {
                if entry.path().is_dir() {
                    versions.push(version.to_string());
                }
            }
        }

        let range = Range::parse(range);
        let picked = range.pick(versions.iter().map(String::as_str)).or_else(|| {
            // Untagged packages are installed at the default ref
            (range == Range::Any && versions.iter().any(|v| v == DEFAULT_REF))
                .then(|| DEFAULT_REF.to_string())
        });
        Ok(picked.map(|version| install_dir.join(package_dir_name(user, repo, &version))))
    }

    async fn resolve_remote(
        &self,
        request: FetchRequest,
        from_kind: &str,
        kind: RequireKind,
    ) -> KnitResult<Resolution> {
        if self.update {
            return Ok(Resolution::Fetch(request));
        }
        match self.installed(&request.user, &request.repo, &request.range).await? {
            Some(dir) => {
                self.resolve_in_package(&dir, request.subpath.as_deref(), from_kind, kind)
                    .await
            }
            None => Ok(Resolution::Fetch(request)),
        }
    }

    async fn resolve_path(
        &self,
        base: &Path,
        from_kind: &str,
        kind: RequireKind,
    ) -> KnitResult<Resolution> {
        let base = crate::layout::normalize(base);
        if base.is_file() {
            return Ok(self.found(base));
        }
        if kind == RequireKind::Asset {
            return Ok(Resolution::NotFound);
        }
        if let Some(path) = with_kind(&base, from_kind) {
            return Ok(self.found(path));
        }
        if base.is_dir() {
            return self.resolve_dir(&base, from_kind).await;
        }
        Ok(Resolution::NotFound)
    }

    async fn resolve_dir(&self, dir: &Path, from_kind: &str) -> KnitResult<Resolution> {
        let manifest = Manifest::from_file(&dir.join(&self.layout.manifest)).await?;
        for candidate in manifest.main_candidates(from_kind) {
            let base = crate::layout::normalize(&dir.join(candidate));
            if base.is_file() {
                return Ok(self.found(base));
            }
            if let Some(path) = with_kind(&base, from_kind) {
                return Ok(self.found(path));
            }
        }
        Ok(Resolution::NotFound)
    }

    fn found(&self, path: PathBuf) -> Resolution {
        Resolution::Found(Target {
            id: self.layout.id_for(&path),
            path,
        })
    }
}

/// The error for a specifier that resolved to nothing
pub fn not_found(spec: &str, from: &File) -> KnitError {
    if Specifier::parse(spec).is_path() {
        KnitError::UnresolvedPath {
            specifier: spec.to_string(),
            from: from.id.clone(),
        }
    } else {
        KnitError::UnresolvedPackage {
            specifier: spec.to_string(),
            from: from.id.clone(),
        }
    }
}

/// `<base>.<kind>` (or `.json` for scripts) when it exists
fn with_kind(base: &Path, kind: &str) -> Option<PathBuf> {
    let name = base.file_name()?.to_string_lossy().into_owned();
    let mut exts = vec![kind];
    if kind == "js" {
        exts.push("json");
    }
    exts.into_iter()
        .filter(|ext| !ext.is_empty())
        .map(|ext| base.with_file_name(format!("{}.{}", name, ext)))
        .find(|path| path.is_file())
}

/// Asset urls may carry `?query` or `#hash` suffixes that aren't part of the path
fn strip_suffix(spec: &str, kind: RequireKind) -> &str {
    match kind {
        RequireKind::Asset => spec.split(['?', '#']).next().unwrap_or(spec),
        RequireKind::Module => spec,
    }
}
