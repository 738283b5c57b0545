//! Package transports
//!
//! A transport lists the refs a remote package publishes and downloads one
//! ref into a directory. Two backends:
//! - GitHub: tags from the REST API, sources from the codeload tarball
//! - Mirror: a local directory laid out as `<mirror>/<user>/<repo>/<ref>/`

use crate::error::{KnitError, KnitResult};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("knit/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Abstract package source
#[async_trait]
pub trait Transport: Send + Sync {
    /// Refs (usually version tags) published for `user/repo`
    async fn versions(&self, user: &str, repo: &str) -> KnitResult<Vec<String>>;

    /// Download `user/repo` at `reference` into the existing, empty `dest`
    async fn download(&self, user: &str, repo: &str, reference: &str, dest: &Path)
        -> KnitResult<()>;

    /// Human-readable transport name for logs
    fn name(&self) -> &'static str;
}

/// Fetches packages from GitHub
#[derive(Clone)]
pub struct GithubTransport {
    agent: ureq::Agent,
    token: Option<String>,
    api: String,
    codeload: String,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl GithubTransport {
    /// Create a transport, authenticating with `token` when given
    pub fn new(token: Option<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            token,
            api: "https://api.github.com".to_string(),
            codeload: "https://codeload.github.com".to_string(),
        }
    }

    fn get(&self, url: &str) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        let mut request = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }
        request.call()
    }

    fn fetch_tags(&self, user: &str, repo: &str) -> KnitResult<Vec<String>> {
        let slug = format!("{}/{}", user, repo);
        let url = format!("{}/repos/{}/tags?per_page=100", self.api, slug);
        let mut response = self.get(&url).map_err(|e| http_error(&slug, e))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| http_error(&slug, e))?;
        let tags: Vec<Tag> = serde_json::from_str(&body)
            .map_err(|e| KnitError::fetch(&slug, format!("unexpected tag listing: {}", e)))?;
        Ok(tags.into_iter().map(|t| t.name).collect())
    }

    fn fetch_tarball(&self, user: &str, repo: &str, reference: &str, dest: &Path) -> KnitResult<()> {
        let slug = format!("{}/{}@{}", user, repo, reference);
        let url = format!("{}/{}/{}/tar.gz/{}", self.codeload, user, repo, reference);
        let mut response = self.get(&url).map_err(|e| http_error(&slug, e))?;
        let reader = response.body_mut().as_reader();
        unpack_tarball(reader, dest).map_err(|e| KnitError::fetch(&slug, e.to_string()))
    }
}

#[async_trait]
impl Transport for GithubTransport {
    async fn versions(&self, user: &str, repo: &str) -> KnitResult<Vec<String>> {
        let this = self.clone();
        let (user, repo) = (user.to_string(), repo.to_string());
        tokio::task::spawn_blocking(move || this.fetch_tags(&user, &repo))
            .await
            .map_err(|e| KnitError::Internal(format!("tag listing task failed: {}", e)))?
    }

    async fn download(
        &self,
        user: &str,
        repo: &str,
        reference: &str,
        dest: &Path,
    ) -> KnitResult<()> {
        let this = self.clone();
        let (user, repo, reference) = (user.to_string(), repo.to_string(), reference.to_string());
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || this.fetch_tarball(&user, &repo, &reference, &dest))
            .await
            .map_err(|e| KnitError::Internal(format!("download task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "github"
    }
}

fn http_error(slug: &str, err: ureq::Error) -> KnitError {
    match err {
        ureq::Error::StatusCode(404) => KnitError::fetch(slug, "not found"),
        ureq::Error::StatusCode(code) => KnitError::fetch(slug, format!("HTTP {}", code)),
        other => KnitError::fetch(slug, other.to_string()),
    }
}

/// Unpack a gzipped tarball into `dest`, dropping the archive's top-level directory
pub fn unpack_tarball(reader: impl std::io::Read, dest: &Path) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let rel: PathBuf = path.components().skip(1).collect();
        if rel.as_os_str().is_empty() {
            continue;
        }
        // Refuse anything that could escape `dest`
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            continue;
        }
        let target = dest.join(&rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

/// Serves packages from a local directory tree
#[derive(Debug, Clone)]
pub struct MirrorTransport {
    root: PathBuf,
}

impl MirrorTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn package_dir(&self, user: &str, repo: &str) -> PathBuf {
        self.root.join(user).join(repo)
    }
}

#[async_trait]
impl Transport for MirrorTransport {
    async fn versions(&self, user: &str, repo: &str) -> KnitResult<Vec<String>> {
        let dir = self.package_dir(user, repo);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|_| KnitError::fetch(format!("{}/{}", user, repo), "not found"))?;

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KnitError::io(format!("reading mirror {}", dir.display()), e))?
        {
            if entry.path().is_dir() {
                versions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        versions.sort();
        Ok(versions)
    }

    async fn download(
        &self,
        user: &str,
        repo: &str,
        reference: &str,
        dest: &Path,
    ) -> KnitResult<()> {
        let source = self.package_dir(user, repo).join(reference);
        if !source.is_dir() {
            return Err(KnitError::fetch(
                format!("{}/{}@{}", user, repo, reference),
                "not found",
            ));
        }
        debug!("Copying {} into {}", source.display(), dest.display());
        copy_tree(&source, dest).await
    }

    fn name(&self) -> &'static str {
        "mirror"
    }
}

/// Recursively copy the contents of `from` into `to`
pub async fn copy_tree(from: &Path, to: &Path) -> KnitResult<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst)
            .await
            .map_err(|e| KnitError::io(format!("creating {}", dst.display()), e))?;
        let mut entries = fs::read_dir(&src)
            .await
            .map_err(|e| KnitError::io(format!("reading {}", src.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KnitError::io(format!("reading {}", src.display()), e))?
        {
            let path = entry.path();
            let target = dst.join(entry.file_name());
            if path.is_dir() {
                pending.push((path, target));
            } else {
                fs::copy(&path, &target).await.map_err(|e| {
                    KnitError::io(format!("copying {}", path.display()), e)
                })?;
            }
        }
    }
    Ok(())
}
