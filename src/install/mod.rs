//! Remote package installation
//!
//! The installer turns a `FetchRequest` into an installed package directory
//! `<install_to>/<user>-<repo>@<version>/`. Concurrent requests for the same
//! package version share one download, and at most `concurrency` downloads
//! run at once; later requests wait in FIFO order.

pub mod transport;

pub use transport::{GithubTransport, MirrorTransport, Transport};

use crate::error::{KnitError, KnitResult};
use crate::resolve::{package_dir_name, FetchRequest, Range};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info};

/// Ref used when a package publishes no version tags
pub const DEFAULT_REF: &str = "master";

type Shared<T> = Arc<OnceCell<Result<T, KnitError>>>;

/// Installs remote packages into the install directory
pub struct Installer {
    transport: Arc<dyn Transport>,
    install_dir: PathBuf,
    limiter: Semaphore,
    versions: Mutex<HashMap<String, Shared<Vec<String>>>>,
    packages: Mutex<HashMap<String, Shared<PathBuf>>>,
}

impl Installer {
    pub fn new(transport: Arc<dyn Transport>, install_dir: impl Into<PathBuf>, concurrency: usize) -> Self {
        Self {
            transport,
            install_dir: install_dir.into(),
            limiter: Semaphore::new(concurrency.max(1)),
            versions: Mutex::new(HashMap::new()),
            packages: Mutex::new(HashMap::new()),
        }
    }

    /// Directory packages are installed into
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install the package a request names and return its directory
    pub async fn install(&self, request: &FetchRequest) -> KnitResult<PathBuf> {
        let version = self.pick_version(request).await?;
        let name = package_dir_name(&request.user, &request.repo, &version);

        let cell = shared(&self.packages, &name);
        let result = cell
            .get_or_init(|| self.download(request, &version, &name))
            .await;
        result.as_ref().map(Clone::clone).map_err(|e| shared_error(&request.slug(), e))
    }

    /// Resolve a request's range to a concrete ref
    pub async fn pick_version(&self, request: &FetchRequest) -> KnitResult<String> {
        let range = Range::parse(&request.range);
        if let Range::Ref(reference) = &range {
            return Ok(reference.clone());
        }

        let versions = self.versions(&request.user, &request.repo).await?;
        match range.pick(versions.iter().map(String::as_str)) {
            Some(version) => Ok(version),
            None if range == Range::Any => {
                debug!("{} has no version tags, using {}", request.slug(), DEFAULT_REF);
                Ok(DEFAULT_REF.to_string())
            }
            None => Err(KnitError::NoMatchingVersion {
                package: request.slug(),
                range: request.range.clone(),
            }),
        }
    }

    async fn versions(&self, user: &str, repo: &str) -> KnitResult<Vec<String>> {
        let slug = format!("{}/{}", user, repo);
        let cell = shared(&self.versions, &slug);
        let result = cell
            .get_or_init(|| async {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|e| KnitError::Internal(format!("install limiter closed: {}", e)))?;
                debug!("Listing versions of {} via {}", slug, self.transport.name());
                self.transport.versions(user, repo).await
            })
            .await;
        result.as_ref().map(Clone::clone).map_err(|e| shared_error(&slug, e))
    }

    async fn download(&self, request: &FetchRequest, version: &str, name: &str) -> KnitResult<PathBuf> {
        let dest = self.install_dir.join(name);
        if dest.is_dir() {
            debug!("{} already installed", name);
            return Ok(dest);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| KnitError::Internal(format!("install limiter closed: {}", e)))?;

        info!("Installing {}@{}", request.slug(), version);
        let staging = self
            .install_dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| KnitError::io(format!("creating {}", staging.display()), e))?;

        if let Err(e) = self
            .transport
            .download(&request.user, &request.repo, version, &staging)
            .await
        {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        // Another process may have installed the same version meanwhile
        if let Err(e) = tokio::fs::rename(&staging, &dest).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if !dest.is_dir() {
                return Err(KnitError::io(format!("installing {}", dest.display()), e));
            }
        }
        Ok(dest)
    }
}

fn shared<T>(map: &Mutex<HashMap<String, Shared<T>>>, key: &str) -> Shared<T> {
    let mut map = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.entry(key.to_string()).or_default().clone()
}

/// Every waiter on a shared failure gets its own copy of the error
fn shared_error(package: &str, err: &KnitError) -> KnitError {
    match err {
        KnitError::NoMatchingVersion { package, range } => KnitError::NoMatchingVersion {
            package: package.clone(),
            range: range.clone(),
        },
        KnitError::Fetch { package, reason } => KnitError::fetch(package, reason),
        other => KnitError::fetch(package, other.to_string()),
    }
}
