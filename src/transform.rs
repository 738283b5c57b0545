//! Transform pipeline
//!
//! Plugins run over every file before its requires are extracted, in
//! registration order, and may rewrite both `src` and `kind` (compiling
//! `styl` down to `css`, say). Alternate plugins run once over the packed
//! artifact instead.
//!
//! Three calling conventions are adapted to one trait at registration:
//! - [`sync_fn`]: a plain function that edits the file in place
//! - [`callback_fn`]: receives the file and a [`Done`] handle to complete later
//! - [`async_fn`]: an async function that returns the rewritten file
//!
//! Registering the same `Arc` twice is a no-op.

use crate::error::{BoxError, KnitError, KnitResult};
use crate::file::File;
use crate::pack::Artifact;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// A per-file transform
#[async_trait]
pub trait Transform: Send + Sync {
    /// Rewrite `file`; `entry` is the build's entry file
    async fn transform(&self, file: &mut File, entry: &File) -> Result<(), BoxError>;
}

/// A transform over the finished artifact
#[async_trait]
pub trait AltTransform: Send + Sync {
    async fn transform(&self, artifact: &mut Artifact, entry: &File) -> Result<(), BoxError>;
}

struct SyncFn<F>(F);

#[async_trait]
impl<F> Transform for SyncFn<F>
where
    F: Fn(&mut File, &File) -> Result<(), BoxError> + Send + Sync,
{
    async fn transform(&self, file: &mut File, entry: &File) -> Result<(), BoxError> {
        (self.0)(file, entry)
    }
}

/// Adapt a synchronous function
pub fn sync_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(&mut File, &File) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(SyncFn(f))
}

/// Completion handle for callback-style transforms
pub struct Done(oneshot::Sender<Result<File, BoxError>>);

impl Done {
    /// Hand the rewritten file back to the pipeline
    pub fn finish(self, file: File) {
        let _ = self.0.send(Ok(file));
    }

    /// Abort the build with `err`
    pub fn fail(self, err: impl Into<BoxError>) {
        let _ = self.0.send(Err(err.into()));
    }
}

struct CallbackFn<F>(F);

#[async_trait]
impl<F> Transform for CallbackFn<F>
where
    F: Fn(File, &File, Done) + Send + Sync,
{
    async fn transform(&self, file: &mut File, entry: &File) -> Result<(), BoxError> {
        let (tx, rx) = oneshot::channel();
        (self.0)(file.clone(), entry, Done(tx));
        *file = rx
            .await
            .map_err(|_| "transform finished without signalling completion")??;
        Ok(())
    }
}

/// Adapt a callback-style function; it must eventually call `finish` or `fail`
pub fn callback_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(File, &File, Done) + Send + Sync + 'static,
{
    Arc::new(CallbackFn(f))
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> Transform for AsyncFn<F>
where
    F: Fn(File, File) -> Fut + Send + Sync,
    Fut: Future<Output = Result<File, BoxError>> + Send,
{
    async fn transform(&self, file: &mut File, entry: &File) -> Result<(), BoxError> {
        *file = (self.0)(file.clone(), entry.clone()).await?;
        Ok(())
    }
}

/// Adapt an async function taking the file and entry by value
pub fn async_fn<F, Fut>(f: F) -> Arc<dyn Transform>
where
    F: Fn(File, File) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<File, BoxError>> + Send + 'static,
{
    Arc::new(AsyncFn(f))
}

struct AltSyncFn<F>(F);

#[async_trait]
impl<F> AltTransform for AltSyncFn<F>
where
    F: Fn(&mut Artifact, &File) -> Result<(), BoxError> + Send + Sync,
{
    async fn transform(&self, artifact: &mut Artifact, entry: &File) -> Result<(), BoxError> {
        (self.0)(artifact, entry)
    }
}

/// Adapt a synchronous function over the artifact
pub fn alt_fn<F>(f: F) -> Arc<dyn AltTransform>
where
    F: Fn(&mut Artifact, &File) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(AltSyncFn(f))
}

/// Ordered, duplicate-free list of registered plugins
pub struct Registry<T: ?Sized> {
    plugins: Vec<Arc<T>>,
}

/// Per-file plugins
pub type Pipeline = Registry<dyn Transform>;

/// Artifact plugins
pub type AltPipeline = Registry<dyn AltTransform>;

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            plugins: self.plugins.clone(),
        }
    }
}

impl<T: ?Sized> Registry<T> {
    /// Register `plugin`; returns false when the same `Arc` is already registered
    pub fn add(&mut self, plugin: Arc<T>) -> bool {
        let ptr = Arc::as_ptr(&plugin).cast::<()>();
        if self.plugins.iter().any(|p| Arc::as_ptr(p).cast::<()>() == ptr) {
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl Registry<dyn Transform> {
    /// Run every plugin over `file`, one at a time
    pub async fn run(&self, file: &mut File, entry: &File) -> KnitResult<()> {
        for plugin in &self.plugins {
            let before = file.kind.clone();
            plugin
                .transform(file, entry)
                .await
                .map_err(|source| KnitError::Transform {
                    file: file.id.clone(),
                    source,
                })?;
            if file.kind != before {
                debug!("{} transformed from {} to {}", file.id, before, file.kind);
            }
        }
        Ok(())
    }
}

impl Registry<dyn AltTransform> {
    /// Run every alternate plugin over the packed artifact
    pub async fn run(&self, artifact: &mut Artifact, entry: &File) -> KnitResult<()> {
        for plugin in &self.plugins {
            plugin
                .transform(artifact, entry)
                .await
                .map_err(|source| KnitError::Transform {
                    file: entry.id.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
