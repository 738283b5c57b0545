//! The build instance
//!
//! A `Knit` owns one project's options, its single entry, its plugins and its
//! includes. Each `run` builds a fresh graph, so per-build state never leaks
//! between runs or instances; only the cache store and the install directory
//! are shared, through the filesystem.

use crate::cache::fingerprint;
use crate::cache::{CacheStore, Mapping};
use crate::config::{BuildOptions, SourceMapMode};
use crate::error::{KnitError, KnitResult};
use crate::extract::{Extractor, Extractors};
use crate::file::{kind_of, File};
use crate::graph::{Graph, GraphBuilder, Include};
use crate::install::{GithubTransport, Installer, MirrorTransport, Transport};
use crate::layout::Layout;
use crate::pack::{output_name, Artifact, Packer};
use crate::transform::{AltPipeline, AltTransform, Pipeline, Transform};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// What a build starts from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A file, relative to the root
    Path(String),
    /// In-memory source of the given kind
    Source { src: String, kind: String },
}

/// One build instance
#[derive(Clone)]
pub struct Knit {
    root: PathBuf,
    options: BuildOptions,
    entry: Option<Entry>,
    plugins: Pipeline,
    alternates: AltPipeline,
    includes: BTreeMap<String, Include>,
    extractors: Extractors,
    transport: Option<Arc<dyn Transport>>,
}

impl Knit {
    /// A build rooted at `root` with default options
    pub fn new(root: impl Into<PathBuf>) -> KnitResult<Self> {
        Self::from_options(BuildOptions::with_root(root))
    }

    /// A build from fully specified options; `options.root` is required
    pub fn from_options(options: BuildOptions) -> KnitResult<Self> {
        let root = match &options.root {
            Some(root) if !root.as_os_str().is_empty() => root.clone(),
            _ => return Err(KnitError::MissingRoot),
        };
        if options.install_to.trim().is_empty() {
            return Err(KnitError::OptionInvalid {
                name: "install_to".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(Self {
            root,
            options,
            entry: None,
            plugins: Pipeline::default(),
            alternates: AltPipeline::default(),
            includes: BTreeMap::new(),
            extractors: Extractors::default(),
            transport: None,
        })
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Entry

    /// Build from the file at `path`, replacing any previous entry
    pub fn entry(&mut self, path: impl Into<String>) -> &mut Self {
        self.entry = Some(Entry::Path(path.into()));
        self
    }

    /// Build from in-memory `src` of `kind`, replacing any previous entry
    pub fn entry_source(&mut self, src: impl Into<String>, kind: impl Into<String>) -> &mut Self {
        self.entry = Some(Entry::Source {
            src: src.into(),
            kind: kind.into(),
        });
        self
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.entry.as_ref()
    }

    // Options

    pub fn manifest(&self) -> &str {
        &self.options.manifest
    }

    pub fn set_manifest(&mut self, manifest: impl Into<String>) -> &mut Self {
        self.options.manifest = manifest.into();
        self
    }

    pub fn global(&self) -> Option<&str> {
        self.options.global.as_deref()
    }

    pub fn set_global(&mut self, name: impl Into<String>) -> &mut Self {
        self.options.global = Some(name.into());
        self
    }

    pub fn install_to(&self) -> &str {
        &self.options.install_to
    }

    pub fn set_install_to(&mut self, dir: impl Into<String>) -> &mut Self {
        self.options.install_to = dir.into();
        self
    }

    pub fn build_to(&self) -> &str {
        &self.options.build_to
    }

    pub fn set_build_to(&mut self, dir: impl Into<String>) -> &mut Self {
        self.options.build_to = dir.into();
        self
    }

    pub fn copy(&self) -> bool {
        self.options.copy
    }

    pub fn set_copy(&mut self, copy: bool) -> &mut Self {
        self.options.copy = copy;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.options.concurrency
    }

    pub fn set_concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.options.concurrency = concurrency;
        self
    }

    pub fn development(&self) -> bool {
        self.options.development
    }

    pub fn set_development(&mut self, development: bool) -> &mut Self {
        self.options.development = development;
        self
    }

    pub fn cache(&self) -> bool {
        self.options.cache
    }

    pub fn set_cache(&mut self, cache: bool) -> &mut Self {
        self.options.cache = cache;
        self
    }

    pub fn update(&self) -> bool {
        self.options.update
    }

    pub fn set_update(&mut self, update: bool) -> &mut Self {
        self.options.update = update;
        self
    }

    pub fn source_map(&self) -> SourceMapMode {
        self.options.source_map
    }

    pub fn set_source_map(&mut self, mode: impl Into<SourceMapMode>) -> &mut Self {
        self.options.source_map = mode.into();
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.options.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.options.token = Some(token.into());
        self
    }

    /// Fetch packages through `transport` instead of the configured one
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    // Paths

    /// Current directory layout
    pub fn layout(&self) -> Layout {
        Layout {
            root: self.root.clone(),
            install_to: self.options.install_to.clone(),
            build_to: self.options.build_to.clone(),
            manifest: self.options.manifest.clone(),
        }
    }

    /// `rel` resolved against the root
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.layout().path(rel)
    }

    /// `rel` resolved against the install directory
    pub fn install_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.layout().install_path(rel)
    }

    /// `rel` resolved against the build directory
    pub fn build_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.layout().build_path(rel)
    }

    /// SHA-256 hex digest of `content`
    pub fn hash(content: impl AsRef<[u8]>) -> String {
        fingerprint::digest(content.as_ref())
    }

    // Plugins

    /// Register a per-file transform. Registering the same `Arc` again is a no-op.
    pub fn use_plugin(&mut self, plugin: Arc<dyn Transform>) -> &mut Self {
        if !self.plugins.add(plugin) {
            debug!("Plugin already registered");
        }
        self
    }

    /// Register a transform over the packed artifact
    pub fn use_alternate(&mut self, plugin: Arc<dyn AltTransform>) -> &mut Self {
        self.alternates.add(plugin);
        self
    }

    pub fn plugins(&self) -> &Pipeline {
        &self.plugins
    }

    pub fn alternates(&self) -> &AltPipeline {
        &self.alternates
    }

    /// Extract requires from files of `kind` with `extractor`
    pub fn use_extractor(&mut self, kind: impl Into<String>, extractor: Arc<dyn Extractor>) -> &mut Self {
        self.extractors.register(kind, extractor);
        self
    }

    /// Make `src` requirable as `name` without a file on disk. The kind
    /// defaults to the name's extension, or `js`.
    pub fn include(&mut self, name: impl Into<String>, src: impl Into<String>, kind: Option<&str>) -> &mut Self {
        let name = name.into();
        let kind = match kind {
            Some(kind) => kind.to_string(),
            None => Some(kind_of(Path::new(&name)))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| "js".to_string()),
        };
        self.includes.insert(
            name,
            Include {
                src: src.into(),
                kind,
            },
        );
        self
    }

    /// Source of the include registered as `name`
    pub fn included(&self, name: &str) -> Option<&str> {
        self.includes.get(name).map(|i| i.src.as_str())
    }

    // Cache

    /// The record store for the current install directory
    pub fn cache_store(&self) -> CacheStore {
        let layout = self.layout();
        CacheStore::new(layout.install_path(""), layout.cache_dir(), self.options.cache)
    }

    /// Remove every record and installed package
    pub async fn clean_cache(&self) -> KnitResult<()> {
        info!("Cleaning {}", self.install_path("").display());
        CacheStore::new(self.install_path(""), self.layout().cache_dir(), true)
            .clean()
            .await
    }

    /// `{id -> {entry, deps}}` of every persisted record
    pub async fn mapping(&self) -> KnitResult<Mapping> {
        self.cache_store().mapping().await
    }

    // Building

    /// Build the dependency graph; `None` when no entry is set
    pub async fn graph(&self) -> KnitResult<Option<Graph>> {
        let Some(entry) = self.entry_file()? else {
            return Ok(None);
        };
        let layout = self.layout();
        let cache = self.cache_store();
        let installer = Installer::new(
            self.transport(),
            layout.install_path(""),
            self.options.concurrency,
        );
        let builder = GraphBuilder::new(
            &layout,
            &self.plugins,
            &self.extractors,
            &self.includes,
            &cache,
            &installer,
            self.options.development,
            self.options.update,
        );
        builder.build(entry).await.map(Some)
    }

    /// Build and pack. Without an entry the artifact is empty.
    pub async fn run(&self) -> KnitResult<Artifact> {
        let Some(graph) = self.graph().await? else {
            return Ok(Artifact::default());
        };
        let layout = self.layout();
        let packer = Packer {
            layout: &layout,
            global: self.options.global.as_deref(),
            source_map: self.options.source_map,
            copy: self.options.copy,
        };
        let mut artifact = packer.pack(&graph).await?;
        if let Some(entry) = graph.entry_file() {
            self.alternates.run(&mut artifact, entry).await?;
        }
        Ok(artifact)
    }

    /// Resolve and install the whole graph without packing it
    pub async fn install(&self) -> KnitResult<Mapping> {
        Ok(self
            .graph()
            .await?
            .map(|graph| graph.mapping())
            .unwrap_or_default())
    }

    /// Build, pack and write the artifact. A relative `path` is resolved
    /// against the build directory; by default the entry's id is used with
    /// the packed kind as extension.
    pub async fn write(&self, path: Option<&Path>) -> KnitResult<Artifact> {
        let artifact = self.run().await?;
        let (Some(entry_id), Some(target)) = (self.entry_id(), self.output_path(&artifact.kind, path))
        else {
            return Ok(artifact);
        };

        let name = output_name(&entry_id, &artifact.kind);
        let dir = target.parent().map(Path::to_path_buf).unwrap_or_else(|| self.build_path(""));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| KnitError::io(format!("creating {}", dir.display()), e))?;
        fs::write(&target, &artifact.code)
            .await
            .map_err(|e| KnitError::io(format!("writing {}", target.display()), e))?;
        info!("Wrote {}", target.display());

        if let Some(map) = &artifact.map {
            let map_name = format!("{}.map", name.rsplit('/').next().unwrap_or(&name));
            let map_path = dir.join(map_name);
            fs::write(&map_path, map)
                .await
                .map_err(|e| KnitError::io(format!("writing {}", map_path.display()), e))?;
            debug!("Wrote {}", map_path.display());
        }
        Ok(artifact)
    }

    /// Where `write` puts an artifact of `kind`; `None` without an entry
    pub fn output_path(&self, kind: &str, path: Option<&Path>) -> Option<PathBuf> {
        let entry_id = self.entry_id()?;
        Some(match path {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.build_path(path),
            None => self.build_path(output_name(&entry_id, kind)),
        })
    }

    fn transport(&self) -> Arc<dyn Transport> {
        if let Some(transport) = &self.transport {
            return transport.clone();
        }
        match &self.options.mirror {
            Some(mirror) => Arc::new(MirrorTransport::new(self.path(mirror))),
            None => Arc::new(GithubTransport::new(self.options.token.clone())),
        }
    }

    fn entry_id(&self) -> Option<String> {
        match self.entry.as_ref()? {
            Entry::Path(path) => Some(self.layout().id_for(&self.path(path))),
            Entry::Source { kind, .. } => Some(source_entry_id(kind)),
        }
    }

    fn entry_file(&self) -> KnitResult<Option<File>> {
        let install_to = &self.options.install_to;
        match &self.entry {
            None => Ok(None),
            Some(Entry::Path(rel)) => {
                let path = self.path(rel);
                if !path.is_file() {
                    return Err(KnitError::EntryNotFound(rel.clone()));
                }
                let id = self.layout().id_for(&path);
                Ok(Some(File::from_path(id, path, install_to)))
            }
            Some(Entry::Source { src, kind }) => {
                let id = source_entry_id(kind);
                let path = self.path(&id);
                Ok(Some(File::from_source(id, path, src.clone(), kind.clone(), install_to)))
            }
        }
    }
}

/// Id given to an in-memory entry
fn source_entry_id(kind: &str) -> String {
    format!("<entry>.{}", kind)
}
