//! Dependency graph construction
//!
//! Starting from the entry, every reachable file is read, transformed,
//! scanned for requires and its requires resolved (installing remote packages
//! on demand), breadth first. Files already visited in this build are not
//! processed again, so cycles terminate. A file whose fingerprint matches its
//! cache record skips the transform and extraction steps.

use crate::cache::fingerprint::file_fingerprint;
use crate::cache::{CacheStore, Mapping, MappingEntry, Record};
use crate::error::{KnitError, KnitResult};
use crate::extract::{Extractors, Require};
use crate::file::File;
use crate::install::Installer;
use crate::layout::Layout;
use crate::manifest::Manifest;
use crate::resolve::{self, RequireKind, Resolution, Resolver, Target};
use crate::transform::Pipeline;
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// An in-memory source registered with `include`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub src: String,
    pub kind: String,
}

/// The finished graph of one build
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Id of the entry file
    pub entry: String,
    /// Every reachable file and asset, by id
    pub files: BTreeMap<String, File>,
}

impl Graph {
    pub fn entry_file(&self) -> Option<&File> {
        self.files.get(&self.entry)
    }

    /// Post-transform kind of the entry, which decides how the graph is packed
    pub fn kind(&self) -> &str {
        self.entry_file().map(|f| f.kind.as_str()).unwrap_or_default()
    }

    /// Referenced assets
    pub fn assets(&self) -> impl Iterator<Item = &File> {
        self.files.values().filter(|f| f.asset)
    }

    /// `{id -> {entry, deps}}` for every module in the graph
    pub fn mapping(&self) -> Mapping {
        self.files
            .values()
            .filter(|f| !f.asset)
            .map(|f| {
                (
                    f.id.clone(),
                    MappingEntry {
                        entry: f.entry,
                        deps: f.deps.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Per-build state for walking the graph
pub struct GraphBuilder<'a> {
    layout: &'a Layout,
    pipeline: &'a Pipeline,
    extractors: &'a Extractors,
    includes: &'a BTreeMap<String, Include>,
    include_names: BTreeSet<String>,
    cache: &'a CacheStore,
    installer: &'a Installer,
    development: bool,
    update: bool,
    manifests: Mutex<HashMap<PathBuf, Arc<Manifest>>>,
}

impl<'a> GraphBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        layout: &'a Layout,
        pipeline: &'a Pipeline,
        extractors: &'a Extractors,
        includes: &'a BTreeMap<String, Include>,
        cache: &'a CacheStore,
        installer: &'a Installer,
        development: bool,
        update: bool,
    ) -> Self {
        Self {
            layout,
            pipeline,
            extractors,
            includes,
            include_names: includes.keys().cloned().collect(),
            cache,
            installer,
            development,
            update,
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// Build the graph reachable from `entry`
    pub async fn build(&self, mut entry: File) -> KnitResult<Graph> {
        if !entry.exists() {
            return Err(KnitError::EntryNotFound(entry.id.clone()));
        }
        entry.entry = true;
        entry.read().await?;
        let root = entry.clone();
        debug!("Building graph from {}", root.id);

        let mut graph = Graph {
            entry: entry.id.clone(),
            files: BTreeMap::new(),
        };
        let mut visited = HashSet::from([entry.id.clone()]);
        let mut level = vec![entry];

        while !level.is_empty() {
            let processed = try_join_all(level.into_iter().map(|file| self.process(file, &root))).await?;

            let mut next = Vec::new();
            for (file, children) in processed {
                for child in children {
                    if visited.insert(child.id.clone()) {
                        if child.asset {
                            graph.files.insert(child.id.clone(), child);
                        } else {
                            next.push(child);
                        }
                    }
                }
                graph.files.insert(file.id.clone(), file);
            }
            level = next;
        }

        debug!("Graph of {} complete: {} files", graph.entry, graph.files.len());
        Ok(graph)
    }

    /// Transform and resolve one file, returning it with its unvisited children
    async fn process(&self, mut file: File, entry: &File) -> KnitResult<(File, Vec<File>)> {
        let raw = file.read().await?.to_string();
        let manifest = self.manifest_for(&file).await?;
        let included = self.includes.contains_key(&file.id);
        let hash = file_fingerprint(&raw, &file.kind, &manifest.digest);

        if !included && !self.update {
            if let Some(record) = self.cache.read(&file.id).await? {
                if record.hash == hash && self.deps_exist(&record) {
                    debug!("Cache hit: {}", file.id);
                    file.kind = record.kind;
                    file.src = record.src;
                    file.deps = record.deps;
                    file.asset_deps = record.assets;
                    if record.entry != file.entry {
                        self.record(&file, &hash).await?;
                    }
                    let children = self.children(&file);
                    return Ok((file, children));
                }
            }
        }
        debug!("Cache miss: {}", file.id);

        self.pipeline.run(&mut file, entry).await?;
        let requires = self.extractors.extract(&file.kind, &file.src);
        let targets = try_join_all(
            requires
                .iter()
                .map(|require| self.resolve_require(&file, &manifest, require)),
        )
        .await?;

        for (require, target) in requires.iter().zip(targets) {
            let Some(target) = target else { continue };
            if require.kind == RequireKind::Asset {
                file.asset_deps.insert(require.specifier.clone());
            }
            file.deps.insert(require.specifier.clone(), target.id);
        }

        if !included {
            self.record(&file, &hash).await?;
        }
        let children = self.children(&file);
        Ok((file, children))
    }

    async fn record(&self, file: &File, hash: &str) -> KnitResult<()> {
        self.cache
            .write(&Record {
                id: file.id.clone(),
                hash: hash.to_string(),
                kind: file.kind.clone(),
                src: file.src.clone(),
                deps: file.deps.clone(),
                assets: file.asset_deps.clone(),
                entry: file.entry,
            })
            .await
    }

    /// Resolve one require, installing its package when needed. `None` means
    /// the reference is passed through untouched.
    async fn resolve_require(
        &self,
        file: &File,
        manifest: &Manifest,
        require: &Require,
    ) -> KnitResult<Option<Target>> {
        let resolver = Resolver::new(self.layout, &self.include_names, self.development, self.update);
        let resolution = match resolver
            .resolve(&require.specifier, file, manifest, require.kind)
            .await?
        {
            Resolution::Fetch(request) => match self.installer.install(&request).await {
                Ok(dir) => {
                    resolver
                        .resolve_in_package(&dir, request.subpath.as_deref(), &file.kind, require.kind)
                        .await?
                }
                Err(e) if require.kind == RequireKind::Asset => {
                    debug!("No package for asset {:?}: {}", require.specifier, e);
                    Resolution::NotFound
                }
                Err(e) => return Err(e),
            },
            other => other,
        };

        match resolution {
            Resolution::Found(target) => Ok(Some(target)),
            Resolution::External => Ok(None),
            Resolution::NotFound if require.kind == RequireKind::Asset => {
                warn!(
                    "Leaving unresolved asset {:?} in {} untouched",
                    require.specifier, file.id
                );
                Ok(None)
            }
            Resolution::NotFound | Resolution::Fetch(_) => {
                Err(resolve::not_found(&require.specifier, file))
            }
        }
    }

    /// Files for every dependency of `file`
    fn children(&self, file: &File) -> Vec<File> {
        file.deps
            .iter()
            .map(|(spec, id)| {
                let mut child = match self.includes.get(id) {
                    Some(include) => File::from_source(
                        id.clone(),
                        self.layout.path(id),
                        include.src.clone(),
                        include.kind.clone(),
                        &self.layout.install_to,
                    ),
                    None => File::from_path(id.clone(), self.layout.path_for(id), &self.layout.install_to),
                };
                child.asset = file.asset_deps.contains(spec);
                child
            })
            .collect()
    }

    fn deps_exist(&self, record: &Record) -> bool {
        record
            .deps
            .values()
            .all(|id| self.includes.contains_key(id) || self.layout.path_for(id).exists())
    }

    /// Manifest governing `file`: the root manifest for local files, the
    /// package manifest for installed ones
    async fn manifest_for(&self, file: &File) -> KnitResult<Arc<Manifest>> {
        let dir = match self.layout.package_segment(&file.id) {
            Some(segment) => self.layout.install_path(segment),
            None => self.layout.root.clone(),
        };
        let path = dir.join(&self.layout.manifest);

        if let Some(manifest) = self.cached_manifest(&path) {
            return Ok(manifest);
        }
        let manifest = Arc::new(Manifest::from_file(&path).await?);
        self.manifests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path, manifest.clone());
        Ok(manifest)
    }

    fn cached_manifest(&self, path: &Path) -> Option<Arc<Manifest>> {
        self.manifests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::MirrorTransport;
    use crate::transform::sync_fn;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        layout: Layout,
        pipeline: Pipeline,
        extractors: Extractors,
        includes: BTreeMap<String, Include>,
        cache: CacheStore,
        installer: Installer,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let layout = Layout {
                root: temp.path().to_path_buf(),
                install_to: "components".into(),
                build_to: "build".into(),
                manifest: "component.json".into(),
            };
            let cache = CacheStore::new(layout.install_path(""), layout.cache_dir(), true);
            let installer = Installer::new(
                Arc::new(MirrorTransport::new(temp.path().join("mirror"))),
                layout.install_path(""),
                4,
            );
            Self {
                temp,
                layout,
                pipeline: Pipeline::default(),
                extractors: Extractors::default(),
                includes: BTreeMap::new(),
                cache,
                installer,
            }
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.temp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn entry(&self, rel: &str) -> File {
            File::from_path(rel, self.temp.path().join(rel), "components")
        }

        fn builder(&self) -> GraphBuilder<'_> {
            GraphBuilder::new(
                &self.layout,
                &self.pipeline,
                &self.extractors,
                &self.includes,
                &self.cache,
                &self.installer,
                false,
                false,
            )
        }
    }

    #[tokio::test]
    async fn walks_local_requires() {
        let fx = Fixture::new();
        fx.write("index.js", "require('./one'); require('./two');");
        fx.write("one.js", "module.exports = 'one';");
        fx.write("two.js", "module.exports = require('./one');");

        let graph = fx.builder().build(fx.entry("index.js")).await.unwrap();
        let ids: Vec<_> = graph.files.keys().cloned().collect();
        assert_eq!(ids, vec!["index.js", "one.js", "two.js"]);
        assert!(graph.files["index.js"].entry);
        assert!(!graph.files["one.js"].entry);
        assert_eq!(graph.files["two.js"].deps["./one"], "one.js");
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let fx = Fixture::new();
        fx.write("a.js", "require('./b');");
        fx.write("b.js", "require('./a');");
        let graph = fx.builder().build(fx.entry("a.js")).await.unwrap();
        assert_eq!(graph.files.len(), 2);
    }

    #[tokio::test]
    async fn missing_entry_fails_before_transforms() {
        let mut fx = Fixture::new();
        fx.pipeline.add(sync_fn(|_, _| panic!("must not run")));
        let err = fx.builder().build(fx.entry("zomg.js")).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot find entry: zomg.js");
    }

    #[tokio::test]
    async fn unresolved_requires_are_terminal() {
        let fx = Fixture::new();
        fx.write("index.js", "require('./missing');");
        let err = fx.builder().build(fx.entry("index.js")).await.unwrap_err();
        assert!(matches!(err, KnitError::UnresolvedPath { .. }));

        fx.write("index.js", "require('nope/nope');");
        let err = fx.builder().build(fx.entry("index.js")).await.unwrap_err();
        assert!(matches!(err, KnitError::Fetch { .. }));
    }

    #[tokio::test]
    async fn installs_remote_packages() {
        let fx = Fixture::new();
        fx.write("mirror/component/type/1.0.0/index.js", "module.exports = 'type';");
        fx.write("index.js", "require('component/type@1.0.0');");

        let graph = fx.builder().build(fx.entry("index.js")).await.unwrap();
        let id = "components/component-type@1.0.0/index.js";
        assert_eq!(graph.files["index.js"].deps["component/type@1.0.0"], id);
        assert!(graph.files[id].is_remote());
    }

    #[tokio::test]
    async fn cached_records_skip_transforms() {
        let mut fx = Fixture::new();
        fx.write("index.js", "module.exports = 1;");
        fx.builder().build(fx.entry("index.js")).await.unwrap();

        fx.pipeline.add(sync_fn(|_, _| panic!("must not run")));
        let graph = fx.builder().build(fx.entry("index.js")).await.unwrap();
        assert_eq!(graph.files["index.js"].src, "module.exports = 1;");
    }

    #[tokio::test]
    async fn extraction_sees_transformed_kind() {
        let mut fx = Fixture::new();
        fx.write("index.styl", "@import './a.css'");
        fx.write("a.css", "a { color: red; }");
        fx.pipeline.add(sync_fn(|file, _| {
            if file.kind == "styl" {
                file.kind = "css".into();
                file.src = format!("{};\n", file.src);
            }
            Ok(())
        }));

        let graph = fx.builder().build(fx.entry("index.styl")).await.unwrap();
        assert_eq!(graph.kind(), "css");
        assert_eq!(graph.files["index.styl"].deps["./a.css"], "a.css");
    }

    #[tokio::test]
    async fn includes_resolve_without_disk() {
        let mut fx = Fixture::new();
        fx.write("index.js", "require('virtual');");
        fx.includes.insert(
            "virtual".into(),
            Include {
                src: "module.exports = 'v';".into(),
                kind: "js".into(),
            },
        );
        let graph = fx.builder().build(fx.entry("index.js")).await.unwrap();
        assert_eq!(graph.files["virtual"].src, "module.exports = 'v';");
    }

    #[tokio::test]
    async fn css_assets_are_leaves() {
        let fx = Fixture::new();
        fx.write("index.css", ".a { background: url(duo.png); } .b { background: url(gone.png); }");
        fx.write("duo.png", "png");

        let graph = fx.builder().build(fx.entry("index.css")).await.unwrap();
        let assets: Vec<_> = graph.assets().map(|f| f.id.clone()).collect();
        assert_eq!(assets, vec!["duo.png"]);
        assert!(!graph.mapping().contains_key("duo.png"));
    }

    #[tokio::test]
    async fn css_references_are_paths_first() {
        let fx = Fixture::new();
        fx.write(
            "index.css",
            "@import \"b.css\";\n.a { background: url(images/logo.png); }\n.b { background: url(images/gone.png); }\n",
        );
        fx.write("b.css", "b { color: red; }");
        fx.write("images/logo.png", "png");

        let graph = fx.builder().build(fx.entry("index.css")).await.unwrap();
        let index = &graph.files["index.css"];
        assert_eq!(index.deps["b.css"], "b.css");
        assert_eq!(index.deps["images/logo.png"], "images/logo.png");
        assert!(!index.deps.contains_key("images/gone.png"));
        assert!(graph.files["images/logo.png"].asset);
    }

    #[tokio::test]
    async fn css_falls_back_to_packages() {
        let fx = Fixture::new();
        fx.write("mirror/necolas/normalize.css/3.0.2/index.css", "html {}");
        fx.write("index.css", "@import 'necolas/normalize.css@3.0.2';\n");

        let graph = fx.builder().build(fx.entry("index.css")).await.unwrap();
        assert_eq!(
            graph.files["index.css"].deps["necolas/normalize.css@3.0.2"],
            "components/necolas-normalize.css@3.0.2/index.css"
        );
    }
}
