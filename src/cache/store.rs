//! Per-file record store
//!
//! Each record lives in its own JSON file under `<install_to>/knit-cache/`,
//! written through a temporary file and an atomic rename. Builds sharing an
//! install directory therefore merge their records key by key; two writers of
//! the same key resolve last-write-wins.

use crate::cache::fingerprint::key_name;
use crate::error::{KnitError, KnitResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Cached result of transforming and parsing one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// File id this record belongs to
    pub id: String,

    /// Fingerprint of the content the record was computed from
    pub hash: String,

    /// Post-transform content kind
    #[serde(rename = "type")]
    pub kind: String,

    /// Post-transform source
    pub src: String,

    /// Require specifier -> resolved id
    pub deps: BTreeMap<String, String>,

    /// Specifiers in `deps` that point at assets
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub assets: BTreeSet<String>,

    /// Whether the file was an entry when recorded
    pub entry: bool,
}

/// One row of the build mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub entry: bool,
    pub deps: BTreeMap<String, String>,
}

/// The externally observed `{id -> {entry, deps}}` table
pub type Mapping = BTreeMap<String, MappingEntry>;

/// Record store scoped to one install directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    install_dir: PathBuf,
    dir: PathBuf,
    enabled: bool,
}

impl CacheStore {
    /// Store for the install directory `install_dir`, keeping records in `dir`
    pub fn new(install_dir: impl Into<PathBuf>, dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            install_dir: install_dir.into(),
            dir: dir.into(),
            enabled,
        }
    }

    /// Whether reads and writes reach the disk
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the record for `id`. Unreadable records count as misses.
    pub async fn read(&self, id: &str) -> KnitResult<Option<Record>> {
        if !self.enabled {
            return Ok(None);
        }

        let path = self.dir.join(key_name(id));
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KnitError::io(
                    format!("reading cache record {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str::<Record>(&content) {
            Ok(record) if record.id == id => Ok(Some(record)),
            Ok(record) => {
                warn!("Cache key collision: {} stored under {}", record.id, id);
                Ok(None)
            }
            Err(e) => {
                warn!("Ignoring corrupt cache record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Upsert the record for `record.id`
    pub async fn write(&self, record: &Record) -> KnitResult<()> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            KnitError::io(format!("creating cache directory {}", self.dir.display()), e)
        })?;

        let name = key_name(&record.id);
        let path = self.dir.join(&name);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

        let content = serde_json::to_string(record)?;
        fs::write(&tmp, content)
            .await
            .map_err(|e| KnitError::io(format!("writing cache record {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(KnitError::io(
                format!("replacing cache record {}", path.display()),
                e,
            ));
        }

        debug!("Cached {}", record.id);
        Ok(())
    }

    /// Every record currently persisted, keyed by id
    pub async fn read_all(&self) -> KnitResult<BTreeMap<String, Record>> {
        let mut records = BTreeMap::new();
        if !self.enabled {
            return Ok(records);
        }

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(KnitError::io("reading cache directory", e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KnitError::io("reading cache entry", e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                // Removed by a concurrent clean
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(KnitError::io(
                        format!("reading cache record {}", path.display()),
                        e,
                    ))
                }
            };
            match serde_json::from_str::<Record>(&content) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => warn!("Ignoring corrupt cache record {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }

    /// The mapping table derived from every persisted record
    pub async fn mapping(&self) -> KnitResult<Mapping> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .map(|(id, record)| {
                (
                    id,
                    MappingEntry {
                        entry: record.entry,
                        deps: record.deps,
                    },
                )
            })
            .collect())
    }

    /// Remove every record and every installed package.
    ///
    /// A missing install directory is not an error.
    pub async fn clean(&self) -> KnitResult<()> {
        match fs::remove_dir_all(&self.install_dir).await {
            Ok(()) => {
                debug!("Removed {}", self.install_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KnitError::io(
                format!("removing {}", self.install_dir.display()),
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir, enabled: bool) -> CacheStore {
        let install = temp.path().join("components");
        CacheStore::new(&install, install.join("knit-cache"), enabled)
    }

    fn record(id: &str, entry: bool) -> Record {
        Record {
            id: id.to_string(),
            hash: "abc".to_string(),
            kind: "js".to_string(),
            src: "module.exports = 1".to_string(),
            deps: BTreeMap::from([("./a".to_string(), "a.js".to_string())]),
            assets: BTreeSet::new(),
            entry,
        }
    }

    #[tokio::test]
    async fn write_then_read() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, true);

        store.write(&record("index.js", true)).await.unwrap();
        let read = store.read("index.js").await.unwrap().unwrap();
        assert_eq!(read, record("index.js", true));
        assert!(store.read("other.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_are_per_key() {
        let temp = TempDir::new().unwrap();
        let a = store(&temp, true);
        let b = store(&temp, true);

        let index = record("index.js", true);
        let admin = record("admin.js", true);
        let (ra, rb) = tokio::join!(a.write(&index), b.write(&admin));
        ra.unwrap();
        rb.unwrap();

        let mapping = a.mapping().await.unwrap();
        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            vec!["admin.js", "index.js"]
        );
        assert!(mapping["admin.js"].entry);
    }

    #[tokio::test]
    async fn disabled_store_misses_and_drops_writes() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, false);

        store.write(&record("index.js", true)).await.unwrap();
        assert!(store.read("index.js").await.unwrap().is_none());
        assert!(store.mapping().await.unwrap().is_empty());
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn corrupt_record_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, true);
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join(key_name("index.js")), "{not json").unwrap();

        assert!(store.read("index.js").await.unwrap().is_none());
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clean_removes_install_dir_and_tolerates_absence() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, true);

        store.clean().await.unwrap();

        store.write(&record("index.js", false)).await.unwrap();
        assert!(store.dir().exists());
        store.clean().await.unwrap();
        assert!(!temp.path().join("components").exists());
    }
}
