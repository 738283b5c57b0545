//! CLI command implementations

pub mod build;
pub mod cache;
pub mod install;

pub use build::execute as build;
pub use cache::execute as cache;
pub use install::execute as install;

use crate::cache::Mapping;
use crate::error::{KnitError, KnitResult};
use crate::manifest::Manifest;
use console::style;
use std::path::Path;

/// The entry to build when none is given: the root manifest's main script,
/// then its main stylesheet
pub(crate) async fn default_entry(root: &Path, manifest: &str) -> KnitResult<String> {
    let manifest = Manifest::from_file(&root.join(manifest)).await?;
    for kind in ["js", "css"] {
        for candidate in manifest.main_candidates(kind) {
            if root.join(&candidate).is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(KnitError::EntryNotFound("index.js".to_string()))
}

pub(crate) fn print_mapping_json(mapping: &Mapping) -> KnitResult<()> {
    println!("{}", serde_json::to_string_pretty(mapping)?);
    Ok(())
}

pub(crate) fn print_mapping_plain(mapping: &Mapping) {
    for (id, entry) in mapping {
        if entry.entry {
            println!("{} {}", id, style("(entry)").dim());
        } else {
            println!("{}", id);
        }
        for (spec, target) in &entry.deps {
            println!("  {} {} {}", spec, style("->").dim(), target);
        }
    }
}
