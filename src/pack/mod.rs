//! Artifact packing
//!
//! The entry's post-transform kind picks the packer: scripts become a module
//! registry, stylesheets are concatenated. Any other kind is emitted as the
//! entry's own source. Assets are materialized as part of packing.

pub mod assets;
pub mod css;
pub mod js;
pub mod sourcemap;

use crate::config::SourceMapMode;
use crate::error::KnitResult;
use crate::graph::Graph;
use crate::layout::Layout;
use serde::Serialize;
use sourcemap::Emitter;
use std::path::Path;
use tracing::debug;

/// The result of a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Packed source
    pub code: String,
    /// External source map JSON, when source maps are external
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    /// Kind of `code` (`js`, `css`, ...)
    #[serde(rename = "type")]
    pub kind: String,
}

/// Packs a finished graph
#[derive(Debug, Clone, Copy)]
pub struct Packer<'a> {
    pub layout: &'a Layout,
    pub global: Option<&'a str>,
    pub source_map: SourceMapMode,
    pub copy: bool,
}

impl Packer<'_> {
    pub async fn pack(&self, graph: &Graph) -> KnitResult<Artifact> {
        let kind = graph.kind().to_string();
        let mut emitter = Emitter::new(self.source_map != SourceMapMode::Off);

        match kind.as_str() {
            "js" => js::pack(graph, self.global, &mut emitter),
            "css" => css::pack(graph, &mut emitter),
            _ => {
                if let Some(entry) = graph.entry_file() {
                    let raw = entry.raw.as_deref().unwrap_or(&entry.src);
                    emitter.mapped(&entry.id, raw, &entry.src, 0);
                }
            }
        }

        let written = assets::materialize(self.layout, graph.assets(), self.copy).await?;
        debug!("Packed {} ({} assets)", graph.entry, written.len());

        let name = output_name(&graph.entry, &kind);
        let (mut code, map) = emitter.finish(&name);
        let map = match (self.source_map, map) {
            (SourceMapMode::External, Some(map)) => {
                code.push_str(&sourcemap::external_comment(&kind, &format!("{}.map", file_name(&name))));
                Some(map)
            }
            (SourceMapMode::Inline, Some(map)) => {
                code.push_str(&sourcemap::inline_comment(&kind, &map));
                None
            }
            _ => None,
        };

        Ok(Artifact { code, map, kind })
    }
}

/// Build-relative output path for an entry: its id with the extension
/// replaced by the packed kind
pub fn output_name(entry: &str, kind: &str) -> String {
    let cleaned: String = entry.chars().filter(|c| !matches!(c, '<' | '>')).collect();
    let path = Path::new(&cleaned);
    let renamed = if kind.is_empty() {
        path.to_path_buf()
    } else {
        path.with_extension(kind)
    };
    crate::layout::slashed(&renamed)
}

fn file_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
