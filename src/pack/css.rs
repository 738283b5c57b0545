//! Stylesheet packing
//!
//! Starting at the entry, every resolved `@import` is replaced by the
//! imported file's own (recursively packed) rules, each file at most once.
//! Assets land in the build directory at their id, and the packed stylesheet
//! lands next to the entry's id, so resolved `url()` references are rewritten
//! to the asset's path relative to the entry's directory. Anything unresolved
//! or external is left exactly as written.

use super::sourcemap::Emitter;
use crate::extract::css::{imports, urls, Reference};
use crate::file::File;
use crate::graph::Graph;
use std::collections::HashSet;

enum Edit<'a> {
    Import(&'a Reference),
    Url(&'a Reference),
}

/// Emit the concatenated stylesheet for `graph`
pub fn pack(graph: &Graph, emitter: &mut Emitter) {
    let mut inlined = HashSet::new();
    let base = graph.entry.rsplit_once('/').map_or("", |(dir, _)| dir);
    emit(graph, &graph.entry, base, &mut inlined, emitter);
}

fn emit<'g>(
    graph: &'g Graph,
    id: &'g str,
    base: &str,
    inlined: &mut HashSet<&'g str>,
    emitter: &mut Emitter,
) {
    if !inlined.insert(id) {
        return;
    }
    let Some(file) = graph.files.get(id) else {
        return;
    };

    let src = file.src.as_str();
    let import_refs = imports(src);
    let url_refs = urls(src);
    let mut edits: Vec<Edit<'_>> = import_refs
        .iter()
        .map(Edit::Import)
        .chain(url_refs.iter().map(Edit::Url))
        .collect();
    edits.sort_by_key(|edit| match edit {
        Edit::Import(r) | Edit::Url(r) => r.span.start,
    });

    let mut cursor = 0;
    for edit in edits {
        let reference = match &edit {
            Edit::Import(r) | Edit::Url(r) => *r,
        };
        let Some(target) = file.deps.get(&reference.specifier) else {
            continue;
        };

        chunk(file, cursor, reference.span.start, emitter);
        match edit {
            Edit::Import(_) => {
                let before = emitter.code().len();
                emit(graph, target, base, inlined, emitter);
                let code = emitter.code();
                if code.len() > before && !code.ends_with('\n') {
                    emitter.raw("\n");
                }
            }
            Edit::Url(r) => emitter.raw(&rewrite_url(r, &relative_to(base, target))),
        }
        cursor = reference.span.end;
    }
    chunk(file, cursor, src.len(), emitter);
}

/// Copy `file.src[start..end]` through, mapped to its source lines
fn chunk(file: &File, start: usize, end: usize, emitter: &mut Emitter) {
    if start >= end {
        return;
    }
    let text = &file.src[start..end];
    let first_line = file.src[..start].matches('\n').count();
    let raw = file.raw.as_deref().unwrap_or(&file.src);
    emitter.mapped(&file.id, raw, text, first_line);
}

/// `id` as seen from the build directory `base`; both are build relative
fn relative_to(base: &str, id: &str) -> String {
    let from: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = id.split('/').collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts = vec![".."; from.len() - common];
    parts.extend(&to[common..]);
    parts.join("/")
}

/// `url(...)` pointing at `id`, keeping the original quoting and any
/// `?query` or `#hash` suffix
fn rewrite_url(reference: &Reference, id: &str) -> String {
    let suffix = reference
        .specifier
        .find(['?', '#'])
        .map_or("", |at| &reference.specifier[at..]);
    match reference.quote {
        Some(q) => format!("url({q}{id}{suffix}{q})"),
        None => format!("url({id}{suffix})"),
    }
}
