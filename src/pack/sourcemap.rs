//! Source map v3 generation
//!
//! The packers never reorder lines inside a file, so every mapping is a
//! line-to-line identity from a chunk of the output back to its source.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::collections::HashMap;

/// Output text with optional line mappings
#[derive(Debug, Default)]
pub struct Emitter {
    code: String,
    line: usize,
    column: usize,
    map: Option<MapBuilder>,
}

#[derive(Debug, Default)]
struct MapBuilder {
    sources: Vec<String>,
    contents: Vec<String>,
    index: HashMap<String, usize>,
    /// Per generated line: (generated column, source, source line)
    lines: Vec<Vec<(usize, usize, usize)>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMap<'a> {
    version: u8,
    file: &'a str,
    sources: &'a [String],
    sources_content: &'a [String],
    names: [&'a str; 0],
    mappings: String,
}

impl Emitter {
    /// An emitter that records mappings when `mapped` is true
    pub fn new(mapped: bool) -> Self {
        Self {
            map: mapped.then(MapBuilder::default),
            ..Self::default()
        }
    }

    /// Append unmapped text
    pub fn raw(&mut self, text: &str) {
        self.advance(text);
        self.code.push_str(text);
    }

    /// Append `text`, which starts at line `first_line` (zero based) of `source`
    pub fn mapped(&mut self, source: &str, content: &str, text: &str, first_line: usize) {
        if let Some(map) = self.map.as_mut() {
            let index = map.source(source, content);
            for (offset, _) in text.split('\n').enumerate() {
                let (gen_line, gen_col) = if offset == 0 {
                    (self.line, self.column)
                } else {
                    (self.line + offset, 0)
                };
                map.add(gen_line, gen_col, index, first_line + offset);
            }
        }
        self.raw(text);
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The generated code and, when enabled, the source map JSON
    pub fn finish(self, file: &str) -> (String, Option<String>) {
        let map = self.map.map(|map| map.to_json(file));
        (self.code, map)
    }

    fn advance(&mut self, text: &str) {
        match text.rfind('\n') {
            Some(last) => {
                self.line += text.matches('\n').count();
                self.column = text.len() - last - 1;
            }
            None => self.column += text.len(),
        }
    }
}

impl MapBuilder {
    fn source(&mut self, id: &str, content: &str) -> usize {
        if let Some(&index) = self.index.get(id) {
            return index;
        }
        let index = self.sources.len();
        self.sources.push(id.to_string());
        self.contents.push(content.to_string());
        self.index.insert(id.to_string(), index);
        index
    }

    fn add(&mut self, gen_line: usize, gen_col: usize, source: usize, src_line: usize) {
        if self.lines.len() <= gen_line {
            self.lines.resize_with(gen_line + 1, Vec::new);
        }
        self.lines[gen_line].push((gen_col, source, src_line));
    }

    fn mappings(&self) -> String {
        let mut out = String::new();
        let (mut prev_source, mut prev_line) = (0i64, 0i64);
        for (i, segments) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut prev_col = 0i64;
            for (j, &(col, source, line)) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                vlq(&mut out, col as i64 - prev_col);
                vlq(&mut out, source as i64 - prev_source);
                vlq(&mut out, line as i64 - prev_line);
                vlq(&mut out, 0);
                prev_col = col as i64;
                prev_source = source as i64;
                prev_line = line as i64;
            }
        }
        out
    }

    fn to_json(&self, file: &str) -> String {
        let map = SourceMap {
            version: 3,
            file,
            sources: &self.sources,
            sources_content: &self.contents,
            names: [],
            mappings: self.mappings(),
        };
        // Serializing strings and integers cannot fail
        serde_json::to_string(&map).unwrap_or_default()
    }
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Append one base64 VLQ value
fn vlq(out: &mut String, value: i64) {
    let mut rest = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (rest & 0b11111) as usize;
        rest >>= 5;
        if rest > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if rest == 0 {
            break;
        }
    }
}

/// `sourceMappingURL` comment pointing at an external map file
pub fn external_comment(kind: &str, map_name: &str) -> String {
    comment(kind, map_name)
}

/// `sourceMappingURL` comment embedding the map as a data URL
pub fn inline_comment(kind: &str, map: &str) -> String {
    let url = format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(map)
    );
    comment(kind, &url)
}

fn comment(kind: &str, url: &str) -> String {
    if kind == "css" {
        format!("\n/*# sourceMappingURL={} */", url)
    } else {
        format!("\n//# sourceMappingURL={}", url)
    }
}
