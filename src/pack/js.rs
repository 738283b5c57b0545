//! Script packing
//!
//! The artifact is a single expression: a small runtime called with a table
//! of module factories keyed by file id. Each factory carries its own
//! specifier -> id table, so `require('./x')` inside a module resolves to the
//! id the graph picked for it. The entry runs immediately and the expression
//! evaluates to the runtime's `require`.

use super::sourcemap::Emitter;
use crate::graph::Graph;

const PRELUDE: &str = r#"(function outer(modules, cache, entries, name) {
  function newRequire(id) {
    if (!cache[id]) {
      if (!modules[id]) {
        var err = new Error('Cannot find module "' + id + '"');
        err.code = 'MODULE_NOT_FOUND';
        throw err;
      }
      var m = cache[id] = { exports: {} };
      modules[id][0].call(m.exports, function (spec) {
        var dep = modules[id][1][spec];
        return newRequire(dep ? dep : spec);
      }, m, m.exports);
    }
    return cache[id].exports;
  }
  for (var i = 0; i < entries.length; i++) newRequire(entries[i]);
  if (name) {
    var root = typeof globalThis !== 'undefined' ? globalThis
      : typeof window !== 'undefined' ? window : this;
    root[name] = newRequire(entries[0]);
  }
  return newRequire;
})({"#;

/// Emit the module registry for `graph`
pub fn pack(graph: &Graph, global: Option<&str>, emitter: &mut Emitter) {
    emitter.raw(PRELUDE);

    let modules: Vec<_> = graph.files.values().filter(|f| !f.asset).collect();
    for (i, file) in modules.iter().enumerate() {
        emitter.raw(if i == 0 { "\n" } else { ",\n" });
        emitter.raw(&format!("{}: [function(require, module, exports) {{\n", quote(&file.id)));

        let raw = file.raw.as_deref().unwrap_or(&file.src);
        match body(&file.kind, &file.src) {
            Some(generated) => emitter.raw(&generated),
            None => emitter.mapped(&file.id, raw, &file.src, 0),
        }

        // Serializing a string map cannot fail
        let deps = serde_json::to_string(&file.deps).unwrap_or_else(|_| "{}".to_string());
        emitter.raw(&format!("\n}}, {}]", deps));
    }

    let global = global.map_or_else(|| "null".to_string(), quote);
    emitter.raw(&format!("\n}}, {{}}, [{}], {});", quote(&graph.entry), global));
}

/// Generated module body for non-script kinds: JSON is exported as a value,
/// anything else as a string. `None` keeps the source as is.
fn body(kind: &str, src: &str) -> Option<String> {
    match kind {
        "js" => None,
        "json" => {
            let json = src.trim();
            Some(format!(
                "module.exports = {};",
                if json.is_empty() { "{}" } else { json }
            ))
        }
        _ => Some(format!("module.exports = {};", quote(src))),
    }
}

fn quote(s: &str) -> String {
    // Serializing a str cannot fail
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}
