//! Build option schema
//!
//! Options may be stored in a `knit.toml` at the project root. Every field has a
//! default, so an empty or missing file is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default manifest filename
pub const DEFAULT_MANIFEST: &str = "component.json";

/// Default install directory, relative to the root
pub const DEFAULT_INSTALL_TO: &str = "components";

/// Default build directory, relative to the root
pub const DEFAULT_BUILD_TO: &str = "build";

/// Default number of simultaneous package fetches
pub const DEFAULT_CONCURRENCY: usize = 50;

/// How source maps are emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// No source map
    #[default]
    Off,
    /// Separate `.map` file referenced by a trailing comment
    External,
    /// Base64 data URL embedded in the artifact
    Inline,
}

impl fmt::Display for SourceMapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::External => "external",
            Self::Inline => "inline",
        };
        write!(f, "{}", name)
    }
}

impl From<bool> for SourceMapMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::External
        } else {
            Self::Off
        }
    }
}

/// Options for one build instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Project root; every id is relative to it
    #[serde(skip)]
    pub root: Option<PathBuf>,

    /// Manifest filename looked up in every package
    pub manifest: String,

    /// Global name the entry's exports are assigned to
    pub global: Option<String>,

    /// Install directory, relative to the root
    pub install_to: String,

    /// Build directory, relative to the root
    pub build_to: String,

    /// Copy assets instead of symlinking them
    pub copy: bool,

    /// Maximum simultaneous package fetches
    pub concurrency: usize,

    /// Include the root manifest's development dependencies
    pub development: bool,

    /// Persist and reuse per-file records
    pub cache: bool,

    /// Re-resolve version ranges against the transport
    pub update: bool,

    /// Source map emission
    pub source_map: SourceMapMode,

    /// Access token for the package host
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Local mirror serving packages as `<mirror>/<user>/<repo>/<ref>/`
    pub mirror: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            root: None,
            manifest: DEFAULT_MANIFEST.to_string(),
            global: None,
            install_to: DEFAULT_INSTALL_TO.to_string(),
            build_to: DEFAULT_BUILD_TO.to_string(),
            copy: false,
            concurrency: DEFAULT_CONCURRENCY,
            development: false,
            cache: true,
            update: false,
            source_map: SourceMapMode::Off,
            token: None,
            mirror: None,
        }
    }
}

impl BuildOptions {
    /// Options rooted at `root`, everything else default
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = BuildOptions::default();
        assert_eq!(opts.manifest, "component.json");
        assert_eq!(opts.install_to, "components");
        assert_eq!(opts.build_to, "build");
        assert!(!opts.copy);
        assert!(!opts.development);
        assert!(opts.cache);
        assert!(!opts.update);
        assert_eq!(opts.concurrency, 50);
        assert_eq!(opts.source_map, SourceMapMode::Off);
        assert!(opts.global.is_none());
    }

    #[test]
    fn parse_partial_toml() {
        let opts: BuildOptions = toml::from_str(
            r#"
install_to = "deps"
copy = true
source_map = "inline"
"#,
        )
        .unwrap();
        assert_eq!(opts.install_to, "deps");
        assert!(opts.copy);
        assert_eq!(opts.source_map, SourceMapMode::Inline);
        assert_eq!(opts.build_to, "build");
    }

    #[test]
    fn source_map_from_bool() {
        assert_eq!(SourceMapMode::from(true), SourceMapMode::External);
        assert_eq!(SourceMapMode::from(false), SourceMapMode::Off);
    }
}
