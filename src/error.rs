//! Error types for knit
//!
//! All modules use `KnitResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for knit operations
pub type KnitResult<T> = Result<T, KnitError>;

/// Boxed error raised by plugins and transports
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can occur while resolving, installing or packing
#[derive(Error, Debug)]
pub enum KnitError {
    // Configuration errors
    #[error("knit requires a root directory")]
    MissingRoot,

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid option {name}: {reason}")]
    OptionInvalid { name: String, reason: String },

    // Graph errors
    #[error("cannot find entry: {0}")]
    EntryNotFound(String),

    #[error("cannot resolve \"{specifier}\" from \"{from}\": no such file")]
    UnresolvedPath { specifier: String, from: String },

    #[error("cannot resolve \"{specifier}\" from \"{from}\": no matching dependency")]
    UnresolvedPackage { specifier: String, from: String },

    #[error("{path}: {reason} at line {line} column {column}")]
    ManifestSyntax {
        path: PathBuf,
        line: usize,
        column: usize,
        reason: String,
    },

    // Install errors
    #[error("failed to fetch {package}: {reason}")]
    Fetch { package: String, reason: String },

    #[error("no version of {package} matches \"{range}\"")]
    NoMatchingVersion { package: String, range: String },

    // Plugin errors
    #[error("transform failed for {file}: {source}")]
    Transform {
        file: String,
        #[source]
        source: BoxError,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KnitError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a fetch error for a package
    pub fn fetch(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a manifest parse failure with its location
    pub fn manifest_syntax(path: impl Into<PathBuf>, err: &serde_json::Error) -> Self {
        Self::ManifestSyntax {
            path: path.into(),
            line: err.line(),
            column: err.column(),
            reason: err.to_string(),
        }
    }

    /// Whether the error comes from a specifier that could not be resolved
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedPath { .. } | Self::UnresolvedPackage { .. }
        )
    }

    /// The unresolved specifier, if any
    pub fn specifier(&self) -> Option<&str> {
        match self {
            Self::UnresolvedPath { specifier, .. } | Self::UnresolvedPackage { specifier, .. } => {
                Some(specifier)
            }
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingRoot => Some("Pass --root or run knit from the project directory"),
            Self::UnresolvedPackage { .. } => {
                Some("Add the package to the manifest dependencies or require it as user/repo")
            }
            Self::Fetch { .. } => Some("Check the network connection or set KNIT_TOKEN"),
            Self::NoMatchingVersion { .. } => Some("Run with --update to refresh the version list"),
            _ => None,
        }
    }
}
