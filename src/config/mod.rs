//! Configuration management for knit

pub mod schema;

pub use schema::{BuildOptions, SourceMapMode};

use crate::error::{KnitError, KnitResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Project-local options file name
pub const CONFIG_FILE: &str = "knit.toml";

/// Environment variables consulted for the access token, in order
pub const TOKEN_VARS: &[&str] = &["KNIT_TOKEN", "GH_TOKEN"];

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Config manager for the `knit.toml` inside `root`
    pub fn for_root(root: &Path) -> Self {
        Self {
            config_path: root.join(CONFIG_FILE),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Load options rooted at `root`, using defaults when the file is missing
    pub async fn load(&self, root: &Path) -> KnitResult<BuildOptions> {
        let mut options = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("No {} found, using defaults", self.config_path.display());
            BuildOptions::default()
        };

        options.root = Some(root.to_path_buf());
        if options.token.is_none() {
            options.token = token_from_env();
        }
        Ok(options)
    }

    /// Load options from a specific file
    pub async fn load_from_file(&self, path: &Path) -> KnitResult<BuildOptions> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KnitError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| KnitError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

/// First non-empty token found in the environment
pub fn token_from_env() -> Option<String> {
    TOKEN_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
}
