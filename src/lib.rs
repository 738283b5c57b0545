//! Knit - component dependency resolver and bundler
//!
//! Resolves the requires of a script or stylesheet entry, installs the remote
//! packages they name, caches per-file work across builds and packs the
//! result into a single artifact.
//!
//! ```rust,ignore
//! use knit::Knit;
//!
//! let mut knit = Knit::new("/path/to/project")?;
//! knit.entry("index.js").set_development(true);
//! let artifact = knit.write(None).await?;
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod file;
pub mod graph;
pub mod install;
pub mod knit;
pub mod layout;
pub mod manifest;
pub mod pack;
pub mod resolve;
pub mod transform;

pub use crate::knit::{Entry, Knit};
pub use error::{KnitError, KnitResult};
pub use file::File;
pub use pack::Artifact;
