//! CLI argument definitions using clap derive

use crate::config::{BuildOptions, SourceMapMode};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Knit - component dependency resolver and bundler
///
/// Resolves the requires of a script or stylesheet entry, installs the remote
/// packages they name and packs everything into one file.
#[derive(Parser, Debug)]
#[command(name = "knit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Project root (defaults to current directory)
    #[arg(short, long, global = true, env = "KNIT_ROOT")]
    pub root: Option<PathBuf>,

    /// Options file (defaults to <root>/knit.toml)
    #[arg(short, long, global = true, env = "KNIT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an entry and write the packed artifact
    Build(BuildArgs),

    /// Resolve and install an entry's dependencies without packing
    Install(InstallArgs),

    /// Manage the per-file cache and installed packages
    Cache(CacheArgs),
}

/// Options shared by every command that walks the graph
#[derive(Args, Debug, Default)]
pub struct GraphArgs {
    /// Install directory, relative to the root
    #[arg(long)]
    pub install_to: Option<String>,

    /// Manifest filename
    #[arg(long)]
    pub manifest: Option<String>,

    /// Maximum simultaneous package fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Include development dependencies
    #[arg(short, long)]
    pub development: bool,

    /// Don't read or write the per-file cache
    #[arg(long)]
    pub no_cache: bool,

    /// Re-resolve version ranges even when a match is installed
    #[arg(short, long)]
    pub update: bool,

    /// Serve packages from a local mirror directory
    #[arg(long)]
    pub mirror: Option<PathBuf>,
}

impl GraphArgs {
    /// Override `options` with every flag that was given
    pub fn apply(&self, options: &mut BuildOptions) {
        if let Some(install_to) = &self.install_to {
            options.install_to = install_to.clone();
        }
        if let Some(manifest) = &self.manifest {
            options.manifest = manifest.clone();
        }
        if let Some(concurrency) = self.concurrency {
            options.concurrency = concurrency;
        }
        if let Some(mirror) = &self.mirror {
            options.mirror = Some(mirror.clone());
        }
        options.development |= self.development;
        options.update |= self.update;
        if self.no_cache {
            options.cache = false;
        }
    }
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Entry file relative to the root, or `-` to read source from stdin
    pub entry: Option<String>,

    #[command(flatten)]
    pub graph: GraphArgs,

    /// Content kind of stdin source
    #[arg(long = "type", default_value = "js")]
    pub kind: String,

    /// Build directory, relative to the root
    #[arg(long)]
    pub build_to: Option<String>,

    /// Output path (relative paths are inside the build directory)
    #[arg(short, long, conflicts_with = "stdout")]
    pub out: Option<PathBuf>,

    /// Print the artifact instead of writing it
    #[arg(long)]
    pub stdout: bool,

    /// Copy assets instead of symlinking them
    #[arg(long)]
    pub copy: bool,

    /// Source map emission
    #[arg(short, long)]
    pub source_map: Option<SourceMapMode>,

    /// Expose the entry's exports as this global
    #[arg(short, long)]
    pub global: Option<String>,
}

impl BuildArgs {
    pub fn apply(&self, options: &mut BuildOptions) {
        self.graph.apply(options);
        if let Some(build_to) = &self.build_to {
            options.build_to = build_to.clone();
        }
        if let Some(mode) = self.source_map {
            options.source_map = mode;
        }
        if let Some(global) = &self.global {
            options.global = Some(global.clone());
        }
        options.copy |= self.copy;
    }
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Entry file relative to the root
    pub entry: Option<String>,

    #[command(flatten)]
    pub graph: GraphArgs,

    /// Output format of the resulting mapping
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Output format for mappings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// JSON object keyed by file id
    Json,
    /// One file per line with its dependencies indented
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,

    /// Install directory, relative to the root
    #[arg(long, global = true)]
    pub install_to: Option<String>,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached record and installed package
    Clean,

    /// Show the mapping recorded by previous builds
    Mapping {
        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
    },
}
