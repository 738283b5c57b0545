//! Knit - component dependency resolver and bundler
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use knit::cli::{Cli, Commands};
use knit::config::ConfigManager;
use knit::error::{KnitError, KnitResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> KnitResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("knit=warn"),
        1 => EnvFilter::new("knit=info"),
        _ => EnvFilter::new("knit=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cwd = std::env::current_dir().map_err(|e| KnitError::io("getting current directory", e))?;
    let root = match cli.root {
        Some(root) => cwd.join(root),
        None => cwd,
    };
    debug!("Project root: {}", root.display());

    let config_manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::for_root(&root),
    };
    let options = config_manager.load(&root).await?;

    match cli.command {
        Commands::Build(args) => knit::cli::commands::build(args, options).await,
        Commands::Install(args) => knit::cli::commands::install(args, options).await,
        Commands::Cache(args) => knit::cli::commands::cache(args, options).await,
    }
}
