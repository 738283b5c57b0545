//! Cache command - inspect and clear the per-file cache

use super::{print_mapping_json, print_mapping_plain};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::BuildOptions;
use crate::error::KnitResult;
use crate::knit::Knit;
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, mut options: BuildOptions) -> KnitResult<()> {
    if let Some(install_to) = args.install_to {
        options.install_to = install_to;
    }
    let knit = Knit::from_options(options)?;

    match args.action {
        CacheAction::Clean => {
            knit.clean_cache().await?;
            println!(
                "{} Removed {}",
                style("✓").green(),
                knit.install_path("").display()
            );
        }
        CacheAction::Mapping { format } => {
            let mapping = knit.mapping().await?;
            if mapping.is_empty() {
                println!("No cached files.");
                return Ok(());
            }
            match format {
                OutputFormat::Json => print_mapping_json(&mapping)?,
                OutputFormat::Plain => print_mapping_plain(&mapping),
            }
        }
    }
    Ok(())
}
