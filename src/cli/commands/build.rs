//! Build command - pack an entry and write the artifact

use super::default_entry;
use crate::cli::args::BuildArgs;
use crate::config::BuildOptions;
use crate::error::{KnitError, KnitResult};
use crate::knit::Knit;
use console::style;
use std::io::Write;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, mut options: BuildOptions) -> KnitResult<()> {
    args.apply(&mut options);
    let mut knit = Knit::from_options(options)?;

    match args.entry.as_deref() {
        Some("-") => {
            let mut src = String::new();
            tokio::io::stdin()
                .read_to_string(&mut src)
                .await
                .map_err(|e| KnitError::io("reading entry from stdin", e))?;
            knit.entry_source(src, args.kind.clone());
        }
        Some(entry) => {
            knit.entry(entry);
        }
        None => {
            let entry = default_entry(knit.root(), knit.manifest()).await?;
            debug!("Using default entry {}", entry);
            knit.entry(entry);
        }
    }

    if args.stdout {
        let artifact = knit.run().await?;
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(artifact.code.as_bytes())
            .map_err(|e| KnitError::io("writing to stdout", e))?;
        return Ok(());
    }

    let artifact = knit.write(args.out.as_deref()).await?;
    if let Some(written) = knit.output_path(&artifact.kind, args.out.as_deref()) {
        println!(
            "{} Wrote {} ({} bytes)",
            style("✓").green(),
            written.display(),
            artifact.code.len()
        );
    }
    Ok(())
}
