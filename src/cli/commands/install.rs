//! Install command - resolve and fetch without packing

use super::{default_entry, print_mapping_json, print_mapping_plain};
use crate::cli::args::{InstallArgs, OutputFormat};
use crate::config::BuildOptions;
use crate::error::KnitResult;
use crate::knit::Knit;
use console::style;

/// Execute the install command
pub async fn execute(args: InstallArgs, mut options: BuildOptions) -> KnitResult<()> {
    args.graph.apply(&mut options);
    let mut knit = Knit::from_options(options)?;

    let entry = match args.entry {
        Some(entry) => entry,
        None => default_entry(knit.root(), knit.manifest()).await?,
    };
    knit.entry(entry);

    let mapping = knit.install().await?;
    match args.format {
        OutputFormat::Json => print_mapping_json(&mapping)?,
        OutputFormat::Plain => {
            print_mapping_plain(&mapping);
            let packages = mapping
                .keys()
                .filter_map(|id| knit.layout().package_segment(id).map(str::to_string))
                .collect::<std::collections::BTreeSet<_>>();
            println!();
            println!(
                "{} {} files, {} packages",
                style("✓").green(),
                mapping.len(),
                packages.len()
            );
        }
    }
    Ok(())
}
