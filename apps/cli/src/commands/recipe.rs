//! Recipe command implementation.

use super::types::SourceArgs;
use anyhow::Context;
use trainpack_core::{ImageBuilder, TrainpackConfig};

/// Print the recipe a build would use, without running the builder.
pub fn execute(source: &SourceArgs, config: &TrainpackConfig, json_output: bool) -> anyhow::Result<()> {
    let request = source.to_request(config, config.use_cache.unwrap_or(true));
    let prepared = ImageBuilder::new()
        .with_builder_command(config.builder_command())
        .prepare(&request)
        .context("Failed to assemble recipe")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&prepared)?);
    } else {
        print!("{}", prepared.rendered);
    }
    Ok(())
}
