//! Build command implementation.

use super::types::SourceArgs;
use anyhow::Context;
use colored::Colorize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trainpack_core::{ImageBuilder, TrainpackConfig};

/// Execute the build command.
///
/// Ctrl-C kills the builder and the build reports as interrupted.
pub async fn execute(
    source: &SourceArgs,
    config: &TrainpackConfig,
    no_cache: bool,
    builder: Option<String>,
) -> anyhow::Result<()> {
    let use_cache = !no_cache && config.use_cache.unwrap_or(true);
    let request = source.to_request(config, use_cache);

    let builder_command = builder.unwrap_or_else(|| config.builder_command());
    let image_builder = ImageBuilder::new().with_builder_command(builder_command);

    image_builder
        .check_available()
        .await
        .with_context(|| format!("Image builder `{}` is not available", image_builder.builder_command()))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            warn!("Interrupt received, stopping the build");
            trigger.cancel();
        }
    });

    info!(image = %request.output_image_name, source = %request.source.host_root.display(), "building image");
    let handle = image_builder
        .build_with_cancel(&request, &cancel)
        .await
        .with_context(|| format!("Failed to build {}", request.output_image_name))?;

    println!();
    println!("{}", "Image built".bold().green());
    println!("  Image:    {}", handle.image_name.cyan());
    println!("  Workdir:  {}", handle.work_dir.dimmed());
    println!("  Home:     {}", handle.home_dir.dimmed());
    println!();
    Ok(())
}
