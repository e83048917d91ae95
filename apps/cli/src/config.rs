//! CLI configuration loading.

use anyhow::Context;
use std::path::Path;
use trainpack_core::TrainpackConfig;

/// Load configuration.
///
/// Configuration precedence:
/// 1. CLI arguments (applied by each command)
/// 2. `TRAINPACK_BUILDER` for the builder command
/// 3. Explicit `--config` file, or else local (./.trainpack.toml) over global
///    (~/.trainpack/config.toml)
/// 4. Defaults
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<TrainpackConfig> {
    match explicit {
        Some(path) => TrainpackConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(TrainpackConfig::discover_and_load()),
    }
}
