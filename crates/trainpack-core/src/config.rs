//! Configuration file support.
//!
//! Defaults for builds can be kept in TOML files so they do not have to be
//! repeated on every invocation. Two locations are consulted:
//! 1. Global config (`~/.trainpack/config.toml`)
//! 2. Local config (`./.trainpack.toml`), which overrides the global one
//!
//! `TRAINPACK_BUILDER` overrides the configured builder command.

use crate::builder::DEFAULT_BUILDER_COMMAND;
use crate::request::ContainerLayout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the image builder CLI.
pub const BUILDER_ENV_VAR: &str = "TRAINPACK_BUILDER";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainpackConfig {
    /// Image builder CLI (`docker`, `podman`, ...)
    #[serde(default)]
    pub builder: Option<String>,

    #[serde(default)]
    pub base_image: Option<String>,

    #[serde(default)]
    pub work_dir: Option<String>,

    #[serde(default)]
    pub home_dir: Option<String>,

    /// In-container package installer
    #[serde(default)]
    pub installer: Option<String>,

    /// In-container script interpreter
    #[serde(default)]
    pub interpreter: Option<String>,

    #[serde(default)]
    pub use_cache: Option<bool>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl TrainpackConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".trainpack")
            .join("config.toml")
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".trainpack.toml")
    }

    /// Load the global then the local config; missing or broken files are skipped.
    pub fn discover_and_load() -> Self {
        let mut config = Self::default();

        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(found) => {
                    tracing::debug!(path = %path.display(), "loaded configuration");
                    config.merge(&found);
                }
                Err(ConfigError::NotFound(_)) => {}
                Err(e) => tracing::warn!(error = %e, "ignoring configuration file"),
            }
        }

        config
    }

    /// Values set in `other` replace the ones in `self`.
    pub fn merge(&mut self, other: &Self) {
        fn take(target: &mut Option<String>, source: Option<&String>) {
            if let Some(value) = source {
                *target = Some(value.clone());
            }
        }

        take(&mut self.builder, other.builder.as_ref());
        take(&mut self.base_image, other.base_image.as_ref());
        take(&mut self.work_dir, other.work_dir.as_ref());
        take(&mut self.home_dir, other.home_dir.as_ref());
        take(&mut self.installer, other.installer.as_ref());
        take(&mut self.interpreter, other.interpreter.as_ref());
        if other.use_cache.is_some() {
            self.use_cache = other.use_cache;
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        for (key, value) in [("work_dir", &self.work_dir), ("home_dir", &self.home_dir)] {
            if let Some(dir) = value {
                if !dir.starts_with('/') {
                    return Err(ConfigError::InvalidValue(format!("{key} must be absolute, got {dir:?}")));
                }
            }
        }
        if matches!(self.builder.as_deref(), Some(b) if b.trim().is_empty()) {
            return Err(ConfigError::InvalidValue("builder must not be empty".to_string()));
        }
        Ok(())
    }

    /// Builder command: `TRAINPACK_BUILDER`, then the config, then `docker`.
    pub fn builder_command(&self) -> String {
        std::env::var(BUILDER_ENV_VAR)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.builder.clone())
            .unwrap_or_else(|| DEFAULT_BUILDER_COMMAND.to_string())
    }

    /// Fill layout fields the caller left empty from this config.
    pub fn apply_to_layout(&self, layout: &mut ContainerLayout) {
        fn fill(target: &mut String, source: Option<&String>) {
            if target.trim().is_empty() {
                if let Some(value) = source {
                    target.clone_from(value);
                }
            }
        }

        fill(&mut layout.base_image, self.base_image.as_ref());
        fill(&mut layout.work_dir, self.work_dir.as_ref());
        fill(&mut layout.home_dir, self.home_dir.as_ref());
        fill(&mut layout.package_installer_command, self.installer.as_ref());
        fill(&mut layout.script_interpreter_command, self.interpreter.as_ref());
    }
}
