//! Trainpack CLI - packages a training source tree into a container image
//!
//! This CLI provides a `trainpack` command that assembles a Dockerfile for a
//! local training project and hands it to the image builder.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trainpack_core::BuildError;

use commands::types::SourceArgs;
use commands::{build, recipe};

/// Environment variable holding a `tracing` filter directive; overrides `--log-level`.
const LOG_ENV_VAR: &str = "TRAINPACK_LOG";

/// Exit status used when a build is interrupted.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Trainpack CLI - container images for custom training jobs
///
/// Copies a training source tree and its dependencies into an image built
/// from a base image, with an entry point that starts the training script.
#[derive(Parser, Debug)]
#[command(name = "trainpack", author, version, about = "Trainpack - container images for custom training jobs")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Configuration file to use instead of ~/.trainpack/config.toml and ./.trainpack.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an image
    ///
    /// Checks that the image builder is available, then pipes the assembled
    /// recipe to `<builder> build -f-` with the source directory as context.
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Do not reuse cached layers
        #[arg(long)]
        no_cache: bool,

        /// Image builder CLI (overrides TRAINPACK_BUILDER and the config file)
        #[arg(long)]
        builder: Option<String>,
    },

    /// Print the recipe without building
    Recipe {
        #[command(flatten)]
        source: SourceArgs,

        /// Output the recipe, builder command and image handle as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    let config = config::load_config(args.config.as_deref())?;

    let result = match args.command {
        Command::Build { source, no_cache, builder } => build::execute(&source, &config, no_cache, builder).await,
        Command::Recipe { source, json } => recipe::execute(&source, &config, json),
    };

    if let Err(error) = result {
        match error.downcast_ref::<BuildError>() {
            Some(BuildError::BuilderFailed { exit_code, .. }) => {
                eprintln!("{} {:#}", "Error:".red().bold(), error);
                std::process::exit(if *exit_code > 0 { *exit_code } else { INTERRUPTED_EXIT_CODE });
            }
            Some(BuildError::Cancelled) => {
                eprintln!("{}", "Build cancelled".yellow());
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
            _ => return Err(error),
        }
    }

    Ok(())
}

/// Logs go to stderr so `trainpack recipe` output can be piped.
fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    if let Ok(filter) = std::env::var(LOG_ENV_VAR) {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::new(filter))
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
