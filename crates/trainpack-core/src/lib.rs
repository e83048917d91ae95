//! Trainpack Core
//!
//! Packages a local training source tree into a container image:
//! - Validating source, dependency and entry-point paths (`paths`)
//! - Assembling a deterministic Dockerfile recipe (`assembler`, `recipe`)
//! - Running the external image builder with streamed output (`process`)
//! - Orchestrating the whole build (`ImageBuilder`)

pub mod assembler;
pub mod builder;
pub mod config;
pub mod error;
pub mod paths;
pub mod process;
pub mod recipe;
pub mod request;
pub mod shell;

pub use assembler::{assemble, RecipeSpec, ResolvedEntry};
pub use builder::{ImageBuilder, PreparedBuild, DEFAULT_BUILDER_COMMAND};
pub use config::{ConfigError, TrainpackConfig};
pub use error::{BuildError, BuildErrorKind, BuildResult};
pub use paths::{is_beneath, relative_posix};
pub use process::{CommandRunner, OutputSink, ProcessRunner, TracingSink, CANCELLED_EXIT_CODE, CANCEL_DRAIN_GRACE};
pub use recipe::{BuildRecipe, Directive, ShellCommand};
pub use request::{BuildRequest, ContainerLayout, DependencySpec, EntryPoint, ImageHandle, SourcePackage};
pub use tokio_util::sync::CancellationToken;
