use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildErrorKind {
    InvalidInput,
    BuilderFailed,
    Io,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum BuildError {
    /// A precondition failed before any subprocess was spawned.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The external image builder exited with a non-zero code.
    #[error("image builder exited with code {exit_code}: {}", command.join(" "))]
    BuilderFailed { command: Vec<String>, exit_code: i32 },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The build was cancelled before the builder was started.
    #[error("image build cancelled before the builder was started")]
    Cancelled,
}

impl BuildError {
    pub(crate) fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput { field, reason: reason.into() }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    #[must_use]
    pub fn kind(&self) -> BuildErrorKind {
        match self {
            Self::InvalidInput { .. } => BuildErrorKind::InvalidInput,
            Self::BuilderFailed { .. } => BuildErrorKind::BuilderFailed,
            Self::Io { .. } => BuildErrorKind::Io,
            Self::Cancelled => BuildErrorKind::Cancelled,
        }
    }

    /// The builder argv, when the error came from running it.
    #[must_use]
    pub fn command_argv(&self) -> Option<&[String]> {
        match self {
            Self::BuilderFailed { command, .. } => Some(command),
            _ => None,
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::BuilderFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
