//! Typed image recipes and their Dockerfile rendering.
//!
//! A [`BuildRecipe`] is an ordered list of [`Directive`]s. Nothing is
//! formatted until [`BuildRecipe::render`] is called, which is the only place
//! that quoting happens:
//! - `COPY` and `ENTRYPOINT` operands are written as JSON arrays
//! - `RUN` operands go through [`crate::shell::quote`]
//! - directory names for `mkdir` are always single-quoted

use crate::shell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One word of a [`ShellCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ShellWord {
    /// Written verbatim (program names and flags).
    Literal(String),
    /// User-controlled data, quoted when rendered.
    Operand(String),
}

/// A command line executed by the shell inside the image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShellCommand {
    pub words: Vec<ShellWord>,
}

impl ShellCommand {
    /// Start a command. `program` is written verbatim so it may carry its own
    /// arguments (for example `python -m pip`).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self { words: vec![ShellWord::Literal(program.into())] }
    }

    #[must_use]
    pub fn arg(mut self, literal: impl Into<String>) -> Self {
        self.words.push(ShellWord::Literal(literal.into()));
        self
    }

    #[must_use]
    pub fn operand(mut self, value: impl Into<String>) -> Self {
        self.words.push(ShellWord::Operand(value.into()));
        self
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match word {
                ShellWord::Literal(text) => f.write_str(text)?,
                ShellWord::Operand(value) => f.write_str(&shell::quote(value))?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum Directive {
    SetBaseImage { image: String },
    /// Create directories writable by any user.
    EnsureDirectories { paths: Vec<String> },
    SetWorkingDir { path: String },
    SetEnvironmentVariable { name: String, value: String },
    /// Copy `source` (relative to the build context) to `destination`.
    CopyFromHost {
        source: String,
        destination: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },
    RunCommand { command: ShellCommand },
    DeclareListeningPort { port: u16 },
    SetEntryPoint { argv: Vec<String> },
}

impl Directive {
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::CopyFromHost { comment, .. } => comment.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::SetBaseImage { .. } => "FROM",
            Self::EnsureDirectories { .. } | Self::RunCommand { .. } => "RUN",
            Self::SetWorkingDir { .. } => "WORKDIR",
            Self::SetEnvironmentVariable { .. } => "ENV",
            Self::CopyFromHost { .. } => "COPY",
            Self::DeclareListeningPort { .. } => "EXPOSE",
            Self::SetEntryPoint { .. } => "ENTRYPOINT",
        }
    }
}

/// Renders the instruction line only; comments are emitted by [`BuildRecipe::render`].
impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.keyword())?;
        match self {
            Self::SetBaseImage { image } => f.write_str(image),
            Self::EnsureDirectories { paths } => {
                f.write_str("mkdir -m 777 -p")?;
                for path in paths {
                    write!(f, " {}", shell::quote_always(path))?;
                }
                Ok(())
            }
            Self::SetWorkingDir { path } => f.write_str(path),
            Self::SetEnvironmentVariable { name, value } => {
                write!(f, "{}={}", name, env_value(value)?)
            }
            Self::CopyFromHost { source, destination, .. } => {
                f.write_str(&json_array(&[source.as_str(), destination.as_str()])?)
            }
            Self::RunCommand { command } => write!(f, "{command}"),
            Self::DeclareListeningPort { port } => write!(f, "{port}"),
            Self::SetEntryPoint { argv } => {
                let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
                f.write_str(&json_array(&argv)?)
            }
        }
    }
}

fn json_array(items: &[&str]) -> Result<String, fmt::Error> {
    serde_json::to_string(items).map_err(|_| fmt::Error)
}

/// `ENV` values are bare unless they contain characters the builder would
/// split or expand, in which case they become a JSON string literal.
fn env_value(value: &str) -> Result<String, fmt::Error> {
    let needs_quoting = value.is_empty()
        || value.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$'));
    if needs_quoting {
        serde_json::to_string(value).map_err(|_| fmt::Error)
    } else {
        Ok(value.to_string())
    }
}

/// An ordered sequence of directives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildRecipe {
    directives: Vec<Directive>,
}

impl BuildRecipe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Render the recipe as Dockerfile text.
    ///
    /// Every line ends with `\n`. A comment block is preceded by one blank line
    /// and each of its lines starts with `# `.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for directive in &self.directives {
            if let Some(comment) = directive.comment() {
                if !out.is_empty() {
                    out.push('\n');
                }
                for line in comment.lines() {
                    out.push_str("# ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            out.push_str(&directive.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for BuildRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
