//! Deterministic recipe assembly.
//!
//! Directive order decides which layers the image builder can reuse from its
//! cache, so it is fixed:
//!
//! 1. base image, directories, working dir, `HOME`, bytecode switch
//! 2. the whole build context, copied next to the working dir
//! 3. dependencies: package definition, manifest, inline packages,
//!    inline requirements, extra dirs (each list in caller order)
//! 4. listening ports, then extra environment variables
//! 5. the entry point
//!
//! [`assemble`] is a pure function of its [`RecipeSpec`].

use crate::recipe::{BuildRecipe, Directive, ShellCommand};
use crate::request::ContainerLayout;
use serde::Serialize;

/// Where a copied manifest lands inside the image.
pub const MANIFEST_DESTINATION: &str = "./requirements.txt";

/// The entry point after path normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedEntry {
    Module(String),
    /// Script path relative to the parent of the source root, `/`-separated.
    Script(String),
}

/// A file or directory copied from the build context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPath {
    /// Path relative to the build context, `/`-separated.
    pub relative: String,
    /// Final component of the host path.
    pub name: String,
}

/// Fully normalized build description. Produced by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeSpec {
    pub base_image: String,
    pub work_dir: String,
    pub home_dir: String,
    /// Directory name the build context is copied to.
    pub context_dir_name: String,
    pub package_definition: Option<ContextPath>,
    pub manifest: Option<ContextPath>,
    pub inline_packages: Vec<ContextPath>,
    pub inline_requirements: Vec<String>,
    pub extra_dirs: Vec<ContextPath>,
    pub force_reinstall: bool,
    pub exposed_ports: Vec<u16>,
    pub environment: Vec<(String, String)>,
    pub installer: String,
    pub interpreter: String,
    pub entry: ResolvedEntry,
}

pub fn assemble(spec: &RecipeSpec) -> BuildRecipe {
    let mut recipe = BuildRecipe::new();

    recipe.push(Directive::SetBaseImage { image: spec.base_image.clone() });
    recipe.push(Directive::EnsureDirectories {
        paths: vec![spec.work_dir.clone(), spec.home_dir.clone()],
    });
    recipe.push(Directive::SetWorkingDir { path: spec.work_dir.clone() });
    recipe.push(env("HOME", &spec.home_dir));
    recipe.push(env("PYTHONDONTWRITEBYTECODE", "1"));
    recipe.push(Directive::CopyFromHost {
        source: "./".to_string(),
        destination: spec.context_dir_name.clone(),
        comment: None,
    });

    push_dependencies(&mut recipe, spec);

    for port in &spec.exposed_ports {
        recipe.push(Directive::DeclareListeningPort { port: *port });
    }
    for (name, value) in &spec.environment {
        recipe.push(env(name, value));
    }

    recipe.push(Directive::SetEntryPoint { argv: entry_argv(&spec.entry, &spec.interpreter) });
    recipe
}

fn push_dependencies(recipe: &mut BuildRecipe, spec: &RecipeSpec) {
    if let Some(definition) = &spec.package_definition {
        recipe.push(Directive::CopyFromHost {
            source: definition.relative.clone(),
            destination: format!("./{}", definition.name),
            comment: Some(format!(
                "{} specified, thus copy it to the image and install the package it describes.",
                definition.name
            )),
        });
        recipe.push(Directive::RunCommand { command: install(spec).arg(".") });
    }

    if let Some(manifest) = &spec.manifest {
        recipe.push(Directive::CopyFromHost {
            source: manifest.relative.clone(),
            destination: MANIFEST_DESTINATION.to_string(),
            comment: Some(format!("Dependencies listed in {}.", manifest.relative)),
        });
        recipe.push(Directive::RunCommand {
            command: install(spec).arg("-r").operand(MANIFEST_DESTINATION),
        });
    }

    for package in &spec.inline_packages {
        recipe.push(Directive::CopyFromHost {
            source: package.relative.clone(),
            destination: package.name.clone(),
            comment: None,
        });
        recipe.push(Directive::RunCommand { command: install(spec).operand(package.name.clone()) });
    }

    for requirement in &spec.inline_requirements {
        recipe.push(Directive::RunCommand {
            command: install(spec).arg("--upgrade").operand(requirement.clone()),
        });
    }

    for dir in &spec.extra_dirs {
        recipe.push(Directive::CopyFromHost {
            source: dir.relative.clone(),
            destination: dir.relative.clone(),
            comment: None,
        });
    }
}

fn install(spec: &RecipeSpec) -> ShellCommand {
    let command = ShellCommand::new(spec.installer.clone()).arg("install").arg("--no-cache-dir");
    if spec.force_reinstall { command.arg("--force-reinstall") } else { command }
}

fn env(name: &str, value: &str) -> Directive {
    Directive::SetEnvironmentVariable { name: name.to_string(), value: value.to_string() }
}

/// Argv the container runs.
pub fn entry_argv(entry: &ResolvedEntry, interpreter: &str) -> Vec<String> {
    match entry {
        ResolvedEntry::Module(module) => {
            vec![interpreter.to_string(), "-m".to_string(), module.clone()]
        }
        ResolvedEntry::Script(script) if script.ends_with(".py") => {
            vec![interpreter.to_string(), script.clone()]
        }
        ResolvedEntry::Script(script) => vec![ContainerLayout::SHELL.to_string(), script.clone()],
    }
}
