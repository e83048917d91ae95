//! Argument types shared between commands.

use clap::Args;
use std::path::PathBuf;
use trainpack_core::{BuildRequest, ContainerLayout, DependencySpec, EntryPoint, SourcePackage, TrainpackConfig};

/// Describes the source tree, its dependencies and the image layout.
///
/// Relative dependency and script paths are resolved against `--source-dir`.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory copied into the image as the build context
    #[arg(long, default_value = ".")]
    pub source_dir: PathBuf,

    /// Script to run when the container starts
    #[arg(long, conflicts_with = "module", required_unless_present = "module")]
    pub script: Option<PathBuf>,

    /// Module to run with `<interpreter> -m`
    #[arg(long)]
    pub module: Option<String>,

    /// Base image (falls back to `base_image` in the config file)
    #[arg(long)]
    pub base_image: Option<String>,

    /// Name and tag of the image to produce
    #[arg(short = 't', long)]
    pub output_image: String,

    /// Requirements file installed with `-r`
    #[arg(long)]
    pub requirements: Option<PathBuf>,

    /// Package definition file (for example setup.py)
    #[arg(long)]
    pub setup: Option<PathBuf>,

    /// Local package archive or directory to install (repeatable)
    #[arg(long = "extra-package")]
    pub extra_packages: Vec<PathBuf>,

    /// Requirement installed from the package index (repeatable)
    #[arg(long = "extra-requirement")]
    pub extra_requirements: Vec<String>,

    /// Directory copied into the image at the same relative path (repeatable)
    #[arg(long = "extra-dir")]
    pub extra_dirs: Vec<PathBuf>,

    /// Port the container listens on (repeatable)
    #[arg(long = "port")]
    pub ports: Vec<u16>,

    /// Environment variable set in the image, as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_var)]
    pub env: Vec<(String, String)>,

    /// Working directory inside the image
    #[arg(long)]
    pub work_dir: Option<String>,

    /// HOME inside the image
    #[arg(long)]
    pub home_dir: Option<String>,

    /// Package installer inside the image
    #[arg(long)]
    pub installer: Option<String>,

    /// Interpreter for `.py` entry scripts and modules
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Reinstall packages even when already present in the base image
    #[arg(long)]
    pub force_reinstall: bool,
}

impl SourceArgs {
    /// Combine these arguments with `config` into a build request.
    pub fn to_request(&self, config: &TrainpackConfig, use_cache: bool) -> BuildRequest {
        let entry = match (&self.script, &self.module) {
            (Some(script), _) => EntryPoint::script(script.clone()),
            (None, Some(module)) => EntryPoint::module(module.clone()),
            // clap requires one of the two
            (None, None) => EntryPoint::module(String::new()),
        };

        let mut layout = ContainerLayout {
            base_image: self.base_image.clone().unwrap_or_default(),
            work_dir: self.work_dir.clone().unwrap_or_default(),
            home_dir: self.home_dir.clone().unwrap_or_default(),
            exposed_ports: self.ports.clone(),
            package_installer_command: self.installer.clone().unwrap_or_default(),
            script_interpreter_command: self.interpreter.clone().unwrap_or_default(),
            environment: self.env.clone(),
        };
        config.apply_to_layout(&mut layout);

        let mut dependencies = DependencySpec::new().with_force_reinstall(self.force_reinstall);
        dependencies.manifest_path.clone_from(&self.requirements);
        dependencies.package_definition_path.clone_from(&self.setup);
        dependencies.inline_packages.clone_from(&self.extra_packages);
        dependencies.inline_requirements.clone_from(&self.extra_requirements);
        dependencies.extra_dirs.clone_from(&self.extra_dirs);

        BuildRequest::new(SourcePackage::new(&self.source_dir, entry), layout, self.output_image.clone())
            .with_dependencies(dependencies)
            .with_cache(use_cache)
    }
}

fn parse_env_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if name.is_empty() {
        return Err(format!("missing variable name in {raw:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}
