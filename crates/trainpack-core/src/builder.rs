//! Build orchestration: validate a [`BuildRequest`], assemble its recipe and
//! hand it to the external image builder.

use crate::assembler::{self, ContextPath, RecipeSpec, ResolvedEntry};
use crate::error::{BuildError, BuildResult};
use crate::paths;
use crate::process::{CommandRunner, OutputSink, ProcessRunner, TracingSink};
use crate::recipe::BuildRecipe;
use crate::request::{BuildRequest, ContainerLayout, EntryPoint, ImageHandle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Image builder invoked when nothing else is configured.
pub const DEFAULT_BUILDER_COMMAND: &str = "docker";

/// Everything `build` needs, computed without spawning anything.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedBuild {
    pub recipe: BuildRecipe,
    /// The recipe as Dockerfile text, fed to the builder on stdin.
    pub rendered: String,
    pub argv: Vec<String>,
    pub handle: ImageHandle,
}

/// Turns build requests into images using an external builder CLI.
///
/// Holds no per-build state, so one instance can serve concurrent builds.
#[derive(Clone)]
pub struct ImageBuilder {
    builder_command: String,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn OutputSink>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ImageBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuilder").field("builder_command", &self.builder_command).finish_non_exhaustive()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            builder_command: DEFAULT_BUILDER_COMMAND.to_string(),
            runner: Arc::new(ProcessRunner::new()),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_builder_command(mut self, command: impl Into<String>) -> Self {
        self.builder_command = command.into();
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn builder_command(&self) -> &str {
        &self.builder_command
    }

    /// Check that the builder CLI can be started, by running `<builder> --version`.
    pub async fn check_available(&self) -> BuildResult<()> {
        let argv = vec![self.builder_command.clone(), "--version".to_string()];
        let code = self.runner.execute(&argv, None, self.sink.as_ref(), &CancellationToken::new()).await?;
        if code == 0 {
            Ok(())
        } else {
            Err(BuildError::BuilderFailed { command: argv, exit_code: code })
        }
    }

    /// Validate and normalize `request`, then assemble and render its recipe.
    pub fn prepare(&self, request: &BuildRequest) -> BuildResult<PreparedBuild> {
        let host_root = &request.source.host_root;
        let root = validate_host_root(host_root)?;
        let context_dir_name = paths::base_name(&root).ok_or_else(|| {
            BuildError::invalid_input("host_root", format!("{} has no directory name", host_root.display()))
        })?;

        let layout = normalize_layout(&request.layout)?;
        if request.output_image_name.trim().is_empty() {
            return Err(BuildError::invalid_input("output_image_name", "must not be empty"));
        }

        let deps = &request.dependencies;
        let package_definition = deps
            .package_definition_path
            .as_deref()
            .map(|path| context_path("package_definition_path", path, &root, EntryKind::File))
            .transpose()?;
        let manifest = deps
            .manifest_path
            .as_deref()
            .map(|path| context_path("manifest_path", path, &root, EntryKind::File))
            .transpose()?;
        let inline_packages = deps
            .inline_packages
            .iter()
            .map(|path| context_path("inline_packages", path, &root, EntryKind::Any))
            .collect::<BuildResult<Vec<_>>>()?;
        let extra_dirs = deps
            .extra_dirs
            .iter()
            .map(|path| context_path("extra_dirs", path, &root, EntryKind::Directory))
            .collect::<BuildResult<Vec<_>>>()?;
        for requirement in &deps.inline_requirements {
            if requirement.trim().is_empty() {
                return Err(BuildError::invalid_input("inline_requirements", "entries must not be empty"));
            }
        }

        let entry = resolve_entry(&request.source.entry, &root)?;

        let spec = RecipeSpec {
            base_image: layout.base_image,
            work_dir: layout.work_dir,
            home_dir: layout.home_dir,
            context_dir_name,
            package_definition,
            manifest,
            inline_packages,
            inline_requirements: deps.inline_requirements.clone(),
            extra_dirs,
            force_reinstall: deps.force_reinstall,
            exposed_ports: layout.exposed_ports,
            environment: layout.environment,
            installer: layout.package_installer_command,
            interpreter: layout.script_interpreter_command,
            entry,
        };

        let recipe = assembler::assemble(&spec);
        let rendered = recipe.render();
        let argv = self.builder_argv(request);
        let handle = ImageHandle {
            image_name: request.output_image_name.clone(),
            home_dir: spec.home_dir,
            work_dir: spec.work_dir,
        };

        Ok(PreparedBuild { recipe, rendered, argv, handle })
    }

    /// `[builder, "build", ("--no-cache"), "-t", image, "--rm", "-f-", host_root]`
    pub fn builder_argv(&self, request: &BuildRequest) -> Vec<String> {
        let mut argv = vec![self.builder_command.clone(), "build".to_string()];
        if !request.use_cache {
            argv.push("--no-cache".to_string());
        }
        argv.extend([
            "-t".to_string(),
            request.output_image_name.clone(),
            "--rm".to_string(),
            "-f-".to_string(),
            request.source.host_root.to_string_lossy().into_owned(),
        ]);
        argv
    }

    pub async fn build(&self, request: &BuildRequest) -> BuildResult<ImageHandle> {
        self.build_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`ImageBuilder::build`], stopping early when `cancel` fires.
    ///
    /// Cancelling before the builder starts yields [`BuildError::Cancelled`];
    /// afterwards the builder is killed and the result is
    /// [`BuildError::BuilderFailed`] with
    /// [`CANCELLED_EXIT_CODE`](crate::process::CANCELLED_EXIT_CODE).
    pub async fn build_with_cancel(
        &self,
        request: &BuildRequest,
        cancel: &CancellationToken,
    ) -> BuildResult<ImageHandle> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let prepared = self.prepare(request)?;
        debug!(recipe = %prepared.rendered, "assembled recipe");

        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        info!("Running: {}", prepared.argv.join(" "));
        let code = self
            .runner
            .execute(&prepared.argv, Some(&prepared.rendered), self.sink.as_ref(), cancel)
            .await?;

        if code == 0 {
            info!(image = %prepared.handle.image_name, "image built");
            Ok(prepared.handle)
        } else {
            Err(BuildError::BuilderFailed { command: prepared.argv, exit_code: code })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
    Any,
}

fn validate_host_root(host_root: &Path) -> BuildResult<PathBuf> {
    let not_a_dir = || {
        BuildError::invalid_input("host_root", format!("{} must be an existing directory", host_root.display()))
    };
    match std::fs::metadata(host_root) {
        Ok(metadata) if metadata.is_dir() => {}
        _ => return Err(not_a_dir()),
    }
    paths::resolve(host_root).map_err(|e| BuildError::io(host_root, e))
}

/// Check that `path` lies beneath `root` and has the expected type, and
/// express it relative to the build context.
fn context_path(field: &'static str, path: &Path, root: &Path, kind: EntryKind) -> BuildResult<ContextPath> {
    let path = &in_root(path, root);
    if !paths::is_beneath(path, root) {
        return Err(BuildError::invalid_input(
            field,
            format!("{} must lie beneath the source root {}", path.display(), root.display()),
        ));
    }

    let metadata = std::fs::metadata(path).map_err(|e| BuildError::io(path, e))?;
    match kind {
        EntryKind::File if !metadata.is_file() => {
            return Err(BuildError::invalid_input(field, format!("{} must be a file", path.display())));
        }
        EntryKind::Directory if !metadata.is_dir() => {
            return Err(BuildError::invalid_input(field, format!("{} must be a directory", path.display())));
        }
        _ => {}
    }

    let relative = paths::relative_posix(path, root)?;
    if relative == "." {
        return Err(BuildError::invalid_input(field, "must not be the source root itself"));
    }
    let resolved = paths::resolve(path).map_err(|e| BuildError::io(path, e))?;
    let name = paths::base_name(&resolved).unwrap_or_else(|| relative.clone());

    Ok(ContextPath { relative, name })
}

/// Relative request paths are anchored at the resolved source root.
fn in_root(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { root.join(path) }
}

fn resolve_entry(entry: &EntryPoint, root: &Path) -> BuildResult<ResolvedEntry> {
    match entry {
        EntryPoint::Module(module) => {
            let module = module.trim();
            if module.is_empty() {
                return Err(BuildError::invalid_input("module_name", "must not be empty"));
            }
            if module.chars().any(char::is_whitespace) {
                return Err(BuildError::invalid_input("module_name", "must be a dotted module name"));
            }
            Ok(ResolvedEntry::Module(module.to_string()))
        }
        EntryPoint::Script(script) => {
            if script.as_os_str().is_empty() {
                return Err(BuildError::invalid_input("script_path", "must not be empty"));
            }
            let script = in_root(script, root);
            if !paths::is_beneath(&script, root) || !script.is_file() {
                return Err(BuildError::invalid_input(
                    "script_path",
                    format!("{} must be a file beneath the source root {}", script.display(), root.display()),
                ));
            }
            // Relative to the parent so the path starts with the directory
            // the build context is copied into.
            let parent = root
                .parent()
                .ok_or_else(|| BuildError::invalid_input("host_root", "must not be the filesystem root"))?;
            Ok(ResolvedEntry::Script(paths::relative_posix(&script, parent)?))
        }
    }
}

/// Apply defaults to empty fields and validate the rest.
fn normalize_layout(layout: &ContainerLayout) -> BuildResult<ContainerLayout> {
    fn or_default(value: &str, default: &str) -> String {
        let value = value.trim();
        if value.is_empty() { default.to_string() } else { value.to_string() }
    }

    let base_image = layout.base_image.trim();
    if base_image.is_empty() {
        return Err(BuildError::invalid_input("base_image", "must not be empty"));
    }

    let work_dir = or_default(&layout.work_dir, ContainerLayout::DEFAULT_WORK_DIR);
    let home_dir = or_default(&layout.home_dir, ContainerLayout::DEFAULT_HOME_DIR);
    if !work_dir.starts_with('/') {
        return Err(BuildError::invalid_input("work_dir", format!("{work_dir} must be an absolute path")));
    }
    if !home_dir.starts_with('/') {
        return Err(BuildError::invalid_input("home_dir", format!("{home_dir} must be an absolute path")));
    }

    let mut exposed_ports = Vec::with_capacity(layout.exposed_ports.len());
    for port in &layout.exposed_ports {
        if *port == 0 {
            return Err(BuildError::invalid_input("exposed_ports", "port 0 cannot be exposed"));
        }
        if !exposed_ports.contains(port) {
            exposed_ports.push(*port);
        }
    }

    for (name, _) in &layout.environment {
        if name.is_empty() || name.contains('=') || name.chars().any(char::is_whitespace) {
            return Err(BuildError::invalid_input(
                "environment",
                format!("{name:?} is not a valid variable name"),
            ));
        }
    }

    Ok(ContainerLayout {
        base_image: base_image.to_string(),
        work_dir,
        home_dir,
        exposed_ports,
        package_installer_command: or_default(&layout.package_installer_command, ContainerLayout::DEFAULT_INSTALLER),
        script_interpreter_command: or_default(
            &layout.script_interpreter_command,
            ContainerLayout::DEFAULT_INTERPRETER,
        ),
        environment: layout.environment.clone(),
    })
}
