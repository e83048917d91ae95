//! Inputs to an image build and the handle returned by a successful one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What the container runs when the training service starts it.
///
/// A relative script path is taken relative to the source root, not the
/// current directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// A script under the source root. `.py` files run under the interpreter,
    /// anything else under `/bin/bash`.
    Script(PathBuf),
    /// A dotted module name run with `<interpreter> -m`.
    Module(String),
}

impl EntryPoint {
    pub fn script(path: impl Into<PathBuf>) -> Self {
        Self::Script(path.into())
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::Module(name.into())
    }
}

/// The host directory copied into the image, plus its entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackage {
    pub host_root: PathBuf,
    pub entry: EntryPoint,
}

impl SourcePackage {
    pub fn new(host_root: impl Into<PathBuf>, entry: EntryPoint) -> Self {
        Self { host_root: host_root.into(), entry }
    }
}

/// Third-party and local dependencies installed into the image.
///
/// Every host path here must live beneath the source root. Relative paths
/// are taken relative to the source root, not the current directory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Requirements file installed with `-r`.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// Package descriptor (for example `setup.py`) installed from the work dir.
    #[serde(default)]
    pub package_definition_path: Option<PathBuf>,

    /// Local archives or directories, each copied in and installed.
    #[serde(default)]
    pub inline_packages: Vec<PathBuf>,

    /// Requirement strings installed from the package index with `--upgrade`.
    #[serde(default)]
    pub inline_requirements: Vec<String>,

    /// Directories copied into the image at their relative location.
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,

    /// Pass `--force-reinstall` to every installer invocation.
    #[serde(default)]
    pub force_reinstall: bool,
}

impl DependencySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    pub fn with_package_definition(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_definition_path = Some(path.into());
        self
    }

    pub fn with_inline_package(mut self, path: impl Into<PathBuf>) -> Self {
        self.inline_packages.push(path.into());
        self
    }

    pub fn with_inline_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.inline_requirements.push(requirement.into());
        self
    }

    pub fn with_extra_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(path.into());
        self
    }

    pub fn with_force_reinstall(mut self, force_reinstall: bool) -> Self {
        self.force_reinstall = force_reinstall;
        self
    }
}

/// How the image is laid out and which in-container programs it uses.
///
/// Empty strings fall back to the associated defaults when a build is prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLayout {
    pub base_image: String,

    #[serde(default)]
    pub work_dir: String,

    #[serde(default)]
    pub home_dir: String,

    /// Listening ports, in declaration order. Duplicates are ignored.
    #[serde(default)]
    pub exposed_ports: Vec<u16>,

    #[serde(default)]
    pub package_installer_command: String,

    #[serde(default)]
    pub script_interpreter_command: String,

    /// Extra `ENV` entries, emitted just before the entry point.
    #[serde(default)]
    pub environment: Vec<(String, String)>,
}

impl ContainerLayout {
    pub const DEFAULT_WORK_DIR: &'static str = "/usr/app";
    pub const DEFAULT_HOME_DIR: &'static str = "/home";
    pub const DEFAULT_INSTALLER: &'static str = "pip";
    pub const DEFAULT_INTERPRETER: &'static str = "python";
    /// Runs entry scripts that are not Python.
    pub const SHELL: &'static str = "/bin/bash";

    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            work_dir: Self::DEFAULT_WORK_DIR.to_string(),
            home_dir: Self::DEFAULT_HOME_DIR.to_string(),
            exposed_ports: Vec::new(),
            package_installer_command: Self::DEFAULT_INSTALLER.to_string(),
            script_interpreter_command: Self::DEFAULT_INTERPRETER.to_string(),
            environment: Vec::new(),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<String>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_home_dir(mut self, home_dir: impl Into<String>) -> Self {
        self.home_dir = home_dir.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    pub fn with_installer(mut self, command: impl Into<String>) -> Self {
        self.package_installer_command = command.into();
        self
    }

    pub fn with_interpreter(mut self, command: impl Into<String>) -> Self {
        self.script_interpreter_command = command.into();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((name.into(), value.into()));
        self
    }
}

/// Everything needed for one image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub source: SourcePackage,
    #[serde(default)]
    pub dependencies: DependencySpec,
    pub layout: ContainerLayout,
    pub output_image_name: String,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

impl BuildRequest {
    pub fn new(source: SourcePackage, layout: ContainerLayout, output_image_name: impl Into<String>) -> Self {
        Self {
            source,
            dependencies: DependencySpec::default(),
            layout,
            output_image_name: output_image_name.into(),
            use_cache: true,
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencySpec) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// A successfully built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub image_name: String,
    pub home_dir: String,
    pub work_dir: String,
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (workdir {}, home {})", self.image_name, self.work_dir, self.home_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_new_uses_defaults() {
        let layout = ContainerLayout::new("base:1");
        assert_eq!(layout.work_dir, "/usr/app");
        assert_eq!(layout.home_dir, "/home");
        assert_eq!(layout.package_installer_command, "pip");
        assert_eq!(layout.script_interpreter_command, "python");
        assert!(layout.exposed_ports.is_empty());
    }

    #[test]
    fn test_dependency_builder_preserves_order() {
        let deps = DependencySpec::new()
            .with_inline_package("/src/pkgB")
            .with_inline_package("/src/pkgA")
            .with_inline_requirement("torch")
            .with_inline_requirement("numpy");

        assert_eq!(deps.inline_packages, vec![PathBuf::from("/src/pkgB"), PathBuf::from("/src/pkgA")]);
        assert_eq!(deps.inline_requirements, vec!["torch", "numpy"]);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "source": { "host_root": "/src", "entry": { "module": "train" } },
            "layout": { "base_image": "base:1" },
            "output_image_name": "img:v1"
        }"#;
        let request: BuildRequest = serde_json::from_str(json).unwrap();
        assert!(request.use_cache);
        assert_eq!(request.dependencies, DependencySpec::default());
        assert_eq!(request.source.entry, EntryPoint::module("train"));
        assert!(request.layout.work_dir.is_empty());
    }
}
