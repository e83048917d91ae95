//! Path containment checks for build-context inputs.
//!
//! Every host path that ends up in a `COPY` directive has to live inside the
//! build context, otherwise the image builder cannot see it. The helpers here
//! resolve symlinks before comparing so a link pointing out of the source tree
//! is rejected the same way a plain out-of-tree path is.

use crate::error::{BuildError, BuildResult};
use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute, symlink-free form.
///
/// Relative paths are taken against the current directory. The longest
/// existing prefix is canonicalized; any remainder that does not exist yet is
/// normalized lexically (`.` dropped, `..` pops a component).
pub fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let components: Vec<Component<'_>> = absolute.components().collect();
    let mut split = components.len();
    let mut base = loop {
        if split == 0 {
            break PathBuf::new();
        }
        let prefix: PathBuf = components[..split].iter().collect();
        if let Ok(canonical) = prefix.canonicalize() {
            break canonical;
        }
        split -= 1;
    };

    for component in &components[split..] {
        match component {
            Component::ParentDir => {
                base.pop();
            }
            Component::CurDir => {}
            other => base.push(other.as_os_str()),
        }
    }

    Ok(base)
}

/// True iff `candidate` resolves to `root` or something beneath it.
///
/// The comparison is component-wise, so `/src-other` is not beneath `/src`.
pub fn is_beneath(candidate: &Path, root: &Path) -> bool {
    match (resolve(candidate), resolve(root)) {
        (Ok(candidate), Ok(root)) => candidate.starts_with(root),
        _ => false,
    }
}

/// Path of `candidate` relative to `root`, always joined with `/`.
///
/// Returns `"."` when both resolve to the same directory.
pub fn relative_posix(candidate: &Path, root: &Path) -> BuildResult<String> {
    let resolved_candidate =
        resolve(candidate).map_err(|e| BuildError::io(candidate, e))?;
    let resolved_root = resolve(root).map_err(|e| BuildError::io(root, e))?;

    let relative = resolved_candidate.strip_prefix(&resolved_root).map_err(|_| {
        BuildError::invalid_input(
            "path",
            format!("{} is not beneath {}", candidate.display(), root.display()),
        )
    })?;

    Ok(to_posix(relative))
}

/// Join the normal components of a relative path with forward slashes.
pub(crate) fn to_posix(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() { ".".to_string() } else { parts.join("/") }
}

/// Final component of a resolved path, as a string.
pub(crate) fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
