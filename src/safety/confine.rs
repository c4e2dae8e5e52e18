/// Path confinement for session directories.
///
/// Two layers: a lexical check on the requested relative path (absolute,
/// empty, `..` escaping, existing symlinks on the way) and a post-creation
/// check that the canonical parent still lies under the canonical root.
use crate::config::types::{Result, SandboxError};
use crate::observability::audit;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Accept only a single plain `*.py` file name.
///
/// A leading `-` is refused as well since the name ends up on an
/// interpreter command line.
pub fn validate_filename(name: &str) -> Result<()> {
    let path = Path::new(name);
    let mut components = path.components();
    let single_plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_plain || name.starts_with('-') || name.contains(['/', '\\', '\0']) {
        return Err(SandboxError::path_escape(name));
    }
    match name.strip_suffix(".py") {
        Some(stem) if !stem.is_empty() => Ok(()),
        _ => Err(SandboxError::path_escape(name)),
    }
}

/// Lexically normalise `rel` against an implicit root.
///
/// Fails when the result would be the root itself or would climb above it.
fn normalize_relative(rel: &Path) -> Result<PathBuf> {
    if rel.as_os_str().is_empty() || rel.is_absolute() {
        return Err(SandboxError::path_escape(rel));
    }
    if rel.to_string_lossy().contains('\0') {
        return Err(SandboxError::path_escape(rel));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(SandboxError::path_escape(rel));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::path_escape(rel));
            }
        }
    }

    if parts.is_empty() {
        return Err(SandboxError::path_escape(rel));
    }
    Ok(parts.iter().collect())
}

/// Resolve `rel` to a path under `root`, refusing any escape.
///
/// Every component that already exists is inspected without following it;
/// a symlink anywhere on the way counts as an escape.
pub fn resolve_within(root: &Path, rel: &Path) -> Result<PathBuf> {
    let normalized = normalize_relative(rel).map_err(|e| {
        audit::path_escape_attempt(root, &rel.display().to_string(), "lexical");
        e
    })?;

    let mut current = root.to_path_buf();
    for part in normalized.iter() {
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                audit::path_escape_attempt(root, &rel.display().to_string(), "symlink");
                return Err(SandboxError::path_escape(rel));
            }
            Ok(_) => {}
            // nothing deeper can exist either
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(SandboxError::Io(e)),
        }
    }

    Ok(root.join(normalized))
}

/// Create the parent directories of `target` and verify the canonical parent
/// is still inside the canonical `root`.
pub fn prepare_parent(root: &Path, target: &Path) -> Result<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| SandboxError::path_escape(target))?;
    fs::create_dir_all(parent)?;

    let canonical_root = fs::canonicalize(root)?;
    let canonical_parent = fs::canonicalize(parent)?;
    ensure_inside(&canonical_root, &canonical_parent)?;
    Ok(canonical_parent)
}

/// Component-wise containment check on already canonical paths
pub fn ensure_inside(canonical_root: &Path, candidate: &Path) -> Result<()> {
    if candidate.starts_with(canonical_root) {
        Ok(())
    } else {
        audit::path_escape_attempt(
            canonical_root,
            &candidate.display().to_string(),
            "canonical",
        );
        Err(SandboxError::path_escape(candidate))
    }
}
