//! Path canonicalization and display helpers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Canonicalize a directory, following symlinks.
pub fn canonicalize_dir(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize: {}", path.display()))?;
    if !canonical.is_dir() {
        anyhow::bail!("Not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

/// Display a directory relative to the project root, or `.` for the root
/// itself. Paths outside the root render absolute.
pub fn relative_display(dir: &Path, project_root: &Path) -> String {
    match dir.strip_prefix(project_root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => dir.display().to_string(),
    }
}

/// Strip a single trailing slash, so `--only packages/x/` matches the
/// resolved directory `packages/x`.
pub fn normalize_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Sanitize a path for use as a filename component in output artifacts.
/// Everything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_component(path: &str) -> String {
    path.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
