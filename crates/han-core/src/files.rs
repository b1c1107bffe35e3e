//! Glob enumeration of the files a hook owns inside one directory.
//!
//! Walks with gitignore semantics so build artifacts and vendored trees
//! never count toward change detection, then filters against the hook's
//! patterns. `*` does not cross `/`; `**` does.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Match options shared by every pattern test in the crate: `*` stays
/// within one path segment, `**` spans segments.
fn match_options() -> glob::MatchOptions {
    glob::MatchOptions {
        require_literal_separator: true,
        ..Default::default()
    }
}

/// Compile a pattern list, rejecting invalid globs up front.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| glob::Pattern::new(p).with_context(|| format!("Invalid glob pattern: {p}")))
        .collect()
}

/// Test a directory-relative path against compiled patterns.
pub fn matches_any(relative: &Path, patterns: &[glob::Pattern]) -> bool {
    let opts = match_options();
    let text = relative.to_string_lossy();
    patterns.iter().any(|p| p.matches_with(&text, opts))
}

/// Enumerate files under `dir` matching any of `patterns` (rooted at
/// `dir`). Returns absolute paths in sorted order.
pub fn matched_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let compiled = compile_patterns(patterns)?;
    if compiled.is_empty() {
        return Ok(Vec::new());
    }

    let canonical_root = dir
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize hook directory: {}", dir.display()))?;

    let mut builder = WalkBuilder::new(&canonical_root);
    builder.hidden(false);
    builder.git_ignore(true);
    builder.git_global(true);
    builder.git_exclude(true);
    builder.parents(true);
    // Ignore rules apply whether or not the directory is a git checkout.
    builder.require_git(false);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(error = %error, "Skipping unreadable walk entry");
                continue;
            }
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(&canonical_root) else {
            continue;
        };
        if matches_any(relative, &compiled) {
            files.push(canonical_root.join(relative));
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
    }

    #[test]
    fn test_matched_files_double_star_spans_dirs() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/a.ts");
        touch(dir.path(), "src/deep/b.ts");
        touch(dir.path(), "src/c.js");

        let files = matched_files(dir.path(), &["**/*.ts".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path().canonicalize().unwrap()).unwrap())
            .map(|f| f.display().to_string())
            .collect();
        assert_eq!(names, vec!["src/a.ts", "src/deep/b.ts"]);
    }

    #[test]
    fn test_matched_files_single_star_stays_in_segment() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.ts");
        touch(dir.path(), "src/b.ts");

        let files = matched_files(dir.path(), &["*.ts".to_string()]).unwrap();
        assert_eq!(files.len(), 1, "bare * must not cross /");
    }

    #[test]
    fn test_matched_files_respects_gitignore() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/a.ts");
        touch(dir.path(), "dist/b.ts");
        fs::write(dir.path().join(".gitignore"), "dist/\n").unwrap();

        let files = matched_files(dir.path(), &["**/*.ts".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/a.ts"));
    }

    #[test]
    fn test_matched_files_empty_patterns() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.ts");
        let files = matched_files(dir.path(), &[]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_matched_files_invalid_pattern_is_error() {
        let dir = tempdir().unwrap();
        let result = matched_files(dir.path(), &["[".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_matched_files_sorted() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "z.ts");
        touch(dir.path(), "a.ts");
        touch(dir.path(), "m.ts");

        let files = matched_files(dir.path(), &["*.ts".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.ts", "m.ts", "z.ts"]);
    }

    #[test]
    fn test_matches_any_relative_paths() {
        let patterns = compile_patterns(&["src/**/*.rs".to_string()]).unwrap();
        assert!(matches_any(Path::new("src/lib.rs"), &patterns));
        assert!(matches_any(Path::new("src/deep/mod.rs"), &patterns));
        assert!(!matches_any(Path::new("tests/it.rs"), &patterns));
    }
}
