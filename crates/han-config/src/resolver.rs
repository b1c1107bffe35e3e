//! Resolution of one hook into its ordered per-directory configurations.

use anyhow::{Context, Result};
use han_core::HookError;
use han_core::paths::{canonicalize_dir, normalize_trailing_slash, relative_display};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::plugin::{HookDef, PluginHooks};

/// One hook in one directory, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHookConfig {
    /// Absolute, canonical (symlinks followed), within the project root.
    pub directory: PathBuf,
    pub command: String,
    pub if_changed: Vec<String>,
    pub idle_timeout: Option<u64>,
    pub enabled: bool,
}

/// Resolve `(plugin_root, hook_name, project_root)` into an ordered list
/// of per-directory configurations, one per target directory,
/// lexicographic by directory.
///
/// `only`, when set, keeps exactly the configuration whose directory
/// equals it (relative to the project root or absolute; a trailing slash
/// is tolerated). No match is [`HookError::NoMatchingDirectory`].
pub fn resolve_hook_configs(
    plugin_root: &Path,
    hook_name: &str,
    project_root: &Path,
    only: Option<&str>,
) -> Result<Vec<ResolvedHookConfig>> {
    let project_root = canonicalize_dir(project_root)?;
    let hooks = PluginHooks::load(plugin_root)?;
    let Some(def) = hooks.get(hook_name) else {
        let plugin = plugin_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| plugin_root.display().to_string());
        return Err(HookError::HookNotFound {
            plugin,
            hook: hook_name.to_string(),
        }
        .into());
    };

    let directories = resolve_directories(def, &project_root)?;
    let mut configs: Vec<ResolvedHookConfig> = directories
        .into_iter()
        .map(|directory| ResolvedHookConfig {
            directory,
            command: def.command.clone(),
            if_changed: def.if_changed.clone(),
            idle_timeout: def.idle_timeout,
            enabled: def.enabled,
        })
        .collect();

    if let Some(only) = only {
        let wanted = normalize_trailing_slash(only);
        configs.retain(|cfg| {
            relative_display(&cfg.directory, &project_root) == wanted
                || cfg.directory == Path::new(wanted)
        });
        if configs.is_empty() {
            return Err(HookError::NoMatchingDirectory(only.to_string()).into());
        }
    }

    Ok(configs)
}

/// Expand `dirs` globs and `dirs_with` markers into the set of target
/// directories. A hook declaring neither runs once at the project root.
/// `project_root` is already canonical.
fn resolve_directories(def: &HookDef, project_root: &Path) -> Result<Vec<PathBuf>> {
    if def.dirs.is_empty() && def.dirs_with.is_empty() {
        return Ok(vec![project_root.to_path_buf()]);
    }

    let mut found: BTreeSet<PathBuf> = BTreeSet::new();

    let match_opts = glob::MatchOptions {
        require_literal_separator: true,
        ..Default::default()
    };
    for pattern in &def.dirs {
        let rooted = project_root.join(pattern);
        let rooted = rooted.to_string_lossy();
        let entries = glob::glob_with(&rooted, match_opts)
            .with_context(|| format!("Invalid directory glob: {pattern}"))?;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(error) => {
                    tracing::debug!(error = %error, "Skipping unreadable glob entry");
                    continue;
                }
            };
            if path.is_dir() {
                insert_if_within(&mut found, &path, &project_root);
            }
        }
    }

    if !def.dirs_with.is_empty() {
        let mut builder = WalkBuilder::new(&project_root);
        builder.hidden(false);
        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);
        builder.parents(true);
        // Ignore rules apply whether or not the project is a git checkout.
        builder.require_git(false);

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::debug!(error = %error, "Skipping unreadable walk entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if def.dirs_with.iter().any(|marker| marker.as_str() == name)
                && let Some(parent) = entry.path().parent()
            {
                insert_if_within(&mut found, parent, &project_root);
            }
        }
    }

    Ok(found.into_iter().collect())
}

fn insert_if_within(found: &mut BTreeSet<PathBuf>, path: &Path, project_root: &Path) {
    let canonical = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(error) => {
            tracing::debug!(path = %path.display(), error = %error, "Skipping directory that failed canonicalization");
            return;
        }
    };
    if canonical.starts_with(project_root) {
        found.insert(canonical);
    } else {
        tracing::warn!(
            path = %canonical.display(),
            root = %project_root.display(),
            "Skipping hook directory outside the project root"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_hooks(plugin_root: &Path, body: &str) {
        fs::write(plugin_root.join("hooks.toml"), body).unwrap();
    }

    fn project_with_packages() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for name in ["a", "b", "c"] {
            let pkg = dir.path().join("packages").join(name);
            fs::create_dir_all(&pkg).unwrap();
            fs::write(pkg.join("package.json"), "{}").unwrap();
        }
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        dir
    }

    #[test]
    fn test_resolve_no_dirs_defaults_to_project_root() {
        let plugin = tempdir().unwrap();
        write_hooks(plugin.path(), "[hooks.lint]\ncommand = \"true\"\n");
        let project = tempdir().unwrap();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].directory, project.path().canonicalize().unwrap());
        assert!(configs[0].enabled);
    }

    #[test]
    fn test_resolve_dirs_glob_ordered() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"packages/*\"]\n",
        );
        let project = project_with_packages();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        let rels: Vec<_> = configs
            .iter()
            .map(|c| relative_display(&c.directory, &project.path().canonicalize().unwrap()))
            .collect();
        assert_eq!(rels, vec!["packages/a", "packages/b", "packages/c"]);
    }

    #[test]
    fn test_resolve_dirs_with_markers() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs_with = [\"package.json\"]\n",
        );
        let project = project_with_packages();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        assert_eq!(configs.len(), 3, "docs/ has no marker");
    }

    #[test]
    fn test_resolve_dirs_and_markers_deduped() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"packages/a\"]\ndirs_with = [\"package.json\"]\n",
        );
        let project = project_with_packages();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        assert_eq!(configs.len(), 3, "packages/a appears once");
    }

    #[test]
    fn test_only_filter_selects_one() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"packages/*\"]\n",
        );
        let project = project_with_packages();

        let configs =
            resolve_hook_configs(plugin.path(), "lint", project.path(), Some("packages/b"))
                .unwrap();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].directory.ends_with("packages/b"));
    }

    #[test]
    fn test_only_filter_tolerates_trailing_slash() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"packages/*\"]\n",
        );
        let project = project_with_packages();

        let configs =
            resolve_hook_configs(plugin.path(), "lint", project.path(), Some("packages/b/"))
                .unwrap();
        assert_eq!(configs.len(), 1);
    }

    #[test]
    fn test_only_filter_no_match_is_error() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"packages/*\"]\n",
        );
        let project = project_with_packages();

        let err = resolve_hook_configs(plugin.path(), "lint", project.path(), Some("packages/z"))
            .unwrap_err();
        let hook_err = err.downcast_ref::<HookError>().unwrap();
        assert!(matches!(hook_err, HookError::NoMatchingDirectory(d) if d == "packages/z"));
    }

    #[test]
    fn test_unknown_hook_is_error() {
        let plugin = tempdir().unwrap();
        write_hooks(plugin.path(), "[hooks.lint]\ncommand = \"true\"\n");
        let project = tempdir().unwrap();

        let err = resolve_hook_configs(plugin.path(), "format", project.path(), None).unwrap_err();
        let hook_err = err.downcast_ref::<HookError>().unwrap();
        assert!(matches!(hook_err, HookError::HookNotFound { hook, .. } if hook == "format"));
    }

    #[test]
    fn test_disabled_flag_carried_through() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\nenabled = false\n",
        );
        let project = tempdir().unwrap();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        assert!(!configs[0].enabled);
    }

    #[test]
    fn test_symlinked_dir_resolves_canonical() {
        let plugin = tempdir().unwrap();
        write_hooks(
            plugin.path(),
            "[hooks.lint]\ncommand = \"true\"\ndirs = [\"link\"]\n",
        );
        let project = tempdir().unwrap();
        let real = project.path().join("real");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, project.path().join("link")).unwrap();

        let configs = resolve_hook_configs(plugin.path(), "lint", project.path(), None).unwrap();
        assert_eq!(configs.len(), 1);
        assert!(configs[0].directory.ends_with("real"));
    }
}
