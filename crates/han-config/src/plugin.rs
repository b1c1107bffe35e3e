//! Plugin discovery and per-plugin hook definitions.
//!
//! A plugin is a directory whose trailing name segment is the plugin
//! name. Its hooks are declared in a `hooks.toml` at the plugin root:
//!
//! ```toml
//! [hooks.lint]
//! command = "eslint ${HAN_FILES}"
//! if_changed = ["**/*.ts"]
//! idle_timeout = 30
//! dirs = ["packages/*"]
//! dirs_with = ["package.json"]
//! ```

use anyhow::{Context, Result};
use han_core::HookError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One hook as declared by the plugin author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookDef {
    /// Shell command; may contain the `${HAN_FILES}` placeholder.
    pub command: String,
    /// Glob patterns (rooted at each resolved directory) enumerating the
    /// files this hook validates. Empty means "entire codebase": the
    /// hook always runs and never records per-file validations.
    #[serde(default)]
    pub if_changed: Vec<String>,
    /// Kill the child when no output arrives for this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory globs relative to the project root.
    #[serde(default)]
    pub dirs: Vec<String>,
    /// Marker file names; every project directory containing one is a
    /// target directory for this hook.
    #[serde(default)]
    pub dirs_with: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// All hooks declared by one plugin, keyed by hook name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginHooks {
    #[serde(default)]
    pub hooks: BTreeMap<String, HookDef>,
}

pub const HOOKS_FILE_NAME: &str = "hooks.toml";

impl PluginHooks {
    /// Load `hooks.toml` from a plugin root. A missing file is an empty
    /// definition set, not an error; a malformed file is an error (the
    /// plugin is installed but broken, which the user must see).
    pub fn load(plugin_root: &Path) -> Result<Self> {
        let path = plugin_root.join(HOOKS_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn get(&self, hook_name: &str) -> Option<&HookDef> {
        self.hooks.get(hook_name)
    }
}

/// Resolve the plugin root directory.
///
/// An explicit root (from `CLAUDE_PLUGIN_ROOT`) wins but must have the
/// requested plugin name as its trailing segment. Otherwise the plugin is
/// looked up under the installed-plugins directory.
pub fn resolve_plugin_root(
    explicit_root: Option<&Path>,
    plugins_dir: &Path,
    plugin_name: &str,
) -> Result<PathBuf> {
    if let Some(root) = explicit_root {
        let trailing = root.file_name().map(|n| n.to_string_lossy().to_string());
        if trailing.as_deref() != Some(plugin_name) {
            return Err(HookError::PluginMismatch {
                requested: plugin_name.to_string(),
                resolved: root.display().to_string(),
            }
            .into());
        }
        return Ok(root.to_path_buf());
    }

    let candidate = plugins_dir.join(plugin_name);
    if !candidate.is_dir() {
        return Err(HookError::PluginNotFound(plugin_name.to_string()).into());
    }
    Ok(candidate)
}
