//! One-shot capture of every environment input the orchestrator consumes.
//!
//! Components never read `std::env` at operation time; the CLI captures a
//! `RuntimeEnv` once and threads it through. Tests build one from an
//! explicit key/value list.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_ABSOLUTE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_SLOT_CAPACITY: u32 = 1;

/// All environment inputs, resolved once.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    /// `CLAUDE_PROJECT_DIR`, canonicalized; defaults to the cwd.
    pub project_root: PathBuf,
    /// `CLAUDE_PLUGIN_ROOT`, verbatim.
    pub plugin_root: Option<PathBuf>,
    /// `CLAUDE_ENV_FILE`, verbatim (the supervisor validates it).
    pub env_file: Option<String>,
    /// `HAN_SESSION_ID`, falling back to `CLAUDE_SESSION_ID`.
    pub session_id: Option<String>,
    /// `HAN_NO_FAIL_FAST` = `1`/`true`.
    pub no_fail_fast: bool,
    /// `HAN_NO_CACHE` = `1`/`true`.
    pub no_cache: bool,
    /// `HAN_HOOK_ABSOLUTE_TIMEOUT` (seconds), default 300.
    pub absolute_timeout_secs: u64,
    /// `HAN_DEBUG` = `1`/`true`.
    pub debug: bool,
    /// `HAN_HOOK_SLOTS`, default 1.
    pub slot_capacity: u32,
}

fn flag_on(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("1") | Some("true"))
}

fn positive_int<T: std::str::FromStr + PartialOrd + From<u8>>(value: Option<&String>) -> Option<T> {
    value
        .and_then(|v| v.parse::<T>().ok())
        .filter(|v| *v >= T::from(1u8))
}

impl RuntimeEnv {
    /// Capture from the process environment and cwd.
    pub fn capture() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::from_vars(&vars, cwd)
    }

    /// Build from an explicit variable map. `cwd` is the fallback project
    /// root when `CLAUDE_PROJECT_DIR` is unset.
    pub fn from_vars(vars: &HashMap<String, String>, cwd: PathBuf) -> Result<Self> {
        let project_root = vars
            .get("CLAUDE_PROJECT_DIR")
            .map(PathBuf::from)
            .unwrap_or(cwd);
        let project_root = project_root.canonicalize().with_context(|| {
            format!("Failed to canonicalize project root: {}", project_root.display())
        })?;

        Ok(Self {
            project_root,
            plugin_root: vars.get("CLAUDE_PLUGIN_ROOT").map(PathBuf::from),
            env_file: vars.get("CLAUDE_ENV_FILE").cloned(),
            session_id: vars
                .get("HAN_SESSION_ID")
                .or_else(|| vars.get("CLAUDE_SESSION_ID"))
                .cloned(),
            no_fail_fast: flag_on(vars.get("HAN_NO_FAIL_FAST")),
            no_cache: flag_on(vars.get("HAN_NO_CACHE")),
            absolute_timeout_secs: positive_int(vars.get("HAN_HOOK_ABSOLUTE_TIMEOUT"))
                .unwrap_or(DEFAULT_ABSOLUTE_TIMEOUT_SECS),
            debug: flag_on(vars.get("HAN_DEBUG")),
            slot_capacity: positive_int(vars.get("HAN_HOOK_SLOTS"))
                .unwrap_or(DEFAULT_SLOT_CAPACITY),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let dir = tempdir().unwrap();
        let env = RuntimeEnv::from_vars(&vars(&[]), dir.path().to_path_buf()).unwrap();

        assert_eq!(env.project_root, dir.path().canonicalize().unwrap());
        assert!(env.plugin_root.is_none());
        assert!(env.env_file.is_none());
        assert!(env.session_id.is_none());
        assert!(!env.no_fail_fast);
        assert!(!env.no_cache);
        assert_eq!(env.absolute_timeout_secs, 300);
        assert!(!env.debug);
        assert_eq!(env.slot_capacity, 1);
    }

    #[test]
    fn test_project_dir_override() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        let env = RuntimeEnv::from_vars(
            &vars(&[("CLAUDE_PROJECT_DIR", other.path().to_str().unwrap())]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(env.project_root, other.path().canonicalize().unwrap());
    }

    #[test]
    fn test_missing_project_dir_is_error() {
        let dir = tempdir().unwrap();
        let result = RuntimeEnv::from_vars(
            &vars(&[("CLAUDE_PROJECT_DIR", "/definitely/not/here")]),
            dir.path().to_path_buf(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_session_id_precedence() {
        let dir = tempdir().unwrap();
        let env = RuntimeEnv::from_vars(
            &vars(&[("HAN_SESSION_ID", "s-han"), ("CLAUDE_SESSION_ID", "s-claude")]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(env.session_id.as_deref(), Some("s-han"));

        let env = RuntimeEnv::from_vars(
            &vars(&[("CLAUDE_SESSION_ID", "s-claude")]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(env.session_id.as_deref(), Some("s-claude"));
    }

    #[test]
    fn test_flag_forms() {
        let dir = tempdir().unwrap();
        for on in ["1", "true"] {
            let env = RuntimeEnv::from_vars(
                &vars(&[("HAN_NO_FAIL_FAST", on), ("HAN_NO_CACHE", on), ("HAN_DEBUG", on)]),
                dir.path().to_path_buf(),
            )
            .unwrap();
            assert!(env.no_fail_fast && env.no_cache && env.debug);
        }
        let env = RuntimeEnv::from_vars(
            &vars(&[("HAN_NO_FAIL_FAST", "yes"), ("HAN_NO_CACHE", "0")]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert!(!env.no_fail_fast && !env.no_cache);
    }

    #[test]
    fn test_absolute_timeout_override() {
        let dir = tempdir().unwrap();
        let env = RuntimeEnv::from_vars(
            &vars(&[("HAN_HOOK_ABSOLUTE_TIMEOUT", "10")]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(env.absolute_timeout_secs, 10);
    }

    #[test]
    fn test_absolute_timeout_rejects_garbage_and_zero() {
        let dir = tempdir().unwrap();
        for bad in ["0", "-5", "soon"] {
            let env = RuntimeEnv::from_vars(
                &vars(&[("HAN_HOOK_ABSOLUTE_TIMEOUT", bad)]),
                dir.path().to_path_buf(),
            )
            .unwrap();
            assert_eq!(env.absolute_timeout_secs, 300, "input {bad:?}");
        }
    }

    #[test]
    fn test_slot_capacity_override() {
        let dir = tempdir().unwrap();
        let env = RuntimeEnv::from_vars(
            &vars(&[("HAN_HOOK_SLOTS", "4")]),
            dir.path().to_path_buf(),
        )
        .unwrap();
        assert_eq!(env.slot_capacity, 4);
    }
}
