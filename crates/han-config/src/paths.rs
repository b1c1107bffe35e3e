//! Filesystem layout under the user's XDG directories.
//!
//! The coordinator lives under the config root (it is the interop surface
//! shared by unrelated processes); session journals and validation
//! records live under the state root.

use std::path::{Path, PathBuf};

/// Canonical XDG app name.
pub const APP_NAME: &str = "han";

/// Resolved root directories. Tests construct this over a tempdir via
/// [`HanPaths::rooted_at`]; production code uses [`HanPaths::resolve`].
#[derive(Debug, Clone)]
pub struct HanPaths {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl HanPaths {
    /// Resolve from the platform XDG directories.
    pub fn resolve() -> Option<Self> {
        let dirs = directories::ProjectDirs::from("", "", APP_NAME)?;
        let state_dir = dirs
            .state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf();
        Some(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            state_dir,
        })
    }

    /// Root both directories under one base, for tests.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            config_dir: base.join("config"),
            state_dir: base.join("state"),
        }
    }

    /// Installed plugins: `<config>/plugins/<name>`.
    pub fn plugins_dir(&self) -> PathBuf {
        self.config_dir.join("plugins")
    }

    /// Slot coordinator directory: `<config>/coordinator`.
    pub fn coordinator_dir(&self) -> PathBuf {
        self.config_dir.join("coordinator")
    }

    /// Per-session modified-file journals: `<state>/sessions`.
    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    /// Validation records: `<state>/validations`.
    pub fn validations_dir(&self) -> PathBuf {
        self.state_dir.join("validations")
    }
}

/// Where hook output and debug artifacts land: `<tempdir>/han-hook-output`.
pub fn hook_output_dir() -> PathBuf {
    std::env::temp_dir().join(format!("{APP_NAME}-hook-output"))
}
