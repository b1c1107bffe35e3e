//! Per-session modified-file journal.
//!
//! The editor reports the files a session touches; each report is one
//! JSON line appended to `<sessions>/<id>/modified-files.jsonl`. Entries
//! carry the directory they were recorded from so relative paths stay
//! resolvable later. Readers take a point-in-time snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const JOURNAL_FILE_NAME: &str = "modified-files.jsonl";

/// One journaled modification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedFileRecord {
    /// Absolute, or relative to `recorded_in`.
    pub path: PathBuf,
    /// Directory the report was made from.
    pub recorded_in: PathBuf,
    pub recorded_at: DateTime<Utc>,
}

/// Append modification reports for a session.
///
/// Relative `paths` are journaled as-is together with `recorded_in`;
/// resolution happens at read time.
pub fn record_modified_files(
    sessions_dir: &Path,
    session_id: &str,
    recorded_in: &Path,
    paths: &[PathBuf],
) -> Result<()> {
    let session_dir = sessions_dir.join(session_id);
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create session directory: {}", session_dir.display()))?;

    let journal_path = session_dir.join(JOURNAL_FILE_NAME);
    let mut journal = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&journal_path)
        .with_context(|| format!("Failed to open journal: {}", journal_path.display()))?;

    let recorded_at = Utc::now();
    for path in paths {
        let record = ModifiedFileRecord {
            path: path.clone(),
            recorded_in: recorded_in.to_path_buf(),
            recorded_at,
        };
        let mut line = serde_json::to_string(&record).context("Failed to serialize record")?;
        line.push('\n');
        journal
            .write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", journal_path.display()))?;
    }
    Ok(())
}

/// Point-in-time snapshot of the files one session has modified.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    all_modified: Vec<PathBuf>,
}

impl SessionFiles {
    /// Load the journal for `session_id`. A session that never reported
    /// anything yields an empty snapshot, not an error. Malformed lines
    /// are skipped with a diagnostic (a crashed writer may leave a torn
    /// final line).
    pub fn load(sessions_dir: &Path, session_id: &str) -> Result<Self> {
        let journal_path = sessions_dir.join(session_id).join(JOURNAL_FILE_NAME);
        if !journal_path.exists() {
            return Ok(Self {
                all_modified: Vec::new(),
            });
        }

        let content = fs::read_to_string(&journal_path)
            .with_context(|| format!("Failed to read journal: {}", journal_path.display()))?;

        let mut all_modified = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ModifiedFileRecord>(line) {
                Ok(record) => {
                    let absolute = if record.path.is_absolute() {
                        record.path
                    } else {
                        record.recorded_in.join(&record.path)
                    };
                    if !all_modified.contains(&absolute) {
                        all_modified.push(absolute);
                    }
                }
                Err(error) => {
                    tracing::debug!(error = %error, "Skipping malformed journal line");
                }
            }
        }

        Ok(Self { all_modified })
    }

    /// Every modified file, as absolute paths, first-report order,
    /// deduplicated.
    pub fn all_modified(&self) -> &[PathBuf] {
        &self.all_modified
    }

    pub fn is_empty(&self) -> bool {
        self.all_modified.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unknown_session_is_empty() {
        let dir = tempdir().unwrap();
        let files = SessionFiles::load(dir.path(), "nope").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_record_then_load_absolute() {
        let dir = tempdir().unwrap();
        record_modified_files(
            dir.path(),
            "s1",
            Path::new("/p"),
            &[PathBuf::from("/p/app/src/a.ts")],
        )
        .unwrap();

        let files = SessionFiles::load(dir.path(), "s1").unwrap();
        assert_eq!(files.all_modified(), [PathBuf::from("/p/app/src/a.ts")]);
    }

    #[test]
    fn test_relative_paths_resolve_against_recorded_dir() {
        let dir = tempdir().unwrap();
        record_modified_files(
            dir.path(),
            "s1",
            Path::new("/p/app"),
            &[PathBuf::from("src/a.ts")],
        )
        .unwrap();

        let files = SessionFiles::load(dir.path(), "s1").unwrap();
        assert_eq!(files.all_modified(), [PathBuf::from("/p/app/src/a.ts")]);
    }

    #[test]
    fn test_appends_accumulate_and_dedupe() {
        let dir = tempdir().unwrap();
        record_modified_files(
            dir.path(),
            "s1",
            Path::new("/p"),
            &[PathBuf::from("/p/a.ts"), PathBuf::from("/p/b.ts")],
        )
        .unwrap();
        record_modified_files(
            dir.path(),
            "s1",
            Path::new("/p"),
            &[PathBuf::from("/p/a.ts"), PathBuf::from("/p/c.ts")],
        )
        .unwrap();

        let files = SessionFiles::load(dir.path(), "s1").unwrap();
        let names: Vec<_> = files
            .all_modified()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.ts", "b.ts", "c.ts"]);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempdir().unwrap();
        record_modified_files(dir.path(), "s1", Path::new("/p"), &[PathBuf::from("/p/a.ts")])
            .unwrap();
        record_modified_files(dir.path(), "s2", Path::new("/p"), &[PathBuf::from("/p/b.ts")])
            .unwrap();

        let s1 = SessionFiles::load(dir.path(), "s1").unwrap();
        let s2 = SessionFiles::load(dir.path(), "s2").unwrap();
        assert_eq!(s1.all_modified(), [PathBuf::from("/p/a.ts")]);
        assert_eq!(s2.all_modified(), [PathBuf::from("/p/b.ts")]);
    }

    #[test]
    fn test_torn_final_line_skipped() {
        let dir = tempdir().unwrap();
        record_modified_files(dir.path(), "s1", Path::new("/p"), &[PathBuf::from("/p/a.ts")])
            .unwrap();
        let journal = dir.path().join("s1").join(JOURNAL_FILE_NAME);
        let mut handle = OpenOptions::new().append(true).open(&journal).unwrap();
        handle.write_all(b"{\"path\": \"/p/tor").unwrap();

        let files = SessionFiles::load(dir.path(), "s1").unwrap();
        assert_eq!(files.all_modified(), [PathBuf::from("/p/a.ts")]);
    }
}
