//! Durable per-file validation records.
//!
//! A validation is the fact that `(plugin, hook, directory, file)` was
//! successfully checked at a given content hash under a given command
//! hash, by a given session. Records for one `(plugin, hook, directory)`
//! live in a single JSON document; the last writer per file wins, which
//! is exactly the "most recent validation across all sessions" the cache
//! rule needs.
//!
//! Writes are read-modify-write under an advisory `flock(2)` on a
//! sibling `.lock` file (the document itself is replaced by rename, so
//! its inode cannot carry the lock), published via write-temp-then-rename.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use han_core::files::matched_files;
use han_core::hash::{hash_command, hash_file};
use han_core::paths::sanitize_component;

/// The recorded fact for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub session_id: String,
    pub file_hash: String,
    pub command_hash: String,
    pub validated_at: DateTime<Utc>,
}

/// One document: every per-file record for a `(plugin, hook, directory)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ValidationDoc {
    directory: PathBuf,
    /// Keyed by absolute file path.
    files: BTreeMap<String, ValidationRecord>,
}

/// Outcome of the cache check for one directory.
#[derive(Debug, Clone, Default)]
pub struct ValidationCheck {
    /// At least one matched file has no usable record.
    pub needs_validation: bool,
    /// Files whose most recent record matches the current content but
    /// belongs to a different session.
    pub stale_files: Vec<PathBuf>,
}

/// Inputs for the cache check.
#[derive(Debug, Clone, Copy)]
pub struct ValidationQuery<'a> {
    pub session_id: &'a str,
    pub plugin: &'a str,
    pub hook: &'a str,
    pub directory: &'a Path,
    pub if_changed: &'a [String],
    pub command: &'a str,
}

/// Inputs for recording one successful validation.
#[derive(Debug, Clone, Copy)]
pub struct RecordRequest<'a> {
    pub session_id: &'a str,
    pub plugin: &'a str,
    pub hook: &'a str,
    pub directory: &'a Path,
    pub file_path: &'a Path,
    pub file_hash: &'a str,
    pub command_hash: &'a str,
}

/// Store rooted at the validations directory.
#[derive(Debug, Clone)]
pub struct ValidationStore {
    root: PathBuf,
}

/// Advisory write lock on one document. Released in `Drop` via `LOCK_UN`;
/// closing the fd moments later would release it regardless.
struct DocLock {
    file: File,
}

impl Drop for DocLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `self.file`.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl ValidationStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Classify the files matched by `if_changed` under the directory.
    ///
    /// Per file:
    /// - no record, a different command hash, or a different content
    ///   hash → needs validation;
    /// - matching record from this session → already validated;
    /// - matching record from another session → stale (skip, but count).
    pub fn check_files_need_validation(&self, query: &ValidationQuery) -> Result<ValidationCheck> {
        let doc = self.read_doc(query.plugin, query.hook, query.directory)?;
        let command_hash = hash_command(query.command);

        let mut check = ValidationCheck::default();
        for file in matched_files(query.directory, query.if_changed)? {
            let current_hash = hash_file(&file)?;
            let key = file.to_string_lossy().to_string();
            match doc.files.get(&key) {
                Some(record)
                    if record.command_hash == command_hash
                        && record.file_hash == current_hash =>
                {
                    if record.session_id != query.session_id {
                        check.stale_files.push(file);
                    }
                }
                _ => check.needs_validation = true,
            }
        }
        Ok(check)
    }

    /// Upsert one record. Last writer wins per file.
    pub fn record(&self, request: &RecordRequest) -> Result<()> {
        let doc_path = self.doc_path(request.plugin, request.hook, request.directory);
        fs::create_dir_all(doc_path.parent().unwrap_or(&self.root)).with_context(|| {
            format!("Failed to create validation directory for {}", doc_path.display())
        })?;

        let _lock = self.lock_doc(&doc_path)?;

        let mut doc = Self::read_doc_at(&doc_path)?;
        doc.directory = request.directory.to_path_buf();
        doc.files.insert(
            request.file_path.to_string_lossy().to_string(),
            ValidationRecord {
                session_id: request.session_id.to_string(),
                file_hash: request.file_hash.to_string(),
                command_hash: request.command_hash.to_string(),
                validated_at: Utc::now(),
            },
        );

        let json = serde_json::to_string_pretty(&doc).context("Failed to serialize validations")?;
        let tmp_path = doc_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &doc_path)
            .with_context(|| format!("Failed to publish {}", doc_path.display()))?;
        Ok(())
    }

    /// The most recent record for one file, across sessions.
    pub fn lookup(
        &self,
        plugin: &str,
        hook: &str,
        directory: &Path,
        file_path: &Path,
    ) -> Result<Option<ValidationRecord>> {
        let doc = self.read_doc(plugin, hook, directory)?;
        Ok(doc
            .files
            .get(file_path.to_string_lossy().as_ref())
            .cloned())
    }

    fn doc_path(&self, plugin: &str, hook: &str, directory: &Path) -> PathBuf {
        let dir_str = directory.to_string_lossy();
        let digest = hash_command(&dir_str);
        // sanitized tail for readability, digest for uniqueness
        let tail = sanitize_component(
            dir_str
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or("root"),
        );
        let digest_short = digest.trim_start_matches("sha256:");
        let digest_short = &digest_short[..16];
        self.root
            .join(sanitize_component(plugin))
            .join(sanitize_component(hook))
            .join(format!("{tail}-{digest_short}.json"))
    }

    fn lock_doc(&self, doc_path: &Path) -> Result<DocLock> {
        let lock_path = doc_path.with_extension("json.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor from the file just opened.
        // Blocking LOCK_EX: document writes are short.
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if ret != 0 {
            anyhow::bail!("failed to lock {}", lock_path.display());
        }
        Ok(DocLock { file })
    }

    fn read_doc(&self, plugin: &str, hook: &str, directory: &Path) -> Result<ValidationDoc> {
        Self::read_doc_at(&self.doc_path(plugin, hook, directory))
    }

    fn read_doc_at(doc_path: &Path) -> Result<ValidationDoc> {
        if !doc_path.exists() {
            return Ok(ValidationDoc::default());
        }
        let content = fs::read_to_string(doc_path)
            .with_context(|| format!("Failed to read {}", doc_path.display()))?;
        match serde_json::from_str(&content) {
            Ok(doc) => Ok(doc),
            Err(error) => {
                // A torn document only costs cached skips; re-validating
                // is always safe.
                tracing::warn!(path = %doc_path.display(), error = %error, "Discarding unreadable validation document");
                Ok(ValidationDoc::default())
            }
        }
    }
}
