//! Output and debug artifacts referenced by failure reports.
//!
//! Naming: `<hook>_<sanitized-dir>_<timestamp>.output.txt` and the
//! matching `.debug.txt`, under the configured output directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use han_core::paths::sanitize_component;

use crate::{RunOutcome, RunRequest};

fn artifact_stem(request: &RunRequest) -> String {
    let dir = sanitize_component(&request.dir.to_string_lossy());
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{}_{}_{}", sanitize_component(&request.hook_name), dir, timestamp)
}

fn ensure_output_dir(request: &RunRequest) -> Result<PathBuf> {
    fs::create_dir_all(&request.output_dir).with_context(|| {
        format!(
            "Failed to create hook output directory: {}",
            request.output_dir.display()
        )
    })?;
    Ok(request.output_dir.clone())
}

/// Persist the captured buffer; returns the artifact path.
pub fn write_output_file(request: &RunRequest, output: &str) -> Result<PathBuf> {
    let dir = ensure_output_dir(request)?;
    let path = dir.join(format!("{}.output.txt", artifact_stem(request)));
    fs::write(&path, output).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Persist a key/value dump of the run for post-mortems.
pub fn write_debug_file(
    request: &RunRequest,
    outcome: &RunOutcome,
    elapsed: Duration,
) -> Result<PathBuf> {
    let dir = ensure_output_dir(request)?;
    let path = dir.join(format!("{}.debug.txt", artifact_stem(request)));

    let mut dump = String::new();
    let mut push = |key: &str, value: String| {
        dump.push_str(key);
        dump.push_str(": ");
        dump.push_str(&value);
        dump.push('\n');
    };
    push("hook", request.hook_name.clone());
    push("dir", request.dir.display().to_string());
    push("command", request.command.clone());
    push(
        "plugin_root",
        request
            .plugin_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    push(
        "env_file",
        request.env_file.clone().unwrap_or_else(|| "-".to_string()),
    );
    push(
        "idle_timeout_secs",
        request
            .idle_timeout
            .map(|t| t.as_secs().to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    push(
        "absolute_timeout_secs",
        request.absolute_timeout.as_secs().to_string(),
    );
    push("elapsed_ms", elapsed.as_millis().to_string());
    push(
        "exit_code",
        outcome
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string()),
    );
    push("idle_timed_out", outcome.idle_timed_out.to_string());
    push("absolute_timed_out", outcome.absolute_timed_out.to_string());
    push("canceled", outcome.canceled.to_string());
    push("output_bytes", outcome.output.len().to_string());

    fs::write(&path, dump).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
