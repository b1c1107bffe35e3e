//! `han session record-files` wiring.

use anyhow::{Context, Result};
use han_config::{HanPaths, RuntimeEnv};
use han_session::record_modified_files;
use std::path::PathBuf;

pub fn record_files(session: Option<String>, paths_to_record: Vec<PathBuf>) -> Result<()> {
    let env = RuntimeEnv::capture()?;
    let session_id = session
        .or(env.session_id)
        .context("No session id: pass --session or set HAN_SESSION_ID")?;
    let paths = HanPaths::resolve().context("Failed to resolve the han state directory")?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;

    record_modified_files(&paths.sessions_dir(), &session_id, &cwd, &paths_to_record)?;
    println!(
        "Recorded {} file{} for session {session_id}",
        paths_to_record.len(),
        if paths_to_record.len() == 1 { "" } else { "s" }
    );
    Ok(())
}
