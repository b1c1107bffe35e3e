//! The two-phase hook run.
//!
//! Phase 1 classifies every resolved configuration against the
//! validation cache without holding any slot. Phase 2 executes the
//! survivors sequentially, one slot per command, checking the fail-fast
//! signal at each boundary, and records validations for the successes.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

use han_config::{HanPaths, ResolvedHookConfig, RuntimeEnv, resolve_hook_configs, resolve_plugin_root};
use han_core::files::{compile_patterns, matches_any};
use han_core::hash::{hash_command, hash_file};
use han_core::paths::relative_display;
use han_lock::{Coordinator, FailureSignal};
use han_process::{RunOutcome, RunRequest, run_command};
use han_session::SessionFiles;
use han_validation::{RecordRequest, ValidationQuery, ValidationStore};

use crate::report::{
    self, FailureReport, format_fail_fast_block, format_failure_report, peer_fail_fast_line,
    pluralize_directories, rerun_command,
};
use crate::template::{build_command_with_files, command_uses_session_files};

/// One `han hook run` invocation.
#[derive(Debug, Clone)]
pub struct HookRunRequest {
    pub plugin_name: String,
    pub hook_name: String,
    /// CLI override; `None` keeps the default (on). `HAN_NO_FAIL_FAST`
    /// wins over both.
    pub fail_fast: Option<bool>,
    /// `--cached`: consult and update the validation store.
    pub cached: bool,
    /// `--only <dir>`: run exactly one resolved directory.
    pub only: Option<String>,
    /// Inherit child stdio instead of capturing.
    pub verbose: bool,
    /// Bypass slot acquisition for callers that bound concurrency
    /// themselves.
    pub skip_slot: bool,
    pub cancel: Option<tokio::sync::watch::Receiver<bool>>,
}

/// What one invocation did, for exit-code mapping and tests.
#[derive(Debug, Default)]
pub struct RunReport {
    pub passed: Vec<String>,
    pub failures: Vec<FailureReport>,
    pub skipped: usize,
    pub stale_skipped: usize,
    pub disabled: usize,
    pub peer_fail_fast: Option<FailureSignal>,
    pub canceled: bool,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if !self.failures.is_empty() || self.peer_fail_fast.is_some() {
            2
        } else {
            0
        }
    }
}

/// Run one configured hook across its directories.
///
/// Misconfiguration (unknown plugin, plugin mismatch, unknown `--only`
/// directory) is `Err` and maps to exit code 1; everything the hook
/// commands themselves do is reported in the returned [`RunReport`].
pub async fn run_configured_hook(
    request: &HookRunRequest,
    env: &RuntimeEnv,
    paths: &HanPaths,
    output_dir: &Path,
) -> Result<RunReport> {
    let mut run = RunReport::default();

    // Phase 1: resolve and classify, no slots held.
    let plugin_root = resolve_plugin_root(
        env.plugin_root.as_deref(),
        &paths.plugins_dir(),
        &request.plugin_name,
    )?;
    let configs = resolve_hook_configs(
        &plugin_root,
        &request.hook_name,
        &env.project_root,
        request.only.as_deref(),
    )?;

    if configs.is_empty() {
        println!(
            "No directories found for {}/{}.",
            request.plugin_name, request.hook_name
        );
        return Ok(run);
    }

    let caching = request.cached && !env.no_cache && env.session_id.is_some();
    let store = ValidationStore::new(paths.validations_dir());
    let total = configs.len();

    let mut to_run: Vec<ResolvedHookConfig> = Vec::new();
    for cfg in configs {
        if !cfg.enabled {
            run.disabled += 1;
            continue;
        }
        if caching && !cfg.if_changed.is_empty() {
            let session_id = env.session_id.as_deref().unwrap_or_default();
            let query = ValidationQuery {
                session_id,
                plugin: &request.plugin_name,
                hook: &request.hook_name,
                directory: &cfg.directory,
                if_changed: &cfg.if_changed,
                command: &cfg.command,
            };
            match store.check_files_need_validation(&query) {
                Ok(check) if !check.needs_validation && check.stale_files.is_empty() => {
                    run.skipped += 1;
                }
                Ok(check) if !check.needs_validation => {
                    tracing::debug!(
                        dir = %cfg.directory.display(),
                        stale = check.stale_files.len(),
                        "Skipping directory validated by another session"
                    );
                    run.stale_skipped += 1;
                }
                Ok(_) => to_run.push(cfg),
                Err(error) => {
                    // An unreadable cache can only cost a re-run.
                    tracing::warn!(error = %error, "Validation check failed; running the hook");
                    to_run.push(cfg);
                }
            }
        } else {
            to_run.push(cfg);
        }
    }

    if run.disabled == total {
        println!(
            "All {} {} for {}/{} are disabled.",
            total,
            pluralize_directories(total),
            request.plugin_name,
            request.hook_name
        );
        return Ok(run);
    }
    if to_run.is_empty() {
        print_skip_summaries(&run);
        return Ok(run);
    }

    // Phase 2: sequential execution, one slot per command.
    let fail_fast = request.fail_fast.unwrap_or(true) && !env.no_fail_fast;
    let coordinator = Coordinator::new(paths.coordinator_dir(), env.slot_capacity);

    // A standing signal from another hook stops us before we clear it; a
    // signal from this same hook is ours (this invocation is the fix
    // re-run) and gets cleared.
    if fail_fast
        && let Some(signal) = coordinator.check_failure_signal()
        && is_foreign(&signal, request)
    {
        println!(
            "{}",
            peer_fail_fast_line(
                &request.plugin_name,
                &request.hook_name,
                &signal.plugin_name,
                &signal.hook_name
            )
        );
        run.peer_fail_fast = Some(signal);
        return Ok(run);
    }
    if let Err(error) = coordinator.clear_failure_signal() {
        tracing::warn!(error = %error, "Failed to clear failure signal");
    }

    let session_files = load_session_files(env, paths, caching, &to_run);
    let mut successes: Vec<ResolvedHookConfig> = Vec::new();

    for cfg in to_run {
        let rel = relative_display(&cfg.directory, &env.project_root);

        if fail_fast
            && let Some(signal) = coordinator.check_failure_signal()
            && is_foreign(&signal, request)
        {
            println!(
                "{}",
                peer_fail_fast_line(
                    &request.plugin_name,
                    &request.hook_name,
                    &signal.plugin_name,
                    &signal.hook_name
                )
            );
            run.peer_fail_fast = Some(signal);
            return Ok(run);
        }

        let command = finalize_command(&cfg, session_files.as_ref());
        let outcome = execute(request, env, &coordinator, &cfg, &plugin_root, command.clone(), output_dir)
            .await?;

        if outcome.canceled {
            run.canceled = true;
            return Ok(run);
        }

        if outcome.success {
            println!("  ✓ {rel} passed");
            successes.push(cfg);
            run.passed.push(rel);
        } else {
            eprintln!("  ✗ {rel} failed");
            let failure = FailureReport {
                dir: rel.clone(),
                command,
                idle_timed_out: outcome.idle_timed_out,
                output_file: outcome.output_file.clone(),
                debug_file: outcome.debug_file.clone(),
                rerun_command: rerun_command(
                    &request.plugin_name,
                    &request.hook_name,
                    caching,
                    &rel,
                ),
            };

            if fail_fast {
                let signal = FailureSignal {
                    plugin_name: request.plugin_name.clone(),
                    hook_name: request.hook_name.clone(),
                    directory: rel,
                    pid: std::process::id(),
                    timestamp: Utc::now(),
                };
                if let Err(error) = coordinator.signal_failure(&signal) {
                    tracing::warn!(error = %error, "Failed to publish failure signal");
                }
                eprintln!("{}", format_fail_fast_block(&request.plugin_name, &request.hook_name, &failure));
                run.failures.push(failure);
                return Ok(run);
            }
            run.failures.push(failure);
        }
    }

    if caching {
        record_validations(request, env, &store, &successes);
    }

    if run.failures.is_empty() {
        print_skip_summaries(&run);
        println!(
            "All {} {} passed",
            run.passed.len(),
            pluralize_directories(run.passed.len())
        );
    } else {
        eprintln!("{}", format_failure_report(&run.failures));
    }
    Ok(run)
}

/// A signal raised by any other `(plugin, hook)` pair.
fn is_foreign(signal: &FailureSignal, request: &HookRunRequest) -> bool {
    signal.plugin_name != request.plugin_name || signal.hook_name != request.hook_name
}

fn print_skip_summaries(run: &RunReport) {
    if run.skipped > 0 {
        println!("{}", report::skipped_clean_line(run.skipped));
    }
    if run.stale_skipped > 0 {
        println!("{}", report::skipped_stale_line(run.stale_skipped));
    }
}

/// The session journal is loaded once, and only when some surviving
/// command actually takes a file list under an active cache.
fn load_session_files(
    env: &RuntimeEnv,
    paths: &HanPaths,
    caching: bool,
    to_run: &[ResolvedHookConfig],
) -> Option<SessionFiles> {
    if !caching {
        return None;
    }
    let session_id = env.session_id.as_deref()?;
    if !to_run.iter().any(|cfg| command_uses_session_files(&cfg.command)) {
        return None;
    }
    match SessionFiles::load(&paths.sessions_dir(), session_id) {
        Ok(files) => Some(files),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to load session files; using the `.` fallback");
            None
        }
    }
}

/// Fill `${HAN_FILES}` with the intersection of session-modified files
/// and the hook's patterns, relative to the hook directory.
fn finalize_command(cfg: &ResolvedHookConfig, session_files: Option<&SessionFiles>) -> String {
    if !command_uses_session_files(&cfg.command) {
        return cfg.command.clone();
    }
    let Some(session_files) = session_files else {
        return build_command_with_files(&cfg.command, &[]);
    };

    let patterns = match compile_patterns(&cfg.if_changed) {
        Ok(patterns) => patterns,
        Err(error) => {
            tracing::warn!(error = %error, "Invalid if_changed pattern; using the `.` fallback");
            return build_command_with_files(&cfg.command, &[]);
        }
    };

    let mut files = Vec::new();
    for path in session_files.all_modified() {
        let Ok(rel) = path.strip_prefix(&cfg.directory) else {
            continue;
        };
        if patterns.is_empty() || matches_any(rel, &patterns) {
            files.push(rel.display().to_string());
        }
    }
    build_command_with_files(&cfg.command, &files)
}

async fn execute(
    request: &HookRunRequest,
    env: &RuntimeEnv,
    coordinator: &Coordinator,
    cfg: &ResolvedHookConfig,
    plugin_root: &Path,
    command: String,
    output_dir: &Path,
) -> Result<RunOutcome> {
    let run_request = RunRequest {
        dir: cfg.directory.clone(),
        command,
        verbose: request.verbose,
        idle_timeout: cfg.idle_timeout.map(Duration::from_secs),
        absolute_timeout: Duration::from_secs(env.absolute_timeout_secs),
        hook_name: request.hook_name.clone(),
        plugin_root: Some(plugin_root.to_path_buf()),
        env_file: env.env_file.clone(),
        debug: env.debug,
        output_dir: output_dir.to_path_buf(),
        cancel: request.cancel.clone(),
    };

    if request.skip_slot {
        return Ok(run_command(run_request).await);
    }
    coordinator
        .with_global_slot(
            &request.hook_name,
            Some(&request.plugin_name),
            env.session_id.as_deref(),
            || run_command(run_request),
        )
        .await
}

/// Record a validation for every file each successful hook owns.
/// Failures here are diagnostics only; the run already passed.
fn record_validations(
    request: &HookRunRequest,
    env: &RuntimeEnv,
    store: &ValidationStore,
    successes: &[ResolvedHookConfig],
) {
    let Some(session_id) = env.session_id.as_deref() else {
        return;
    };
    for cfg in successes {
        if cfg.if_changed.is_empty() {
            continue;
        }
        let command_hash = hash_command(&cfg.command);
        let files = match han_core::files::matched_files(&cfg.directory, &cfg.if_changed) {
            Ok(files) => files,
            Err(error) => {
                tracing::warn!(
                    dir = %cfg.directory.display(),
                    error = %error,
                    "Failed to enumerate files for validation recording"
                );
                continue;
            }
        };
        for file in files {
            let file_hash = match hash_file(&file) {
                Ok(hash) => hash,
                Err(error) => {
                    tracing::warn!(file = %file.display(), error = %error, "Failed to hash validated file");
                    continue;
                }
            };
            let record = RecordRequest {
                session_id,
                plugin: &request.plugin_name,
                hook: &request.hook_name,
                directory: &cfg.directory,
                file_path: &file,
                file_hash: &file_hash,
                command_hash: &command_hash,
            };
            if let Err(error) = store.record(&record) {
                tracing::warn!(file = %file.display(), error = %error, "Failed to record validation");
            }
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
