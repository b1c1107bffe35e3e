//! Child execution supervisor: spawning, output capture, and the two
//! independent timeouts.
//!
//! A hook command runs under `/bin/bash -c`, optionally prefixed by
//! `source "<env_file>" && `. Stdout and stderr are captured into one
//! ordered buffer with byte-level reads (progress bars and streaming
//! dots reset the idle timer even when no full line arrives). The idle
//! timer resets on every chunk; the absolute timer never resets. Either
//! expiry kills the child's whole process group.
//!
//! Child-level failures are data, not errors: [`run_command`] returns a
//! tagged [`RunOutcome`] and only the caller decides what a failure
//! means.

mod artifacts;

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

pub use artifacts::{write_debug_file, write_output_file};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_BUF_SIZE: usize = 4096;

/// Characters allowed in a sourceable env-file path. Anything else could
/// smuggle shell syntax into the `source` line.
static SAFE_ENV_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_.\-~]+$").expect("static regex"));

/// One hook command to supervise.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Working directory for the child.
    pub dir: PathBuf,
    pub command: String,
    /// Inherit stdio instead of capturing. Without captured streams the
    /// idle timer has nothing to observe, so only the absolute timeout
    /// applies.
    pub verbose: bool,
    pub idle_timeout: Option<Duration>,
    pub absolute_timeout: Duration,
    pub hook_name: String,
    /// Exported to the child as `CLAUDE_PLUGIN_ROOT`.
    pub plugin_root: Option<PathBuf>,
    /// Sourced before the command when it passes the safe-character check.
    pub env_file: Option<String>,
    /// Write artifacts even on success.
    pub debug: bool,
    /// Where output/debug artifacts land.
    pub output_dir: PathBuf,
    /// Cooperative cancellation; flipping to `true` terminates the child
    /// and discards the buffer.
    pub cancel: Option<tokio::sync::watch::Receiver<bool>>,
}

/// Classified result of one supervised run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Exit 0 and neither timer fired and not canceled.
    pub success: bool,
    pub idle_timed_out: bool,
    pub absolute_timed_out: bool,
    pub canceled: bool,
    /// `None` when the child was signal-killed or never spawned.
    pub exit_code: Option<i32>,
    /// Ordered stdout+stderr capture (empty in verbose mode).
    pub output: String,
    pub output_file: Option<PathBuf>,
    pub debug_file: Option<PathBuf>,
}

/// Wrap the command for bash, sourcing the env file when it is safe.
///
/// An unsafe path is a local configuration problem, not a reason to
/// block every hook: log the diagnostic and run the bare command.
fn wrap_command(command: &str, env_file: Option<&str>) -> String {
    match env_file {
        Some(path) if SAFE_ENV_FILE.is_match(path) => {
            format!("source \"{path}\" && {command}")
        }
        Some(path) => {
            warn!(
                env_file = %path,
                "CLAUDE_ENV_FILE contains characters outside [A-Za-z0-9/_.-~]; refusing to source it"
            );
            command.to_string()
        }
        None => command.to_string(),
    }
}

/// Supervise one hook command to completion.
pub async fn run_command(request: RunRequest) -> RunOutcome {
    let started = Instant::now();
    let wrapped = wrap_command(&request.command, request.env_file.as_deref());

    let mut cmd = Command::new("/bin/bash");
    cmd.arg("-c").arg(&wrapped);
    cmd.current_dir(&request.dir);
    if let Some(plugin_root) = &request.plugin_root {
        cmd.env("CLAUDE_PLUGIN_ROOT", plugin_root);
    }
    if request.verbose {
        cmd.stdin(std::process::Stdio::inherit());
        cmd.stdout(std::process::Stdio::inherit());
        cmd.stderr(std::process::Stdio::inherit());
    } else {
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
    }
    cmd.kill_on_drop(true);

    // Isolate the child in its own process group so timeout kills reap
    // the shell and everything it spawned.
    // SAFETY: setsid() is async-signal-safe and runs before exec.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(error) => {
            warn!(command = %wrapped, error = %error, "Failed to spawn hook command");
            let mut outcome = RunOutcome {
                output: format!("failed to spawn: {error}"),
                ..RunOutcome::default()
            };
            finalize_artifacts(&request, &mut outcome, started.elapsed());
            return outcome;
        }
    };

    let mut outcome = if request.verbose {
        supervise_inherited(child, &request).await
    } else {
        supervise_captured(child, &request).await
    };

    finalize_artifacts(&request, &mut outcome, started.elapsed());
    outcome
}

/// Verbose mode: stdio is inherited, so only the absolute timer and
/// cancellation are in play.
async fn supervise_inherited(mut child: Child, request: &RunRequest) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    let mut cancel = request.cancel.clone();

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => outcome.exit_code = status.code(),
            Err(error) => {
                warn!(error = %error, "Failed to wait for hook command");
            }
        },
        _ = tokio::time::sleep(request.absolute_timeout) => {
            outcome.absolute_timed_out = true;
            kill_process_group(&mut child, libc::SIGKILL);
            let _ = child.wait().await;
        }
        _ = canceled(&mut cancel) => {
            outcome.canceled = true;
            kill_process_group(&mut child, libc::SIGTERM);
            let _ = child.wait().await;
        }
    }

    outcome.success =
        outcome.exit_code == Some(0) && !outcome.absolute_timed_out && !outcome.canceled;
    outcome
}

/// Quiet mode: byte-level reads from both streams into one ordered
/// buffer, idle timer reset on every chunk, absolute timer fixed from
/// the start.
async fn supervise_captured(mut child: Child, request: &RunRequest) -> RunOutcome {
    let mut outcome = RunOutcome::default();
    let mut cancel = request.cancel.clone();

    let Some(stdout) = child.stdout.take() else {
        warn!("Captured child has no stdout handle");
        let _ = child.start_kill();
        return outcome;
    };
    let Some(stderr) = child.stderr.take() else {
        warn!("Captured child has no stderr handle");
        let _ = child.start_kill();
        return outcome;
    };

    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);
    let mut stdout_buf = [0u8; READ_BUF_SIZE];
    let mut stderr_buf = [0u8; READ_BUF_SIZE];
    let mut stdout_done = false;
    let mut stderr_done = false;

    let started = Instant::now();
    let mut last_activity = Instant::now();
    let mut output = String::new();

    while !stdout_done || !stderr_done {
        tokio::select! {
            result = stdout_reader.read(&mut stdout_buf), if !stdout_done => {
                match result {
                    Ok(0) | Err(_) => stdout_done = true,
                    Ok(n) => {
                        last_activity = Instant::now();
                        output.push_str(&String::from_utf8_lossy(&stdout_buf[..n]));
                    }
                }
            }
            result = stderr_reader.read(&mut stderr_buf), if !stderr_done => {
                match result {
                    Ok(0) | Err(_) => stderr_done = true,
                    Ok(n) => {
                        last_activity = Instant::now();
                        output.push_str(&String::from_utf8_lossy(&stderr_buf[..n]));
                    }
                }
            }
            _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => {
                if started.elapsed() >= request.absolute_timeout {
                    outcome.absolute_timed_out = true;
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&format!(
                        "⏱️ Absolute timeout: Command exceeded {}s limit and was terminated.\n",
                        request.absolute_timeout.as_secs()
                    ));
                    warn!(
                        timeout_secs = request.absolute_timeout.as_secs(),
                        "Killing hook command: absolute timeout"
                    );
                    kill_process_group(&mut child, libc::SIGKILL);
                    break;
                }
                if let Some(idle) = request.idle_timeout
                    && last_activity.elapsed() >= idle
                {
                    outcome.idle_timed_out = true;
                    warn!(
                        timeout_secs = idle.as_secs(),
                        "Killing hook command: no output within idle timeout"
                    );
                    kill_process_group(&mut child, libc::SIGTERM);
                    break;
                }
            }
            _ = canceled(&mut cancel) => {
                outcome.canceled = true;
                kill_process_group(&mut child, libc::SIGTERM);
                break;
            }
        }
    }

    // The child may outlive its streams (EOF before exit) or trap the
    // idle SIGTERM; the absolute budget still caps the wait, escalating
    // to SIGKILL on expiry.
    let remaining = request
        .absolute_timeout
        .saturating_sub(started.elapsed())
        .max(Duration::from_millis(50));
    match tokio::time::timeout(remaining, child.wait()).await {
        Ok(Ok(status)) => outcome.exit_code = status.code(),
        Ok(Err(error)) => warn!(error = %error, "Failed to wait for hook command"),
        Err(_) => {
            if !outcome.absolute_timed_out {
                outcome.absolute_timed_out = true;
                if !output.is_empty() && !output.ends_with('\n') {
                    output.push('\n');
                }
                output.push_str(&format!(
                    "⏱️ Absolute timeout: Command exceeded {}s limit and was terminated.\n",
                    request.absolute_timeout.as_secs()
                ));
            }
            kill_process_group(&mut child, libc::SIGKILL);
            let _ = child.wait().await;
        }
    }

    // A canceled run's buffer is discarded.
    outcome.output = if outcome.canceled { String::new() } else { output };
    outcome.success = outcome.exit_code == Some(0)
        && !outcome.idle_timed_out
        && !outcome.absolute_timed_out
        && !outcome.canceled;
    outcome
}

/// Resolves when the cancellation flag flips to `true`; pends forever
/// when no token was provided.
async fn canceled(cancel: &mut Option<tokio::sync::watch::Receiver<bool>>) {
    match cancel {
        Some(receiver) => {
            loop {
                if *receiver.borrow() {
                    return;
                }
                if receiver.changed().await.is_err() {
                    // Sender gone: cancellation can never arrive.
                    std::future::pending::<()>().await;
                }
            }
        }
        None => std::future::pending().await,
    }
}

fn kill_process_group(child: &mut Child, signal: i32) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill() is async-signal-safe; the negative PID
            // targets the process group created by setsid in pre_exec.
            unsafe {
                libc::kill(-(pid as i32), signal);
            }
            return;
        }
    }
    let _ = child.start_kill();
}

/// Write the output and debug artifacts the failure report points at.
fn finalize_artifacts(request: &RunRequest, outcome: &mut RunOutcome, elapsed: Duration) {
    if outcome.canceled {
        // Cancellation tears down without leaving artifacts behind.
        return;
    }
    let failed = !outcome.success;
    if !failed && !request.debug {
        return;
    }

    if !outcome.output.is_empty() && (failed || request.debug) {
        match write_output_file(request, &outcome.output) {
            Ok(path) => outcome.output_file = Some(path),
            Err(error) => warn!(error = %error, "Failed to write hook output file"),
        }
    }
    if failed || request.debug {
        match write_debug_file(request, outcome, elapsed) {
            Ok(path) => outcome.debug_file = Some(path),
            Err(error) => warn!(error = %error, "Failed to write hook debug file"),
        }
    }
    debug!(
        hook = %request.hook_name,
        success = outcome.success,
        elapsed_ms = elapsed.as_millis() as u64,
        "hook command finished"
    );
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
