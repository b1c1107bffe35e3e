//! Failure reports, skip summaries, and re-run command formation.
//!
//! Formatting lives here as pure string builders; the runner decides
//! which stream each block goes to (stdout for success/info, stderr for
//! failure).

use std::path::PathBuf;

/// One failed configuration, with everything a user or agent needs to
/// retry the minimal scope.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Directory, relative to the project root.
    pub dir: String,
    pub command: String,
    pub idle_timed_out: bool,
    pub output_file: Option<PathBuf>,
    pub debug_file: Option<PathBuf>,
    pub rerun_command: String,
}

/// `directory` / `directories`.
pub fn pluralize_directories(count: usize) -> &'static str {
    if count == 1 { "directory" } else { "directories" }
}

/// The exact invocation that re-selects one configuration.
///
/// `--cached` is only appended for untargeted re-runs: pointing at a
/// specific directory means the user wants it re-checked regardless of
/// the cache.
pub fn rerun_command(plugin: &str, hook: &str, cached_active: bool, rel_dir: &str) -> String {
    let mut command = format!("han hook run {plugin} {hook}");
    if rel_dir == "." {
        if cached_active {
            command.push_str(" --cached");
        }
    } else {
        command.push_str(&format!(" --only={rel_dir}"));
    }
    command
}

pub fn skipped_clean_line(count: usize) -> String {
    format!(
        "Skipped {count} {} (no changes detected)",
        pluralize_directories(count)
    )
}

pub fn skipped_stale_line(count: usize) -> String {
    format!(
        "Skipped {count} {} (files modified by another session)",
        pluralize_directories(count)
    )
}

/// Info line printed when a peer's fail-fast signal stops this run.
pub fn peer_fail_fast_line(
    plugin: &str,
    hook: &str,
    signal_plugin: &str,
    signal_hook: &str,
) -> String {
    format!(
        "⏭️ Skipping {plugin}/{hook}: Fix the {signal_plugin}/{signal_hook} failure first, then re-run all hooks."
    )
}

/// The grouped failure report, idle timeouts separated from the rest.
pub fn format_failure_report(failures: &[FailureReport]) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "❌ {} {} failed.",
        failures.len(),
        pluralize_directories(failures.len())
    ));

    let (idle, regular): (Vec<_>, Vec<_>) = failures.iter().partition(|f| f.idle_timed_out);

    if !regular.is_empty() {
        lines.push(String::new());
        for failure in &regular {
            push_failure(&mut lines, failure);
        }
    }
    if !idle.is_empty() {
        lines.push(String::new());
        lines.push("⏱️ Timed out with no output received:".to_string());
        for failure in &idle {
            push_failure(&mut lines, failure);
        }
    }

    lines.join("\n")
}

fn push_failure(lines: &mut Vec<String>, failure: &FailureReport) {
    lines.push(format!("• {}", failure.dir));
    lines.push(format!("  Re-run: {}", failure.rerun_command));
    if let Some(output) = &failure.output_file {
        lines.push(format!("  Output: {}", output.display()));
    }
    if let Some(debug) = &failure.debug_file {
        lines.push(format!("  Debug: {}", debug.display()));
    }
}

/// Directive printed on a fail-fast failure so a supervising agent fixes
/// it before anything else runs.
pub fn format_fail_fast_block(plugin: &str, hook: &str, failure: &FailureReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "**CRITICAL**: {plugin}/{hook} failed in {}. All other hooks are paused until this passes.",
        failure.dir
    ));
    lines.push("Spawn a subagent to fix it:".to_string());
    match &failure.output_file {
        Some(output) => lines.push(format!("  1. Read the output: {}", output.display())),
        None => lines.push("  1. The command produced no output; run it manually.".to_string()),
    }
    lines.push("  2. Fix every reported problem.".to_string());
    lines.push(format!("  3. Re-run: {}", failure.rerun_command));
    lines.join("\n")
}
