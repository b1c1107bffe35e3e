use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "han", version)]
#[command(about = "Hook orchestrator for plugin-defined project checks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run or inspect plugin hooks
    Hook {
        #[command(subcommand)]
        cmd: HookCommands,
    },

    /// Session bookkeeping used by the editor integration
    Session {
        #[command(subcommand)]
        cmd: SessionCommands,
    },
}

#[derive(Subcommand)]
pub enum HookCommands {
    /// Run one hook across its resolved directories
    Run {
        /// Plugin that defines the hook
        plugin_name: String,

        /// Hook to run (e.g. lint, typecheck)
        hook_name: String,

        /// Stop at the first failure and signal peer orchestrators (default)
        #[arg(long, conflicts_with = "no_fail_fast")]
        fail_fast: bool,

        /// Keep running the remaining directories after a failure
        #[arg(long)]
        no_fail_fast: bool,

        /// Skip directories whose files this session already validated
        #[arg(long)]
        cached: bool,

        /// Run exactly this resolved directory (relative to the project root)
        #[arg(long)]
        only: Option<String>,

        /// Inherit hook stdio instead of capturing it
        #[arg(long)]
        verbose: bool,
    },

    /// List a plugin's hooks and their resolved directories
    List {
        /// Plugin to inspect
        plugin_name: String,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Journal files a session modified (invoked by the editor after tool use)
    RecordFiles {
        /// Session identifier (defaults to HAN_SESSION_ID / CLAUDE_SESSION_ID)
        #[arg(long)]
        session: Option<String>,

        /// Modified paths, absolute or relative to the cwd
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_structure_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hook_run_flags() {
        let cli = Cli::parse_from([
            "han", "hook", "run", "lang", "lint", "--cached", "--only", "packages/x",
        ]);
        let Commands::Hook {
            cmd:
                HookCommands::Run {
                    plugin_name,
                    hook_name,
                    cached,
                    only,
                    fail_fast,
                    no_fail_fast,
                    verbose,
                },
        } = cli.command
        else {
            panic!("expected hook run");
        };
        assert_eq!(plugin_name, "lang");
        assert_eq!(hook_name, "lint");
        assert!(cached);
        assert_eq!(only.as_deref(), Some("packages/x"));
        assert!(!fail_fast && !no_fail_fast && !verbose);
    }

    #[test]
    fn test_parse_only_equals_form() {
        let cli = Cli::parse_from(["han", "hook", "run", "lang", "lint", "--only=packages/x"]);
        let Commands::Hook {
            cmd: HookCommands::Run { only, .. },
        } = cli.command
        else {
            panic!("expected hook run");
        };
        assert_eq!(only.as_deref(), Some("packages/x"));
    }

    #[test]
    fn test_fail_fast_flags_conflict() {
        let result =
            Cli::try_parse_from(["han", "hook", "run", "lang", "lint", "--fail-fast", "--no-fail-fast"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_record_files_requires_paths() {
        let result = Cli::try_parse_from(["han", "session", "record-files", "--session", "s1"]);
        assert!(result.is_err());
    }
}
