use anyhow::Result;
use clap::Parser;

mod cli;
mod hook_cmd;
mod session_cmd;

use cli::{Cli, Commands, HookCommands, SessionCommands};

#[tokio::main]
async fn main() {
    // Diagnostics go to stderr; stdout is reserved for the report lines.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Hook { cmd } => match cmd {
            HookCommands::Run {
                plugin_name,
                hook_name,
                fail_fast,
                no_fail_fast,
                cached,
                only,
                verbose,
            } => {
                hook_cmd::run(
                    plugin_name,
                    hook_name,
                    fail_fast,
                    no_fail_fast,
                    cached,
                    only,
                    verbose,
                )
                .await
            }
            HookCommands::List { plugin_name } => {
                hook_cmd::list(plugin_name)?;
                Ok(0)
            }
        },
        Commands::Session { cmd } => match cmd {
            SessionCommands::RecordFiles { session, paths } => {
                session_cmd::record_files(session, paths)?;
                Ok(0)
            }
        },
    }
}
