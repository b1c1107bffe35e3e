//! `han hook run` / `han hook list` wiring.

use anyhow::{Context, Result};
use han_config::{HanPaths, PluginHooks, RuntimeEnv, resolve_hook_configs, resolve_plugin_root};
use han_core::paths::relative_display;
use han_hooks::{HookRunRequest, run_configured_hook};

fn resolved_paths() -> Result<HanPaths> {
    HanPaths::resolve().context("Failed to resolve the han config/state directories")
}

pub async fn run(
    plugin_name: String,
    hook_name: String,
    fail_fast: bool,
    no_fail_fast: bool,
    cached: bool,
    only: Option<String>,
    verbose: bool,
) -> Result<i32> {
    let env = RuntimeEnv::capture()?;
    let paths = resolved_paths()?;

    let request = HookRunRequest {
        plugin_name,
        hook_name,
        fail_fast: match (fail_fast, no_fail_fast) {
            (_, true) => Some(false),
            (true, _) => Some(true),
            _ => None,
        },
        cached,
        only,
        verbose,
        skip_slot: false,
        cancel: None,
    };

    let report =
        run_configured_hook(&request, &env, &paths, &han_config::paths::hook_output_dir()).await?;
    Ok(report.exit_code())
}

pub fn list(plugin_name: String) -> Result<()> {
    let env = RuntimeEnv::capture()?;
    let paths = resolved_paths()?;
    let plugin_root =
        resolve_plugin_root(env.plugin_root.as_deref(), &paths.plugins_dir(), &plugin_name)?;

    let hooks = PluginHooks::load(&plugin_root)?;
    if hooks.hooks.is_empty() {
        println!("Plugin '{plugin_name}' defines no hooks.");
        return Ok(());
    }

    for (name, def) in &hooks.hooks {
        let state = if def.enabled { "enabled" } else { "disabled" };
        println!("{name} ({state}): {}", def.command);
        match resolve_hook_configs(&plugin_root, name, &env.project_root, None) {
            Ok(configs) => {
                for cfg in configs {
                    println!("  {}", relative_display(&cfg.directory, &env.project_root));
                }
            }
            Err(error) => println!("  (unresolvable: {error:#})"),
        }
    }
    Ok(())
}
