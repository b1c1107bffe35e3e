//! Configuration surface of the orchestrator: filesystem layout, plugin
//! discovery, per-plugin hook definitions, directory resolution, and the
//! one-shot capture of every environment input.

pub mod paths;
pub mod plugin;
pub mod resolver;
pub mod runtime;

pub use paths::HanPaths;
pub use plugin::{HookDef, PluginHooks, resolve_plugin_root};
pub use resolver::{ResolvedHookConfig, resolve_hook_configs};
pub use runtime::RuntimeEnv;
