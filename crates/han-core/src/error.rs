/// Misconfiguration errors surfaced to the user with exit code 1.
///
/// Child-level failures (non-zero exit, timeouts) are not errors: the
/// supervisor returns them as data and the orchestrator maps them to
/// exit code 2.
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error("Plugin '{0}' is not installed")]
    PluginNotFound(String),

    #[error("Plugin root '{resolved}' does not match requested plugin '{requested}'")]
    PluginMismatch { requested: String, resolved: String },

    #[error("No hook directory matches '{0}'")]
    NoMatchingDirectory(String),

    #[error("Hook '{hook}' is not defined by plugin '{plugin}'")]
    HookNotFound { plugin: String, hook: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_plugin_not_found() {
        let err = HookError::PluginNotFound("lang".into());
        assert_eq!(err.to_string(), "Plugin 'lang' is not installed");
    }

    #[test]
    fn test_display_plugin_mismatch() {
        let err = HookError::PluginMismatch {
            requested: "lang".into(),
            resolved: "/plugins/other".into(),
        };
        assert_eq!(
            err.to_string(),
            "Plugin root '/plugins/other' does not match requested plugin 'lang'"
        );
    }

    #[test]
    fn test_display_no_matching_directory() {
        let err = HookError::NoMatchingDirectory("packages/x/".into());
        assert_eq!(err.to_string(), "No hook directory matches 'packages/x/'");
    }

    #[test]
    fn test_display_hook_not_found() {
        let err = HookError::HookNotFound {
            plugin: "lang".into(),
            hook: "lint".into(),
        };
        assert_eq!(
            err.to_string(),
            "Hook 'lint' is not defined by plugin 'lang'"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HookError>();
    }
}
