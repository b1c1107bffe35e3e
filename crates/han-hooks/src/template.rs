//! `${HAN_FILES}` substitution.
//!
//! Hooks that accept a file list declare the placeholder in their
//! command; the orchestrator fills in the session's relevant files, or
//! `.` when no file information is available so the hook still runs over
//! its whole directory.

pub const FILES_PLACEHOLDER: &str = "${HAN_FILES}";

/// Whether a command wants the session file list.
pub fn command_uses_session_files(command: &str) -> bool {
    command.contains(FILES_PLACEHOLDER)
}

/// Escape a string for safe shell usage by wrapping in single quotes.
///
/// Internal single quotes are escaped as '\'' (end quote, escaped quote,
/// start quote).
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Substitute the placeholder with shell-quoted paths, or the bare `.`
/// when the list is empty.
pub fn build_command_with_files(command: &str, files: &[String]) -> String {
    let replacement = if files.is_empty() {
        ".".to_string()
    } else {
        files
            .iter()
            .map(|file| shell_escape(file))
            .collect::<Vec<_>>()
            .join(" ")
    };
    command.replace(FILES_PLACEHOLDER, &replacement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_uses_session_files() {
        assert!(command_uses_session_files("eslint ${HAN_FILES}"));
        assert!(!command_uses_session_files("eslint ."));
        assert!(!command_uses_session_files("eslint $HAN_FILES"));
    }

    #[test]
    fn test_substitute_file_list() {
        let cmd = build_command_with_files(
            "eslint ${HAN_FILES}",
            &["src/a.ts".to_string(), "src/b.ts".to_string()],
        );
        assert_eq!(cmd, "eslint 'src/a.ts' 'src/b.ts'");
    }

    #[test]
    fn test_substitute_empty_list_falls_back_to_dot() {
        assert_eq!(build_command_with_files("eslint ${HAN_FILES}", &[]), "eslint .");
    }

    #[test]
    fn test_substitute_without_placeholder_is_identity() {
        assert_eq!(
            build_command_with_files("make lint", &["a.ts".to_string()]),
            "make lint"
        );
    }

    #[test]
    fn test_shell_escape_single_quote() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_substitute_escapes_hostile_paths() {
        let cmd = build_command_with_files(
            "eslint ${HAN_FILES}",
            &["a b.ts".to_string(), "$(whoami).ts".to_string()],
        );
        assert_eq!(cmd, "eslint 'a b.ts' '$(whoami).ts'");
    }

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let cmd = build_command_with_files(
            "lint ${HAN_FILES} && fmt ${HAN_FILES}",
            &["a.ts".to_string()],
        );
        assert_eq!(cmd, "lint 'a.ts' && fmt 'a.ts'");
    }
}
