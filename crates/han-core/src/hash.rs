//! SHA-256 hashing of file contents and command strings.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUFFER_SIZE: usize = 8 * 1024;

/// Hash a file's content as `sha256:<hex>`, streaming in fixed-size reads.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed while hashing file: {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Hash a command string as `sha256:<hex>`.
///
/// Any byte change to the command (including whitespace) produces a
/// different hash, which is what invalidates cached validations when a
/// hook's command is edited.
pub fn hash_command(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hash_file_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello\n").unwrap();

        let hash = hash_file(&path).unwrap();
        assert!(hash.starts_with("sha256:"));
        // sha256 of "hello\n"
        assert_eq!(
            hash,
            "sha256:5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn test_hash_file_stable_across_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "content").unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_file(&path).unwrap());
    }

    #[test]
    fn test_hash_file_changes_with_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "one").unwrap();
        let first = hash_file(&path).unwrap();
        fs::write(&path, "two").unwrap();
        let second = hash_file(&path).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_hash_file_missing_is_error() {
        let dir = tempdir().unwrap();
        let result = hash_file(&dir.path().join("nope.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_hash_command_whitespace_sensitive() {
        let a = hash_command("eslint .");
        let b = hash_command("eslint  .");
        assert_ne!(a, b, "whitespace change must invalidate the hash");
    }

    #[test]
    fn test_hash_command_matches_equivalent_file_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cmd");
        fs::write(&path, "make lint").unwrap();
        assert_eq!(hash_command("make lint"), hash_file(&path).unwrap());
    }
}
