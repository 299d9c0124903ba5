//! Passphrase and salt files, and how they reach the cipher process.
//!
//! In [`KeyMode::Combined`] both files are read here and joined into one
//! secret, handed to `openssl` through the child's environment
//! (`-pass env:BACKUP_PIPE_KEY`).  The secret never appears on a command line
//! and changing either file changes the derived key.
//!
//! [`KeyMode::Legacy`] passes both paths as `-pass file:…` the way older
//! archives were produced.  openssl only honours the last `-pass`, so in this
//! mode the salt file alone determines the key.

use std::path::{Path, PathBuf};

use crate::{
    config::KeyMode,
    error::{PipelineError, Result},
    process::ProcessSpec,
};

/// Environment variable carrying the combined secret to the cipher.
pub const KEY_ENV: &str = "BACKUP_PIPE_KEY";

/// Locations of the two key files.  Contents are only read when a cipher
/// stage is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    pub passphrase: PathBuf,
    pub salt: PathBuf,
}

impl KeyFiles {
    pub fn new(passphrase: impl Into<PathBuf>, salt: impl Into<PathBuf>) -> Self {
        Self {
            passphrase: passphrase.into(),
            salt: salt.into(),
        }
    }

    /// Append the key arguments (and, in combined mode, the secret) to a
    /// cipher invocation.
    pub fn apply(&self, mode: KeyMode, spec: ProcessSpec) -> Result<ProcessSpec> {
        match mode {
            KeyMode::Legacy => {
                tracing::warn!(
                    "key_mode = \"legacy\": the passphrase file is ignored, only the salt file determines the key"
                );
                Ok(spec
                    .arg("-pass")
                    .arg(file_source(&self.passphrase))
                    .arg("-pass")
                    .arg(file_source(&self.salt)))
            },
            KeyMode::Combined => {
                let passphrase = read_secret(&self.passphrase)?;
                let salt = read_secret(&self.salt)?;
                Ok(spec
                    .args(["-pass", &format!("env:{KEY_ENV}")])
                    .env(KEY_ENV, format!("{passphrase}\n{salt}")))
            },
        }
    }
}

fn file_source(path: &Path) -> String {
    format!("file:{}", path.display())
}

/// Read a key file, dropping one trailing line ending.  The rest must be a
/// single non-empty line.
fn read_secret(path: &Path) -> Result<String> {
    let key_error = |reason: String| PipelineError::KeyFile {
        path: path.to_path_buf(),
        reason,
    };

    let mut text = std::fs::read_to_string(path).map_err(|e| key_error(e.to_string()))?;
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    if text.is_empty() {
        return Err(key_error("file is empty".into()));
    }
    // `passphrase \n salt` must split back into the same two parts.
    if text.contains(['\n', '\r']) {
        return Err(key_error("file must hold a single line".into()));
    }
    if text.contains('\0') {
        return Err(key_error("file contains a NUL byte".into()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Role, logging::testing, process::ExternalProcess};

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn legacy_passes_both_paths() {
        let keys = KeyFiles::new("/keys/pass", "/keys/salt");
        let spec = keys
            .apply(KeyMode::Legacy, ProcessSpec::new("openssl"))
            .unwrap();
        assert_eq!(spec.argv(), vec![
            "openssl",
            "-pass",
            "file:/keys/pass",
            "-pass",
            "file:/keys/salt"
        ]);
    }

    #[test]
    fn legacy_does_not_touch_the_files() {
        let keys = KeyFiles::new("/does/not/exist", "/nor/this");
        assert!(keys.apply(KeyMode::Legacy, ProcessSpec::new("openssl")).is_ok());
    }

    #[test]
    fn combined_uses_env_and_keeps_secret_off_the_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyFiles::new(
            write(dir.path(), "pass", "correct horse\n"),
            write(dir.path(), "salt", "NaCl\r\n"),
        );
        let spec = keys
            .apply(KeyMode::Combined, ProcessSpec::new("openssl"))
            .unwrap();

        assert_eq!(spec.argv(), vec!["openssl", "-pass", "env:BACKUP_PIPE_KEY"]);
        assert!(!spec.command_line().contains("horse"));
        assert!(!spec.command_line().contains("NaCl"));
    }

    #[test]
    fn combined_secret_joins_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyFiles::new(
            write(dir.path(), "pass", "correct horse\n"),
            write(dir.path(), "salt", "NaCl\r\n"),
        );
        let out = dir.path().join("secret");
        // The trailing `-pass env:…` args land in `$0`/`$1` and are ignored.
        let spec = keys
            .apply(
                KeyMode::Combined,
                ProcessSpec::new("sh").args([
                    "-c",
                    &format!("printf %s \"${KEY_ENV}\" > '{}'", out.display()),
                ]),
            )
            .unwrap();
        ExternalProcess::new("dump-secret", Role::Standalone, spec)
            .run()
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "correct horse\nNaCl");
    }

    #[test]
    fn missing_key_file_is_key_error() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyFiles::new(dir.path().join("absent"), write(dir.path(), "salt", "s"));
        let err = keys
            .apply(KeyMode::Combined, ProcessSpec::new("openssl"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::KeyFile { .. }), "got {err:?}");
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn empty_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyFiles::new(write(dir.path(), "pass", "p"), write(dir.path(), "salt", "\n"));
        let err = keys
            .apply(KeyMode::Combined, ProcessSpec::new("openssl"))
            .unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[test]
    fn multi_line_key_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Would otherwise derive the same secret as pass="a", salt="b\nc".
        let keys = KeyFiles::new(write(dir.path(), "pass", "a\nb\n"), write(dir.path(), "salt", "c"));
        let err = keys
            .apply(KeyMode::Combined, ProcessSpec::new("openssl"))
            .unwrap_err();
        assert!(err.to_string().contains("single line"), "got: {err}");

        let keys = KeyFiles::new(write(dir.path(), "pass2", "a"), write(dir.path(), "salt2", "b\nc"));
        assert!(keys.apply(KeyMode::Combined, ProcessSpec::new("openssl")).is_err());
    }

    #[test]
    fn legacy_mode_warns_that_the_passphrase_is_ignored() {
        let keys = KeyFiles::new("/keys/pass", "/keys/salt");
        let (result, logged) = testing::capture(tracing::Level::WARN, || {
            keys.apply(KeyMode::Legacy, ProcessSpec::new("openssl"))
        });
        assert!(result.is_ok());
        assert!(logged.contains("passphrase file is ignored"), "got: {logged}");
    }

    #[test]
    fn combined_mode_does_not_warn() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyFiles::new(write(dir.path(), "pass", "p"), write(dir.path(), "salt", "s"));
        let (result, logged) = testing::capture(tracing::Level::WARN, || {
            keys.apply(KeyMode::Combined, ProcessSpec::new("openssl"))
        });
        assert!(result.is_ok());
        assert!(logged.is_empty(), "got: {logged}");
    }
}
