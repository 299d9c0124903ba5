//! Configuration types and loading logic.
//!
//! `Config` is a direct mapping of `backup-pipe.toml`.  Every section has a
//! `Default` impl so the file is entirely optional: without one, backups use
//! `tar` with xz compression and `openssl enc -aes-256-cbc -pbkdf2`.
//!
//! # File format
//!
//! ```toml
//! [archive]
//! program     = "tar"
//! compression = "xz"          # xz | gzip | bzip2 | zstd | none
//!
//! [cipher]
//! program  = "openssl"
//! cipher   = "aes-256-cbc"
//! suffix   = ".enc"
//! key_mode = "combined"       # combined | legacy
//!
//! [upload]
//! program = "rclone"
//! ```
//!
//! # Layers
//!
//! 1. `~/.config/backup-pipe/config.toml` — global defaults
//! 2. `--config` (default `./backup-pipe.toml`) — per-invocation overrides
//!
//! A section present in the local file replaces the same section from the
//! global file as a whole.  Either file may be absent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// ─── Top-level ────────────────────────────────────────────────────────────────

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub cipher: CipherConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

// ─── [archive] ────────────────────────────────────────────────────────────────

/// The archiver stage (producer on backup, consumer on restore).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// tar-compatible program.  Must understand `-c`, `-x`, `-f -` and `-C`.
    #[serde(default = "default_archive_program")]
    pub program: String,

    /// Compression filter applied by the archiver itself.
    #[serde(default)]
    pub compression: Compression,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: default_archive_program(),
            compression: Compression::default(),
        }
    }
}

/// Compression filters understood by GNU and BSD tar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Xz,
    Gzip,
    Bzip2,
    Zstd,
    None,
}

impl Compression {
    /// The tar flag selecting this filter, if any.
    pub const fn tar_flag(self) -> Option<&'static str> {
        match self {
            Self::Xz => Some("-J"),
            Self::Gzip => Some("-z"),
            Self::Bzip2 => Some("-j"),
            Self::Zstd => Some("--zstd"),
            Self::None => None,
        }
    }
}

// ─── [cipher] ─────────────────────────────────────────────────────────────────

/// The encryption stage (consumer on backup, producer on restore).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CipherConfig {
    /// openssl-compatible program supporting `enc`.
    #[serde(default = "default_cipher_program")]
    pub program: String,

    /// Cipher name passed as `-<cipher>` to `openssl enc`.
    #[serde(default = "default_cipher")]
    pub cipher: String,

    /// Appended to the output path given to `compress_encrypt`.
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// How the passphrase and salt files are handed to the cipher.
    #[serde(default)]
    pub key_mode: KeyMode,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            program: default_cipher_program(),
            cipher: default_cipher(),
            suffix: default_suffix(),
            key_mode: KeyMode::default(),
        }
    }
}

/// See [`crate::keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Both files are read and combined into one secret.
    #[default]
    Combined,
    /// Both paths are passed as `-pass file:…`; openssl honours only the last.
    Legacy,
}

// ─── [upload] ─────────────────────────────────────────────────────────────────

/// The `send_to_backblaze` step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadConfig {
    /// rclone-compatible program invoked as `<program> copy <src> <remote>`.
    #[serde(default = "default_upload_program")]
    pub program: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            program: default_upload_program(),
        }
    }
}

// ─── Defaults ─────────────────────────────────────────────────────────────────

// serde's field-level `default = "…"` needs free functions.

pub fn default_archive_program() -> String {
    "tar".into()
}

pub fn default_cipher_program() -> String {
    "openssl".into()
}

pub fn default_cipher() -> String {
    "aes-256-cbc".into()
}

pub fn default_suffix() -> String {
    ".enc".into()
}

pub fn default_upload_program() -> String {
    "rclone".into()
}

// ─── Layering ─────────────────────────────────────────────────────────────────

/// One config file as written, before layering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialConfig {
    pub archive: Option<ArchiveConfig>,
    pub cipher: Option<CipherConfig>,
    pub upload: Option<UploadConfig>,
}

impl PartialConfig {
    /// Sections from `over` win over sections from `self`.
    #[must_use]
    pub fn merge(self, over: Self) -> Self {
        Self {
            archive: over.archive.or(self.archive),
            cipher: over.cipher.or(self.cipher),
            upload: over.upload.or(self.upload),
        }
    }

    pub fn resolve(self) -> Config {
        Config {
            archive: self.archive.unwrap_or_default(),
            cipher: self.cipher.unwrap_or_default(),
            upload: self.upload.unwrap_or_default(),
        }
    }
}

// ─── Loader ───────────────────────────────────────────────────────────────────

/// Parse `path` if it exists.  `Ok(None)` means "no such file".
pub fn parse_partial(path: &Path) -> Result<Option<PartialConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let partial = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(partial))
}

/// `<config_dir>/backup-pipe/config.toml`, if the platform has a config dir.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("backup-pipe").join("config.toml"))
}

/// Load and layer the global and local config files.
///
/// A malformed local file is an error.  A malformed global file is skipped
/// with a warning so one bad dotfile cannot block every invocation.
pub fn load(local_path: &Path) -> Result<Config> {
    let global = match global_config_path() {
        Some(path) => parse_partial(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "ignoring global config");
            None
        }),
        None => None,
    };

    let local = parse_partial(local_path)?;
    if local.is_none() {
        tracing::debug!(path = %local_path.display(), "no local config, using defaults");
    }

    Ok(global
        .unwrap_or_default()
        .merge(local.unwrap_or_default())
        .resolve())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
