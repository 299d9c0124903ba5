//! Process spec construction for every external program.
//!
//! This module only *builds* [`ProcessSpec`]s; it never runs anything.
//! Execution lives in [`crate::pipeline`] and [`crate::process`], so every
//! function here except the key-reading ones is pure and unit-testable
//! without `tar`, `openssl` or `rclone` installed.
//!
//! # Shapes
//!
//! ```text
//! archive   tar -c [-J] -C <dir> .
//! extract   tar -x [-J] -f - -C <dir>
//! encrypt   openssl enc -<cipher> -salt -pbkdf2 -out <file><suffix>.partial <key args>
//! decrypt   openssl enc -d -<cipher> -pbkdf2 -in <file> <key args>
//! upload    rclone copy <file> <remote>
//! ```
//!
//! The archive is taken relative to the input directory (`-C <dir> .`) so a
//! restore recreates the directory's contents directly inside the output
//! directory.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{
    config::{ArchiveConfig, CipherConfig, UploadConfig},
    error::Result,
    keys::KeyFiles,
    process::ProcessSpec,
};

// ─── tar ──────────────────────────────────────────────────────────────────────

/// `tar -c [-J] -C <input_dir> .` writing the archive to stdout.
pub fn archive_spec(cfg: &ArchiveConfig, input_dir: &Path) -> ProcessSpec {
    ProcessSpec::new(&cfg.program)
        .arg("-c")
        .args(cfg.compression.tar_flag())
        .arg("-C")
        .arg(input_dir)
        .arg(".")
}

/// `tar -x [-J] -f - -C <output_dir>` reading the archive from stdin.
pub fn extract_spec(cfg: &ArchiveConfig, output_dir: &Path) -> ProcessSpec {
    ProcessSpec::new(&cfg.program)
        .arg("-x")
        .args(cfg.compression.tar_flag())
        .args(["-f", "-", "-C"])
        .arg(output_dir)
}

// ─── openssl ──────────────────────────────────────────────────────────────────

/// `<output_base><suffix>`, e.g. `backup.tar` → `backup.tar.enc`.
pub fn encrypted_path(cfg: &CipherConfig, output_base: &Path) -> PathBuf {
    let mut name = OsString::from(output_base);
    name.push(&cfg.suffix);
    PathBuf::from(name)
}

/// `<output_base><suffix>.partial`.  The encryptor writes here and the file
/// is only renamed to [`encrypted_path`] once the whole pipeline succeeded.
pub fn staging_path(cfg: &CipherConfig, output_base: &Path) -> PathBuf {
    let mut name = encrypted_path(cfg, output_base).into_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Encryptor reading plaintext from stdin and writing
/// [`staging_path`]`(output_base)`.
pub fn encrypt_spec(cfg: &CipherConfig, output_base: &Path, keys: &KeyFiles) -> Result<ProcessSpec> {
    let spec = ProcessSpec::new(&cfg.program)
        .arg("enc")
        .arg(format!("-{}", cfg.cipher))
        .args(["-salt", "-pbkdf2", "-out"])
        .arg(staging_path(cfg, output_base));
    keys.apply(cfg.key_mode, spec)
}

/// Decryptor reading `input` and writing plaintext to stdout.
pub fn decrypt_spec(cfg: &CipherConfig, input: &Path, keys: &KeyFiles) -> Result<ProcessSpec> {
    let spec = ProcessSpec::new(&cfg.program)
        .args(["enc", "-d"])
        .arg(format!("-{}", cfg.cipher))
        .args(["-pbkdf2", "-in"])
        .arg(input);
    keys.apply(cfg.key_mode, spec)
}

// ─── rclone ───────────────────────────────────────────────────────────────────

/// `rclone copy <source> <remote>`.
pub fn upload_spec(cfg: &UploadConfig, source: &Path, remote: &str) -> ProcessSpec {
    ProcessSpec::new(&cfg.program)
        .arg("copy")
        .arg(source)
        .arg(remote)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
