//! Command-line interface definition.
//!
//! All argument parsing lives here so the rest of the codebase can stay
//! agnostic to `clap`.  Each subcommand takes a fixed number of positional
//! arguments; clap rejects any other count with a usage message before a
//! single file is touched or process spawned.

use std::path::PathBuf;

use clap::Parser;

/// Top-level CLI arguments, shared across every subcommand.
#[derive(Parser, Debug)]
#[command(
    name    = "backup-pipe",
    about   = "Archive-and-encrypt backups through a streaming tar | openssl pipeline",
    version,
    help_template = "\
{before-help}{name} {version}
{about}

{usage-heading} {usage}

{all-args}{after-help}"
)]
pub struct Cli {
    /// Path to the configuration file.
    ///
    /// Defaults to `backup-pipe.toml` in the current working directory.
    /// Sections found there override `~/.config/backup-pipe/config.toml`.
    #[arg(short, long, default_value = "backup-pipe.toml", global = true)]
    pub config: PathBuf,

    /// Print the merged configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    ///
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operation to run.  Without one, the help text is printed.
    #[command(subcommand)]
    pub command: Option<Subcommand>,
}

#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
pub enum Subcommand {
    /// Archive a directory and encrypt the archive in one streaming pass.
    ///
    /// Writes `<OUTPUT_FILE>` plus the configured suffix (`.enc` by default).
    #[command(name = "compress_encrypt")]
    CompressEncrypt {
        /// Directory to back up.
        input_dir: PathBuf,
        /// Output path, before the encryption suffix is appended.
        output_file: PathBuf,
        /// File holding the passphrase.
        pass_file: PathBuf,
        /// File holding the salt.
        salt_file: PathBuf,
    },

    /// Decrypt an archive and extract it into a directory in one streaming pass.
    #[command(name = "decrypt_decompress")]
    DecryptDecompress {
        /// Encrypted archive produced by `compress_encrypt`.
        input_file: PathBuf,
        /// Directory to extract into; created if missing.
        output_dir: PathBuf,
        /// File holding the passphrase.
        pass_file: PathBuf,
        /// File holding the salt.
        salt_file: PathBuf,
    },

    /// Copy a file to a remote with `rclone copy`.
    #[command(name = "send_to_backblaze")]
    SendToBackblaze {
        /// Local file to upload.
        source_file: PathBuf,
        /// rclone destination, e.g. `b2:bucket/path`.
        remote_destination: String,
    },
}
