//! `backup-pipe` — streaming archive-and-encrypt backups.
//!
//! # Overview
//!
//! The binary orchestrates external programs and never touches the payload
//! itself: `tar` writes the archive into a kernel pipe, `openssl` reads it
//! from the other end and writes the ciphertext to disk.  Restores run the
//! same two-stage executor with the roles reversed.  Whichever stage fails
//! is reported with its exit status *and* everything it wrote to stderr.
//!
//! # Usage
//!
//! ```text
//! backup-pipe compress_encrypt   <inputDir> <outputFile> <passFile> <saltFile>
//! backup-pipe decrypt_decompress <inputFile> <outputDir> <passFile> <saltFile>
//! backup-pipe send_to_backblaze  <sourceFile> <remoteDestination>
//! backup-pipe --print-config
//! ```
//!
//! # Module layout
//!
//! | Module                   | Responsibility                              |
//! |--------------------------|---------------------------------------------|
//! | [`cli`]                  | Argument types parsed by clap               |
//! | [`config`]               | `Config` struct + layered TOML loader       |
//! | [`logging`]              | tracing subscriber setup                    |
//! | [`error`]                | `PipelineError` taxonomy                    |
//! | [`process`]              | One external process and its streams        |
//! | [`pipeline`]             | `producer \| consumer` executor              |
//! | [`keys`]                 | Passphrase/salt handling for the cipher     |
//! | [`runner`]               | Argument construction for tar/openssl/rclone|
//! | [`ui`]                   | Spinner, stage outcomes, summary            |
//! | [`commands`]             | The three subcommands                       |

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod runner;
pub mod ui;
