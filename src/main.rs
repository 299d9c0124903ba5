//! Entry point: parse arguments, load config, dispatch to a subcommand.

use anyhow::{Context, Result};
use backup_pipe::{
    cli::{Cli, Subcommand},
    commands::{self, backup::BackupRequest, restore::RestoreRequest},
    config,
    keys::KeyFiles,
    logging,
};
use clap::{CommandFactory, Parser};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load(&cli.config)?;

    if cli.print_config {
        print!(
            "{}",
            toml::to_string_pretty(&cfg).context("serialising config")?
        );
        return Ok(());
    }

    match cli.command {
        // ── bare invocation: usage and a clean exit ───────────────────────────
        None => {
            Cli::command().print_help()?;
        },

        Some(Subcommand::CompressEncrypt {
            input_dir,
            output_file,
            pass_file,
            salt_file,
        }) => {
            let req = BackupRequest {
                input_dir,
                output_file,
                keys: KeyFiles::new(pass_file, salt_file),
            };
            commands::backup::run(&cfg, &req)?;
        },

        Some(Subcommand::DecryptDecompress {
            input_file,
            output_dir,
            pass_file,
            salt_file,
        }) => {
            let req = RestoreRequest {
                input_file,
                output_dir,
                keys: KeyFiles::new(pass_file, salt_file),
            };
            commands::restore::run(&cfg, &req)?;
        },

        Some(Subcommand::SendToBackblaze {
            source_file,
            remote_destination,
        }) => {
            commands::upload::run(&cfg, &source_file, &remote_destination)?;
        },
    }

    Ok(())
}
