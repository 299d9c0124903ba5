//! `compress_encrypt` — archive a directory straight into an encrypted file.
//!
//! | # | Stage             | Description                                  |
//! |---|-------------------|----------------------------------------------|
//! | 1 | Check input       | `<input_dir>` exists and is a directory      |
//! | 2 | Archive + encrypt | `tar -c … \| openssl enc … -out <out>.enc`   |
//!
//! The archive stream only ever exists inside the kernel pipe between the
//! two processes.  `openssl` writes to `<out>.enc.partial`, which is renamed
//! to `<out>.enc` only after both stages succeeded and removed otherwise, so
//! a failed run never leaves a plausible backup at the final path.

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};

use crate::{
    config::Config,
    error::PipelineError,
    keys::KeyFiles,
    pipeline::{Pipeline, PipelineStage},
    process::Redirect,
    runner::{archive_spec, encrypt_spec, encrypted_path, staging_path},
    ui::{StageOutcome, print_summary, run_stage},
};

/// Arguments of `compress_encrypt`.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub input_dir: PathBuf,
    pub output_file: PathBuf,
    pub keys: KeyFiles,
}

/// `archive | encrypt`.  Fails before launching anything if a key file
/// cannot be read.
pub fn pipeline(cfg: &Config, req: &BackupRequest) -> Result<Pipeline, PipelineError> {
    let archive = PipelineStage::new("archive", archive_spec(&cfg.archive, &req.input_dir));
    let encrypt = PipelineStage::new(
        "encrypt",
        encrypt_spec(&cfg.cipher, &req.output_file, &req.keys)?,
    );
    Ok(Pipeline::new(archive, encrypt)
        .with_source(Redirect::Null)
        .with_sink(Redirect::Null))
}

fn check_input(dir: &Path) -> Result<()> {
    let meta = std::fs::metadata(dir).with_context(|| format!("reading {}", dir.display()))?;
    if !meta.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    Ok(())
}

/// Run the pipeline and move the staged ciphertext into place.  Returns the
/// final path.
pub fn execute(cfg: &Config, req: &BackupRequest) -> Result<PathBuf> {
    let staged = staging_path(&cfg.cipher, &req.output_file);
    let target = encrypted_path(&cfg.cipher, &req.output_file);

    if let Err(err) = pipeline(cfg, req).and_then(Pipeline::run) {
        discard(&staged);
        return Err(err.into());
    }

    std::fs::rename(&staged, &target).with_context(|| {
        format!("moving {} to {}", staged.display(), target.display())
    })?;
    Ok(target)
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove partial output"),
    }
}

/// Run both stages, printing a ✓/✗ line for each and a final summary.
pub fn run(cfg: &Config, req: &BackupRequest) -> Result<()> {
    println!();
    let mut outcomes: Vec<StageOutcome> = Vec::new();

    let check = run_stage("Check input", || check_input(&req.input_dir));
    check.print();
    let failed = check.failed();
    outcomes.push(check);
    if failed {
        print_summary(&outcomes);
        bail!("backup aborted: input check failed");
    }

    let mut written = None;
    let backup = run_stage("Archive + encrypt", || {
        written = Some(execute(cfg, req)?);
        Ok(())
    });
    backup.print();
    let failed = backup.failed();
    outcomes.push(backup);
    print_summary(&outcomes);
    if failed {
        bail!("backup aborted: pipeline failed");
    }

    if let Some(path) = written {
        println!("  Wrote {}", path.display());
    }
    Ok(())
}
