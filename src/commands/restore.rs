//! `decrypt_decompress` — decrypt an archive straight into a directory.
//!
//! | # | Stage             | Description                                      |
//! |---|-------------------|--------------------------------------------------|
//! | 1 | Prepare           | input file exists, keys read, output dir created |
//! | 2 | Decrypt + extract | `openssl enc -d … -in <file> \| tar -x -f - -C …` |
//!
//! A wrong passphrase or salt makes `openssl` exit non-zero ("bad decrypt"),
//! which is reported as the producer's failure even if `tar` has already
//! choked on the garbage it was fed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::{
    config::Config,
    error::PipelineError,
    keys::KeyFiles,
    pipeline::{Pipeline, PipelineStage},
    process::Redirect,
    runner::{decrypt_spec, extract_spec},
    ui::{StageOutcome, print_summary, run_stage},
};

/// Arguments of `decrypt_decompress`.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
    pub keys: KeyFiles,
}

/// `decrypt | extract`.  Same executor as the backup, roles reversed.
pub fn pipeline(cfg: &Config, req: &RestoreRequest) -> Result<Pipeline, PipelineError> {
    let decrypt = PipelineStage::new(
        "decrypt",
        decrypt_spec(&cfg.cipher, &req.input_file, &req.keys)?,
    );
    let extract = PipelineStage::new("extract", extract_spec(&cfg.archive, &req.output_dir));
    Ok(Pipeline::new(decrypt, extract)
        .with_source(Redirect::Null)
        .with_sink(Redirect::Null))
}

/// Everything that can fail without launching a process.  The output
/// directory is only created once the key files have been read.
fn prepare(cfg: &Config, req: &RestoreRequest) -> Result<Pipeline> {
    let meta = std::fs::metadata(&req.input_file)
        .with_context(|| format!("reading {}", req.input_file.display()))?;
    if !meta.is_file() {
        bail!("{} is not a file", req.input_file.display());
    }
    let built = pipeline(cfg, req)?;
    ensure_dir(&req.output_dir)?;
    Ok(built)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

pub fn run(cfg: &Config, req: &RestoreRequest) -> Result<()> {
    println!();
    let mut outcomes: Vec<StageOutcome> = Vec::new();

    let mut prepared = None;
    let prep = run_stage("Prepare", || {
        prepared = Some(prepare(cfg, req)?);
        Ok(())
    });
    prep.print();
    let failed = prep.failed();
    outcomes.push(prep);
    if failed {
        print_summary(&outcomes);
        bail!("restore aborted: preparation failed");
    }

    let restore = run_stage("Decrypt + extract", || {
        prepared.context("restore pipeline was not prepared")?.run()?;
        Ok(())
    });
    restore.print();
    let failed = restore.failed();
    outcomes.push(restore);
    print_summary(&outcomes);
    if failed {
        bail!("restore aborted: pipeline failed");
    }

    println!("  Restored into {}", req.output_dir.display());
    Ok(())
}
