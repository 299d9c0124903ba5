//! `send_to_backblaze` — one blocking `rclone copy`, no pipe.

use std::path::Path;

use anyhow::{Result, bail};

use crate::{
    config::Config,
    error::Role,
    process::ExternalProcess,
    runner::upload_spec,
    ui::{print_summary, run_stage},
};

pub fn run(cfg: &Config, source: &Path, remote: &str) -> Result<()> {
    println!();
    let upload = run_stage("Upload", || {
        ExternalProcess::new("upload", Role::Standalone, upload_spec(&cfg.upload, source, remote))
            .run()?;
        Ok(())
    });
    upload.print();
    let failed = upload.failed();
    print_summary(&[upload]);
    if failed {
        bail!("upload failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;

    fn config_with(program: &str) -> Config {
        Config {
            upload: UploadConfig {
                program: program.into(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn succeeds_when_the_uploader_succeeds() {
        // `true copy <src> <remote>` ignores its arguments.
        assert!(run(&config_with("true"), Path::new("/x"), "remote:y").is_ok());
    }

    #[test]
    fn fails_when_the_uploader_fails() {
        assert!(run(&config_with("false"), Path::new("/x"), "remote:y").is_err());
    }

    #[test]
    fn fails_when_the_uploader_is_missing() {
        let cfg = config_with("/no/such/rclone");
        assert!(run(&cfg, Path::new("/x"), "remote:y").is_err());
    }
}
