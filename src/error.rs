//! Error types for the process pipeline.
//!
//! Everything below the command layer reports failures through
//! [`PipelineError`].  The command handlers wrap it in `anyhow` for
//! presentation; the variants themselves carry everything an operator needs
//! (exit description *and* captured stderr), so nothing is lost on the way up.

use std::{fmt, io, path::PathBuf};

/// Position of a process inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Writes into the pipe.
    Producer,
    /// Reads from the pipe.
    Consumer,
    /// Runs on its own, outside any pipe (e.g. the upload step).
    Standalone,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Standalone => "standalone",
        })
    }
}

/// Lifecycle calls made out of order on an [`ExternalProcess`](crate::process::ExternalProcess).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misuse {
    AlreadyStarted,
    NotStarted,
    AlreadyWaited,
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyStarted => "process was already started",
            Self::NotStarted => "process was never started",
            Self::AlreadyWaited => "process was already waited on",
        })
    }
}

/// Errors produced while launching or running external processes.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The pipe could not be allocated or a process could not be spawned.
    /// No data has flowed; there is no diagnostic text, only the OS error.
    #[error("failed to launch {what}: {source}")]
    Launch {
        what: String,
        #[source]
        source: io::Error,
    },

    /// A stage ran and exited unsuccessfully.
    #[error("{stage} ({role}) `{command}` failed: {status}{}", render_diagnostics(.diagnostics))]
    Stage {
        stage: String,
        role: Role,
        command: String,
        status: String,
        diagnostics: String,
    },

    /// `start`/`wait` called in the wrong order.
    #[error("`{program}`: {misuse}")]
    Misuse { program: String, misuse: Misuse },

    /// The OS refused to report on a child we spawned.
    #[error("failed to wait on `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    /// A passphrase or salt file was unreadable, empty, or spanned several lines.
    #[error("key file {}: {reason}", path.display())]
    KeyFile { path: PathBuf, reason: String },
}

impl PipelineError {
    /// Which role failed, if the error came from a running stage.
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::Stage { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// The error without the trailing diagnostic text, for displays that
    /// replay the diagnostics separately.
    pub fn headline(&self) -> String {
        match self {
            Self::Stage {
                stage,
                role,
                command,
                status,
                ..
            } => format!("{stage} ({role}) `{command}` failed: {status}"),
            other => other.to_string(),
        }
    }

    /// Captured stderr of the failing stage (empty for non-stage errors).
    pub fn diagnostics(&self) -> &str {
        match self {
            Self::Stage { diagnostics, .. } => diagnostics,
            _ => "",
        }
    }
}

fn render_diagnostics(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Convenience alias used by the process and pipeline modules.
pub type Result<T> = std::result::Result<T, PipelineError>;
