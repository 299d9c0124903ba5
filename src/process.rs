//! A single external program invocation.
//!
//! [`ProcessSpec`] says *what* to run; [`ExternalProcess`] owns the running
//! child, its stream redirections, and the [`DiagnosticCapture`] that drains
//! its stderr.  The lifecycle is strictly `start` → `wait`; calling either
//! out of order is reported as [`PipelineError::Misuse`] rather than a panic.
//!
//! # Stream ownership
//!
//! Redirections are moved into the `Command` at `start` and the `Command` is
//! dropped as soon as the child is spawned.  The orchestrating process
//! therefore never keeps a copy of a pipe end it handed to a child, which is
//! what lets the other side of a pipe observe EOF or a broken pipe.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    fs::File,
    io::{self, PipeReader, PipeWriter, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
};

use crate::error::{Misuse, PipelineError, Result, Role};

// ─── ProcessSpec ──────────────────────────────────────────────────────────────

/// Program name, arguments, working directory and extra environment for one
/// invocation.  Built once with the consuming builder methods and never
/// mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl ProcessSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add an environment entry for the child only.  Values are never shown
    /// by `Debug` or [`Self::command_line`], so this is the channel for
    /// secrets.
    #[must_use]
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Program followed by its arguments, lossily converted for display.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Space-joined [`Self::argv`], used in log lines and error messages.
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<_> = self.env.iter().map(|(k, _)| k).collect();
        f.debug_struct("ProcessSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("current_dir", &self.current_dir)
            .field("env", &env_keys)
            .finish()
    }
}

// ─── Redirect ─────────────────────────────────────────────────────────────────

/// Where a child's stdin or stdout is connected.
#[derive(Debug, Default)]
pub enum Redirect {
    /// Share the orchestrator's own stream.
    #[default]
    Inherit,
    /// `/dev/null`.
    Null,
    /// Read end of an OS pipe (for stdin).
    PipeReader(PipeReader),
    /// Write end of an OS pipe (for stdout).
    PipeWriter(PipeWriter),
    /// An already opened file.
    File(File),
}

impl From<Redirect> for Stdio {
    fn from(redirect: Redirect) -> Self {
        match redirect {
            Redirect::Inherit => Self::inherit(),
            Redirect::Null => Self::null(),
            Redirect::PipeReader(r) => Self::from(r),
            Redirect::PipeWriter(w) => Self::from(w),
            Redirect::File(f) => Self::from(f),
        }
    }
}

// ─── DiagnosticCapture ────────────────────────────────────────────────────────

/// Drains a child's stderr on a dedicated thread into a growable buffer.
///
/// Reading concurrently matters: a child that writes more than one pipe
/// buffer of diagnostics would otherwise block on its own stderr and never
/// exit.
pub struct DiagnosticCapture {
    reader: Option<JoinHandle<Vec<u8>>>,
}

impl DiagnosticCapture {
    pub fn attach(mut stderr: ChildStderr) -> Self {
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf) {
                tracing::warn!(error = %e, "stderr capture ended early");
            }
            buf
        });
        Self {
            reader: Some(reader),
        }
    }

    const fn empty() -> Self {
        Self { reader: None }
    }

    /// Block until the stream reaches EOF and return everything captured.
    pub fn collect(mut self) -> String {
        let bytes = self
            .reader
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// ─── ExitOutcome ──────────────────────────────────────────────────────────────

/// How a process terminated, plus everything it wrote to stderr.
#[derive(Debug)]
pub struct ExitOutcome {
    pub status: ExitStatus,
    pub diagnostics: String,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// `"exit status: 2"`, `"signal: 13 (SIGPIPE)"` and so on.
    pub fn describe(&self) -> String {
        self.status.to_string()
    }
}

// ─── ExternalProcess ──────────────────────────────────────────────────────────

enum State {
    Pending,
    Running {
        child: Child,
        capture: DiagnosticCapture,
    },
    Finished,
}

/// One external program, from spawn to exit.
pub struct ExternalProcess {
    label: String,
    role: Role,
    spec: ProcessSpec,
    stdin: Redirect,
    stdout: Redirect,
    state: State,
}

impl ExternalProcess {
    pub fn new(label: impl Into<String>, role: Role, spec: ProcessSpec) -> Self {
        Self {
            label: label.into(),
            role,
            spec,
            stdin: Redirect::Inherit,
            stdout: Redirect::Inherit,
            state: State::Pending,
        }
    }

    #[must_use]
    pub fn stdin(mut self, redirect: Redirect) -> Self {
        self.stdin = redirect;
        self
    }

    #[must_use]
    pub fn stdout(mut self, redirect: Redirect) -> Self {
        self.stdout = redirect;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    fn misuse(&self, misuse: Misuse) -> PipelineError {
        PipelineError::Misuse {
            program: self.spec.command_line(),
            misuse,
        }
    }

    /// Spawn the program and return immediately.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Pending) {
            return Err(self.misuse(Misuse::AlreadyStarted));
        }

        let mut cmd = self.spec.to_command();
        cmd.stdin(Stdio::from(std::mem::take(&mut self.stdin)))
            .stdout(Stdio::from(std::mem::take(&mut self.stdout)))
            .stderr(Stdio::piped());

        let spawned = cmd.spawn();
        // Releases our copies of any pipe ends now owned by the child.
        drop(cmd);

        let mut child = spawned.map_err(|source| PipelineError::Launch {
            what: format!("{} `{}`", self.label, self.spec.command_line()),
            source,
        })?;

        let capture = child
            .stderr
            .take()
            .map_or_else(DiagnosticCapture::empty, DiagnosticCapture::attach);

        tracing::debug!(
            stage = %self.label,
            role = %self.role,
            pid = child.id(),
            command = %self.spec.command_line(),
            "started"
        );
        self.state = State::Running { child, capture };
        Ok(())
    }

    /// Block until the program exits.  Stderr is fully drained before this
    /// returns.
    pub fn wait(&mut self) -> Result<ExitOutcome> {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::Pending => {
                self.state = State::Pending;
                Err(self.misuse(Misuse::NotStarted))
            },
            State::Finished => Err(self.misuse(Misuse::AlreadyWaited)),
            State::Running { mut child, capture } => {
                let status = child.wait().map_err(|source| PipelineError::Wait {
                    program: self.spec.command_line(),
                    source,
                })?;
                let diagnostics = capture.collect();
                tracing::debug!(stage = %self.label, role = %self.role, %status, "exited");
                Ok(ExitOutcome {
                    status,
                    diagnostics,
                })
            },
        }
    }

    /// Turn an unsuccessful outcome into [`PipelineError::Stage`].
    pub fn check(&self, outcome: ExitOutcome) -> Result<()> {
        if outcome.success() {
            return Ok(());
        }
        Err(PipelineError::Stage {
            stage: self.label.clone(),
            role: self.role,
            command: self.spec.command_line(),
            status: outcome.describe(),
            diagnostics: outcome.diagnostics,
        })
    }

    /// `start`, `wait` and `check` in one call, for processes outside a pipe.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        let outcome = self.wait()?;
        self.check(outcome)
    }

    /// Stop caring about this process without blocking on it.  A running
    /// child is reaped on a background thread so it does not linger as a
    /// zombie; its diagnostics are discarded.
    pub fn detach(mut self) {
        self.reap_in_background();
    }

    fn reap_in_background(&mut self) {
        let State::Running { mut child, capture } =
            std::mem::replace(&mut self.state, State::Finished)
        else {
            return;
        };
        let label = self.label.clone();
        thread::spawn(move || {
            let status = child.wait();
            drop(capture.collect());
            match status {
                Ok(status) => tracing::debug!(stage = %label, %status, "detached process exited"),
                Err(e) => tracing::warn!(stage = %label, error = %e, "could not reap detached process"),
            }
        });
    }
}

impl Drop for ExternalProcess {
    fn drop(&mut self) {
        self.reap_in_background();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
