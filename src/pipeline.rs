//! Two-stage streaming pipeline: `producer | consumer`.
//!
//! The producer's stdout and the consumer's stdin are the two ends of one
//! kernel pipe.  The payload never passes through this process, so memory use
//! is independent of payload size and back-pressure is whatever the kernel
//! pipe buffer provides.
//!
//! # Ordering
//!
//! | Step | Action                                   |
//! |------|------------------------------------------|
//! | 1    | allocate the pipe (both ends)            |
//! | 2    | start the consumer                       |
//! | 3    | start the producer                       |
//! | 4    | wait on the producer; bail on failure    |
//! | 5    | wait on the consumer                     |
//!
//! Waiting on the producer first means its failure is the one reported,
//! even when the consumer fails as a consequence (truncated input, EOF in the
//! middle of a stream).  A consumer abandoned after a producer failure is
//! reaped in the background rather than waited on.

use std::io;

use crate::{
    error::{PipelineError, Result, Role},
    process::{ExternalProcess, ProcessSpec, Redirect},
};

/// A labelled process taking one side of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineStage {
    pub label: String,
    pub spec: ProcessSpec,
}

impl PipelineStage {
    pub fn new(label: impl Into<String>, spec: ProcessSpec) -> Self {
        Self {
            label: label.into(),
            spec,
        }
    }
}

/// Lifecycle notification passed to the observer of [`Pipeline::run_observed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started(Role),
    Exited(Role),
}

/// `producer | consumer`, run exactly once.
#[derive(Debug)]
pub struct Pipeline {
    producer: PipelineStage,
    consumer: PipelineStage,
    source: Redirect,
    sink: Redirect,
}

impl Pipeline {
    pub fn new(producer: PipelineStage, consumer: PipelineStage) -> Self {
        Self {
            producer,
            consumer,
            source: Redirect::Inherit,
            sink: Redirect::Inherit,
        }
    }

    /// Where the producer reads from.  Defaults to the inherited stdin.
    #[must_use]
    pub fn with_source(mut self, source: Redirect) -> Self {
        self.source = source;
        self
    }

    /// Where the consumer writes to.  Defaults to the inherited stdout.
    #[must_use]
    pub fn with_sink(mut self, sink: Redirect) -> Self {
        self.sink = sink;
        self
    }

    pub const fn producer(&self) -> &PipelineStage {
        &self.producer
    }

    pub const fn consumer(&self) -> &PipelineStage {
        &self.consumer
    }

    /// `producer_cmd | consumer_cmd`, for log lines.
    pub fn describe(&self) -> String {
        format!(
            "{} | {}",
            self.producer.spec.command_line(),
            self.consumer.spec.command_line()
        )
    }

    /// Run both stages to completion and return one aggregated result.
    pub fn run(self) -> Result<()> {
        self.run_observed(|event| tracing::trace!(?event, "pipeline"))
    }

    /// [`Self::run`] with a callback invoked at every start and exit.
    pub fn run_observed(self, mut observe: impl FnMut(Event)) -> Result<()> {
        tracing::info!(pipeline = %self.describe(), "running");
        let Self {
            producer,
            consumer,
            source,
            sink,
        } = self;

        let (reader, writer) = io::pipe().map_err(|source| PipelineError::Launch {
            what: "pipe between stages".into(),
            source,
        })?;

        let mut consumer = ExternalProcess::new(consumer.label, Role::Consumer, consumer.spec)
            .stdin(Redirect::PipeReader(reader))
            .stdout(sink);
        let mut producer = ExternalProcess::new(producer.label, Role::Producer, producer.spec)
            .stdin(source)
            .stdout(Redirect::PipeWriter(writer));

        // A producer that fails to launch closes the write end on its way
        // out, so the already running consumer sees EOF and is reaped by Drop.
        consumer.start()?;
        observe(Event::Started(Role::Consumer));
        producer.start()?;
        observe(Event::Started(Role::Producer));

        let produced = producer.wait()?;
        observe(Event::Exited(Role::Producer));
        if let Err(err) = producer.check(produced) {
            tracing::info!(stage = %producer.label(), "producer failed; not waiting on consumer");
            consumer.detach();
            return Err(err);
        }

        let consumed = consumer.wait()?;
        observe(Event::Exited(Role::Consumer));
        consumer.check(consumed)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        sync::mpsc,
        time::Duration,
    };

    use super::*;
    use crate::logging::testing;

    fn stage(label: &str, program: &str, args: &[&str]) -> PipelineStage {
        PipelineStage::new(label, ProcessSpec::new(program).args(args))
    }

    fn sh(label: &str, script: &str) -> PipelineStage {
        stage(label, "sh", &["-c", script])
    }

    // ── data flow ─────────────────────────────────────────────────────────────

    #[test]
    fn producer_output_reaches_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");

        Pipeline::new(
            stage("emit", "printf", &["hello pipe"]),
            stage("copy", "cat", &[]),
        )
        .with_sink(Redirect::File(File::create(&out).unwrap()))
        .run()
        .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello pipe");
    }

    #[test]
    fn source_feeds_producer() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        std::fs::write(&input, "abc\n").unwrap();

        Pipeline::new(stage("upper", "tr", &["a-z", "A-Z"]), stage("copy", "cat", &[]))
            .with_source(Redirect::File(File::open(&input).unwrap()))
            .with_sink(Redirect::File(File::create(&out).unwrap()))
            .run()
            .unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "ABC\n");
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn consumer_starts_first_and_producer_is_waited_first() {
        let mut events = Vec::new();
        Pipeline::new(stage("emit", "printf", &["x"]), stage("drop", "cat", &[]))
            .with_sink(Redirect::Null)
            .run_observed(|e| events.push(e))
            .unwrap();

        assert_eq!(events, vec![
            Event::Started(Role::Consumer),
            Event::Started(Role::Producer),
            Event::Exited(Role::Producer),
            Event::Exited(Role::Consumer),
        ]);
    }

    #[test]
    fn consumer_is_not_waited_after_producer_failure() {
        let mut events = Vec::new();
        let err = Pipeline::new(sh("emit", "exit 1"), stage("drop", "cat", &[]))
            .with_sink(Redirect::Null)
            .run_observed(|e| events.push(e))
            .unwrap_err();

        assert_eq!(err.role(), Some(Role::Producer));
        assert!(!events.contains(&Event::Exited(Role::Consumer)));
    }

    #[test]
    fn producer_failure_logs_nothing_at_the_default_level() {
        let (result, logged) = testing::capture(tracing::Level::WARN, || {
            Pipeline::new(sh("emit", "exit 1"), stage("drop", "cat", &[]))
                .with_sink(Redirect::Null)
                .run()
        });
        assert!(result.is_err());
        assert!(logged.is_empty(), "got: {logged}");
    }

    // ── error aggregation ─────────────────────────────────────────────────────

    #[test]
    fn producer_failure_carries_status_and_full_stderr() {
        let err = Pipeline::new(
            sh(
                "archive",
                "echo 'tar: /missing: Cannot stat' >&2; echo 'tar: Exiting with failure' >&2; exit 2",
            ),
            stage("encrypt", "cat", &[]),
        )
        .with_sink(Redirect::Null)
        .run()
        .unwrap_err();

        assert_eq!(err.role(), Some(Role::Producer));
        assert_eq!(
            err.diagnostics(),
            "tar: /missing: Cannot stat\ntar: Exiting with failure\n"
        );
        let msg = err.to_string();
        assert!(msg.starts_with("archive (producer)"), "got: {msg}");
        assert!(msg.contains("exit status: 2"), "got: {msg}");
        assert!(msg.contains("Cannot stat"), "got: {msg}");
        assert!(msg.contains("Exiting with failure"), "got: {msg}");
    }

    #[test]
    fn consumer_failure_reports_consumer_stderr_only() {
        let err = Pipeline::new(
            sh("decrypt", "echo 'producer noise' >&2; printf data"),
            sh("extract", "cat >/dev/null; echo 'bad archive' >&2; exit 3"),
        )
        .run()
        .unwrap_err();

        assert_eq!(err.role(), Some(Role::Consumer));
        assert_eq!(err.diagnostics(), "bad archive\n");
        assert!(err.to_string().contains("exit status: 3"));
    }

    #[test]
    fn unknown_producer_is_launch_failure() {
        let err = Pipeline::new(
            stage("archive", "/no/such/archiver", &[]),
            stage("encrypt", "cat", &[]),
        )
        .with_sink(Redirect::Null)
        .run()
        .unwrap_err();
        assert!(matches!(err, PipelineError::Launch { .. }), "got {err:?}");
    }

    #[test]
    fn unknown_consumer_is_launch_failure() {
        let err = Pipeline::new(
            stage("archive", "printf", &["x"]),
            stage("encrypt", "/no/such/encryptor", &[]),
        )
        .run()
        .unwrap_err();
        assert!(matches!(err, PipelineError::Launch { .. }), "got {err:?}");
        assert!(err.to_string().contains("encrypt"));
    }

    // ── liveness ──────────────────────────────────────────────────────────────

    #[test]
    fn broken_consumer_does_not_hang_an_endless_producer() {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = Pipeline::new(stage("flood", "yes", &[]), sh("broken", "exit 1"))
                .with_sink(Redirect::Null)
                .run();
            let _ = tx.send(result);
        });

        let result = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("pipeline hung with a broken consumer");
        let err = result.unwrap_err();
        // `yes` dies of a broken pipe and that failure is reported first.
        assert_eq!(err.role(), Some(Role::Producer));
    }

    #[cfg(target_os = "linux")]
    fn peak_rss_kib() -> u64 {
        let status = std::fs::read_to_string("/proc/self/status").unwrap();
        status
            .lines()
            .find_map(|l| l.strip_prefix("VmHWM:"))
            .and_then(|v| v.trim().trim_end_matches("kB").trim().parse().ok())
            .unwrap()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn large_payload_is_not_buffered_in_process() {
        const PAYLOAD: u64 = 256 * 1024 * 1024;
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("count.txt");

        let before = peak_rss_kib();
        Pipeline::new(
            stage("emit", "head", &["-c", &PAYLOAD.to_string(), "/dev/zero"]),
            stage("count", "wc", &["-c"]),
        )
        .with_sink(Redirect::File(File::create(&out).unwrap()))
        .run()
        .unwrap();
        let grown_kib = peak_rss_kib().saturating_sub(before);

        let counted: u64 = std::fs::read_to_string(&out).unwrap().trim().parse().unwrap();
        assert_eq!(counted, PAYLOAD);
        assert!(
            grown_kib < 32 * 1024,
            "peak RSS grew by {grown_kib} KiB while streaming {PAYLOAD} bytes"
        );
    }
}
