//! Terminal UI — spinners, stage banners, and replayed diagnostics.
//!
//! # Design goals
//!
//! - **Clean by default.** While a stage is running the user sees only a spinner and a short label.
//!   The external programs' stderr is captured and hidden.
//! - **Informative on failure.** If a stage fails, the error headline is printed followed by the
//!   failing process's captured stderr, so the operator can diagnose it without re-running.
//! - **Testable without a terminal.** [`StageOutcome`] is plain data; indicatif hides the spinner
//!   automatically when stderr is not a terminal.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::PipelineError;

// ─── Icons ───────────────────────────────────────────────────────────────────

/// Braille spinner frames, same as indicatif's default.
static SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

fn icon_ok() -> console::StyledObject<&'static str> {
    style("✓").green().bold()
}
fn icon_err() -> console::StyledObject<&'static str> {
    style("✗").red().bold()
}
fn icon_done() -> console::StyledObject<&'static str> {
    style("✓").cyan().bold()
}

// ─── Stage result ─────────────────────────────────────────────────────────────

/// The outcome of one step of a command.
#[derive(Debug)]
pub struct StageOutcome {
    /// Human-readable label, e.g. `"Archive + encrypt"`.
    pub label: String,
    pub success: bool,
    /// Captured stderr of the failing process, if any.
    pub stderr: String,
    /// One-line error headline.
    pub error: Option<String>,
}

impl StageOutcome {
    fn succeeded(label: &str) -> Self {
        Self {
            label: label.to_string(),
            success: true,
            stderr: String::new(),
            error: None,
        }
    }

    fn failed_with(label: &str, err: &anyhow::Error) -> Self {
        // Pipeline failures carry their stderr separately so it can be
        // replayed line by line instead of inlined into the headline.
        let (headline, stderr) = match err.downcast_ref::<PipelineError>() {
            Some(pe) => {
                tracing::debug!(stage = label, role = ?pe.role(), "pipeline stage failed");
                (pe.headline(), pe.diagnostics().to_owned())
            },
            None => (format!("{err:#}"), String::new()),
        };
        Self {
            label: label.to_string(),
            success: false,
            stderr,
            error: Some(headline),
        }
    }

    /// Print the one-line summary (✓/✗ + label).
    ///
    /// On failure, also prints the error headline and the captured stderr.
    pub fn print(&self) {
        if self.success {
            println!("  {}  {}", icon_ok(), style(&self.label).bold());
            return;
        }

        println!("  {}  {}", icon_err(), style(&self.label).bold());
        if let Some(ref msg) = self.error {
            eprintln!();
            eprintln!("  {} {}", style("Error:").red().bold(), msg);
        }
        if !self.stderr.trim().is_empty() {
            eprintln!();
            eprintln!("  {} stderr:", style("►").dim());
            for line in self.stderr.lines() {
                eprintln!("    {line}");
            }
        }
    }

    pub const fn failed(&self) -> bool {
        !self.success
    }
}

// ─── Spinner ──────────────────────────────────────────────────────────────────

fn make_spinner(label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("  {spinner:.cyan}  {msg}") {
        pb.set_style(spinner_style.tick_chars(SPINNER_CHARS));
    }
    pb.set_message(format!("{}", style(label).dim()));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ─── High-level stage runner ──────────────────────────────────────────────────

/// Run `task` behind a spinner and turn its result into a [`StageOutcome`].
///
/// The spinner is cleared before returning so the terminal always shows a
/// clean, static summary.
pub fn run_stage<F>(label: &str, task: F) -> StageOutcome
where
    F: FnOnce() -> anyhow::Result<()>,
{
    let spinner = make_spinner(label);
    let result = task();
    spinner.finish_and_clear();

    match result {
        Ok(()) => StageOutcome::succeeded(label),
        Err(e) => {
            tracing::debug!(stage = label, error = %format!("{e:#}"), "stage failed");
            StageOutcome::failed_with(label, &e)
        },
    }
}

// ─── Summary banner ───────────────────────────────────────────────────────────

/// Print the final banner after all stages have run.
pub fn print_summary(outcomes: &[StageOutcome]) {
    let failed: Vec<&StageOutcome> = outcomes.iter().filter(|o| o.failed()).collect();
    println!();
    if failed.is_empty() {
        println!(
            "  {} {}",
            icon_done(),
            style("Operation completed successfully.").cyan().bold()
        );
    } else {
        eprintln!("  {}  {}", icon_err(), style("Operation failed.").red().bold());
        for o in &failed {
            eprintln!("    {} {}", icon_err(), style(&o.label).red());
        }
    }
    println!();
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Role;

    fn stage_error() -> anyhow::Error {
        PipelineError::Stage {
            stage: "decrypt".into(),
            role: Role::Producer,
            command: "openssl enc -d".into(),
            status: "exit status: 1".into(),
            diagnostics: "bad decrypt\n".into(),
        }
        .into()
    }

    #[test]
    fn successful_task_is_success() {
        let o = run_stage("Test", || Ok(()));
        assert!(o.success);
        assert!(!o.failed());
        assert_eq!(o.label, "Test");
        assert!(o.error.is_none());
    }

    #[test]
    fn pipeline_failure_splits_headline_and_stderr() {
        let o = run_stage("Decrypt + extract", || Err(stage_error()));
        assert!(o.failed());
        assert_eq!(
            o.error.as_deref(),
            Some("decrypt (producer) `openssl enc -d` failed: exit status: 1")
        );
        assert_eq!(o.stderr, "bad decrypt\n");
    }

    #[test]
    fn other_failures_keep_the_context_chain() {
        let o = run_stage("Check input", || {
            Err(anyhow::anyhow!("not a directory").context("checking /nope"))
        });
        assert!(o.failed());
        assert!(o.stderr.is_empty());
        assert_eq!(o.error.as_deref(), Some("checking /nope: not a directory"));
    }

    #[test]
    fn contextualised_pipeline_error_is_still_recognised() {
        let o = run_stage("Backup", || Err(stage_error().context("while backing up")));
        // `downcast_ref` sees through anyhow context layers.
        assert_eq!(o.stderr, "bad decrypt\n");
    }

    #[test]
    fn printing_and_summary_do_not_panic() {
        let ok = run_stage("Check input", || Ok(()));
        let bad = run_stage("Backup", || Err(stage_error()));
        ok.print();
        bad.print();
        print_summary(&[ok, bad]);
    }
}
