//! Output formatting and progress indicators
//!
//! This module provides the spinners, download bars and status prefixes used
//! by the commands, and the observer that reports a run as it happens.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};

use crate::core::orchestrator::{PackageReport, RunObserver, SkipReason};
use crate::core::recipe::Phase;
use crate::core::routine::{PhaseObserver, PhaseOutcome, PhaseReport};
use crate::core::summary::FailureLine;
use crate::error::ChainbuildError;
use crate::infra::download::ProgressCallback;

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// Process-wide output settings
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress everything except errors
    pub quiet: bool,
    /// Number of `-v` flags
    pub verbose: u8,
}

impl OutputConfig {
    /// Create from the global CLI flags
    pub fn new(quiet: bool, verbose: u8) -> Self {
        Self { quiet, verbose }
    }

    /// Make these settings visible to every command
    pub fn apply_global(self) {
        QUIET.store(self.quiet, Ordering::Relaxed);
        VERBOSITY.store(self.verbose, Ordering::Relaxed);
    }

    /// Settings applied by [`Self::apply_global`]
    pub fn current() -> Self {
        Self {
            quiet: QUIET.load(Ordering::Relaxed),
            verbose: VERBOSITY.load(Ordering::Relaxed),
        }
    }
}

/// Whether progress output is suppressed
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    eprintln!("{} {error}", status::ERROR);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

fn template(style: ProgressStyle, template: &str) -> ProgressStyle {
    match style.clone().template(template) {
        Ok(styled) => styled,
        Err(e) => {
            tracing::debug!("Invalid progress template: {e}");
            style
        }
    }
}

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    if is_quiet() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(template(
        ProgressStyle::default_spinner().tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        "{spinner:.blue} {msg}",
    ));
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Create a progress bar for downloads
pub fn create_download_bar(total: u64) -> ProgressBar {
    if is_quiet() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        template(
            ProgressStyle::default_bar(),
            "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
        .progress_chars("█▓▒░"),
    );
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Print a status line unless quiet
pub fn say(prefix: &str, message: &str) {
    if !is_quiet() {
        println!("{prefix} {message}");
    }
}

/// Print the end-of-run failure summary
pub fn print_failure_summary(lines: &[FailureLine]) {
    if lines.is_empty() {
        say(status::SUCCESS, "No test failures reported");
        return;
    }

    println!("{} Test failures reported in {} log line(s):", status::WARNING, lines.len());
    for line in lines {
        println!("  {}:{}: {}", line.log.display(), line.line_no, line.text);
    }
}

/// Reports a run on the terminal
#[derive(Debug, Default)]
pub struct TerminalObserver {
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalObserver {
    /// Create an observer
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_spinner(&self) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(pb) = spinner.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn set_spinner(&self, pb: ProgressBar) {
        if let Ok(mut spinner) = self.spinner.lock() {
            if let Some(old) = spinner.replace(pb) {
                old.finish_and_clear();
            }
        }
    }
}

impl PhaseObserver for TerminalObserver {
    fn phase_started(&self, name: &str, phase: Phase) {
        self.set_spinner(create_spinner(&format!("{name}: {phase}")));
    }

    fn phase_finished(&self, name: &str, report: &PhaseReport) {
        self.finish_spinner();
        match report.outcome {
            PhaseOutcome::Succeeded => {
                say(status::SUCCESS, &format!("{name} {} ({})", report.phase, report.timing));
            }
            PhaseOutcome::SoftFailed { exit_code } => {
                let code = exit_code.map_or_else(|| "no exit code".to_string(), |c| format!("exit {c}"));
                say(
                    status::WARNING,
                    &format!(
                        "{name} {} failed, {code} ({}), see {}",
                        report.phase,
                        report.timing,
                        report.log.display()
                    ),
                );
            }
        }
    }
}

impl RunObserver for TerminalObserver {
    fn package_started(&self, label: &str) {
        self.set_spinner(create_spinner(&format!("Resolving {label}")));
    }

    fn download_progress(&self, _label: &str) -> Option<ProgressCallback> {
        if is_quiet() {
            return None;
        }
        let bar = create_download_bar(0);
        Some(Box::new(move |done, total| {
            if total > 0 && bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(done);
            if total > 0 && done >= total {
                bar.finish_and_clear();
            }
        }))
    }

    fn package_skipped(&self, name: &str, reason: SkipReason) {
        self.finish_spinner();
        match reason {
            SkipReason::AlreadyBuilt => say(status::INFO, &format!("{name} already built")),
            SkipReason::FetchOnly => say(status::INFO, &format!("{name} fetched")),
        }
    }

    fn package_failed(&self, label: &str, error: &ChainbuildError) {
        self.finish_spinner();
        eprintln!("{} {label}: {error}", status::ERROR);
    }

    fn package_completed(&self, report: &PackageReport) {
        self.finish_spinner();
        let entry = &report.record.entry;
        say(
            status::SUCCESS,
            &format!("{} recorded as {} ({} files)", entry.name, entry.key, entry.files_changed),
        );
    }
}
