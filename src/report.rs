//! Run outcome and stage reporting.
//!
//! Every export run walks this state machine once, without retries:
//!
//! ```text
//! Idle → Launching → NavigatingPage → AwaitingQuiescence → Rendering → Closing → Succeeded
//!            │              │                 │                │
//!            └──────────────┴─────────────────┴────────────────┴──▶ Closing → Failed(kind)
//! ```
//!
//! [`StageTracker`] logs one line per transition; [`RenderResult`] is what the
//! CLI turns into an exit code and the server into a response.

use std::path::PathBuf;
use std::time::Instant;

use crate::error::{ExportError, FailureKind};

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing started yet.
    Idle,
    /// Spawning the browser process.
    Launching,
    /// Loading the preview URL.
    NavigatingPage,
    /// Waiting for the network to go quiet.
    AwaitingQuiescence,
    /// Printing the DOM to PDF and writing it out.
    Rendering,
    /// Terminating the browser process.
    Closing,
    /// Terminal: one PDF was produced.
    Succeeded,
    /// Terminal: the run failed.
    Failed(FailureKind),
}

impl Stage {
    /// Whether the stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Launching => f.write_str("Launching"),
            Self::NavigatingPage => f.write_str("NavigatingPage"),
            Self::AwaitingQuiescence => f.write_str("AwaitingQuiescence"),
            Self::Rendering => f.write_str("Rendering"),
            Self::Closing => f.write_str("Closing"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Exactly one PDF was produced.
    Success,
    /// Preview server answered with a non-success status.
    NavigationFailed,
    /// Quiescence not reached in time.
    Timeout,
    /// Launch, page interaction or PDF output failed.
    RenderError,
}

impl RenderStatus {
    /// Status for a failure.
    ///
    /// `InvalidRequest` never reaches the pipeline; if it does, it is
    /// reported as a render error.
    pub fn from_error(error: &ExportError) -> Self {
        match error.kind() {
            FailureKind::NavigationFailed => Self::NavigationFailed,
            FailureKind::Timeout => Self::Timeout,
            FailureKind::RenderError | FailureKind::InvalidRequest => Self::RenderError,
        }
    }
}

/// Outcome of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    /// Final status.
    pub status: RenderStatus,
    /// File the PDF was written to (file destination, success only).
    pub output_path: Option<PathBuf>,
    /// Diagnostic screenshot written after a render error, if any.
    pub diagnostic_screenshot_path: Option<PathBuf>,
}

impl RenderResult {
    /// Process exit code: `0` on success, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            RenderStatus::Success => 0,
            _ => 1,
        }
    }

    /// Whether the run succeeded.
    pub fn is_success(&self) -> bool {
        self.status == RenderStatus::Success
    }
}

/// Records stage transitions and logs each one.
#[derive(Debug)]
pub struct StageTracker {
    label: String,
    current: Stage,
    started: Instant,
    entered: Instant,
    history: Vec<Stage>,
}

impl StageTracker {
    /// Start tracking a run; `label` prefixes every log line.
    pub fn new(label: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            current: Stage::Idle,
            started: now,
            entered: now,
            history: vec![Stage::Idle],
        }
    }

    /// Move to `next`, logging the time spent in the previous stage.
    ///
    /// Transitions out of a terminal stage are ignored.
    pub fn enter(&mut self, next: Stage) {
        if self.current.is_terminal() {
            log::warn!("[{}] ignoring transition {} -> {}", self.label, self.current, next);
            return;
        }

        let spent = self.entered.elapsed();
        match next {
            Stage::Failed(kind) => log::error!(
                "[{}] {} -> Failed({}) after {:?}",
                self.label,
                self.current,
                kind,
                self.started.elapsed()
            ),
            Stage::Succeeded => log::info!(
                "[{}] {} -> Succeeded in {:?}",
                self.label,
                self.current,
                self.started.elapsed()
            ),
            _ => log::info!("[{}] {} -> {} ({:?} in {})", self.label, self.current, next, spent, self.current),
        }

        self.current = next;
        self.entered = Instant::now();
        self.history.push(next);
    }

    /// Current stage.
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Every stage entered so far, starting with `Idle`.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
