//! Error types for the PDF export pipeline.
//!
//! Every failure an export run can hit is represented by [`ExportError`].
//! Errors are grouped into four operator-facing kinds ([`FailureKind`]):
//!
//! | Kind | Raised when | HTTP | Exit |
//! |------|-------------|------|------|
//! | `InvalidRequest` | Required input missing or malformed (no browser launched) | 400 | 1 |
//! | `NavigationFailed` | Preview server answered with a non-success status | 502 | 1 |
//! | `Timeout` | Page did not become quiescent within `timeoutMs` | 504 | 1 |
//! | `RenderError` | Anything else during launch, page interaction or PDF output | 500 | 1 |
//!
//! All kinds are terminal for the current run; nothing is retried internally.
//!
//! # Example
//!
//! ```rust
//! use preview2pdf::{ExportError, FailureKind};
//!
//! let error = ExportError::NavigationFailed {
//!     status: Some(500),
//!     message: "preview answered 500".to_string(),
//! };
//! assert_eq!(error.kind(), FailureKind::NavigationFailed);
//! assert_eq!(error.status_code(), 502);
//! assert_eq!(error.exit_code(), 1);
//! ```

use std::time::Duration;

/// Operator-facing classification of an export failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing or malformed input; detected before any external call.
    InvalidRequest,
    /// The preview URL answered with a non-success HTTP status.
    NavigationFailed,
    /// Quiescence was not reached within the configured timeout.
    Timeout,
    /// Any failure while launching, driving the page or producing the PDF.
    RenderError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::NavigationFailed => "NavigationFailed",
            Self::Timeout => "Timeout",
            Self::RenderError => "RenderError",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while resolving a request or running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Required input is missing or malformed.
    ///
    /// Raised by the resolver before any browser is launched.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The preview server did not answer with a success status, or the
    /// navigation itself could not be performed.
    ///
    /// `status` carries the observed HTTP status code when one was received.
    #[error("Navigation failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    NavigationFailed {
        /// HTTP status returned by the preview server, if any.
        status: Option<u16>,
        /// Human-readable detail.
        message: String,
    },

    /// The page did not reach the waited-for condition in time.
    #[error("Timed out after {}ms waiting for {waiting_for}", .elapsed.as_millis())]
    Timeout {
        /// What the pipeline was waiting for (`navigation`, `quiescence`, ...).
        waiting_for: String,
        /// How long the pipeline waited before giving up.
        elapsed: Duration,
    },

    /// Page interaction or PDF generation failed.
    #[error("Render error: {0}")]
    Render(String),

    /// The browser process could not be started.
    ///
    /// Classified as [`FailureKind::RenderError`].
    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    /// Invalid configuration (bad launch options, bad config values).
    ///
    /// Classified as [`FailureKind::RenderError`].
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExportError {
    /// Returns the operator-facing failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::NavigationFailed { .. } => FailureKind::NavigationFailed,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Render(_) | Self::BrowserLaunch(_) | Self::Configuration(_) => {
                FailureKind::RenderError
            }
        }
    }

    /// Returns the HTTP status used when the error is surfaced by the server.
    ///
    /// ```rust
    /// use preview2pdf::ExportError;
    ///
    /// assert_eq!(ExportError::InvalidRequest("week".into()).status_code(), 400);
    /// assert_eq!(ExportError::Render("boom".into()).status_code(), 500);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            FailureKind::InvalidRequest => 400,
            FailureKind::NavigationFailed => 502,
            FailureKind::Timeout => 504,
            FailureKind::RenderError => 500,
        }
    }

    /// Returns a stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NavigationFailed { .. } => "NAVIGATION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Render(_) => "RENDER_ERROR",
            Self::BrowserLaunch(_) => "BROWSER_LAUNCH_FAILED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Process exit code for the CLI. Every failure maps to `1`.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Shorthand for a [`ExportError::Timeout`].
    pub(crate) fn timeout(waiting_for: &str, elapsed: Duration) -> Self {
        Self::Timeout {
            waiting_for: waiting_for.to_string(),
            elapsed,
        }
    }
}

/// Result type alias using [`ExportError`].
pub type Result<T> = std::result::Result<T, ExportError>;

// ============================================================================
// Unit Tests
// ============================================================================
