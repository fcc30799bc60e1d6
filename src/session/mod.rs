//! Headless render sessions.
//!
//! A render session is one isolated browser process with one page, scoped to
//! a single export. This module defines the seam between the pipeline and the
//! browser engine:
//!
//! - [`SessionLauncher`] starts a browser process and opens a page
//! - [`RenderSession`] drives that page (navigate, watch activity, print, screenshot)
//! - [`SessionGuard`] guarantees the process is terminated on every exit path
//!
//! # Available Launchers
//!
//! | Launcher | Description |
//! |----------|-------------|
//! | [`ChromeLauncher`] | Real headless Chrome via `headless_chrome` |
//! | [`mock::MockLauncher`] | Scripted sessions for tests (feature-gated) |
//!
//! # Session Lifecycle
//!
//! ```text
//! launch() ──▶ SessionGuard ──▶ navigate / poll / print   ──▶ close()
//!                  │                                            ▲
//!                  └──────────── Drop (error / panic) ──────────┘
//! ```

mod chrome;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use chrome::ChromeLauncher;

use std::time::Duration;

use crate::config::Viewport;
use crate::error::Result;
use crate::request::{Margins, PageFormat};

/// Outcome of navigating to the preview URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationResponse {
    /// HTTP status of the main document, when the engine could observe one.
    ///
    /// `None` for non-HTTP URLs or when the status is not exposed.
    pub status: Option<u16>,
}

impl NavigationResponse {
    /// Whether the status counts as success. An unknown status is accepted.
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|s| (200..300).contains(&s))
    }
}

/// Snapshot of page activity used to detect quiescence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageActivity {
    /// The `load` event has fired (`document.readyState === "complete"`).
    pub loaded: bool,
    /// Number of network requests the page has started so far.
    pub requests_seen: u64,
    /// Requests started but not yet finished or failed.
    pub in_flight: u64,
}

impl PageActivity {
    /// Loaded with no request pending.
    pub fn is_idle(&self) -> bool {
        self.loaded && self.in_flight == 0
    }
}

/// Fixed print parameters handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    /// Paper format.
    pub format: PageFormat,
    /// Page margins.
    pub margins: Margins,
    /// Include CSS backgrounds.
    pub print_background: bool,
    /// Let `@page { size }` override `format`.
    pub prefer_css_page_size: bool,
    /// Rendering scale.
    pub scale: f64,
}

impl PdfOptions {
    /// A4, backgrounds on, CSS page size preferred, scale 1, given margins.
    pub fn a4(margins: Margins) -> Self {
        Self {
            format: PageFormat::A4,
            margins,
            print_background: true,
            prefer_css_page_size: true,
            scale: 1.0,
        }
    }
}

/// One browser page owned by one export run.
///
/// Implementations are driven from a single thread, one call at a time.
pub trait RenderSession {
    /// Navigate to `url` and wait for the `load` event, up to `timeout`.
    ///
    /// # Errors
    ///
    /// - [`ExportError::Timeout`](crate::ExportError::Timeout) if the page
    ///   did not load in time
    /// - [`ExportError::NavigationFailed`](crate::ExportError::NavigationFailed)
    ///   if the navigation could not be performed
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResponse>;

    /// Report current page activity.
    fn activity(&mut self) -> Result<PageActivity>;

    /// Print the current DOM to PDF bytes.
    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>>;

    /// Capture a PNG of the current viewport.
    fn capture_screenshot(&mut self) -> Result<Vec<u8>>;

    /// Terminate the browser process. Must be idempotent.
    fn close(&mut self);

    /// OS process id of the browser, for logging.
    fn process_id(&self) -> Option<u32> {
        None
    }
}

/// Starts render sessions.
///
/// Shared across requests in the server deployment, hence `Send + Sync`.
pub trait SessionLauncher: Send + Sync {
    /// Launch one isolated browser process with the given viewport.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::BrowserLaunch`](crate::ExportError::BrowserLaunch)
    /// or [`ExportError::Configuration`](crate::ExportError::Configuration).
    fn launch(&self, viewport: Viewport, timeout: Duration) -> Result<Box<dyn RenderSession>>;
}

/// RAII owner of a [`RenderSession`].
///
/// [`close`](Self::close) terminates the browser explicitly; if the guard is
/// dropped first (early return, panic), `Drop` does it instead.
pub struct SessionGuard {
    session: Option<Box<dyn RenderSession>>,
}

impl SessionGuard {
    /// Take ownership of a freshly launched session.
    pub fn new(session: Box<dyn RenderSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Terminate the browser now. Further calls are no-ops.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            let pid = session.process_id();
            session.close();
            log::debug!("Browser process {:?} terminated", pid);
        }
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = dyn RenderSession;

    fn deref(&self) -> &Self::Target {
        self.session
            .as_deref()
            .expect("render session used after close")
    }
}

impl std::ops::DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_deref_mut()
            .expect("render session used after close")
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.session.is_some() {
            log::debug!("SessionGuard dropped with an open session, terminating browser");
            self.close();
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session {
            Some(session) => f
                .debug_struct("SessionGuard")
                .field("pid", &session.process_id())
                .finish(),
            None => f
                .debug_struct("SessionGuard")
                .field("state", &"closed")
                .finish(),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
