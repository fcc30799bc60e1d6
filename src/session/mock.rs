//! Scripted render sessions for testing.
//!
//! [`MockLauncher`] produces sessions whose behavior is fixed up front,
//! so the pipeline and the HTTP endpoint can be exercised without Chrome.
//! It counts launched and closed sessions, which lets tests assert that no
//! browser process outlives its export.
//!
//! # Feature Flag
//!
//! This module is only available when:
//! - The `test-utils` feature is enabled, OR
//! - During testing (`#[cfg(test)]`)
//!
//! # Example
//!
//! ```rust,ignore
//! use preview2pdf::session::mock::{MockBehavior, MockLauncher};
//!
//! let launcher = MockLauncher::new(MockBehavior::NavigationStatus(500));
//! // ... run the pipeline ...
//! assert_eq!(launcher.live_sessions(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{NavigationResponse, PageActivity, PdfOptions, RenderSession, SessionLauncher};
use crate::config::Viewport;
use crate::error::{ExportError, Result};

/// Minimal well-formed PDF returned by successful mock renders.
pub const MOCK_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 1 0 R >>\n%%EOF\n";

/// What a mock session does.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Navigation succeeds, the page goes quiet, printing returns `pdf`.
    Succeed {
        /// Bytes returned by `print_pdf`.
        pdf: Vec<u8>,
    },
    /// Navigation answers with the given HTTP status.
    NavigationStatus(u16),
    /// Navigation never completes; fails with a timeout.
    NavigationTimeout,
    /// The page keeps issuing requests forever.
    NeverQuiescent,
    /// The page loads, then one request stays pending forever.
    RequestPending,
    /// Printing fails with the given message.
    PrintFails(String),
    /// The browser process cannot be started.
    LaunchFails(String),
}

impl MockBehavior {
    /// Successful render returning [`MOCK_PDF`].
    pub fn succeed() -> Self {
        Self::Succeed {
            pdf: MOCK_PDF.to_vec(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    launched: AtomicUsize,
    closed: AtomicUsize,
    screenshots: AtomicUsize,
}

/// Launcher producing scripted [`RenderSession`]s.
#[derive(Debug, Clone)]
pub struct MockLauncher {
    behavior: MockBehavior,
    screenshot_fails: bool,
    counters: Arc<Counters>,
}

impl MockLauncher {
    /// Create a launcher whose sessions follow `behavior`.
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            screenshot_fails: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Make diagnostic screenshots fail as well.
    pub fn with_failing_screenshots(mut self) -> Self {
        self.screenshot_fails = true;
        self
    }

    /// Number of sessions launched so far.
    pub fn launched_count(&self) -> usize {
        self.counters.launched.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far.
    pub fn closed_count(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Sessions launched but not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.launched_count() - self.closed_count()
    }

    /// Number of screenshot attempts.
    pub fn screenshot_attempts(&self) -> usize {
        self.counters.screenshots.load(Ordering::SeqCst)
    }
}

impl SessionLauncher for MockLauncher {
    fn launch(&self, _viewport: Viewport, _timeout: Duration) -> Result<Box<dyn RenderSession>> {
        if let MockBehavior::LaunchFails(message) = &self.behavior {
            return Err(ExportError::BrowserLaunch(message.clone()));
        }

        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            behavior: self.behavior.clone(),
            screenshot_fails: self.screenshot_fails,
            counters: Arc::clone(&self.counters),
            requests: 0,
            open: true,
        }))
    }
}

struct MockSession {
    behavior: MockBehavior,
    screenshot_fails: bool,
    counters: Arc<Counters>,
    requests: u64,
    open: bool,
}

impl RenderSession for MockSession {
    fn navigate(&mut self, _url: &str, timeout: Duration) -> Result<NavigationResponse> {
        match &self.behavior {
            MockBehavior::NavigationStatus(status) => Ok(NavigationResponse {
                status: Some(*status),
            }),
            MockBehavior::NavigationTimeout => Err(ExportError::timeout("navigation", timeout)),
            _ => Ok(NavigationResponse { status: Some(200) }),
        }
    }

    fn activity(&mut self) -> Result<PageActivity> {
        let (requests_seen, in_flight) = match self.behavior {
            MockBehavior::NeverQuiescent => {
                self.requests += 1;
                (self.requests, 0)
            }
            MockBehavior::RequestPending => (4, 1),
            _ => (3, 0),
        };
        Ok(PageActivity {
            loaded: true,
            requests_seen,
            in_flight,
        })
    }

    fn print_pdf(&mut self, _options: &PdfOptions) -> Result<Vec<u8>> {
        match &self.behavior {
            MockBehavior::Succeed { pdf } => Ok(pdf.clone()),
            MockBehavior::PrintFails(message) => Err(ExportError::Render(message.clone())),
            _ => Ok(MOCK_PDF.to_vec()),
        }
    }

    fn capture_screenshot(&mut self) -> Result<Vec<u8>> {
        self.counters.screenshots.fetch_add(1, Ordering::SeqCst);
        if self.screenshot_fails {
            return Err(ExportError::Render("screenshot unavailable".to_string()));
        }
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn process_id(&self) -> Option<u32> {
        self.open.then_some(4242)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::A4_VIEWPORT;

    #[test]
    fn test_launch_failure_does_not_count() {
        let launcher = MockLauncher::new(MockBehavior::LaunchFails("no chrome".into()));
        assert!(launcher.launch(A4_VIEWPORT, Duration::from_secs(1)).is_err());
        assert_eq!(launcher.launched_count(), 0);
    }

    #[test]
    fn test_dropping_session_counts_as_closed() {
        let launcher = MockLauncher::new(MockBehavior::succeed());
        let session = launcher.launch(A4_VIEWPORT, Duration::from_secs(1)).unwrap();
        assert_eq!(launcher.live_sessions(), 1);
        drop(session);
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[test]
    fn test_never_quiescent_keeps_growing() {
        let launcher = MockLauncher::new(MockBehavior::NeverQuiescent);
        let mut session = launcher.launch(A4_VIEWPORT, Duration::from_secs(1)).unwrap();
        let first = session.activity().unwrap().requests_seen;
        let second = session.activity().unwrap().requests_seen;
        assert!(second > first);
    }

    #[test]
    fn test_request_pending_never_goes_idle() {
        let launcher = MockLauncher::new(MockBehavior::RequestPending);
        let mut session = launcher.launch(A4_VIEWPORT, Duration::from_secs(1)).unwrap();
        let first = session.activity().unwrap();
        let second = session.activity().unwrap();
        assert_eq!(first, second);
        assert!(!second.is_idle());
    }
}
