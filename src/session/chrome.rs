//! Headless Chrome render sessions.
//!
//! [`ChromeLauncher`] starts one Chrome process per export with the
//! [`BrowserStrategy`] resolved at startup. The resulting session owns the
//! `Browser` handle; dropping it terminates the process.
//!
//! Network activity is followed through the DevTools `Network` domain: every
//! `requestWillBeSent` adds a request id, every `loadingFinished` or
//! `loadingFailed` removes it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::Network;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, Tab};

use super::{NavigationResponse, PageActivity, PdfOptions, RenderSession, SessionLauncher};
use crate::browser::BrowserStrategy;
use crate::config::Viewport;
use crate::error::{ExportError, Result};

/// Extra silence tolerated on the DevTools connection beyond the run timeout.
///
/// Also bounds a `Page.navigate` call against a server that never answers.
const IDLE_GRACE: Duration = Duration::from_secs(5);

/// Status of the main document from the Navigation Timing entry.
///
/// `responseStatus` is `0` for non-HTTP documents; `-1` means not exposed.
const NAVIGATION_STATUS_SCRIPT: &str = "(() => { \
    const entry = performance.getEntriesByType('navigation')[0]; \
    return entry && typeof entry.responseStatus === 'number' ? entry.responseStatus : -1; \
})()";

const READY_STATE_SCRIPT: &str = "document.readyState";

/// Launches headless Chrome sessions.
///
/// # Thread Safety
///
/// `Send + Sync`; one launcher is shared by all requests of the server.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    strategy: BrowserStrategy,
}

impl ChromeLauncher {
    /// Create a launcher for an already-resolved strategy.
    pub fn new(strategy: BrowserStrategy) -> Self {
        Self { strategy }
    }

    /// Resolve the strategy from the host and create a launcher.
    pub fn detect(chrome_path: Option<std::path::PathBuf>) -> Self {
        Self::new(BrowserStrategy::detect(chrome_path))
    }

    /// The strategy used for every launch.
    pub fn strategy(&self) -> &BrowserStrategy {
        &self.strategy
    }
}

impl SessionLauncher for ChromeLauncher {
    fn launch(&self, viewport: Viewport, timeout: Duration) -> Result<Box<dyn RenderSession>> {
        let options = self.strategy.launch_options(viewport, timeout + IDLE_GRACE)?;

        log::debug!("Launching Chrome browser...");
        let browser = Browser::new(options).map_err(|e| {
            log::error!("❌ Chrome launch failed: {}", e);
            ExportError::BrowserLaunch(e.to_string())
        })?;

        // On failure `browser` is dropped here, which kills the process.
        let tab = browser.new_tab().map_err(|e| {
            log::error!("❌ Failed to create tab: {}", e);
            ExportError::BrowserLaunch(format!("failed to open page: {}", e))
        })?;

        let network = Arc::new(NetworkTracker::default());
        watch_network(&tab, Arc::clone(&network))?;

        log::debug!("Chrome started (pid {:?})", browser.get_process_id());

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab: Some(tab),
            network,
        }))
    }
}

/// Requests started but not yet finished, keyed by DevTools request id.
#[derive(Debug, Default)]
struct NetworkTracker {
    pending: Mutex<HashSet<String>>,
    started: AtomicU64,
}

impl NetworkTracker {
    fn request_started(&self, request_id: &str) {
        // Redirect hops reuse the id of the original request.
        if self.pending().insert(request_id.to_string()) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request_settled(&self, request_id: &str) {
        self.pending().remove(request_id);
    }

    /// `(requests started, requests in flight)`.
    fn snapshot(&self) -> (u64, u64) {
        let in_flight = self.pending().len() as u64;
        (self.started.load(Ordering::SeqCst), in_flight)
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscribe `tracker` to the tab's network events and enable the domain.
fn watch_network(tab: &Tab, tracker: Arc<NetworkTracker>) -> Result<()> {
    tab.add_event_listener(Arc::new(move |event: &Event| match event {
        Event::NetworkRequestWillBeSent(e) => tracker.request_started(&e.params.request_id),
        Event::NetworkLoadingFinished(e) => tracker.request_settled(&e.params.request_id),
        Event::NetworkLoadingFailed(e) => tracker.request_settled(&e.params.request_id),
        _ => {}
    }))
    .map_err(|e| ExportError::BrowserLaunch(format!("cannot listen to network events: {}", e)))?;

    tab.call_method(Network::Enable {
        max_total_buffer_size: None,
        max_resource_buffer_size: None,
        max_post_data_size: None,
        report_direct_socket_traffic: None,
        enable_durable_messages: None,
    })
    .map_err(|e| {
        log::error!("❌ Failed to enable network tracking: {}", e);
        ExportError::BrowserLaunch(format!("cannot enable network domain: {}", e))
    })?;

    Ok(())
}

/// One Chrome process with one page.
struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
    network: Arc<NetworkTracker>,
}

impl ChromeSession {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| ExportError::Render("render session already closed".to_string()))
    }

    fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let result = self
            .tab()?
            .evaluate(script, false)
            .map_err(|e| ExportError::Render(format!("script evaluation failed: {}", e)))?;
        Ok(result.value)
    }
}

impl RenderSession for ChromeSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResponse> {
        let tab = self.tab()?;
        let start = Instant::now();

        // Blocks until response headers arrive; bounded by the DevTools idle timeout.
        tab.navigate_to(url).map_err(|e| {
            let err = navigation_error(e.to_string(), start.elapsed(), timeout);
            log::error!("❌ Failed to navigate to URL: {}", err);
            err
        })?;

        tab.set_default_timeout(timeout.saturating_sub(start.elapsed()));
        tab.wait_until_navigated().map_err(|e| {
            let err = navigation_error(e.to_string(), start.elapsed(), timeout);
            log::error!("❌ Navigation did not complete: {}", err);
            err
        })?;

        log::debug!("Navigation completed in {:?}", start.elapsed());

        // Unknown status is not a failure: file:// and data: documents have none.
        let status = match self.evaluate(NAVIGATION_STATUS_SCRIPT) {
            Ok(value) => value
                .and_then(|v| v.as_i64())
                .and_then(|s| u16::try_from(s).ok())
                .filter(|s| *s > 0),
            Err(e) => {
                log::warn!("Could not read navigation status: {}", e);
                None
            }
        };

        Ok(NavigationResponse { status })
    }

    fn activity(&mut self) -> Result<PageActivity> {
        let ready_state = self
            .evaluate(READY_STATE_SCRIPT)?
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| ExportError::Render("readyState query returned nothing".to_string()))?;
        let (requests_seen, in_flight) = self.network.snapshot();

        Ok(PageActivity {
            loaded: ready_state == "complete",
            requests_seen,
            in_flight,
        })
    }

    fn print_pdf(&mut self, options: &PdfOptions) -> Result<Vec<u8>> {
        self.tab()?
            .print_to_pdf(Some(to_print_options(options)))
            .map_err(|e| {
                log::error!("❌ Failed to generate PDF: {}", e);
                ExportError::Render(format!("print to PDF failed: {}", e))
            })
    }

    fn capture_screenshot(&mut self) -> Result<Vec<u8>> {
        self.tab()?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| ExportError::Render(format!("screenshot failed: {}", e)))
    }

    fn close(&mut self) {
        if let Some(tab) = self.tab.take() {
            // Best effort: the process is killed right after anyway.
            if let Err(e) = tab.close(true) {
                log::warn!("Failed to close tab (continuing anyway): {}", e);
            }
        }
        if let Some(browser) = self.browser.take() {
            log::trace!("Terminating Chrome process {:?}", browser.get_process_id());
            drop(browser);
        }
    }

    fn process_id(&self) -> Option<u32> {
        self.browser.as_ref().and_then(|b| b.get_process_id())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map print parameters to Chrome's `Page.printToPDF` options (inches).
fn to_print_options(options: &PdfOptions) -> PrintToPdfOptions {
    let (paper_width, paper_height) = options.format.size_inches();
    PrintToPdfOptions {
        landscape: Some(false),
        display_header_footer: Some(false),
        print_background: Some(options.print_background),
        scale: Some(options.scale),
        paper_width: Some(paper_width),
        paper_height: Some(paper_height),
        margin_top: Some(options.margins.top.to_inches()),
        margin_right: Some(options.margins.right.to_inches()),
        margin_bottom: Some(options.margins.bottom.to_inches()),
        margin_left: Some(options.margins.left.to_inches()),
        prefer_css_page_size: Some(options.prefer_css_page_size),
        ..Default::default()
    }
}

/// A navigation error raised once the budget is spent is a timeout, whatever
/// the engine reported.
fn navigation_error(message: String, elapsed: Duration, timeout: Duration) -> ExportError {
    if elapsed >= timeout {
        ExportError::timeout("navigation", elapsed)
    } else {
        ExportError::NavigationFailed {
            status: None,
            message,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Length, Margins};

    #[test]
    fn test_print_options_a4_fixed_parameters() {
        let options = to_print_options(&PdfOptions::a4(Margins::zero()));
        assert_eq!(options.print_background, Some(true));
        assert_eq!(options.prefer_css_page_size, Some(true));
        assert_eq!(options.scale, Some(1.0));
        assert_eq!(options.display_header_footer, Some(false));
        assert!((options.paper_width.unwrap() - 8.27).abs() < 0.01);
        assert!((options.paper_height.unwrap() - 11.69).abs() < 0.01);
    }

    #[test]
    fn test_print_options_zero_margins() {
        let options = to_print_options(&PdfOptions::a4(Margins::zero()));
        assert_eq!(options.margin_top, Some(0.0));
        assert_eq!(options.margin_right, Some(0.0));
        assert_eq!(options.margin_bottom, Some(0.0));
        assert_eq!(options.margin_left, Some(0.0));
    }

    #[test]
    fn test_print_options_converts_margins_to_inches() {
        let margins = Margins {
            top: Length::mm(25.4),
            right: Length::px(96.0),
            bottom: Length::mm(0.0),
            left: Length::px(48.0),
        };
        let options = to_print_options(&PdfOptions::a4(margins));
        assert!((options.margin_top.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(options.margin_right, Some(1.0));
        assert_eq!(options.margin_bottom, Some(0.0));
        assert_eq!(options.margin_left, Some(0.5));
    }

    #[test]
    fn test_tracker_counts_pending_requests() {
        let tracker = NetworkTracker::default();
        tracker.request_started("1");
        tracker.request_started("2");
        assert_eq!(tracker.snapshot(), (2, 2));

        tracker.request_settled("1");
        assert_eq!(tracker.snapshot(), (2, 1));

        tracker.request_settled("2");
        assert_eq!(tracker.snapshot(), (2, 0));
    }

    #[test]
    fn test_tracker_redirect_is_one_request() {
        let tracker = NetworkTracker::default();
        tracker.request_started("7");
        tracker.request_started("7");
        assert_eq!(tracker.snapshot(), (1, 1));

        tracker.request_settled("7");
        assert_eq!(tracker.snapshot(), (1, 0));
    }

    #[test]
    fn test_tracker_ignores_unknown_settle() {
        let tracker = NetworkTracker::default();
        tracker.request_started("1");
        tracker.request_settled("unknown");
        assert_eq!(tracker.snapshot(), (1, 1));
    }

    #[test]
    fn test_navigation_error_before_budget_is_navigation_failure() {
        let err = navigation_error(
            "net::ERR_CONNECTION_REFUSED".to_string(),
            Duration::from_millis(40),
            Duration::from_secs(60),
        );
        assert!(matches!(
            err,
            ExportError::NavigationFailed { status: None, .. }
        ));
    }

    /// A server that accepts the connection and never answers only fails
    /// once the DevTools call gives up, past the budget.
    #[test]
    fn test_navigation_error_after_budget_is_timeout() {
        let err = navigation_error(
            "Timeout while waiting for response".to_string(),
            Duration::from_secs(60) + IDLE_GRACE,
            Duration::from_secs(60),
        );
        assert!(matches!(err, ExportError::Timeout { .. }));
        assert_eq!(err.status_code(), 504);
    }

    #[test]
    fn test_navigation_error_at_exact_budget_is_timeout() {
        let err = navigation_error(String::new(), Duration::from_secs(2), Duration::from_secs(2));
        assert!(matches!(err, ExportError::Timeout { .. }));
    }

    #[test]
    fn test_launcher_keeps_strategy() {
        let launcher = ChromeLauncher::new(BrowserStrategy::Bundled);
        assert_eq!(launcher.strategy(), &BrowserStrategy::Bundled);
    }
}
