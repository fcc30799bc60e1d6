//! The single-shot export pipeline.
//!
//! One call to [`Pipeline::run`] launches one browser, loads one preview URL,
//! waits for the page to go quiet, prints it to an A4 PDF and terminates the
//! browser. Stages never overlap and nothing is retried.
//!
//! ```text
//! ┌───────────┐   ┌────────────────┐   ┌────────────────────┐   ┌───────────┐   ┌─────────┐
//! │ Launching │──▶│ NavigatingPage │──▶│ AwaitingQuiescence │──▶│ Rendering │──▶│ Closing │
//! └───────────┘   └────────────────┘   └────────────────────┘   └───────────┘   └─────────┘
//!                                                                     │ RenderError
//!                                                                     ▼
//!                                                        best-effort diagnostic screenshot
//! ```
//!
//! The browser is owned by a [`SessionGuard`], so it is terminated on every
//! exit path, including panics.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use preview2pdf::{ChromeLauncher, ExportConfig, Pipeline, RenderRequest};
//!
//! let config = ExportConfig::default();
//! let launcher = Arc::new(ChromeLauncher::detect(config.chrome_path.clone()));
//! let pipeline = Pipeline::new(launcher, config.clone());
//!
//! let request = RenderRequest::from_args(Some("http://host/devis/123/preview".into()), None, &config)?;
//! let outcome = pipeline.export_to_file(&request);
//! std::process::exit(outcome.result.exit_code() as i32);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ExportConfig;
use crate::error::{ExportError, FailureKind, Result};
use crate::report::{RenderResult, RenderStatus, Stage, StageTracker};
use crate::request::RenderRequest;
use crate::session::{PdfOptions, RenderSession, SessionGuard, SessionLauncher};

/// Where the emitted PDF goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Write to this file (CLI).
    File(PathBuf),
    /// Keep the bytes in memory (HTTP response body).
    Memory,
}

/// A successfully emitted PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    /// Raw PDF bytes.
    pub data: Vec<u8>,
    /// File the bytes were written to, for [`Destination::File`].
    pub path: Option<PathBuf>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct ExportOutcome {
    /// Summary for the exit code / HTTP status.
    pub result: RenderResult,
    /// The PDF, or the error that ended the run.
    pub document: Result<PdfDocument>,
    /// Stages entered, from `Idle` to the terminal stage.
    pub stages: Vec<Stage>,
}

impl ExportOutcome {
    /// Consume the outcome, keeping only the PDF or the error.
    pub fn into_document(self) -> Result<PdfDocument> {
        self.document
    }
}

/// Runs export invocations against a [`SessionLauncher`].
///
/// Cheap to share: the server wraps one in an `Arc` and every request calls
/// [`run`](Self::run) on its own blocking thread.
pub struct Pipeline {
    launcher: Arc<dyn SessionLauncher>,
    config: ExportConfig,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(launcher: Arc<dyn SessionLauncher>, config: ExportConfig) -> Self {
        Self { launcher, config }
    }

    /// The configuration every run uses.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run and write the PDF to the request's output path.
    pub fn export_to_file(&self, request: &RenderRequest) -> ExportOutcome {
        self.run(request, Destination::File(request.output_path().to_path_buf()))
    }

    /// Run and keep the PDF in memory.
    pub fn render_to_bytes(&self, request: &RenderRequest) -> ExportOutcome {
        self.run(request, Destination::Memory)
    }

    /// Run the full pipeline once.
    ///
    /// Never panics on engine failures; the outcome carries the error.
    pub fn run(&self, request: &RenderRequest, destination: Destination) -> ExportOutcome {
        let mut tracker = StageTracker::new(truncate_url(request.preview_url(), 80));

        tracker.enter(Stage::Launching);
        let mut session = match self.launcher.launch(self.config.viewport, request.timeout()) {
            Ok(session) => SessionGuard::new(session),
            Err(e) => return finish(tracker, Err(e), None),
        };
        log::debug!("Render session opened: {:?}", session);

        let rendered = self.drive(&mut session, &mut tracker, request, &destination);

        let mut screenshot = None;
        if let Err(e) = &rendered {
            if e.kind() == FailureKind::RenderError {
                screenshot = self.capture_diagnostic(&mut session);
            }
        }

        tracker.enter(Stage::Closing);
        session.close();

        finish(tracker, rendered, screenshot)
    }

    fn drive(
        &self,
        session: &mut SessionGuard,
        tracker: &mut StageTracker,
        request: &RenderRequest,
        destination: &Destination,
    ) -> Result<PdfDocument> {
        tracker.enter(Stage::NavigatingPage);
        let started = Instant::now();
        let response = session.navigate(request.preview_url(), request.timeout())?;

        if !response.is_success() {
            let status = response.status;
            log::error!(
                "❌ Preview {} answered HTTP {}",
                truncate_url(request.preview_url(), 100),
                status.map(|s| s.to_string()).unwrap_or_default()
            );
            return Err(ExportError::NavigationFailed {
                status,
                message: format!("{} answered with a non-success status", request.preview_url()),
            });
        }
        log::debug!("Preview responded with status {:?}", response.status);

        tracker.enter(Stage::AwaitingQuiescence);
        wait_for_quiescence(
            &mut **session,
            self.config.idle_window,
            self.config.poll_interval,
            started,
            request.timeout(),
        )?;

        tracker.enter(Stage::Rendering);
        if !self.config.settle_delay.is_zero() {
            log::trace!("Settling for {:?} before printing", self.config.settle_delay);
            std::thread::sleep(self.config.settle_delay);
        }

        let pdf_start = Instant::now();
        let data = session.print_pdf(&PdfOptions::a4(request.margins()))?;
        if data.is_empty() {
            return Err(ExportError::Render("engine returned an empty PDF".to_string()));
        }
        log::debug!("PDF generated in {:?} ({} bytes)", pdf_start.elapsed(), data.len());

        let path = match destination {
            Destination::File(path) => {
                write_pdf(path, &data)?;
                log::info!("PDF written to {}", path.display());
                Some(path.clone())
            }
            Destination::Memory => None,
        };

        Ok(PdfDocument { data, path })
    }

    /// Best-effort screenshot of the failing page.
    ///
    /// Failures are logged and swallowed so the original error survives.
    fn capture_diagnostic(&self, session: &mut SessionGuard) -> Option<PathBuf> {
        if !session.is_open() {
            return None;
        }

        let path = &self.config.diagnostic_screenshot_path;
        let saved = session.capture_screenshot().and_then(|png| {
            std::fs::write(path, png).map_err(|e| {
                ExportError::Render(format!("cannot write {}: {}", path.display(), e))
            })
        });

        match saved {
            Ok(()) => {
                log::info!("Diagnostic screenshot saved to {}", path.display());
                Some(path.clone())
            }
            Err(e) => {
                log::warn!("Diagnostic screenshot failed (ignored): {}", e);
                None
            }
        }
    }
}

fn finish(
    mut tracker: StageTracker,
    document: Result<PdfDocument>,
    diagnostic_screenshot_path: Option<PathBuf>,
) -> ExportOutcome {
    let result = match &document {
        Ok(doc) => {
            tracker.enter(Stage::Succeeded);
            RenderResult {
                status: RenderStatus::Success,
                output_path: doc.path.clone(),
                diagnostic_screenshot_path: None,
            }
        }
        Err(e) => {
            log::error!("❌ Export failed: {}", e);
            tracker.enter(Stage::Failed(e.kind()));
            RenderResult {
                status: RenderStatus::from_error(e),
                output_path: None,
                diagnostic_screenshot_path,
            }
        }
    };

    ExportOutcome {
        result,
        document,
        stages: tracker.history().to_vec(),
    }
}

/// Poll page activity until the page is loaded, has no request in flight and
/// has started no new request for `idle_window`.
///
/// `started` is when navigation began; the whole wait shares its `timeout`.
pub(crate) fn wait_for_quiescence(
    session: &mut dyn RenderSession,
    idle_window: Duration,
    poll_interval: Duration,
    started: Instant,
    timeout: Duration,
) -> Result<()> {
    let deadline = started + timeout;
    let mut last = None;
    let mut quiet_since = Instant::now();

    loop {
        let activity = session.activity()?;
        let now = Instant::now();

        if !activity.is_idle() || last != Some(activity) {
            last = Some(activity);
            quiet_since = now;
        } else if now.duration_since(quiet_since) >= idle_window {
            log::debug!(
                "Page quiescent after {:?} ({} requests)",
                started.elapsed(),
                activity.requests_seen
            );
            return Ok(());
        }

        if now >= deadline {
            log::error!(
                "❌ Page still busy after {:?} (loaded: {}, {} requests in flight)",
                started.elapsed(),
                activity.loaded,
                activity.in_flight
            );
            return Err(ExportError::timeout("quiescence", started.elapsed()));
        }

        std::thread::sleep(poll_interval.min(deadline.saturating_duration_since(now)));
    }
}

/// Write through a `.part` sibling and rename, so `path` only ever holds a
/// complete PDF.
fn write_pdf(path: &Path, data: &[u8]) -> Result<()> {
    let partial = partial_path(path);

    let written = std::fs::write(&partial, data).and_then(|_| std::fs::rename(&partial, path));
    written.map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        log::error!("❌ Failed to write {}: {}", path.display(), e);
        ExportError::Render(format!("cannot write {}: {}", path.display(), e))
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "output.pdf".into());
    name.push(".part");
    path.with_file_name(name)
}

/// Truncate a URL for logging purposes.
fn truncate_url(url: &str, max_len: usize) -> String {
    if url.chars().count() <= max_len {
        url.to_string()
    } else {
        format!("{}...", url.chars().take(max_len).collect::<String>())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfigBuilder;
    use crate::request::Margins;
    use crate::session::mock::{MOCK_PDF, MockBehavior, MockLauncher};
    use crate::session::{NavigationResponse, PageActivity};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("preview2pdf-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &Path) -> ExportConfig {
        ExportConfigBuilder::new()
            .timeout(Duration::from_millis(300))
            .idle_window(Duration::from_millis(20))
            .poll_interval(Duration::from_millis(5))
            .settle_delay(Duration::ZERO)
            .default_output_path(dir.join("output.pdf"))
            .diagnostic_screenshot_path(dir.join("render-error.png"))
            .build()
            .unwrap()
    }

    fn pipeline(launcher: &MockLauncher, config: ExportConfig) -> Pipeline {
        Pipeline::new(Arc::new(launcher.clone()), config)
    }

    fn request(config: &ExportConfig, url: &str) -> RenderRequest {
        RenderRequest::from_args(Some(url.to_string()), None, config).unwrap()
    }

    // -------------------------------------------------------------------------
    // Success path
    // -------------------------------------------------------------------------

    #[test]
    fn test_success_writes_default_output_and_closes_browser() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::succeed());

        let outcome = pipeline(&launcher, config.clone())
            .export_to_file(&request(&config, "http://host/devis/123/preview"));

        assert_eq!(outcome.result.status, RenderStatus::Success);
        assert_eq!(outcome.result.exit_code(), 0);
        assert_eq!(outcome.result.output_path, Some(dir.join("output.pdf")));

        let written = std::fs::read(dir.join("output.pdf")).unwrap();
        assert!(written.starts_with(b"%PDF"));
        assert!(!dir.join("output.pdf.part").exists());

        assert_eq!(launcher.launched_count(), 1);
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[test]
    fn test_success_walks_every_stage_in_order() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::succeed());

        let outcome = pipeline(&launcher, config.clone())
            .render_to_bytes(&request(&config, "http://host/planning"));

        assert_eq!(
            outcome.stages,
            vec![
                Stage::Idle,
                Stage::Launching,
                Stage::NavigatingPage,
                Stage::AwaitingQuiescence,
                Stage::Rendering,
                Stage::Closing,
                Stage::Succeeded,
            ]
        );
    }

    #[test]
    fn test_memory_destination_writes_nothing() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::succeed());

        let outcome = pipeline(&launcher, config.clone())
            .render_to_bytes(&request(&config, "http://host/planning"));

        let document = outcome.into_document().unwrap();
        assert_eq!(document.data, MOCK_PDF);
        assert!(document.path.is_none());
        assert!(!dir.join("output.pdf").exists());
    }

    // -------------------------------------------------------------------------
    // Failure paths
    // -------------------------------------------------------------------------

    #[test]
    fn test_http_500_fails_navigation_without_writing() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::NavigationStatus(500));

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/down"));

        assert_eq!(outcome.result.status, RenderStatus::NavigationFailed);
        assert_eq!(outcome.result.exit_code(), 1);
        assert!(matches!(
            outcome.document,
            Err(ExportError::NavigationFailed {
                status: Some(500),
                ..
            })
        ));
        assert!(!dir.join("output.pdf").exists());
        assert_eq!(launcher.live_sessions(), 0);
        assert_eq!(launcher.screenshot_attempts(), 0);
    }

    #[test]
    fn test_never_quiescent_page_times_out() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::NeverQuiescent);

        let started = Instant::now();
        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/busy"));

        assert_eq!(outcome.result.status, RenderStatus::Timeout);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!dir.join("output.pdf").exists());
        assert_eq!(launcher.live_sessions(), 0);
        assert_eq!(
            outcome.stages.last(),
            Some(&Stage::Failed(FailureKind::Timeout))
        );
    }

    #[test]
    fn test_navigation_timeout() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::NavigationTimeout);

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/slow"));

        assert_eq!(outcome.result.status, RenderStatus::Timeout);
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[test]
    fn test_render_error_captures_screenshot() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::PrintFails("printing crashed".into()));

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/x"));

        assert_eq!(outcome.result.status, RenderStatus::RenderError);
        assert_eq!(
            outcome.result.diagnostic_screenshot_path,
            Some(dir.join("render-error.png"))
        );
        assert!(dir.join("render-error.png").exists());
        assert!(!dir.join("output.pdf").exists());
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[test]
    fn test_failing_screenshot_does_not_mask_render_error() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher =
            MockLauncher::new(MockBehavior::PrintFails("printing crashed".into())).with_failing_screenshots();

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/x"));

        assert_eq!(outcome.result.status, RenderStatus::RenderError);
        assert!(outcome.result.diagnostic_screenshot_path.is_none());
        assert_eq!(launcher.screenshot_attempts(), 1);
        match outcome.document {
            Err(ExportError::Render(message)) => assert_eq!(message, "printing crashed"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(launcher.live_sessions(), 0);
    }

    #[test]
    fn test_empty_pdf_is_a_render_error() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::Succeed { pdf: Vec::new() });

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/x"));

        assert_eq!(outcome.result.status, RenderStatus::RenderError);
        assert!(!dir.join("output.pdf").exists());
    }

    #[test]
    fn test_launch_failure() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::LaunchFails("chrome not found".into()));

        let outcome =
            pipeline(&launcher, config.clone()).export_to_file(&request(&config, "http://host/x"));

        assert_eq!(outcome.result.status, RenderStatus::RenderError);
        assert_eq!(launcher.launched_count(), 0);
        assert_eq!(
            outcome.stages,
            vec![
                Stage::Idle,
                Stage::Launching,
                Stage::Failed(FailureKind::RenderError)
            ]
        );
    }

    #[test]
    fn test_unwritable_output_fails_and_still_closes() {
        let dir = temp_dir();
        let config = test_config(&dir);
        let launcher = MockLauncher::new(MockBehavior::succeed());
        let request = RenderRequest::new(
            "http://host/x",
            dir.join("missing-dir").join("out.pdf"),
            Margins::zero(),
            config.timeout,
        )
        .unwrap();

        let outcome = pipeline(&launcher, config).export_to_file(&request);

        assert_eq!(outcome.result.status, RenderStatus::RenderError);
        assert_eq!(launcher.live_sessions(), 0);
    }

    // -------------------------------------------------------------------------
    // Quiescence
    // -------------------------------------------------------------------------

    /// Replays a fixed sequence of activity snapshots, repeating the last one.
    struct ScriptedActivity {
        script: Vec<PageActivity>,
        polls: usize,
    }

    impl RenderSession for ScriptedActivity {
        fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<NavigationResponse> {
            Ok(NavigationResponse { status: Some(200) })
        }

        fn activity(&mut self) -> Result<PageActivity> {
            let index = self.polls.min(self.script.len() - 1);
            self.polls += 1;
            Ok(self.script[index])
        }

        fn print_pdf(&mut self, _options: &PdfOptions) -> Result<Vec<u8>> {
            Ok(MOCK_PDF.to_vec())
        }

        fn capture_screenshot(&mut self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        fn close(&mut self) {}
    }

    fn snapshot(loaded: bool, requests_seen: u64, in_flight: u64) -> PageActivity {
        PageActivity {
            loaded,
            requests_seen,
            in_flight,
        }
    }

    #[test]
    fn test_quiescence_waits_for_load_event() {
        let mut session = ScriptedActivity {
            script: vec![
                snapshot(false, 2, 0),
                snapshot(false, 2, 0),
                snapshot(false, 2, 0),
                snapshot(true, 2, 0),
            ],
            polls: 0,
        };

        wait_for_quiescence(
            &mut session,
            Duration::from_millis(10),
            Duration::from_millis(5),
            Instant::now(),
            Duration::from_secs(2),
        )
        .unwrap();

        // Three unloaded polls, one to see the load, then idle polls.
        assert!(session.polls >= 5);
    }

    #[test]
    fn test_quiescence_restarts_window_on_new_requests() {
        let mut session = ScriptedActivity {
            script: vec![snapshot(true, 1, 0), snapshot(true, 2, 0), snapshot(true, 3, 0)],
            polls: 0,
        };

        wait_for_quiescence(
            &mut session,
            Duration::from_millis(10),
            Duration::from_millis(2),
            Instant::now(),
            Duration::from_secs(2),
        )
        .unwrap();

        assert!(session.polls >= 4);
    }

    #[test]
    fn test_quiescence_timeout_error() {
        let mut session = ScriptedActivity {
            script: vec![snapshot(false, 0, 0)],
            polls: 0,
        };

        let result = wait_for_quiescence(
            &mut session,
            Duration::from_millis(5),
            Duration::from_millis(5),
            Instant::now(),
            Duration::from_millis(50),
        );

        assert!(matches!(result, Err(ExportError::Timeout { .. })));
    }

    /// A request issued after `load` that never completes keeps the page busy
    /// even though nothing else changes.
    #[test]
    fn test_pending_request_blocks_quiescence() {
        let mut session = ScriptedActivity {
            script: vec![snapshot(true, 4, 1)],
            polls: 0,
        };

        let started = Instant::now();
        let result = wait_for_quiescence(
            &mut session,
            Duration::from_millis(20),
            Duration::from_millis(5),
            started,
            Duration::from_millis(200),
        );

        assert!(matches!(result, Err(ExportError::Timeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_quiescence_waits_for_pending_request_to_finish() {
        let mut session = ScriptedActivity {
            script: vec![
                snapshot(true, 4, 1),
                snapshot(true, 4, 1),
                snapshot(true, 4, 1),
                snapshot(true, 4, 0),
            ],
            polls: 0,
        };

        wait_for_quiescence(
            &mut session,
            Duration::from_millis(10),
            Duration::from_millis(5),
            Instant::now(),
            Duration::from_secs(2),
        )
        .unwrap();

        // Three busy polls, one to see the request settle, then idle polls.
        assert!(session.polls >= 5);
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out.pdf")),
            PathBuf::from("/tmp/out.pdf.part")
        );
        assert_eq!(partial_path(Path::new("out.pdf")), PathBuf::from("out.pdf.part"));
    }

    #[test]
    fn test_truncate_url_short() {
        let url = "https://example.com";
        assert_eq!(truncate_url(url, 50), url);
    }

    #[test]
    fn test_truncate_url_long() {
        let url = "https://example.com/very/long/path/that/exceeds/the/maximum/length";
        let truncated = truncate_url(url, 30);
        assert_eq!(truncated.len(), 33);
        assert!(truncated.ends_with("..."));
    }
}
