//! Configuration for the export pipeline and its HTTP deployment.
//!
//! This module provides [`ExportConfig`] and [`ExportConfigBuilder`] for the
//! per-run timing and output parameters, and [`ServerConfig`] for the HTTP
//! endpoint.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use preview2pdf::ExportConfigBuilder;
//!
//! let config = ExportConfigBuilder::new()
//!     .timeout(Duration::from_secs(30))
//!     .settle_delay(Duration::from_millis(250))
//!     .build()
//!     .expect("Invalid configuration");
//!
//! assert_eq!(config.timeout.as_secs(), 30);
//! ```
//!
//! # Environment Configuration
//!
//! When the `env-config` feature is enabled, configuration can be loaded
//! from environment variables and an optional `app.env` file. See
//! [`mod@env`] for the variable names.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::request::{Length, Margins};

/// Viewport of an A4 page at 96 DPI.
pub const A4_VIEWPORT: Viewport = Viewport {
    width: 794,
    height: 1123,
};

/// Browser window size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Timing and output parameters shared by every export run.
///
/// # Fields Overview
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `timeout` | 60s | Budget for navigation plus quiescence |
/// | `settle_delay` | 500ms | Pause after quiescence before printing |
/// | `idle_window` | 500ms | Network must stay idle this long |
/// | `poll_interval` | 100ms | Quiescence poll frequency |
/// | `viewport` | 794×1123 | A4 at 96 DPI |
/// | `margins` | 20mm | CLI page margins |
/// | `default_output_path` | `output.pdf` | CLI output when none given |
/// | `diagnostic_screenshot_path` | `render-error.png` | Screenshot on render errors |
/// | `chrome_path` | `None` | Force a specific browser binary |
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Upper bound on navigation plus quiescence.
    pub timeout: Duration,

    /// Extra wait after quiescence so late style/layout work can land.
    ///
    /// Zero disables the delay.
    pub settle_delay: Duration,

    /// How long the page must show no new network activity to be quiescent.
    pub idle_window: Duration,

    /// Interval between quiescence polls.
    pub poll_interval: Duration,

    /// Browser window size.
    pub viewport: Viewport,

    /// Margins used by the CLI.
    pub margins: Margins,

    /// Output file when the CLI gets no `outputPath`.
    pub default_output_path: PathBuf,

    /// Where a best-effort screenshot is written when rendering fails.
    pub diagnostic_screenshot_path: PathBuf,

    /// Explicit browser binary. Takes precedence over auto-detection.
    pub chrome_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(60_000),
            settle_delay: Duration::from_millis(500),
            idle_window: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            viewport: A4_VIEWPORT,
            margins: Margins::uniform(Length::mm(20.0)),
            default_output_path: PathBuf::from("output.pdf"),
            diagnostic_screenshot_path: PathBuf::from("render-error.png"),
            chrome_path: None,
        }
    }
}

/// Builder for [`ExportConfig`] with validation.
///
/// # Validation Rules
///
/// - `timeout` must be greater than zero
/// - `poll_interval` must be greater than zero
/// - `idle_window` must be shorter than `timeout`
/// - `viewport` dimensions must be non-zero
#[derive(Debug, Clone, Default)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    /// Create a builder initialised with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the navigation plus quiescence budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the post-quiescence settle delay.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the network idle window.
    pub fn idle_window(mut self, window: Duration) -> Self {
        self.config.idle_window = window;
        self
    }

    /// Set the quiescence poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the browser viewport.
    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.config.viewport = viewport;
        self
    }

    /// Set the CLI margins.
    pub fn margins(mut self, margins: Margins) -> Self {
        self.config.margins = margins;
        self
    }

    /// Set the default CLI output file.
    pub fn default_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.default_output_path = path.into();
        self
    }

    /// Set the diagnostic screenshot location.
    pub fn diagnostic_screenshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.diagnostic_screenshot_path = path.into();
        self
    }

    /// Force a browser binary.
    pub fn chrome_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.chrome_path = path;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated rule.
    pub fn build(self) -> std::result::Result<ExportConfig, String> {
        let config = self.config;

        if config.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if config.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if config.idle_window >= config.timeout {
            return Err(format!(
                "idle_window ({:?}) must be shorter than timeout ({:?})",
                config.idle_window, config.timeout
            ));
        }

        if config.viewport.width == 0 || config.viewport.height == 0 {
            return Err("viewport dimensions must be greater than 0".to_string());
        }

        Ok(config)
    }
}

/// Settings of the HTTP deployment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,

    /// Base of the internal preview pages, e.g. `http://localhost:8000`.
    pub preview_base_url: String,

    /// Margins of the planning export.
    pub margins: Margins,

    /// Maximum renders (and therefore browser processes) running at once.
    ///
    /// Further requests wait for a free slot.
    pub max_concurrent_renders: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            preview_base_url: "http://localhost:8000".to_string(),
            margins: Margins::zero(),
            max_concurrent_renders: 4,
        }
    }
}

/// Environment-based configuration loading.
///
/// Values are read from the process environment after loading an optional
/// `app.env` file. Unset or unparsable variables fall back to the defaults.
///
/// # Environment Variables
///
/// | Variable | Field |
/// |----------|-------|
/// | `PDF_TIMEOUT_MS` | [`ExportConfig::timeout`] |
/// | `PDF_SETTLE_DELAY_MS` | [`ExportConfig::settle_delay`] |
/// | `PDF_IDLE_WINDOW_MS` | [`ExportConfig::idle_window`] |
/// | `PDF_MARGIN` | [`ExportConfig::margins`] |
/// | `PDF_OUTPUT_PATH` | [`ExportConfig::default_output_path`] |
/// | `PDF_SCREENSHOT_PATH` | [`ExportConfig::diagnostic_screenshot_path`] |
/// | `CHROME_PATH` | [`ExportConfig::chrome_path`] |
/// | `SERVER_ADDR` | [`ServerConfig::bind_addr`] |
/// | `PREVIEW_BASE_URL` | [`ServerConfig::preview_base_url`] |
/// | `SERVER_MARGIN` | [`ServerConfig::margins`] |
/// | `MAX_CONCURRENT_RENDERS` | [`ServerConfig::max_concurrent_renders`] |
#[cfg(feature = "env-config")]
pub mod env {
    use super::*;
    use crate::error::ExportError;

    /// Default environment file name.
    pub const ENV_FILE_NAME: &str = "app.env";

    /// Load environment variables from `app.env`.
    pub fn load_env_file() -> Result<std::path::PathBuf, dotenvy::Error> {
        dotenvy::from_filename(ENV_FILE_NAME)
    }

    /// Load [`ExportConfig`] from the environment (and `app.env` if present).
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] if the resulting values fail
    /// validation.
    pub fn from_env() -> Result<ExportConfig, ExportError> {
        match load_env_file() {
            Ok(path) => log::info!("Loaded configuration from: {:?}", path),
            Err(e) => log::debug!(
                "No {} file found or failed to load: {} (using environment variables and defaults)",
                ENV_FILE_NAME,
                e
            ),
        }
        export_config_from(|key| std::env::var(key).ok())
    }

    /// Load [`ServerConfig`] from the environment.
    ///
    /// Call [`from_env`] or [`load_env_file`] first so `app.env` is applied.
    pub fn server_from_env() -> Result<ServerConfig, ExportError> {
        server_config_from(|key| std::env::var(key).ok())
    }

    /// Build an [`ExportConfig`] from an arbitrary variable lookup.
    pub fn export_config_from<F>(lookup: F) -> Result<ExportConfig, ExportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ExportConfig::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let timeout = millis("PDF_TIMEOUT_MS", defaults.timeout);
        let settle_delay = millis("PDF_SETTLE_DELAY_MS", defaults.settle_delay);
        let idle_window = millis("PDF_IDLE_WINDOW_MS", defaults.idle_window);

        let margins = match lookup("PDF_MARGIN") {
            Some(raw) => raw
                .parse::<Margins>()
                .map_err(|e| ExportError::Configuration(format!("PDF_MARGIN: {}", e)))?,
            None => defaults.margins,
        };

        let output = lookup("PDF_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.default_output_path);
        let screenshot = lookup("PDF_SCREENSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.diagnostic_screenshot_path);
        let chrome_path = lookup("CHROME_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        log::info!("Loading export configuration from environment:");
        log::info!("   - Timeout: {}ms", timeout.as_millis());
        log::info!("   - Settle delay: {}ms", settle_delay.as_millis());
        log::info!("   - Idle window: {}ms", idle_window.as_millis());
        log::info!("   - Default output: {}", output.display());

        ExportConfigBuilder::new()
            .timeout(timeout)
            .settle_delay(settle_delay)
            .idle_window(idle_window)
            .margins(margins)
            .default_output_path(output)
            .diagnostic_screenshot_path(screenshot)
            .chrome_path(chrome_path)
            .build()
            .map_err(ExportError::Configuration)
    }

    /// Build a [`ServerConfig`] from an arbitrary variable lookup.
    pub fn server_config_from<F>(lookup: F) -> Result<ServerConfig, ExportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();

        let bind_addr = match lookup("SERVER_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ExportError::Configuration(format!("SERVER_ADDR '{}': {}", raw, e))
            })?,
            None => defaults.bind_addr,
        };

        let margins = match lookup("SERVER_MARGIN") {
            Some(raw) => raw
                .parse::<Margins>()
                .map_err(|e| ExportError::Configuration(format!("SERVER_MARGIN: {}", e)))?,
            None => defaults.margins,
        };

        let max_concurrent_renders = lookup("MAX_CONCURRENT_RENDERS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_concurrent_renders);
        if max_concurrent_renders == 0 {
            return Err(ExportError::Configuration(
                "MAX_CONCURRENT_RENDERS must be greater than 0".to_string(),
            ));
        }

        let preview_base_url = lookup("PREVIEW_BASE_URL").unwrap_or(defaults.preview_base_url);
        url::Url::parse(&preview_base_url).map_err(|e| {
            ExportError::Configuration(format!("PREVIEW_BASE_URL '{}': {}", preview_base_url, e))
        })?;

        log::info!("   - Listen address: {}", bind_addr);
        log::info!("   - Preview base URL: {}", preview_base_url);
        log::info!("   - Max concurrent renders: {}", max_concurrent_renders);

        Ok(ServerConfig {
            bind_addr,
            preview_base_url,
            margins,
            max_concurrent_renders,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
