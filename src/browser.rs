//! Browser binary selection and Chrome launch options.
//!
//! The binary is chosen once at startup and carried as a [`BrowserStrategy`]
//! value; nothing downstream branches on the host environment.
//!
//! | Strategy | When | Sandbox |
//! |----------|------|---------|
//! | [`BrowserStrategy::System`] | Explicit path, or a Chromium/Chrome binary installed on a Linux host | disabled |
//! | [`BrowserStrategy::Bundled`] | Everything else; `headless_chrome` locates or fetches its own Chromium | enabled |
//!
//! # Example
//!
//! ```rust,ignore
//! use preview2pdf::BrowserStrategy;
//!
//! let strategy = BrowserStrategy::detect(None);
//! let options = strategy.launch_options(preview2pdf::config::A4_VIEWPORT, std::time::Duration::from_secs(90))?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use headless_chrome::LaunchOptions;

use crate::config::Viewport;
use crate::error::{ExportError, Result};

/// System browser locations checked on Linux hosts, in order.
pub const SYSTEM_BROWSER_CANDIDATES: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
];

/// Which browser binary a render session launches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserStrategy {
    /// A browser installed on the host (containerized deployment).
    ///
    /// Launched without the sandbox.
    System {
        /// Absolute path of the binary.
        path: PathBuf,
    },
    /// The browser `headless_chrome` finds or downloads itself.
    Bundled,
}

impl BrowserStrategy {
    /// Resolve the strategy for the current host.
    ///
    /// An explicit `chrome_path` always wins. Otherwise, on Linux, the first
    /// existing entry of [`SYSTEM_BROWSER_CANDIDATES`] is used; on any other
    /// host (or when none exists) the bundled browser is used.
    pub fn detect(chrome_path: Option<PathBuf>) -> Self {
        let strategy = Self::detect_with(chrome_path, cfg!(target_os = "linux"), |p| p.is_file());
        match &strategy {
            Self::System { path } => log::info!("Using system browser: {}", path.display()),
            Self::Bundled => log::info!("Using bundled browser"),
        }
        strategy
    }

    /// Same as [`detect`](Self::detect) with the host facts injected.
    pub fn detect_with<F>(chrome_path: Option<PathBuf>, is_linux: bool, exists: F) -> Self
    where
        F: Fn(&Path) -> bool,
    {
        if let Some(path) = chrome_path {
            return Self::System { path };
        }

        if is_linux {
            if let Some(found) = SYSTEM_BROWSER_CANDIDATES
                .iter()
                .map(Path::new)
                .find(|candidate| exists(candidate))
            {
                return Self::System {
                    path: found.to_path_buf(),
                };
            }
        }

        Self::Bundled
    }

    /// Whether the Chrome sandbox is enabled for this strategy.
    pub fn sandbox(&self) -> bool {
        matches!(self, Self::Bundled)
    }

    /// Build Chrome launch options for one render session.
    ///
    /// `idle_timeout` bounds how long the DevTools connection may stay silent
    /// before `headless_chrome` gives up on the process.
    ///
    /// # Chrome Flags Applied
    ///
    /// - `--disable-dev-shm-usage` - Use /tmp instead of /dev/shm (container-friendly)
    /// - `--disable-gpu` - No GPU in headless containers
    /// - `--disable-extensions`, `--disable-sync`, `--disable-default-apps`
    /// - `--hide-scrollbars` - Keep scrollbars out of screenshots
    /// - `--font-render-hinting=none` - Stable glyph metrics across hosts
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] if the options builder rejects
    /// the values.
    pub fn launch_options(
        &self,
        viewport: Viewport,
        idle_timeout: Duration,
    ) -> Result<LaunchOptions<'static>> {
        let mut builder = LaunchOptions::default_builder();

        if let Self::System { path } = self {
            builder.path(Some(path.clone()));
            log::trace!("Chrome path set to: {}", path.display());
        } else {
            log::trace!("Chrome path: bundled");
        }

        builder
            .headless(true)
            .sandbox(self.sandbox())
            .window_size(Some((viewport.width, viewport.height)))
            .idle_browser_timeout(idle_timeout)
            .args(vec![
                "--disable-dev-shm-usage".as_ref(),
                "--disable-gpu".as_ref(),
                "--disable-extensions".as_ref(),
                "--disable-sync".as_ref(),
                "--disable-default-apps".as_ref(),
                "--hide-scrollbars".as_ref(),
                "--font-render-hinting=none".as_ref(),
            ])
            .build()
            .map_err(|e| {
                log::error!("❌ Failed to build Chrome launch options ({:?}): {}", self, e);
                ExportError::Configuration(e.to_string())
            })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
