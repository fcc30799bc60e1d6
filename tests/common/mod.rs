//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use preview2pdf::session::mock::{MockBehavior, MockLauncher};
use preview2pdf::{ExportConfig, ExportConfigBuilder, Pipeline};

/// Fresh, empty directory under the system temp dir.
pub fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("preview2pdf-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Short timings so failure paths finish quickly.
pub fn fast_config(dir: &Path) -> ExportConfig {
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

/// Pipeline over a mock launcher; the launcher is returned for assertions.
pub fn mock_pipeline(behavior: MockBehavior, config: ExportConfig) -> (Pipeline, MockLauncher) {
    let launcher = MockLauncher::new(behavior);
    let pipeline = Pipeline::new(Arc::new(launcher.clone()), config);
    (pipeline, launcher)
}
