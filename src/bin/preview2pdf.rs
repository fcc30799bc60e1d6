//! Command-line export.
//!
//! ```bash
//! preview2pdf http://localhost:8000/devis/123/preview devis-123.pdf
//! preview2pdf --margin 0 --timeout-ms 30000 http://localhost:8000/planning/preview
//! ```
//!
//! Exits with `0` when exactly one PDF was written, `1` otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use preview2pdf::{
    ChromeLauncher, ExportConfig, ExportConfigBuilder, ExportError, Margins, Pipeline,
    RenderRequest,
};

#[derive(Debug, Parser)]
#[command(name = "preview2pdf", version, about = "Export an HTML preview page to an A4 PDF")]
struct Cli {
    /// Preview page to render.
    #[arg(value_name = "PREVIEW_URL")]
    preview_url: Option<String>,

    /// Destination file [default: PDF_OUTPUT_PATH or output.pdf].
    #[arg(value_name = "OUTPUT_PATH")]
    output_path: Option<PathBuf>,

    /// Upper bound on navigation plus network quiescence.
    #[arg(long = "timeout-ms", value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Page margins: one value, or four as `top,right,bottom,left` (`20mm`, `0`, `96px`).
    #[arg(long, value_name = "MARGINS")]
    margin: Option<Margins>,

    /// Delay between quiescence and printing.
    #[arg(long = "settle-ms", value_name = "MS")]
    settle_ms: Option<u64>,

    /// Where to write the diagnostic screenshot on render errors.
    #[arg(long, value_name = "PATH")]
    screenshot: Option<PathBuf>,

    /// Browser binary to use instead of auto-detection.
    #[arg(long = "chrome-path", value_name = "PATH")]
    chrome_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match load_config().and_then(|base| apply_overrides(base, &cli)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    // Rejected before any browser is started.
    let request = match RenderRequest::from_args(cli.preview_url, cli.output_path, &config) {
        Ok(request) => request,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    let launcher = Arc::new(ChromeLauncher::detect(config.chrome_path.clone()));
    let pipeline = Pipeline::new(launcher, config);

    let outcome = pipeline.export_to_file(&request);
    if let Some(path) = &outcome.result.output_path {
        log::info!("✅ {}", path.display());
    }
    if let Some(path) = &outcome.result.diagnostic_screenshot_path {
        log::info!("Diagnostic screenshot: {}", path.display());
    }

    ExitCode::from(outcome.result.exit_code())
}

#[cfg(feature = "env-config")]
fn load_config() -> Result<ExportConfig, ExportError> {
    preview2pdf::from_env()
}

#[cfg(not(feature = "env-config"))]
fn load_config() -> Result<ExportConfig, ExportError> {
    Ok(ExportConfig::default())
}

/// Command-line flags win over the environment.
fn apply_overrides(base: ExportConfig, cli: &Cli) -> Result<ExportConfig, ExportError> {
    ExportConfigBuilder::new()
        .timeout(cli.timeout_ms.map(Duration::from_millis).unwrap_or(base.timeout))
        .settle_delay(cli.settle_ms.map(Duration::from_millis).unwrap_or(base.settle_delay))
        .idle_window(base.idle_window)
        .poll_interval(base.poll_interval)
        .viewport(base.viewport)
        .margins(cli.margin.unwrap_or(base.margins))
        .default_output_path(base.default_output_path)
        .diagnostic_screenshot_path(cli.screenshot.clone().unwrap_or(base.diagnostic_screenshot_path))
        .chrome_path(cli.chrome_path.clone().or(base.chrome_path))
        .build()
        .map_err(ExportError::Configuration)
}
