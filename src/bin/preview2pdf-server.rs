//! HTTP export service.
//!
//! ```bash
//! SERVER_ADDR=0.0.0.0:3000 PREVIEW_BASE_URL=http://app:8000 preview2pdf-server
//! curl -OJ 'http://localhost:3000/export-pdf?agent=7&week=12&year=2024'
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use preview2pdf::server::{self, AppState};
use preview2pdf::{ChromeLauncher, Pipeline};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting preview2pdf-server...");

    let config = match preview2pdf::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let server_config = match preview2pdf::server_from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("   - Preview base URL: {}", server_config.preview_base_url);
    log::info!("   - Max concurrent renders: {}", server_config.max_concurrent_renders);

    // Resolved once; every request reuses the same strategy.
    let launcher = Arc::new(ChromeLauncher::detect(config.chrome_path.clone()));
    let state = AppState::new(Pipeline::new(launcher, config), server_config);

    match server::serve(state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("❌ Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}
