//! HTTP deployment.
//!
//! Exposes the pipeline behind an axum router:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/export-pdf?agent=<id>&week=<int>&year=<int>` | Planning page as an A4 PDF attachment |
//! | GET | `/health` | Liveness check |
//!
//! Each export launches its own browser. At most
//! [`ServerConfig::max_concurrent_renders`] run at once; further requests
//! wait for a slot.
//!
//! # Errors
//!
//! Failures answer with a JSON body:
//!
//! ```json
//! { "error": "Navigation failed (HTTP 500): ...", "code": "NAVIGATION_FAILED" }
//! ```
//!
//! | Status | Kind |
//! |--------|------|
//! | 400 | `InvalidRequest` |
//! | 502 | `NavigationFailed` |
//! | 504 | `Timeout` |
//! | 500 | `RenderError` |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use preview2pdf::{ChromeLauncher, ExportConfig, Pipeline};
//! use preview2pdf::config::ServerConfig;
//! use preview2pdf::server::{self, AppState};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ExportConfig::default();
//!     let launcher = Arc::new(ChromeLauncher::detect(config.chrome_path.clone()));
//!     let state = AppState::new(Pipeline::new(launcher, config), ServerConfig::default());
//!     server::serve(state).await
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::Semaphore;

use crate::config::ServerConfig;
use crate::error::{ExportError, Result};
use crate::pipeline::Pipeline;
use crate::request::PlanningExport;

/// Slack on top of the render timeout before the handler gives up on the
/// blocking task. Covers browser launch and PDF printing.
const RENDER_GRACE: Duration = Duration::from_secs(30);

/// Shared state of the router.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    server: Arc<ServerConfig>,
    render_slots: Arc<Semaphore>,
}

impl AppState {
    /// Create the state. A `max_concurrent_renders` of zero is treated as one.
    pub fn new(pipeline: Pipeline, server: ServerConfig) -> Self {
        let slots = server.max_concurrent_renders.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            server: Arc::new(server),
            render_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Server settings.
    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    /// Render slots currently free.
    pub fn available_slots(&self) -> usize {
        self.render_slots.available_permits()
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Stable code, see [`ExportError::error_code`].
    pub code: String,
}

impl From<&ExportError> for ErrorResponse {
    fn from(err: &ExportError) -> Self {
        Self {
            error: err.to_string(),
            code: err.error_code().to_string(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the endpoint answers.
    pub status: String,
    /// Service name.
    pub service: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
            service: "preview2pdf".to_string(),
        }
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/export-pdf", get(export_pdf))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind [`ServerConfig::bind_addr`] and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.server.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn export_pdf(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    let export = PlanningExport::from_query(&query).inspect_err(|e| {
        log::warn!("Rejected export request: {}", e);
    })?;
    let request = export.to_render_request(&state.server, state.pipeline.config())?;
    let filename = export.filename();

    log::info!(
        "Planning export requested: agent={} week={} year={}",
        export.agent,
        export.week,
        export.year
    );

    let permit = Arc::clone(&state.render_slots)
        .acquire_owned()
        .await
        .map_err(|_| ExportError::Render("render slots closed".to_string()))?;

    // The permit moves into the blocking task so the slot stays taken until the
    // browser is really gone, even if this handler stops waiting.
    let pipeline = Arc::clone(&state.pipeline);
    let deadline = request.timeout() + RENDER_GRACE;
    let result = tokio::time::timeout(
        deadline,
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.render_to_bytes(&request)
        }),
    )
    .await;

    let document = match result {
        Ok(Ok(outcome)) => outcome.into_document()?,
        Ok(Err(join_err)) => {
            log::error!("Render task failed: {}", join_err);
            return Err(ExportError::Render(join_err.to_string()));
        }
        Err(_elapsed) => {
            log::error!("Render did not finish within {:?}", deadline);
            return Err(ExportError::timeout("render", deadline));
        }
    };

    log::info!("Sending {} ({} bytes)", filename, document.data.len());
    Ok(pdf_response(&filename, document.data))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

fn pdf_response(filename: &str, data: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, finishing in-flight exports...");
}

// ============================================================================
// Unit Tests
// ============================================================================
