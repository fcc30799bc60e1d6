//! # preview2pdf
//!
//! Export server-rendered HTML previews (quotes, plannings, monthly reports)
//! to A4 PDF files through a single-shot headless Chrome session.
//!
//! Every export launches its own browser process, loads the preview URL,
//! waits until the page has stopped issuing network requests, prints the DOM
//! and terminates the browser. Nothing is pooled and nothing is retried.
//!
//! ## Features
//!
//! - **Fresh isolation**: one browser per export, terminated on every exit path
//! - **Quiescence wait**: prints only once the page's network has gone quiet
//! - **Typed failures**: `InvalidRequest`, `NavigationFailed`, `Timeout`, `RenderError`
//! - **Diagnostics**: best-effort screenshot when rendering fails
//! - **Two deployments**: a CLI (`preview2pdf`) and an axum service (`preview2pdf-server`)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────────┐
//! │  preview2pdf (CLI)       │      │  preview2pdf-server (axum)   │
//! │  url + output path       │      │  GET /export-pdf?agent&week… │
//! └────────────┬─────────────┘      └───────────────┬──────────────┘
//!              │         RenderRequest              │
//!              └──────────────────┬─────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Pipeline                               │
//! │  launch ─▶ navigate ─▶ await quiescence ─▶ print ─▶ close        │
//! └────────────────────────────────┬─────────────────────────────────┘
//!                                  │ SessionLauncher / RenderSession
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │        Headless Chrome (managed by headless_chrome crate)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use preview2pdf::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = ExportConfig::default();
//!     let launcher = Arc::new(ChromeLauncher::detect(config.chrome_path.clone()));
//!     let pipeline = Pipeline::new(launcher, config.clone());
//!
//!     let request = RenderRequest::from_args(
//!         Some("http://localhost:8000/devis/123/preview".to_string()),
//!         Some("devis-123.pdf".into()),
//!         &config,
//!     )?;
//!
//!     let outcome = pipeline.export_to_file(&request);
//!     println!("{:?}", outcome.result.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `env-config` | Load configuration from `app.env` and the environment (default) |
//! | `server` | axum HTTP deployment and the `preview2pdf-server` binary (default) |
//! | `test-utils` | [`session::mock`] launcher for tests without Chrome |
//!
//! ## Environment Configuration
//!
//! With `env-config`, see [`config::env`] for the recognized variables.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod browser;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod report;
pub mod request;
pub mod session;

#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

pub use browser::BrowserStrategy;
pub use config::{ExportConfig, ExportConfigBuilder, ServerConfig};
pub use error::{ExportError, FailureKind, Result};
pub use pipeline::{Destination, ExportOutcome, PdfDocument, Pipeline};
pub use report::{RenderResult, RenderStatus, Stage};
pub use request::{Length, Margins, PageFormat, PlanningExport, RenderRequest};
pub use session::{ChromeLauncher, RenderSession, SessionGuard, SessionLauncher};

#[cfg(feature = "env-config")]
pub use config::env::{from_env, server_from_env};
