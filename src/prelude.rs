//! Convenient imports for common usage patterns.
//!
//! ```rust,ignore
//! use preview2pdf::prelude::*;
//! ```
//!
//! This imports the pipeline, its request and result types, the Chrome
//! launcher and the error type. Server types stay under [`crate::server`].

pub use crate::browser::BrowserStrategy;
pub use crate::config::{ExportConfig, ExportConfigBuilder, ServerConfig};
pub use crate::error::{ExportError, FailureKind, Result};
pub use crate::pipeline::{Destination, ExportOutcome, Pipeline};
pub use crate::report::{RenderResult, RenderStatus};
pub use crate::request::{Margins, RenderRequest};
pub use crate::session::{ChromeLauncher, SessionLauncher};

#[cfg(feature = "env-config")]
pub use crate::config::env::from_env;
