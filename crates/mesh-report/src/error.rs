//! Error types for report persistence.

use std::io;
use std::path::PathBuf;

/// Errors raised while writing or loading a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to access report file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
