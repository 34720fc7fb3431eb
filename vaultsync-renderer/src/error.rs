//! Error types for vaultsync-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while rendering one output file.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// JSON serialization error (quoting metadata values).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Only documents with an assigned identity can be rendered.
    #[error("{path} has no noteUid")]
    MissingUid { path: PathBuf },
}
