//! Error types for vaultsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use vaultsync_core::ConfigError;
use vaultsync_renderer::RenderError;
use vaultsync_source::SourceError;

/// All errors that can arise from sync operations.
///
/// Inside a pass these are caught at the document boundary and recorded in
/// the pass report; only structural errors escape a pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An error reading or writing a source note.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration could not be resolved (state file location).
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (state store).
    #[error("state store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The vault root vanished after startup validation.
    #[error("vault root is missing or not a directory: {path}")]
    SourceRootMissing { path: PathBuf },

    /// The output repository root vanished after startup validation.
    #[error("output root is missing or not a directory: {path}")]
    OutputRootMissing { path: PathBuf },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
