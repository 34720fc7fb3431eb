use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading or writing a single source document.
///
/// All variants are per-document: a pass records them and moves on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Front-matter block is not valid YAML.
    #[error("malformed front matter in {path}: {source}")]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Front-matter block parsed, but is not a mapping.
    #[error("front matter in {path} must be a key/value mapping")]
    FrontMatterShape { path: PathBuf },

    #[error("{path} is not valid UTF-8")]
    Utf8 { path: PathBuf },

    #[error("failed to serialize front matter for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
