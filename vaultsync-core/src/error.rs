//! Error types for vaultsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is a startup error: the caller must abort before any pass runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An explicitly requested config file does not exist.
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// A required key was not provided by any layer.
    #[error("missing required setting '{key}' (set it in the config file, via {env}, or with --{key})")]
    Missing { key: &'static str, env: &'static str },

    /// A configured root directory does not exist or is not a directory.
    #[error("{role} directory does not exist: {path}")]
    RootMissing { role: &'static str, path: PathBuf },

    /// A key carries a value outside its accepted range.
    #[error("invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },

    /// A duration string could not be parsed.
    #[error("invalid duration '{value}' for '{key}' (expected <n>ms|s|m|h|d)")]
    Duration { key: &'static str, value: String },

    /// `dirs::config_dir()` / `dirs::cache_dir()` returned `None`.
    #[error("cannot determine the user {0} directory; set cache_dir or pass --config")]
    DirNotFound(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
