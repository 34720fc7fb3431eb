//! vaultsync core library: domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: identities, front matter, source documents, change events
//! - [`config`]: layered configuration (file → environment → flags)
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ConfigFile, LinkFormat, LogLevel, UnpublishedLink};
pub use error::ConfigError;
pub use types::{
    AssetRef, ChangeEvent, ChangeOp, CrossReference, FrontMatter, SourceDocument, Uid,
};
