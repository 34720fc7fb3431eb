//! Source tree provider for `vaultsync`.
//!
//! - [`scan`] enumerates the vault
//! - [`note`] parses notes, assigns UIDs and writes them back
//! - [`assets`] extracts image references from note bodies

pub mod assets;
pub mod error;
pub mod note;
pub mod scan;

pub use assets::{asset_references, is_supported_asset, resolve_reference};
pub use error::SourceError;
pub use note::{
    ensure_uid, EnsuredUid, load_document, modified_time, parse_document, serialize_document,
    write_back,
};
pub use scan::{is_hidden, is_markdown, scan_vault};
