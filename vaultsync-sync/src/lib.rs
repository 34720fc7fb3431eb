//! # vaultsync-sync
//!
//! State store, target writers and reconciliation.
//!
//! Call [`pipeline::run`] for a one-shot full pass, or drive an
//! [`Orchestrator`] directly for incremental passes (the daemon does).

pub mod assets;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod status;
pub mod store;
pub mod writer;

pub use assets::{AssetTracker, Sweep};
pub use error::SyncError;
pub use reconcile::{embedded_uid, Orchestrator};
pub use report::{DocumentError, Operation, PassReport};
pub use store::{StateEntry, StateStore};
pub use writer::{DeleteResult, DryRunWriter, FsWriter, PendingChange, TargetWriter, WriteResult};
