//! `vaultsync watch`: filesystem watcher, settle check and the dispatch loop
//! that feeds change events to the orchestrator.

mod error;
mod runtime;
pub mod settle;
pub mod watcher;

pub use error::DaemonError;
pub use runtime::{
    dispatch, init_tracing, run, run_until, start_blocking, LoopSummary, LoopTiming,
};
