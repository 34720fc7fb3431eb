//! Read-only view of the state store for `vaultsync status`.
//!
//! Per-document signal precedence:
//! 1. `SourceMissing` (the note is gone since the last sync)
//! 2. `Modified` (the note's bytes differ from the synced fingerprint)
//! 3. `OutputMissing` (published, but the output file is absent)
//! 4. `Current`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use vaultsync_core::config::Config;
use vaultsync_core::types::{fingerprint, Uid};

use crate::store::StateStore;
use crate::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncSignal {
    Current,
    Modified,
    SourceMissing,
    OutputMissing,
}

impl std::fmt::Display for SyncSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncSignal::Current => "current",
            SyncSignal::Modified => "modified",
            SyncSignal::SourceMissing => "source missing",
            SyncSignal::OutputMissing => "output missing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedDocument {
    pub uid: Uid,
    pub source: PathBuf,
    pub output: PathBuf,
    pub published: bool,
    pub last_synced: DateTime<Utc>,
    pub signal: SyncSignal,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state_file: PathBuf,
    pub origin_tag: String,
    /// No state file exists yet.
    pub never_synced: bool,
    pub documents: Vec<TrackedDocument>,
    pub assets: usize,
}

impl StatusReport {
    pub fn published(&self) -> usize {
        self.documents.iter().filter(|d| d.published).count()
    }

    /// Documents whose signal is anything but `Current`.
    pub fn pending(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.signal != SyncSignal::Current)
            .count()
    }
}

/// Load the store for `config` and classify every tracked document.
pub fn collect(config: &Config) -> Result<StatusReport, SyncError> {
    let state_file = config.state_file()?;
    let origin_tag = config.origin_tag();
    let never_synced = !state_file.exists();
    let store = StateStore::load(&state_file, origin_tag.as_str());

    let documents = store
        .all()
        .map(|(uid, entry)| TrackedDocument {
            uid: uid.clone(),
            source: entry.source_path.clone(),
            output: entry.output_path.clone(),
            published: entry.published,
            last_synced: entry.last_synced,
            signal: signal_for(
                &config.vault.join(&entry.source_path),
                &entry.fingerprint,
                entry.published,
                &config.repo.join(&entry.output_path),
            ),
        })
        .collect();

    Ok(StatusReport {
        state_file,
        origin_tag,
        never_synced,
        documents,
        assets: store.asset_references().len(),
    })
}

fn signal_for(source: &Path, synced_fingerprint: &str, published: bool, output: &Path) -> SyncSignal {
    let Ok(bytes) = std::fs::read(source) else {
        return SyncSignal::SourceMissing;
    };
    if fingerprint(&bytes) != synced_fingerprint {
        return SyncSignal::Modified;
    }
    if published && !output.is_file() {
        return SyncSignal::OutputMissing;
    }
    SyncSignal::Current
}

/// Compact age such as `42s`, `5m`, `3h` or `2d`.
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
