//! Asset reference tracker.
//!
//! Images referenced by published notes are copied to
//! `<content_dir>/<vault-relative path>` and counted per referencing uid in
//! the [`StateStore`]. An asset whose count reaches zero is not deleted at
//! once: its output mtime is refreshed, and [`AssetTracker::sweep`] only
//! removes unreferenced assets whose mtime is older than the grace period.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use vaultsync_core::types::{is_asset_path, Uid};
use vaultsync_renderer::Layout;

use crate::error::SyncError;
use crate::store::StateStore;
use crate::writer::{DeleteResult, TargetWriter, WriteResult};

#[derive(Debug, Clone)]
pub struct AssetTracker {
    vault: PathBuf,
    layout: Layout,
    grace_period: Duration,
}

impl AssetTracker {
    pub fn new(vault: impl Into<PathBuf>, layout: Layout, grace_period: Duration) -> Self {
        Self {
            vault: vault.into(),
            layout,
            grace_period,
        }
    }

    /// Copy `asset` (vault-relative key) to its output location and register
    /// `uid` as a user.
    ///
    /// The copy happens first; a failed copy leaves the reference map as it
    /// was.
    pub fn record_usage<W: TargetWriter>(
        &self,
        writer: &mut W,
        store: &mut StateStore,
        asset: &str,
        uid: &Uid,
    ) -> Result<WriteResult, SyncError> {
        let source = self.vault.join(asset);
        let result = writer.copy_file(&source, &self.layout.asset_output(asset))?;
        if store.add_asset_reference(asset, uid) {
            tracing::debug!("{asset} now referenced by {uid}");
        }
        Ok(result)
    }

    /// Drop `uid` as a user of `asset`.
    ///
    /// When that was the last reference the output file's mtime is refreshed
    /// so the grace period starts now. Returns true in that case.
    pub fn release<W: TargetWriter>(
        &self,
        writer: &mut W,
        store: &mut StateStore,
        asset: &str,
        uid: &Uid,
    ) -> Result<bool, SyncError> {
        if !store.remove_asset_reference(asset, uid) {
            return Ok(false);
        }
        writer.touch(&self.layout.asset_output(asset))?;
        tracing::info!("{asset} has no remaining references; grace period started");
        Ok(true)
    }

    /// Delete unreferenced assets in the output tree whose mtime is older
    /// than the grace period.
    ///
    /// Only an unreadable content tree fails the sweep; a failure on one
    /// asset is recorded and the rest are still examined.
    pub fn sweep<W: TargetWriter>(
        &self,
        writer: &mut W,
        references: &BTreeMap<String, BTreeSet<Uid>>,
        now: SystemTime,
    ) -> Result<Sweep, SyncError> {
        let content_dir = self.layout.content_dir().to_path_buf();
        let mut sweep = Sweep::default();

        for path in writer.inventory(&content_dir)? {
            if !is_asset_path(&path) {
                continue;
            }
            let key = asset_key(&content_dir, &path);
            if references.get(&key).is_some_and(|users| !users.is_empty()) {
                continue;
            }
            let modified = match writer.modified(&path) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    sweep.failed.push((path, e));
                    continue;
                }
            };
            let idle = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if idle <= self.grace_period {
                tracing::debug!("{key} unreferenced but inside grace period");
                continue;
            }
            match writer.delete(&path) {
                Ok(result) if result.is_change() => {
                    tracing::info!("swept unreferenced asset {key}");
                    sweep.deleted.push(result);
                }
                Ok(_) => {}
                Err(e) => sweep.failed.push((path, e)),
            }
        }
        Ok(sweep)
    }
}

/// What one [`AssetTracker::sweep`] removed, and the assets it could not
/// handle.
#[derive(Debug, Default)]
pub struct Sweep {
    pub deleted: Vec<DeleteResult>,
    pub failed: Vec<(PathBuf, SyncError)>,
}

/// Vault-relative key for an asset output path.
fn asset_key(content_dir: &Path, output: &Path) -> String {
    output
        .strip_prefix(content_dir)
        .unwrap_or(output)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
