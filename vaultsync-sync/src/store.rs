//! Identity and change-detection store, persisted as JSON.
//!
//! One [`StateEntry`] per known [`Uid`] plus a reference-counted asset map.
//! The file lives at `<cache>/<origin-tag>/state.json` and is replaced
//! atomically on save (`state.json.tmp` then rename).
//!
//! Loading never fails: a missing, unreadable, corrupt, wrong-version or
//! wrong-origin file yields an empty store so the next full pass can rebuild.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vaultsync_core::types::Uid;

use crate::error::{io_err, SyncError};

pub const SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

/// Last known state of one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// Vault-relative source path.
    pub source_path: PathBuf,
    /// Repo-relative canonical output path.
    pub output_path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
    pub published: bool,
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    origin_tag: String,
    #[serde(default)]
    documents: BTreeMap<Uid, StateEntry>,
    #[serde(default)]
    assets: BTreeMap<String, BTreeSet<Uid>>,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    origin_tag: String,
    documents: BTreeMap<Uid, StateEntry>,
    assets: BTreeMap<String, BTreeSet<Uid>>,
    dirty: bool,
}

impl StateStore {
    /// An empty store bound to `path` and `origin_tag`.
    pub fn new(path: impl Into<PathBuf>, origin_tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin_tag: origin_tag.into(),
            documents: BTreeMap::new(),
            assets: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the store at `path`, degrading to empty on any problem.
    pub fn load(path: impl Into<PathBuf>, origin_tag: impl Into<String>) -> Self {
        let mut store = Self::new(path, origin_tag);

        let raw = match std::fs::read_to_string(&store.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no state file at {}, starting empty", store.path.display());
                return store;
            }
            Err(e) => {
                tracing::warn!(
                    "cannot read state file {}: {e}; starting empty",
                    store.path.display()
                );
                return store;
            }
        };

        let file: StateFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    "state file {} is corrupt: {e}; starting empty",
                    store.path.display()
                );
                return store;
            }
        };

        if file.schema_version != SCHEMA_VERSION {
            tracing::warn!(
                "state file {} has schema version {} (expected {SCHEMA_VERSION}); starting empty",
                store.path.display(),
                file.schema_version
            );
            return store;
        }
        if file.origin_tag != store.origin_tag {
            tracing::warn!(
                "state file {} belongs to another vault ({}); starting empty",
                store.path.display(),
                file.origin_tag
            );
            return store;
        }

        store.documents = file.documents;
        store.assets = file.assets;
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin_tag(&self) -> &str {
        &self.origin_tag
    }

    /// True when in-memory state differs from what was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // -- change detection ---------------------------------------------------

    /// Whether a document must be re-processed.
    ///
    /// True for an unknown uid, a different source path, a different
    /// fingerprint, or a modification time strictly after the last sync.
    pub fn needs_sync(
        &self,
        uid: &Uid,
        location: &Path,
        modified_at: DateTime<Utc>,
        fingerprint: &str,
    ) -> bool {
        match self.documents.get(uid) {
            None => true,
            Some(entry) => {
                entry.source_path != location
                    || entry.fingerprint != fingerprint
                    || modified_at > entry.last_synced
            }
        }
    }

    // -- documents ----------------------------------------------------------

    pub fn get(&self, uid: &Uid) -> Option<&StateEntry> {
        self.documents.get(uid)
    }

    pub fn upsert(&mut self, uid: Uid, entry: StateEntry) {
        if self.documents.get(&uid) != Some(&entry) {
            self.documents.insert(uid, entry);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, uid: &Uid) -> Option<StateEntry> {
        let removed = self.documents.remove(uid);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn all(&self) -> impl Iterator<Item = (&Uid, &StateEntry)> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Uid whose last known source path is `source`.
    pub fn find_by_source(&self, source: &Path) -> Option<&Uid> {
        self.documents
            .iter()
            .find(|(_, entry)| entry.source_path == source)
            .map(|(uid, _)| uid)
    }

    // -- assets -------------------------------------------------------------

    /// Register `uid` as a user of `asset`. Returns true when newly added.
    pub fn add_asset_reference(&mut self, asset: &str, uid: &Uid) -> bool {
        let added = self
            .assets
            .entry(asset.to_string())
            .or_default()
            .insert(uid.clone());
        if added {
            self.dirty = true;
        }
        added
    }

    /// Drop `uid` from the users of `asset`.
    ///
    /// Returns true when that was the last reference; the asset entry is then
    /// removed entirely.
    pub fn remove_asset_reference(&mut self, asset: &str, uid: &Uid) -> bool {
        let Some(users) = self.assets.get_mut(asset) else {
            return false;
        };
        if !users.remove(uid) {
            return false;
        }
        self.dirty = true;
        if users.is_empty() {
            self.assets.remove(asset);
            return true;
        }
        false
    }

    /// Assets currently referenced by `uid`, sorted.
    pub fn assets_for(&self, uid: &Uid) -> Vec<String> {
        self.assets
            .iter()
            .filter(|(_, users)| users.contains(uid))
            .map(|(asset, _)| asset.clone())
            .collect()
    }

    pub fn asset_references(&self) -> &BTreeMap<String, BTreeSet<Uid>> {
        &self.assets
    }

    // -- persistence --------------------------------------------------------

    /// Atomically write the store to disk and clear the dirty flag.
    ///
    /// On failure the in-memory state is kept as is.
    pub fn persist(&mut self) -> Result<(), SyncError> {
        let file = StateFile {
            schema_version: SCHEMA_VERSION,
            origin_tag: self.origin_tag.clone(),
            documents: self.documents.clone(),
            assets: self.assets.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }

        self.dirty = false;
        tracing::debug!(
            "persisted {} documents and {} assets to {}",
            self.documents.len(),
            self.assets.len(),
            self.path.display()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
