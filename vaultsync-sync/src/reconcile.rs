//! Reconciliation orchestrator.
//!
//! ## Full pass
//!
//! 1. Scan the vault, load every note, assign missing uids (written back to
//!    the note unless dry-running). A load failure isolates that path, as
//!    does losing a shared uid or a shared output path to another note.
//! 2. Drop store entries whose source disappeared (their outputs and asset
//!    references go with them). Entries of paths that failed to load are
//!    kept untouched.
//! 3. Classify each note against the store. A moved or unpublished note
//!    loses its previous output immediately.
//! 4. Build the publish-set snapshot from this pass's published notes.
//! 5. Render: every published note when the snapshot changed or a
//!    rename/publish flip happened, otherwise only changed notes and notes
//!    whose output is missing. A note that could not be written and has no
//!    output on disk is dropped from the snapshot and the rest re-rendered.
//! 6. Write missing section indexes.
//! 7. Repair sweep over the output tree: outputs whose embedded `noteUid` is
//!    not published are orphans; published uids found away from their
//!    canonical path are duplicates. Both are deleted.
//! 8. Sweep unreferenced assets past their grace period.
//! 9. Persist the store (skipped in dry-run mode).
//!
//! ## Incremental pass
//!
//! [`Orchestrator::apply_change`] runs one note through the same
//! classification and renders it against the patched snapshot. When the
//! snapshot entry for that note changed, the global re-render is deferred to
//! the next [`Orchestrator::tick`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;

use vaultsync_core::config::Config;
use vaultsync_core::types::{ChangeEvent, SourceDocument, Uid, KEY_UID};
use vaultsync_renderer::slug::{folder_weight, SECTION_INDEX};
use vaultsync_renderer::{Layout, PublishSet, Renderer};
use vaultsync_source::{
    asset_references, ensure_uid, is_hidden, is_markdown, load_document, scan_vault, write_back,
};

use crate::assets::AssetTracker;
use crate::error::SyncError;
use crate::report::{Operation, PassReport};
use crate::store::{StateEntry, StateStore};
use crate::writer::TargetWriter;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<W: TargetWriter> {
    vault: PathBuf,
    auto_weight: bool,
    dry_run: bool,
    renderer: Renderer,
    store: StateStore,
    assets: AssetTracker,
    writer: W,
    /// Snapshot produced by the last full pass, patched by incremental ones.
    snapshot: PublishSet,
    rerender_pending: bool,
}

/// One loaded note and how it compares to the store.
struct Observed {
    doc: SourceDocument,
    uid: Uid,
    output: PathBuf,
    changed: bool,
}

impl<W: TargetWriter> Orchestrator<W> {
    /// Load the store from the configured state file and wire everything up.
    pub fn new(config: &Config, writer: W) -> Result<Self, SyncError> {
        let store = StateStore::load(config.state_file()?, config.origin_tag());
        Self::with_store(config, writer, store)
    }

    pub fn with_store(config: &Config, writer: W, store: StateStore) -> Result<Self, SyncError> {
        let renderer = Renderer::from_config(config)?;
        let assets = AssetTracker::new(
            &config.vault,
            renderer.layout().clone(),
            config.asset_grace_period,
        );
        Ok(Self {
            vault: config.vault.clone(),
            auto_weight: config.auto_weight,
            dry_run: config.dry_run,
            renderer,
            store,
            assets,
            writer,
            snapshot: PublishSet::new(),
            rerender_pending: false,
        })
    }

    pub fn layout(&self) -> &Layout {
        self.renderer.layout()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    pub fn snapshot(&self) -> &PublishSet {
        &self.snapshot
    }

    /// A global re-render is waiting for the next tick.
    pub fn rerender_pending(&self) -> bool {
        self.rerender_pending
    }

    // -----------------------------------------------------------------------
    // Full pass
    // -----------------------------------------------------------------------

    /// Reconcile the whole vault against the output tree.
    ///
    /// Only a missing root escapes as an error; everything else is recorded
    /// in the returned report.
    pub fn full_pass(&mut self) -> Result<PassReport, SyncError> {
        self.check_roots()?;
        let mut report = PassReport::default();

        // 1. load
        let mut failed: BTreeSet<PathBuf> = BTreeSet::new();
        let mut loaded = Vec::new();
        for rel in scan_vault(&self.vault)? {
            report.processed += 1;
            match self.load_observed(&rel, &mut report) {
                Some(observed) => loaded.push(observed),
                None => {
                    failed.insert(rel);
                }
            }
        }
        let docs = self.claim_uids(loaded, &mut failed, &mut report);
        let docs = self.claim_outputs(docs, &mut failed, &mut report);

        let mut protected: BTreeSet<Uid> = failed
            .iter()
            .filter_map(|path| self.store.find_by_source(path).cloned())
            .collect();

        // 2. removals
        let mut global = self.rerender_pending;
        let gone: Vec<(Uid, StateEntry)> = self
            .store
            .all()
            .filter(|(uid, entry)| !docs.contains_key(*uid) && !failed.contains(&entry.source_path))
            .map(|(uid, entry)| (uid.clone(), entry.clone()))
            .collect();
        for (uid, entry) in gone {
            tracing::info!("{} is gone; retiring {uid}", entry.source_path.display());
            global |= entry.published;
            self.retire(&uid, &entry, &mut report);
            self.store.remove(&uid);
        }

        // 3. classify
        let mut observed = Vec::with_capacity(docs.len());
        for (uid, doc) in docs {
            let (plan, invalidates) = self.classify(doc, uid, &mut report);
            global |= invalidates;
            observed.push(plan);
        }

        // 4. snapshot
        let mut snapshot = PublishSet::build(
            observed.iter().filter(|o| o.doc.is_published()).map(|o| &o.doc),
            self.renderer.layout(),
        );
        global |= snapshot != self.snapshot;
        if global {
            tracing::info!("publish set changed; re-rendering all {} published notes", snapshot.len());
        }

        // 5. render
        let mut unavailable = BTreeSet::new();
        for plan in &observed {
            if plan.doc.is_published() {
                let render = global || plan.changed || !self.writer.exists(&plan.output);
                if !self.materialize(plan, &snapshot, render, &mut report)
                    && !self.writer.exists(&plan.output)
                {
                    unavailable.insert(plan.uid.clone());
                }
            } else {
                self.record_unpublished(plan, &mut report);
            }
        }

        // 5b. a note whose output could not be produced leaves the publish
        // set, and everything else is rendered again without it
        while !unavailable.is_empty() {
            tracing::warn!(
                "{} note(s) could not be written; re-rendering without them",
                unavailable.len()
            );
            for uid in &unavailable {
                snapshot.remove(uid);
                protected.insert(uid.clone());
            }
            global = true;
            let mut again = BTreeSet::new();
            for plan in observed.iter().filter(|o| snapshot.contains(&o.uid)) {
                if !self.materialize(plan, &snapshot, true, &mut report)
                    && !self.writer.exists(&plan.output)
                {
                    again.insert(plan.uid.clone());
                }
            }
            unavailable = again;
        }

        // 6. section indexes
        self.write_section_indexes(&snapshot, &mut report);

        // 7. repair
        self.repair(&snapshot, &protected, &mut report);

        // 8. assets
        match self
            .assets
            .sweep(&mut self.writer, self.store.asset_references(), SystemTime::now())
        {
            Ok(sweep) => {
                report.deletions.extend(sweep.deleted);
                for (path, e) in sweep.failed {
                    report.error(path, Operation::Delete, e);
                }
            }
            Err(e) => report.error(self.renderer.layout().content_dir(), Operation::Delete, e),
        }

        self.snapshot = snapshot;
        self.rerender_pending = false;
        report.published = self.snapshot.len();
        report.global_rerender = global;

        // 9. persist
        self.persist_into(&mut report);
        report.log_summary("full pass");
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Incremental pass
    // -----------------------------------------------------------------------

    /// Process one change notification.
    ///
    /// The store is not persisted here; [`Self::tick`] does that.
    pub fn apply_change(&mut self, event: &ChangeEvent) -> Result<PassReport, SyncError> {
        self.check_roots()?;
        let mut report = PassReport::default();
        let rel = event.path.as_path();
        if !is_markdown(rel) || is_hidden(rel) {
            return Ok(report);
        }

        if self.vault.join(rel).is_file() {
            self.apply_update(rel, &mut report);
        } else {
            self.apply_removal(rel, &mut report);
        }

        report.published = self.snapshot.len();
        tracing::debug!(
            "{} {}: rendered={} written={} deleted={} errored={}",
            event.op,
            rel.display(),
            report.rendered,
            report.written(),
            report.deleted(),
            report.errors.len()
        );
        Ok(report)
    }

    fn apply_update(&mut self, rel: &Path, report: &mut PassReport) {
        report.processed += 1;
        let Some((doc, uid)) = self.load_observed(rel, report) else {
            return;
        };

        if let Some(prior) = self.store.get(&uid) {
            let other = prior.source_path.clone();
            if other != rel && self.carries_uid(&other, &uid) {
                report.error(
                    rel,
                    Operation::Classify,
                    format!("duplicate noteUid {uid}, already used by {}", other.display()),
                );
                return;
            }
        }

        if doc.is_published() {
            let output = self.renderer.layout().output_path(&doc.path, &uid);
            if let Some(owner) = self.snapshot.output_owner(&output).filter(|o| o.uid != uid) {
                report.error(
                    rel,
                    Operation::Classify,
                    format!("output {} already used by {}", output.display(), owner.source.display()),
                );
                return;
            }
        }

        let (plan, invalidates) = self.classify(doc, uid, report);

        let mut snapshot = std::mem::take(&mut self.snapshot);
        let before = snapshot.get(&plan.uid).cloned();
        if plan.doc.is_published() {
            snapshot.insert(&plan.doc, self.renderer.layout());
        } else {
            snapshot.remove(&plan.uid);
        }
        if invalidates || snapshot.get(&plan.uid) != before.as_ref() {
            tracing::info!("{} changed the publish set; re-render scheduled", rel.display());
            self.rerender_pending = true;
        }

        if plan.doc.is_published() {
            let render = plan.changed || !self.writer.exists(&plan.output);
            if !self.materialize(&plan, &snapshot, render, report)
                && !self.writer.exists(&plan.output)
            {
                snapshot.remove(&plan.uid);
                self.rerender_pending = true;
            }
            self.write_section_indexes(&snapshot, report);
        } else {
            self.record_unpublished(&plan, report);
        }
        self.snapshot = snapshot;
    }

    fn apply_removal(&mut self, rel: &Path, report: &mut PassReport) {
        let Some(uid) = self.store.find_by_source(rel).cloned() else {
            return;
        };
        report.processed += 1;
        let Some(entry) = self.store.remove(&uid) else {
            return;
        };
        tracing::info!("{} removed; retiring {uid}", rel.display());
        self.retire(&uid, &entry, report);
        if self.snapshot.remove(&uid) || entry.published {
            self.rerender_pending = true;
        }
    }

    /// Periodic housekeeping: run the deferred global re-render, or persist
    /// a dirty store.
    pub fn tick(&mut self) -> Result<Option<PassReport>, SyncError> {
        if self.rerender_pending {
            return self.full_pass().map(Some);
        }
        if self.store.is_dirty() {
            if let Err(e) = self.persist() {
                tracing::warn!("could not persist state: {e}");
            }
        }
        Ok(None)
    }

    /// Save the store now. A no-op in dry-run mode.
    pub fn persist(&mut self) -> Result<(), SyncError> {
        if self.dry_run {
            return Ok(());
        }
        self.store.persist()
    }

    // -----------------------------------------------------------------------
    // Per-document steps
    // -----------------------------------------------------------------------

    /// Load a note and make sure it has a uid. `None` means the failure was
    /// recorded in `report`.
    fn load_observed(&mut self, rel: &Path, report: &mut PassReport) -> Option<(SourceDocument, Uid)> {
        let mut doc = match load_document(&self.vault, rel) {
            Ok(doc) => doc,
            Err(e) => {
                report.error(rel, Operation::Load, e);
                return None;
            }
        };

        let ensured = match ensure_uid(&mut doc) {
            Ok(ensured) => ensured,
            Err(e) => {
                report.error(rel, Operation::AssignUid, e);
                return None;
            }
        };
        let assigned = ensured.is_assigned();
        let uid = ensured.into_uid();
        if assigned {
            report.assigned_uids += 1;
            if self.dry_run {
                tracing::info!("[dry-run] would assign noteUid {uid} to {}", rel.display());
            } else if let Err(e) = write_back(&self.vault, &mut doc) {
                report.error(rel, Operation::AssignUid, e);
                return None;
            } else {
                tracing::info!("assigned noteUid {uid} to {}", rel.display());
            }
        }
        Some((doc, uid))
    }

    /// Settle notes that share a uid. The path the store already tracks
    /// keeps it; otherwise the first path in scan order does. The others are
    /// recorded as classify errors and added to `failed`.
    fn claim_uids(
        &self,
        loaded: Vec<(SourceDocument, Uid)>,
        failed: &mut BTreeSet<PathBuf>,
        report: &mut PassReport,
    ) -> BTreeMap<Uid, SourceDocument> {
        let (tracked, untracked): (Vec<_>, Vec<_>) = loaded.into_iter().partition(|(doc, uid)| {
            self.store
                .get(uid)
                .is_some_and(|entry| entry.source_path == doc.path)
        });

        let mut docs: BTreeMap<Uid, SourceDocument> = BTreeMap::new();
        for (doc, uid) in tracked.into_iter().chain(untracked) {
            if let Some(first) = docs.get(&uid) {
                report.error(
                    &doc.path,
                    Operation::Classify,
                    format!("duplicate noteUid {uid}, already used by {}", first.path.display()),
                );
                failed.insert(doc.path);
                continue;
            }
            docs.insert(uid, doc);
        }
        docs
    }

    /// Settle published notes whose slugs land on the same output path. The
    /// note already published there keeps it; otherwise the first source
    /// path in sort order does.
    fn claim_outputs(
        &self,
        mut docs: BTreeMap<Uid, SourceDocument>,
        failed: &mut BTreeSet<PathBuf>,
        report: &mut PassReport,
    ) -> BTreeMap<Uid, SourceDocument> {
        let layout = self.renderer.layout();
        let mut candidates: Vec<(bool, PathBuf, Uid, PathBuf)> = docs
            .iter()
            .filter(|(_, doc)| doc.is_published())
            .map(|(uid, doc)| {
                let output = layout.output_path(&doc.path, uid);
                let holds = self
                    .store
                    .get(uid)
                    .is_some_and(|entry| entry.published && entry.output_path == output);
                (!holds, doc.path.clone(), uid.clone(), output)
            })
            .collect();
        candidates.sort();

        let mut claimed: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        for (_, source, uid, output) in candidates {
            if let Some(owner) = claimed.get(&output) {
                report.error(
                    &source,
                    Operation::Classify,
                    format!("output {} already used by {}", output.display(), owner.display()),
                );
                docs.remove(&uid);
                failed.insert(source);
                continue;
            }
            claimed.insert(output, source);
        }
        docs
    }

    /// Compare a note with its store entry and retire a previous output that
    /// no longer applies. Returns whether the change invalidates every
    /// rendered cross-reference.
    fn classify(&mut self, doc: SourceDocument, uid: Uid, report: &mut PassReport) -> (Observed, bool) {
        let output = self.renderer.layout().output_path(&doc.path, &uid);
        let changed = self
            .store
            .needs_sync(&uid, &doc.path, doc.modified_at, &doc.fingerprint());
        let published = doc.is_published();

        let mut invalidates = false;
        if let Some(prior) = self.store.get(&uid).cloned() {
            let moved = prior.source_path != doc.path;
            if moved {
                tracing::info!(
                    "{} moved to {}",
                    prior.source_path.display(),
                    doc.path.display()
                );
            }
            if prior.published && (!published || prior.output_path != output) {
                self.delete_output(&prior.output_path, report);
            }
            invalidates = moved || prior.published != published;
        }

        (
            Observed {
                doc,
                uid,
                output,
                changed,
            },
            invalidates,
        )
    }

    /// Render and write a published note (when `render`), copy its assets
    /// and record it in the store. Returns false when rendering or writing
    /// failed.
    fn materialize(
        &mut self,
        plan: &Observed,
        snapshot: &PublishSet,
        render: bool,
        report: &mut PassReport,
    ) -> bool {
        if render {
            let weight = snapshot.weight_for(&plan.uid, self.auto_weight);
            let rendered = match self.renderer.render(&plan.doc, snapshot, weight) {
                Ok(rendered) => rendered,
                Err(e) => {
                    report.error(&plan.doc.path, Operation::Render, e);
                    return false;
                }
            };
            report.rendered += 1;
            let unresolved = rendered
                .cross_references
                .iter()
                .filter(|r| !r.target_key.is_empty() && snapshot.lookup(&r.target_key).is_none())
                .count();
            if unresolved > 0 {
                tracing::debug!(
                    "{}: {unresolved} cross-reference(s) point at unpublished notes",
                    plan.doc.path.display()
                );
            }
            match self.writer.write(&rendered.path, &rendered.content) {
                Ok(result) => report.writes.push(result),
                Err(e) => {
                    report.error(&plan.doc.path, Operation::Write, e);
                    return false;
                }
            }
        }

        self.sync_assets(&plan.uid, &plan.doc, report);

        if render {
            let entry = self.entry_for(plan, true);
            self.store.upsert(plan.uid.clone(), entry);
        }
        true
    }

    fn record_unpublished(&mut self, plan: &Observed, report: &mut PassReport) {
        self.release_assets(&plan.uid, None, &plan.doc.path, report);
        let stale = self
            .store
            .get(&plan.uid)
            .map_or(true, |prior| prior.published);
        if plan.changed || stale {
            let entry = self.entry_for(plan, false);
            self.store.upsert(plan.uid.clone(), entry);
        }
    }

    fn entry_for(&self, plan: &Observed, published: bool) -> StateEntry {
        StateEntry {
            source_path: plan.doc.path.clone(),
            output_path: plan.output.clone(),
            last_modified: plan.doc.modified_at,
            last_synced: Utc::now().max(plan.doc.modified_at),
            published,
            fingerprint: plan.doc.fingerprint(),
        }
    }

    /// Copy every asset `doc` references and release the ones it dropped.
    fn sync_assets(&mut self, uid: &Uid, doc: &SourceDocument, report: &mut PassReport) {
        let mut wanted = BTreeSet::new();
        for asset in asset_references(doc) {
            if !self.vault.join(&asset.path).is_file() {
                tracing::warn!("{}: referenced asset {} not found", doc.path.display(), asset.path);
                continue;
            }
            match self
                .assets
                .record_usage(&mut self.writer, &mut self.store, &asset.path, uid)
            {
                Ok(result) => {
                    if result.is_change() {
                        report.writes.push(result);
                    }
                    wanted.insert(asset.path);
                }
                Err(e) => report.error(&doc.path, Operation::CopyAsset, e),
            }
        }
        self.release_assets(uid, Some(&wanted), &doc.path, report);
    }

    /// Release `uid`'s assets not in `keep` (all of them for `None`).
    fn release_assets(
        &mut self,
        uid: &Uid,
        keep: Option<&BTreeSet<String>>,
        path: &Path,
        report: &mut PassReport,
    ) {
        for asset in self.store.assets_for(uid) {
            if keep.is_some_and(|keep| keep.contains(&asset)) {
                continue;
            }
            if let Err(e) = self
                .assets
                .release(&mut self.writer, &mut self.store, &asset, uid)
            {
                report.error(path, Operation::ReleaseAsset, e);
            }
        }
    }

    /// Delete a vanished note's output and drop its asset references.
    fn retire(&mut self, uid: &Uid, entry: &StateEntry, report: &mut PassReport) {
        if entry.published {
            self.delete_output(&entry.output_path, report);
        }
        self.release_assets(uid, None, &entry.source_path, report);
    }

    fn delete_output(&mut self, path: &Path, report: &mut PassReport) {
        match self.writer.delete(path) {
            Ok(result) => report.deletions.push(result),
            Err(e) => report.error(path, Operation::Delete, e),
        }
    }

    fn write_section_indexes(&mut self, snapshot: &PublishSet, report: &mut PassReport) {
        let layout = self.renderer.layout().clone();
        for dir in snapshot.section_dirs(&layout) {
            let index = dir.join(SECTION_INDEX);
            if self.writer.exists(&index) {
                continue;
            }
            let weight = folder_weight(layout.section_depth(&dir));
            let rendered = match self.renderer.render_section_index(&dir, weight) {
                Ok(rendered) => rendered,
                Err(e) => {
                    report.error(&index, Operation::Render, e);
                    continue;
                }
            };
            match self.writer.write(&rendered.path, &rendered.content) {
                Ok(result) => report.writes.push(result),
                Err(e) => report.error(&index, Operation::Write, e),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Repair sweep
    // -----------------------------------------------------------------------

    /// Delete outputs whose embedded uid is not published (orphans) or is
    /// published elsewhere (duplicates). Outputs of `protected` uids are kept.
    fn repair(&mut self, snapshot: &PublishSet, protected: &BTreeSet<Uid>, report: &mut PassReport) {
        let content_dir = self.renderer.layout().content_dir().to_path_buf();
        let files = match self.writer.inventory(&content_dir) {
            Ok(files) => files,
            Err(e) => {
                report.error(&content_dir, Operation::Repair, e);
                return;
            }
        };

        for path in files {
            let is_doc = path.extension().is_some_and(|ext| ext == "md");
            let is_index = path.file_name().is_some_and(|name| name == SECTION_INDEX);
            if !is_doc || is_index {
                continue;
            }
            let content = match self.writer.read(&path) {
                Ok(Some(content)) => content,
                Ok(None) => continue,
                Err(e) => {
                    report.error(&path, Operation::Repair, e);
                    continue;
                }
            };
            let Some(uid) = embedded_uid(&content) else {
                continue;
            };

            let kind = match snapshot.get(&uid) {
                Some(published) if published.output == path => continue,
                Some(_) => "duplicate",
                None if protected.contains(&uid) => continue,
                None => "orphan",
            };
            tracing::info!("repair: removing {kind} output {} (noteUid {uid})", path.display());
            self.delete_output(&path, report);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_roots(&self) -> Result<(), SyncError> {
        if !self.vault.is_dir() {
            return Err(SyncError::SourceRootMissing {
                path: self.vault.clone(),
            });
        }
        if !self.writer.root().is_dir() {
            return Err(SyncError::OutputRootMissing {
                path: self.writer.root().to_path_buf(),
            });
        }
        Ok(())
    }

    /// Whether the note at `rel` still exists and carries `uid`.
    fn carries_uid(&self, rel: &Path, uid: &Uid) -> bool {
        load_document(&self.vault, rel)
            .ok()
            .and_then(|doc| doc.uid())
            .is_some_and(|found| &found == uid)
    }

    fn persist_into(&mut self, report: &mut PassReport) {
        if let Err(e) = self.persist() {
            tracing::warn!("could not persist state: {e}");
            report.persist_error = Some(e.to_string());
        }
    }
}

/// `noteUid` from the metadata block of a rendered output.
pub fn embedded_uid(content: &str) -> Option<Uid> {
    let rest = content.strip_prefix("---\n")?;
    for line in rest.lines() {
        if line.trim() == "---" {
            break;
        }
        let Some(value) = line.strip_prefix(KEY_UID).and_then(|v| v.strip_prefix(':')) else {
            continue;
        };
        let value = value.trim();
        let value = if value.starts_with('"') {
            serde_json::from_str::<String>(value).ok()?
        } else {
            value.trim_matches('\'').to_string()
        };
        if !value.is_empty() {
            return Some(Uid::from(value));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
