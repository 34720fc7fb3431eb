//! Publish-set snapshot.
//!
//! Built once per pass from the documents published in that pass and passed
//! by reference into every render call. Never shared mutably while rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use vaultsync_core::types::{SourceDocument, Uid};

use crate::slug::{folder_weight, Layout};

/// One published document as seen by link resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDoc {
    pub uid: Uid,
    /// Vault-relative source path.
    pub source: PathBuf,
    pub title: String,
    /// Repo-relative canonical output path.
    pub output: PathBuf,
    /// Content-root relative link target.
    pub link: String,
    /// Explicit `weight` from front matter.
    pub explicit_weight: Option<i64>,
}

/// Canonical output locations of the currently published documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSet {
    entries: BTreeMap<Uid, PublishedDoc>,
    by_name: BTreeMap<String, Uid>,
    by_title: BTreeMap<String, Uid>,
    auto_weights: BTreeMap<Uid, i64>,
}

impl PublishSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the published documents of a pass. Documents without a UID
    /// are ignored.
    pub fn build<'a>(
        docs: impl IntoIterator<Item = &'a SourceDocument>,
        layout: &Layout,
    ) -> Self {
        let mut set = Self::new();
        for doc in docs {
            if let Some(entry) = published_doc(doc, layout) {
                set.entries.insert(entry.uid.clone(), entry);
            }
        }
        set.reindex();
        set
    }

    /// Add or replace one document (incremental passes).
    pub fn insert(&mut self, doc: &SourceDocument, layout: &Layout) {
        if let Some(entry) = published_doc(doc, layout) {
            self.entries.insert(entry.uid.clone(), entry);
            self.reindex();
        }
    }

    /// Drop one document. Returns whether it was present.
    pub fn remove(&mut self, uid: &Uid) -> bool {
        let removed = self.entries.remove(uid).is_some();
        if removed {
            self.reindex();
        }
        removed
    }

    pub fn get(&self, uid: &Uid) -> Option<&PublishedDoc> {
        self.entries.get(uid)
    }

    /// The published document whose canonical output is `output`.
    pub fn output_owner(&self, output: &Path) -> Option<&PublishedDoc> {
        self.entries.values().find(|entry| entry.output == output)
    }

    pub fn contains(&self, uid: &Uid) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PublishedDoc> {
        self.entries.values()
    }

    /// Resolve a cross-reference key: file stem (or vault path without
    /// extension) first, then title.
    pub fn lookup(&self, key: &str) -> Option<&PublishedDoc> {
        let key = key.trim();
        let key = key.strip_suffix(".md").unwrap_or(key);
        self.by_name
            .get(key)
            .or_else(|| self.by_title.get(key))
            .and_then(|uid| self.entries.get(uid))
    }

    /// Explicit weight, else the automatic weight when enabled, else 0.
    ///
    /// Automatic weight is `folder_weight + 10 * index`, where `index` is the
    /// position among published siblings sorted by source path.
    pub fn weight_for(&self, uid: &Uid, auto_weight: bool) -> i64 {
        let Some(entry) = self.entries.get(uid) else {
            return 0;
        };
        match (entry.explicit_weight, auto_weight) {
            (Some(weight), _) => weight,
            (None, true) => self.auto_weights.get(uid).copied().unwrap_or(0),
            (None, false) => 0,
        }
    }

    /// Every section directory that needs an `_index.md`.
    pub fn section_dirs(&self, layout: &Layout) -> BTreeSet<PathBuf> {
        self.entries
            .values()
            .flat_map(|entry| layout.section_dirs(&entry.output))
            .collect()
    }

    fn reindex(&mut self) {
        self.by_name.clear();
        self.by_title.clear();
        self.auto_weights.clear();

        let mut ordered: Vec<&PublishedDoc> = self.entries.values().collect();
        ordered.sort_by(|a, b| a.source.cmp(&b.source));

        let mut siblings: BTreeMap<&Path, i64> = BTreeMap::new();
        for entry in ordered {
            for key in name_keys(&entry.source) {
                self.by_name.entry(key).or_insert_with(|| entry.uid.clone());
            }
            self.by_title
                .entry(entry.title.clone())
                .or_insert_with(|| entry.uid.clone());

            let dir = entry.source.parent().unwrap_or_else(|| Path::new(""));
            let index = siblings.entry(dir).or_insert(0);
            let depth = dir.components().count();
            self.auto_weights
                .insert(entry.uid.clone(), folder_weight(depth) + 10 * *index);
            *index += 1;
        }
    }
}

fn published_doc(doc: &SourceDocument, layout: &Layout) -> Option<PublishedDoc> {
    let uid = doc.uid()?;
    let output = layout.output_path(&doc.path, &uid);
    Some(PublishedDoc {
        link: layout.link_path(&output),
        uid,
        source: doc.path.clone(),
        title: doc.title(),
        output,
        explicit_weight: doc.weight(),
    })
}

/// `seo` and `guides/seo` for `guides/seo.md`.
fn name_keys(source: &Path) -> Vec<String> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let full = source
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if full == stem {
        vec![stem]
    } else {
        vec![stem, full]
    }
}
