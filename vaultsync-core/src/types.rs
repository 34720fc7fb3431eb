//! Domain types shared by every vaultsync crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Source paths are always vault-relative, output paths always repo-relative.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Front-matter keys
// ---------------------------------------------------------------------------

pub const KEY_TITLE: &str = "title";
pub const KEY_UID: &str = "noteUid";
pub const KEY_TAGS: &str = "tags";
pub const KEY_PUBLISH: &str = "publish";
pub const KEY_WEIGHT: &str = "weight";

/// Tags that mark a document for publishing.
pub const PUBLISH_TAGS: &[&str] = &["publish", "#publish"];

/// Image formats copied from the vault into the output tree.
pub const ASSET_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Extension is one of [`ASSET_EXTENSIONS`], case-insensitive.
pub fn is_asset_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ASSET_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable document identity, persisted in the document's own front matter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    /// First eight characters, used to keep truncated slugs collision-resistant.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Uid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Uid {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Front matter
// ---------------------------------------------------------------------------

/// Schema-less front-matter block.
///
/// Backed by an insertion-ordered YAML mapping so unknown keys survive a
/// parse → serialize cycle untouched and in their original order. Known keys
/// are read through the typed accessors below.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter(Mapping);

impl FrontMatter {
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    pub fn mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert or replace a key. New keys are appended after existing ones.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(Value::String(key.to_owned()), value);
    }

    /// `title` when it is a non-empty string.
    pub fn title(&self) -> Option<&str> {
        self.get(KEY_TITLE)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `noteUid` when it is a non-empty string.
    pub fn uid(&self) -> Option<Uid> {
        self.get(KEY_UID)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Uid::from)
    }

    pub fn set_uid(&mut self, uid: &Uid) {
        self.insert(KEY_UID, Value::String(uid.0.clone()));
    }

    /// `tags` as a list of strings; a single string counts as one tag.
    pub fn tags(&self) -> Vec<String> {
        match self.get(KEY_TAGS) {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(tag)) => vec![tag.clone()],
            _ => Vec::new(),
        }
    }

    /// `publish: true`.
    pub fn publish_flag(&self) -> bool {
        self.get(KEY_PUBLISH).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Explicit ordering weight.
    pub fn weight(&self) -> Option<i64> {
        self.get(KEY_WEIGHT).and_then(Value::as_i64)
    }
}

// ---------------------------------------------------------------------------
// Source documents
// ---------------------------------------------------------------------------

/// A parsed source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Vault-relative location, e.g. `guides/seo.md`.
    pub path: PathBuf,
    pub front_matter: FrontMatter,
    /// Whether the raw text carried a terminated front-matter block.
    pub has_front_matter: bool,
    /// Everything after the front-matter block, untouched.
    pub body: String,
    /// Raw text exactly as stored on disk (or as it would be after write-back).
    pub raw: String,
    /// Filesystem modification time.
    pub modified_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn uid(&self) -> Option<Uid> {
        self.front_matter.uid()
    }

    /// File name without the `.md` extension.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Front-matter title, falling back to the file stem.
    pub fn title(&self) -> String {
        self.front_matter
            .title()
            .map(str::to_owned)
            .unwrap_or_else(|| self.file_stem())
    }

    pub fn tags(&self) -> Vec<String> {
        self.front_matter.tags()
    }

    /// Publish predicate: `publish: true` or a `publish` / `#publish` tag.
    pub fn is_published(&self) -> bool {
        self.front_matter.publish_flag()
            || self
                .tags()
                .iter()
                .any(|tag| PUBLISH_TAGS.contains(&tag.trim()))
    }

    pub fn weight(&self) -> Option<i64> {
        self.front_matter.weight()
    }

    /// Directory part of [`Self::path`]; empty for documents at the vault root.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// `sha256-<hex>` over the raw bytes.
    pub fn fingerprint(&self) -> String {
        fingerprint(self.raw.as_bytes())
    }
}

/// Content fingerprint used for change detection.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// A `[[target#section|display]]` reference found in a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossReference {
    /// The full markup as written.
    pub raw: String,
    /// Lookup key: the target with any `#section` suffix removed.
    pub target_key: String,
    pub display_text: String,
    pub section: Option<String>,
}

/// A binary asset referenced by a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssetRef {
    /// Vault-relative path with `/` separators.
    pub path: String,
    pub alt_text: String,
    /// `![[file]]` embed rather than `![alt](path)`.
    pub embed: bool,
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Kind of change observed on a source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Created,
    Modified,
    Removed,
    Renamed,
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOp::Created => write!(f, "created"),
            ChangeOp::Modified => write!(f, "modified"),
            ChangeOp::Removed => write!(f, "removed"),
            ChangeOp::Renamed => write!(f, "renamed"),
        }
    }
}

/// One change notification for a vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub op: ChangeOp,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, yaml: &str) -> SourceDocument {
        let mapping: Mapping = serde_yaml::from_str(yaml).expect("yaml");
        SourceDocument {
            path: PathBuf::from(path),
            front_matter: FrontMatter::from_mapping(mapping),
            has_front_matter: true,
            body: String::new(),
            raw: String::new(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn uid_display_and_short() {
        let uid = Uid::from("abcd1234-5678-90ab-cdef-1234567890ab");
        assert_eq!(uid.to_string(), "abcd1234-5678-90ab-cdef-1234567890ab");
        assert_eq!(uid.short(), "abcd1234");
        assert_eq!(Uid::from("abc").short(), "abc");
    }

    #[test]
    fn title_falls_back_to_file_stem() {
        let d = doc("guides/Getting Started.md", "tags: [a]");
        assert_eq!(d.title(), "Getting Started");
        let d = doc("guides/x.md", "title: Intro");
        assert_eq!(d.title(), "Intro");
    }

    #[test]
    fn publish_predicate_accepts_flag_and_tags() {
        assert!(doc("a.md", "publish: true").is_published());
        assert!(!doc("a.md", "publish: false").is_published());
        assert!(doc("a.md", "tags: [draft, publish]").is_published());
        assert!(doc("a.md", "tags: '#publish'").is_published());
        assert!(!doc("a.md", "tags: [publishing]").is_published());
    }

    #[test]
    fn set_uid_appends_after_existing_keys() {
        let mut d = doc("a.md", "title: A\ncustom: 1");
        d.front_matter.set_uid(&Uid::from("u-1"));
        let keys: Vec<_> = d
            .front_matter
            .mapping()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["title", "custom", "noteUid"]);
        assert_eq!(d.uid(), Some(Uid::from("u-1")));
    }

    #[test]
    fn blank_uid_is_treated_as_absent() {
        assert_eq!(doc("a.md", "noteUid: '  '").uid(), None);
    }

    #[test]
    fn fingerprint_is_prefixed_sha256() {
        let fp = fingerprint(b"hello");
        assert!(fp.starts_with("sha256-"));
        assert_eq!(fp.len(), "sha256-".len() + 64);
    }

    #[test]
    fn uid_serializes_as_plain_string() {
        let yaml = serde_yaml::to_string(&Uid::from("u-9")).expect("serialize");
        assert_eq!(yaml, "u-9\n");
    }
}
