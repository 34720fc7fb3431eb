//! Note parsing, UID assignment and write-back.
//!
//! A note is `[front matter] body`, where front matter is a YAML mapping
//! between two `---` lines at the very start of the file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_yaml::Value;
use uuid::Uuid;
use vaultsync_core::types::{FrontMatter, SourceDocument, Uid};

use crate::error::{io_err, SourceError};

const DELIMITER: &str = "---";

/// Read and parse `<root>/<rel>`.
pub fn load_document(root: &Path, rel: &Path) -> Result<SourceDocument, SourceError> {
    let abs = root.join(rel);
    let bytes = fs::read(&abs).map_err(|e| io_err(&abs, e))?;
    let raw = String::from_utf8(bytes).map_err(|_| SourceError::Utf8 { path: abs.clone() })?;
    let modified_at = modified_time(&abs)?;
    parse_document(rel, raw, modified_at)
}

/// Parse raw note text. `path` is only used for the document identity and errors.
pub fn parse_document(
    path: &Path,
    raw: String,
    modified_at: DateTime<Utc>,
) -> Result<SourceDocument, SourceError> {
    let normalized = raw.replace("\r\n", "\n");

    let (front_matter, has_front_matter, body) = match split_front_matter(&normalized) {
        Some((yaml, body)) => (parse_mapping(path, yaml)?, true, body.to_string()),
        None => (FrontMatter::new(), false, normalized.clone()),
    };

    Ok(SourceDocument {
        path: path.to_path_buf(),
        front_matter,
        has_front_matter,
        body,
        raw,
        modified_at,
    })
}

/// The UID a note carries after [`ensure_uid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsuredUid {
    /// Already present in the front matter.
    Existing(Uid),
    /// Freshly assigned; `raw` must be written back.
    Assigned(Uid),
}

impl EnsuredUid {
    pub fn is_assigned(&self) -> bool {
        matches!(self, EnsuredUid::Assigned(_))
    }

    pub fn into_uid(self) -> Uid {
        match self {
            EnsuredUid::Existing(uid) | EnsuredUid::Assigned(uid) => uid,
        }
    }
}

/// Assign a fresh UID when the note has none.
///
/// The new key is appended to the existing front matter and `raw` is
/// re-serialized; the body is left byte-for-byte intact. A `noteUid` that is
/// not a string is replaced.
pub fn ensure_uid(doc: &mut SourceDocument) -> Result<EnsuredUid, SourceError> {
    if let Some(uid) = doc.uid() {
        return Ok(EnsuredUid::Existing(uid));
    }
    let uid = Uid::from(Uuid::new_v4().to_string());
    doc.front_matter.set_uid(&uid);
    doc.has_front_matter = true;
    doc.raw = serialize_document(doc)?;
    Ok(EnsuredUid::Assigned(uid))
}

/// `---\n<yaml>---\n<body>`
pub fn serialize_document(doc: &SourceDocument) -> Result<String, SourceError> {
    let yaml = if doc.front_matter.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(doc.front_matter.mapping()).map_err(|e| SourceError::Serialize {
            path: doc.path.clone(),
            source: e,
        })?
    };
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", doc.body))
}

/// Atomically replace `<root>/<doc.path>` with `doc.raw` and refresh
/// `doc.modified_at` from the written file.
///
/// The temporary file is hidden so vault scans and watchers ignore it.
pub fn write_back(root: &Path, doc: &mut SourceDocument) -> Result<(), SourceError> {
    let target = root.join(&doc.path);
    let tmp = hidden_tmp_path(&target);
    fs::write(&tmp, doc.raw.as_bytes()).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(&target, e));
    }
    doc.modified_at = modified_time(&target)?;
    tracing::debug!("wrote front matter back to {}", doc.path.display());
    Ok(())
}

/// Filesystem modification time as UTC.
pub fn modified_time(path: &Path) -> Result<DateTime<Utc>, SourceError> {
    let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
    let modified = meta.modified().map_err(|e| io_err(path, e))?;
    Ok(DateTime::<Utc>::from(modified))
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Split `---\n<yaml>\n---\n<body>`. Unterminated blocks yield `None`.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---\n")?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_mapping(path: &Path, yaml: &str) -> Result<FrontMatter, SourceError> {
    if yaml.trim().is_empty() {
        return Ok(FrontMatter::new());
    }
    let value: Value = serde_yaml::from_str(yaml).map_err(|e| SourceError::FrontMatter {
        path: path.to_path_buf(),
        source: e,
    })?;
    match value {
        Value::Null => Ok(FrontMatter::new()),
        Value::Mapping(mapping) => Ok(FrontMatter::from_mapping(mapping)),
        _ => Err(SourceError::FrontMatterShape {
            path: path.to_path_buf(),
        }),
    }
}

fn hidden_tmp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.vaultsync.tmp"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SourceDocument {
        parse_document(Path::new("guides/seo.md"), text.to_string(), Utc::now()).expect("parse")
    }

    #[test]
    fn splits_front_matter_and_body() {
        let doc = parse("---\ntitle: SEO\ntags: [publish]\n---\n# Heading\n\nBody\n");
        assert!(doc.has_front_matter);
        assert_eq!(doc.title(), "SEO");
        assert!(doc.is_published());
        assert_eq!(doc.body, "# Heading\n\nBody\n");
    }

    #[test]
    fn crlf_is_normalised() {
        let doc = parse("---\r\ntitle: Win\r\n---\r\nline\r\n");
        assert_eq!(doc.title(), "Win");
        assert_eq!(doc.body, "line\n");
        assert!(doc.raw.contains("\r\n"));
    }

    #[test]
    fn unterminated_block_is_body() {
        let doc = parse("---\ntitle: nope\nno closing\n");
        assert!(!doc.has_front_matter);
        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body, "---\ntitle: nope\nno closing\n");
    }

    #[test]
    fn empty_block_is_empty_mapping() {
        let doc = parse("---\n---\nbody");
        assert!(doc.has_front_matter);
        assert!(doc.front_matter.is_empty());
        assert_eq!(doc.body, "body");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = parse_document(
            Path::new("bad.md"),
            "---\ntitle: [unclosed\n---\n".to_string(),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::FrontMatter { .. }), "got: {err}");
    }

    #[test]
    fn non_mapping_front_matter_is_an_error() {
        let err = parse_document(Path::new("list.md"), "---\n- a\n- b\n---\n".into(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SourceError::FrontMatterShape { .. }));
    }

    #[test]
    fn ensure_uid_appends_key_and_keeps_body() {
        let mut doc = parse("---\ntitle: A\ncustom: keep\n---\nBody [[Link]]\n");
        let uid = ensure_uid(&mut doc).expect("ensure").into_uid();
        assert!(doc.raw.starts_with("---\ntitle: A\ncustom: keep\nnoteUid: "));
        assert!(doc.raw.ends_with("---\nBody [[Link]]\n"));
        assert!(doc.raw.contains(uid.as_str()));

        let reparsed = parse(&doc.raw);
        assert_eq!(reparsed.uid(), Some(uid));
    }

    #[test]
    fn ensure_uid_is_a_noop_when_present() {
        let mut doc = parse("---\nnoteUid: fixed\n---\nx");
        let before = doc.raw.clone();
        assert_eq!(
            ensure_uid(&mut doc).expect("ensure"),
            EnsuredUid::Existing(Uid::from("fixed"))
        );
        assert_eq!(doc.raw, before);
    }

    #[test]
    fn non_string_uid_is_replaced() {
        let mut doc = parse("---\nnoteUid: 42\n---\nx");
        let ensured = ensure_uid(&mut doc).expect("ensure");
        assert!(ensured.is_assigned());
        assert_eq!(doc.uid(), Some(ensured.into_uid()));
    }

    #[test]
    fn ensure_uid_adds_block_to_plain_note() {
        let mut doc = parse("just text\n");
        ensure_uid(&mut doc).expect("ensure");
        assert!(doc.raw.starts_with("---\nnoteUid: "));
        assert!(doc.raw.ends_with("---\njust text\n"));
    }
}
