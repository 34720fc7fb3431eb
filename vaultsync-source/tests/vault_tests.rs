//! Vault loading and UID write-back against a real directory.
//!
//! Each test builds its own `TempDir` vault: no shared state.

use std::fs;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use rstest::rstest;
use tempfile::TempDir;
use vaultsync_source::{ensure_uid, load_document, scan_vault, write_back, SourceError};

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn vault() -> TempDir {
    TempDir::new().expect("tempdir")
}

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write fixture");
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn load_reports_mtime_and_fingerprint() {
    let dir = vault();
    write(&dir, "guides/seo.md", "---\ntitle: SEO\n---\nbody\n");
    set_file_mtime(dir.path().join("guides/seo.md"), FileTime::from_unix_time(1_700_000_000, 0))
        .expect("mtime");

    let doc = load_document(dir.path(), Path::new("guides/seo.md")).expect("load");
    assert_eq!(doc.modified_at.timestamp(), 1_700_000_000);
    assert_eq!(doc.fingerprint(), vaultsync_core::types::fingerprint(doc.raw.as_bytes()));
    assert_eq!(doc.directory(), Path::new("guides"));
}

#[test]
fn non_utf8_note_is_an_error() {
    let dir = vault();
    fs::write(dir.path().join("bin.md"), [0xff, 0xfe, 0x00]).expect("write");
    let err = load_document(dir.path(), Path::new("bin.md")).unwrap_err();
    assert!(matches!(err, SourceError::Utf8 { .. }), "got: {err}");
}

#[rstest]
#[case("tags: [publish]", true)]
#[case("tags: ['#publish', other]", true)]
#[case("publish: true", true)]
#[case("tags: [draft]", false)]
#[case("title: Only a title", false)]
fn publish_predicate_from_disk(#[case] front_matter: &str, #[case] published: bool) {
    let dir = vault();
    write(&dir, "n.md", &format!("---\n{front_matter}\n---\ntext\n"));
    let doc = load_document(dir.path(), Path::new("n.md")).expect("load");
    assert_eq!(doc.is_published(), published);
}

// ---------------------------------------------------------------------------
// UID write-back
// ---------------------------------------------------------------------------

#[test]
fn write_back_persists_uid_and_refreshes_mtime() {
    let dir = vault();
    write(&dir, "notes/a.md", "---\ntitle: A\nextra: [1, 2]\n---\nHello [[B]]\n");
    set_file_mtime(dir.path().join("notes/a.md"), FileTime::from_unix_time(1_600_000_000, 0))
        .expect("mtime");

    let mut doc = load_document(dir.path(), Path::new("notes/a.md")).expect("load");
    let uid = ensure_uid(&mut doc).expect("ensure").into_uid();
    write_back(dir.path(), &mut doc).expect("write back");

    assert!(doc.modified_at.timestamp() > 1_600_000_000);
    let reloaded = load_document(dir.path(), Path::new("notes/a.md")).expect("reload");
    assert_eq!(reloaded.uid(), Some(uid));
    assert_eq!(reloaded.body, "Hello [[B]]\n");
    assert_eq!(reloaded.fingerprint(), doc.fingerprint());
    assert!(reloaded.front_matter.get("extra").is_some());
}

#[test]
fn write_back_leaves_no_temp_files_in_scan() {
    let dir = vault();
    write(&dir, "a.md", "plain\n");
    let mut doc = load_document(dir.path(), Path::new("a.md")).expect("load");
    ensure_uid(&mut doc).expect("ensure");
    write_back(dir.path(), &mut doc).expect("write back");

    let names: Vec<_> = fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.md".to_string()]);
    assert_eq!(scan_vault(dir.path()).expect("scan").len(), 1);
}

#[test]
fn second_ensure_never_reassigns() {
    let dir = vault();
    write(&dir, "a.md", "plain\n");
    let mut doc = load_document(dir.path(), Path::new("a.md")).expect("load");
    let first = ensure_uid(&mut doc).expect("ensure").into_uid();
    write_back(dir.path(), &mut doc).expect("write back");

    let mut again = load_document(dir.path(), Path::new("a.md")).expect("reload");
    assert!(!ensure_uid(&mut again).expect("ensure").is_assigned());
    assert_eq!(again.uid(), Some(first));
}
