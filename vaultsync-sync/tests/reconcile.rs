//! Full and incremental passes against real temporary vault and repo trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use rstest::rstest;
use tempfile::TempDir;

use vaultsync_core::config::{Config, ConfigFile};
use vaultsync_core::types::{ChangeEvent, ChangeOp, Uid};
use vaultsync_sync::diff::diff;
use vaultsync_sync::status::{collect, SyncSignal};
use vaultsync_sync::{pipeline, DeleteResult, FsWriter, Operation, Orchestrator, PassReport, SyncError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Env {
    vault: TempDir,
    repo: TempDir,
    _cache: TempDir,
    config: Config,
}

fn env() -> Env {
    let _ = env_logger::builder().is_test(true).try_init();
    let vault = TempDir::new().expect("vault");
    let repo = TempDir::new().expect("repo");
    let cache = TempDir::new().expect("cache");
    let config = Config::from_file(ConfigFile {
        vault: Some(vault.path().to_path_buf()),
        repo: Some(repo.path().to_path_buf()),
        cache_dir: Some(cache.path().to_path_buf()),
        ..Default::default()
    })
    .expect("config")
    .validate()
    .expect("valid");
    Env {
        vault,
        repo,
        _cache: cache,
        config,
    }
}

impl Env {
    fn note(&self, rel: &str, content: &str) {
        let path = self.vault.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read_note(&self, rel: &str) -> String {
        fs::read_to_string(self.vault.path().join(rel)).unwrap()
    }

    fn out(&self, rel: &str) -> PathBuf {
        self.repo.path().join(rel)
    }

    fn read_out(&self, rel: &str) -> String {
        fs::read_to_string(self.out(rel)).unwrap_or_else(|e| panic!("{rel}: {e}"))
    }

    fn sync(&self) -> PassReport {
        pipeline::run(&self.config).expect("sync")
    }

    fn orchestrator(&self) -> Orchestrator<FsWriter> {
        Orchestrator::new(&self.config, pipeline::fs_writer(&self.config)).expect("orchestrator")
    }
}

fn published(uid: &str, title: &str, body: &str) -> String {
    format!("---\ntitle: {title}\nnoteUid: {uid}\ntags: [publish]\n---\n{body}")
}

fn draft(uid: &str, title: &str, body: &str) -> String {
    format!("---\ntitle: {title}\nnoteUid: {uid}\ntags: [draft]\n---\n{body}")
}

fn deleted_paths(report: &PassReport) -> Vec<PathBuf> {
    report
        .deletions
        .iter()
        .filter(|d| matches!(d, DeleteResult::Deleted { .. }))
        .map(|d| d.path().to_path_buf())
        .collect()
}

fn age(path: &Path, by: Duration) {
    filetime::set_file_mtime(path, FileTime::from_system_time(SystemTime::now() - by)).unwrap();
}

// ---------------------------------------------------------------------------
// 1. Idempotence and identity
// ---------------------------------------------------------------------------

#[test]
fn second_pass_without_changes_writes_nothing() {
    let env = env();
    env.note("guides/seo.md", &published("seo-uid", "SEO", "See [[Intro]].\n"));
    env.note("basics/intro.md", &published("intro-uid", "Intro", "Hello.\n"));
    env.note("private/diary.md", "no front matter at all\n");

    let first = env.sync();
    assert!(first.is_clean(), "{:?}", first.errors);
    assert_eq!(first.processed, 3);
    assert_eq!(first.published, 2);
    assert!(first.written() >= 2);

    let second = env.sync();
    assert!(second.is_clean(), "{:?}", second.errors);
    assert_eq!(second.written(), 0, "{:?}", second.writes);
    assert_eq!(second.deleted(), 0, "{:?}", second.deletions);
}

#[test]
fn missing_uid_is_assigned_once_and_written_back() {
    let env = env();
    env.note("notes/a.md", "---\ntitle: A\ntags: [publish]\n---\nBody\n");

    let first = env.sync();
    assert_eq!(first.assigned_uids, 1);
    let after_first = env.read_note("notes/a.md");
    assert!(after_first.contains("noteUid: "), "{after_first}");
    assert!(after_first.ends_with("---\nBody\n"));

    let second = env.sync();
    assert_eq!(second.assigned_uids, 0);
    assert_eq!(env.read_note("notes/a.md"), after_first);
}

#[test]
fn output_carries_metadata_block_and_section_index() {
    let env = env();
    env.note("guides/seo.md", &published("seo-uid", "SEO", "Body\n"));
    env.sync();

    let out = env.read_out("content/docs/guides/seo.md");
    assert!(out.starts_with("---\ntitle: \"SEO\"\nweight: 200\nnoteUid: \"seo-uid\"\nlastUpdated: "));
    assert!(out.ends_with("---\n\nBody\n"));

    let index = env.read_out("content/docs/guides/_index.md");
    assert_eq!(index, "---\ntitle: \"Guides\"\nweight: 100\n---\n");
}

#[test]
fn existing_section_index_is_left_alone() {
    let env = env();
    env.note("guides/seo.md", &published("seo-uid", "SEO", "Body\n"));
    fs::create_dir_all(env.out("content/docs/guides")).unwrap();
    fs::write(env.out("content/docs/guides/_index.md"), "hand written\n").unwrap();

    env.sync();
    assert_eq!(env.read_out("content/docs/guides/_index.md"), "hand written\n");
}

// ---------------------------------------------------------------------------
// 2. Renames and publish flips
// ---------------------------------------------------------------------------

#[test]
fn rename_deletes_old_output_and_rerenders_everything() {
    let env = env();
    env.note("notes/a.md", &published("a-uid", "Alpha", "Alpha body\n"));
    env.note("notes/c.md", &published("c-uid", "Gamma", "Links to [[a]].\n"));
    env.sync();
    assert!(env.out("content/docs/notes/a.md").exists());

    fs::rename(env.vault.path().join("notes/a.md"), env.vault.path().join("notes/b.md")).unwrap();
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("warm snapshot");

    // Rename once more with a warm snapshot so only this change is measured.
    fs::rename(env.vault.path().join("notes/b.md"), env.vault.path().join("notes/d.md")).unwrap();
    let report = orchestrator.full_pass().expect("pass");

    assert_eq!(deleted_paths(&report), vec![PathBuf::from("content/docs/notes/b.md")]);
    assert!(!env.out("content/docs/notes/b.md").exists());
    assert!(env.out("content/docs/notes/d.md").exists());
    assert!(report.global_rerender);
    assert_eq!(report.rendered, 2);
    assert!(env.read_out("content/docs/notes/c.md").contains("Links to a."));
}

#[test]
fn publishing_a_target_resolves_links_to_it() {
    let env = env();
    env.note("guides/seo.md", &published("a-uid", "SEO", "Start with [[Intro]].\n"));
    env.note("basics/getting-started.md", &draft("b-uid", "Intro", "Hi\n"));
    env.sync();
    let before = env.read_out("content/docs/guides/seo.md");
    assert!(before.contains("Start with Intro.\n"), "{before}");

    env.note("basics/getting-started.md", &published("b-uid", "Intro", "Hi\n"));
    let report = env.sync();
    assert!(report.global_rerender);
    let after = env.read_out("content/docs/guides/seo.md");
    assert!(
        after.contains("[Intro]({{< relref \"docs/basics/getting-started\" >}})"),
        "{after}"
    );
    assert!(env.out("content/docs/basics/getting-started.md").exists());
}

#[rstest]
#[case::draft_tag("---\nnoteUid: p-uid\ntags: [draft]\n---\nBody\n")]
#[case::publish_false("---\nnoteUid: p-uid\npublish: false\n---\nBody\n")]
#[case::no_markers("---\nnoteUid: p-uid\n---\nBody\n")]
fn unpublishing_removes_output(#[case] unpublished: &str) {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.sync();
    assert!(env.out("content/docs/notes/p.md").exists());

    env.note("notes/p.md", unpublished);
    let report = env.sync();
    assert_eq!(report.published, 0);
    assert!(!env.out("content/docs/notes/p.md").exists());
}

#[test]
fn deleted_source_retires_output_and_store_entry() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.sync();

    fs::remove_file(env.vault.path().join("notes/p.md")).unwrap();
    let report = env.sync();
    assert_eq!(deleted_paths(&report), vec![PathBuf::from("content/docs/notes/p.md")]);

    let status = collect(&env.config).expect("status");
    assert!(status.documents.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Repair sweep
// ---------------------------------------------------------------------------

#[test]
fn orphan_outputs_are_deleted_and_foreign_files_kept() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    fs::create_dir_all(env.out("content/docs/old")).unwrap();
    fs::write(
        env.out("content/docs/old/ghost.md"),
        "---\ntitle: \"Ghost\"\nweight: 0\nnoteUid: \"ghost\"\n---\n\nboo\n",
    )
    .unwrap();
    fs::write(env.out("content/docs/handwritten.md"), "# Not ours\n").unwrap();

    let report = env.sync();
    assert!(deleted_paths(&report).contains(&PathBuf::from("content/docs/old/ghost.md")));
    assert!(!env.out("content/docs/old").exists());
    assert!(env.out("content/docs/handwritten.md").exists());
}

#[test]
fn duplicate_outputs_keep_only_the_canonical_copy() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.sync();

    let canonical = env.read_out("content/docs/notes/p.md");
    fs::create_dir_all(env.out("content/docs/stale")).unwrap();
    fs::write(env.out("content/docs/stale/p-copy.md"), &canonical).unwrap();

    let report = env.sync();
    assert_eq!(deleted_paths(&report), vec![PathBuf::from("content/docs/stale/p-copy.md")]);
    assert!(env.out("content/docs/notes/p.md").exists());
}

// ---------------------------------------------------------------------------
// 4. Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn malformed_note_is_isolated_and_keeps_its_output() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.note("notes/q.md", &published("q-uid", "Q", "Body\n"));
    env.sync();

    env.note("notes/p.md", "---\nnoteUid: p-uid\ntags: [publish\n---\nBody\n");
    let report = env.sync();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, PathBuf::from("notes/p.md"));
    assert_eq!(report.errors[0].operation, Operation::Load);
    assert!(env.out("content/docs/notes/p.md").exists());
    assert!(env.out("content/docs/notes/q.md").exists());

    let status = collect(&env.config).expect("status");
    assert!(status.documents.iter().any(|d| d.uid == Uid::from("p-uid")));
}

#[test]
fn duplicate_uid_errors_the_later_path() {
    let env = env();
    env.note("a/one.md", &published("same", "One", "1\n"));
    env.note("b/two.md", &published("same", "Two", "2\n"));

    let report = env.sync();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, PathBuf::from("b/two.md"));
    assert_eq!(report.errors[0].operation, Operation::Classify);
    assert!(env.out("content/docs/a/one.md").exists());
    assert!(!env.out("content/docs/b/two.md").exists());
}

#[test]
fn tracked_note_keeps_its_uid_when_a_copy_sorts_first() {
    let env = env();
    env.note("notes/zeta.md", &published("uz", "Zeta", "Body\n"));
    env.sync();

    env.note("notes/alpha.md", &published("uz", "Zeta", "Body\n"));
    let report = env.sync();

    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].path, PathBuf::from("notes/alpha.md"));
    assert_eq!(report.errors[0].operation, Operation::Classify);
    assert_eq!(report.deleted(), 0, "{:?}", report.deletions);
    assert!(env.out("content/docs/notes/zeta.md").exists());
    assert!(!env.out("content/docs/notes/alpha.md").exists());
}

#[test]
fn colliding_slugs_error_the_later_note() {
    let env = env();
    env.note("notes/Foo Bar.md", &published("u-space", "Spaced", "1\n"));
    env.note("notes/foo-bar.md", &published("u-dash", "Dashed", "2\n"));

    let report = env.sync();
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].path, PathBuf::from("notes/foo-bar.md"));
    assert_eq!(report.errors[0].operation, Operation::Classify);
    assert_eq!(report.published, 1);
    let out = env.read_out("content/docs/notes/foo-bar.md");
    assert!(out.contains("noteUid: \"u-space\""), "{out}");
}

#[test]
fn unwritable_note_is_not_linked_to() {
    let env = env();
    env.note("a.md", &published("a-uid", "A", "See [[b]].\n"));
    env.note("sub/b.md", &published("b-uid", "B", "Bee\n"));
    fs::create_dir_all(env.out("content/docs")).unwrap();
    fs::write(env.out("content/docs/sub"), "in the way\n").unwrap();

    let report = env.sync();
    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].path, PathBuf::from("sub/b.md"));
    assert_eq!(report.errors[0].operation, Operation::Write);
    assert_eq!(report.published, 1);
    let a = env.read_out("content/docs/posts/a.md");
    assert!(a.contains("See b."), "{a}");
    assert!(!a.contains("docs/sub/b"), "{a}");

    fs::remove_file(env.out("content/docs/sub")).unwrap();
    let report = env.sync();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(env.out("content/docs/sub/b.md").exists());
    let a = env.read_out("content/docs/posts/a.md");
    assert!(a.contains("{{< relref \"docs/sub/b\" >}}"), "{a}");
}

#[test]
fn missing_vault_root_is_fatal() {
    let env = env();
    let mut orchestrator = env.orchestrator();
    let vault = env.vault.path().to_path_buf();
    drop(env.vault);
    assert!(!vault.exists());
    assert!(matches!(
        orchestrator.full_pass(),
        Err(SyncError::SourceRootMissing { .. })
    ));
}

// ---------------------------------------------------------------------------
// 5. Assets
// ---------------------------------------------------------------------------

#[test]
fn unreferenced_asset_survives_grace_period_then_goes() {
    let env = env();
    env.note("guides/pic.md", &published("pic-uid", "Pic", "![chart](chart.png)\n"));
    fs::write(env.vault.path().join("guides/chart.png"), b"PNG").unwrap();

    env.sync();
    let asset = env.out("content/docs/guides/chart.png");
    assert!(asset.exists());
    assert!(env
        .read_out("content/docs/guides/pic.md")
        .contains("![chart](chart.png)"));

    env.note("guides/pic.md", &draft("pic-uid", "Pic", "![chart](chart.png)\n"));
    env.sync();
    assert!(asset.exists(), "inside the grace window the asset must stay");

    age(&asset, Duration::from_secs(25 * 60 * 60));
    let report = env.sync();
    assert!(!asset.exists());
    assert!(deleted_paths(&report).contains(&PathBuf::from("content/docs/guides/chart.png")));
}

#[test]
fn republish_inside_grace_window_keeps_asset() {
    let env = env();
    env.note("guides/pic.md", &published("pic-uid", "Pic", "![[chart.png]]\n"));
    fs::write(env.vault.path().join("guides/chart.png"), b"PNG").unwrap();
    env.sync();

    env.note("guides/pic.md", &draft("pic-uid", "Pic", "![[chart.png]]\n"));
    env.sync();
    env.note("guides/pic.md", &published("pic-uid", "Pic", "![[chart.png]]\n"));
    env.sync();

    let asset = env.out("content/docs/guides/chart.png");
    age(&asset, Duration::from_secs(48 * 60 * 60));
    env.sync();
    assert!(asset.exists(), "referenced again, so never swept");
}

// ---------------------------------------------------------------------------
// 6. Dry run, diff, status
// ---------------------------------------------------------------------------

#[test]
fn dry_run_changes_nothing_on_disk() {
    let mut env = env();
    env.note("notes/a.md", "---\ntitle: A\ntags: [publish]\n---\nBody\n");
    env.config.dry_run = true;

    let report = env.sync();
    assert!(report.written() >= 1);
    assert_eq!(report.assigned_uids, 1);
    assert!(!env.out("content/docs").exists());
    assert!(!env.read_note("notes/a.md").contains("noteUid"));
    assert!(!env.config.state_file().unwrap().exists());
}

#[test]
fn diff_reports_local_output_edits() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.sync();
    assert!(diff(&env.config).expect("diff").diffs.is_empty());

    let target = env.out("content/docs/notes/p.md");
    let edited = format!("{}manual tweak\n", fs::read_to_string(&target).unwrap());
    fs::write(&target, edited).unwrap();

    let result = diff(&env.config).expect("diff");
    assert_eq!(result.diffs.len(), 1);
    let d = &result.diffs[0];
    assert!(d.unified_diff.contains("--- a/content/docs/notes/p.md"));
    assert!(d.unified_diff.contains("-manual tweak"));
    assert!(fs::read_to_string(&target).unwrap().contains("manual tweak"));
}

#[test]
fn status_flags_modified_notes() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    let before = collect(&env.config).expect("status");
    assert!(before.never_synced);

    env.sync();
    env.note("notes/p.md", &published("p-uid", "P", "Changed\n"));

    let status = collect(&env.config).expect("status");
    assert!(!status.never_synced);
    assert_eq!(status.documents.len(), 1);
    assert_eq!(status.documents[0].signal, SyncSignal::Modified);
    assert_eq!(status.published(), 1);
}

// ---------------------------------------------------------------------------
// 7. Incremental passes
// ---------------------------------------------------------------------------

#[test]
fn body_edit_renders_only_that_note() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.note("notes/q.md", &published("q-uid", "Q", "Body\n"));
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("pass");

    env.note("notes/p.md", &published("p-uid", "P", "New body\n"));
    let report = orchestrator
        .apply_change(&ChangeEvent::new("notes/p.md", ChangeOp::Modified))
        .expect("apply");

    assert_eq!(report.rendered, 1);
    assert!(!orchestrator.rerender_pending());
    assert!(env.read_out("content/docs/notes/p.md").ends_with("New body\n"));
    assert!(orchestrator.tick().expect("tick").is_none());
}

#[test]
fn title_change_defers_global_rerender_to_tick() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    env.note("notes/q.md", &published("q-uid", "Q", "See [[Renamed]].\n"));
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("pass");
    assert!(env.read_out("content/docs/notes/q.md").contains("See Renamed."));

    env.note("notes/p.md", &published("p-uid", "Renamed", "Body\n"));
    orchestrator
        .apply_change(&ChangeEvent::new("notes/p.md", ChangeOp::Modified))
        .expect("apply");
    assert!(orchestrator.rerender_pending());

    let report = orchestrator.tick().expect("tick").expect("full pass ran");
    assert!(report.global_rerender);
    assert!(!orchestrator.rerender_pending());
    assert!(env
        .read_out("content/docs/notes/q.md")
        .contains("[Renamed]({{< relref \"docs/notes/p\" >}})"));
}

#[test]
fn removed_event_retires_the_note() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("pass");

    fs::remove_file(env.vault.path().join("notes/p.md")).unwrap();
    let report = orchestrator
        .apply_change(&ChangeEvent::new("notes/p.md", ChangeOp::Removed))
        .expect("apply");

    assert_eq!(deleted_paths(&report), vec![PathBuf::from("content/docs/notes/p.md")]);
    assert!(orchestrator.store().get(&Uid::from("p-uid")).is_none());
    assert!(orchestrator.rerender_pending());
}

#[test]
fn copied_note_is_reported_as_duplicate_incrementally() {
    let env = env();
    env.note("notes/p.md", &published("p-uid", "P", "Body\n"));
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("pass");

    env.note("notes/p copy.md", &published("p-uid", "P", "Body\n"));
    let report = orchestrator
        .apply_change(&ChangeEvent::new("notes/p copy.md", ChangeOp::Created))
        .expect("apply");

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].operation, Operation::Classify);
    assert!(env.out("content/docs/notes/p.md").exists());
}

#[test]
fn colliding_slug_is_rejected_incrementally() {
    let env = env();
    env.note("notes/Foo Bar.md", &published("u-space", "Spaced", "1\n"));
    let mut orchestrator = env.orchestrator();
    orchestrator.full_pass().expect("pass");

    env.note("notes/foo-bar.md", &published("u-dash", "Dashed", "2\n"));
    let report = orchestrator
        .apply_change(&ChangeEvent::new("notes/foo-bar.md", ChangeOp::Created))
        .expect("apply");

    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert_eq!(report.errors[0].operation, Operation::Classify);
    let out = env.read_out("content/docs/notes/foo-bar.md");
    assert!(out.contains("noteUid: \"u-space\""), "{out}");
}

#[test]
fn non_markdown_events_are_ignored() {
    let env = env();
    let mut orchestrator = env.orchestrator();
    let report = orchestrator
        .apply_change(&ChangeEvent::new("img/x.png", ChangeOp::Modified))
        .expect("apply");
    assert_eq!(report.processed, 0);
}
