//! Filesystem notifications to vault change events.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use vaultsync_core::{ChangeEvent, ChangeOp};
use vaultsync_source::{is_hidden, is_markdown};

use crate::error::DaemonError;

/// Keeps the OS watcher alive for as long as events are wanted.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `vault` recursively. Relevant notifications arrive on the returned
/// receiver as vault-relative [`ChangeEvent`]s.
pub fn watch(
    vault: &Path,
) -> Result<(VaultWatcher, mpsc::UnboundedReceiver<ChangeEvent>), DaemonError> {
    // Notifications carry real paths; match them against the canonical root.
    let root = std::fs::canonicalize(vault).unwrap_or_else(|_| vault.to_path_buf());
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ChangeEvent>();

    let callback_root = root.clone();
    let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) => {
            for change in translate(&callback_root, &event) {
                let _ = event_tx.send(change);
            }
        }
        Err(err) => tracing::warn!(error = %err, "watcher event error"),
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(vault = %root.display(), "watching vault");

    Ok((VaultWatcher { _watcher: watcher }, event_rx))
}

/// Map one notify event to zero or more change events.
///
/// Only non-hidden markdown paths under `root` survive. For a rename that
/// reports both ends, the destination comes first so the move is seen
/// while the old path is already gone.
pub fn translate(root: &Path, event: &Event) -> Vec<ChangeEvent> {
    let Some(op) = change_op(&event.kind) else {
        return Vec::new();
    };

    let mut paths: Vec<&PathBuf> = event.paths.iter().collect();
    if matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both))) {
        paths.reverse();
    }

    paths
        .into_iter()
        .filter_map(|path| relevant_path(root, path))
        .map(|rel| ChangeEvent::new(rel, op))
        .collect()
}

fn change_op(kind: &EventKind) -> Option<ChangeOp> {
    match kind {
        EventKind::Create(_) => Some(ChangeOp::Created),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeOp::Renamed),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(ChangeOp::Modified),
        EventKind::Remove(_) => Some(ChangeOp::Removed),
        _ => None,
    }
}

fn relevant_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() || !is_markdown(rel) || is_hidden(rel) {
        return None;
    }
    Some(rel.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn maps_kinds_to_ops() {
        let root = Path::new("/vault");
        let cases = [
            (EventKind::Create(CreateKind::File), ChangeOp::Created),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                ChangeOp::Modified,
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                ChangeOp::Renamed,
            ),
            (EventKind::Remove(RemoveKind::File), ChangeOp::Removed),
        ];
        for (kind, op) in cases {
            let out = translate(root, &event(kind, &["/vault/notes/a.md"]));
            assert_eq!(out, vec![ChangeEvent::new("notes/a.md", op)]);
        }
    }

    #[test]
    fn drops_irrelevant_paths() {
        let root = Path::new("/vault");
        let kind = EventKind::Create(CreateKind::File);
        for path in [
            "/vault/img/a.png",
            "/vault/.obsidian/workspace.md",
            "/vault/notes/.a.md.swp",
            "/elsewhere/a.md",
        ] {
            assert!(translate(root, &event(kind, &[path])).is_empty(), "{path}");
        }
    }

    #[test]
    fn metadata_and_access_events_are_ignored() {
        let root = Path::new("/vault");
        let touched = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            &["/vault/a.md"],
        );
        assert!(translate(root, &touched).is_empty());
        let read = event(
            EventKind::Access(notify::event::AccessKind::Read),
            &["/vault/a.md"],
        );
        assert!(translate(root, &read).is_empty());
    }

    #[test]
    fn rename_with_both_ends_lists_destination_first() {
        let root = Path::new("/vault");
        let out = translate(
            root,
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/vault/old.md", "/vault/new/place.md"],
            ),
        );
        assert_eq!(
            out,
            vec![
                ChangeEvent::new("new/place.md", ChangeOp::Renamed),
                ChangeEvent::new("old.md", ChangeOp::Renamed),
            ]
        );
    }
}
