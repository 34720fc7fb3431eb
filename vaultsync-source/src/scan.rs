//! Vault enumeration.

use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{io_err, SourceError};

/// Every `*.md` file below `root`, vault-relative and sorted.
///
/// Hidden files and hidden directories are skipped. Unreadable entries are
/// logged and skipped; an unreadable root is an error.
pub fn scan_vault(root: &Path) -> Result<Vec<PathBuf>, SourceError> {
    if !root.is_dir() {
        return Err(io_err(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "vault root is not a directory"),
        ));
    }

    let mut notes = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_entry(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("skipping unreadable vault entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            notes.push(rel.to_path_buf());
        }
    }

    notes.sort();
    Ok(notes)
}

/// `.md` extension, case-insensitive.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Whether any component of a vault-relative path starts with `.`.
pub fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn is_hidden_entry(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
