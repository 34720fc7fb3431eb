//! Dry-run unified diff support for `vaultsync diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use vaultsync_core::config::Config;

use crate::error::io_err;
use crate::pipeline::dry_run;
use crate::report::PassReport;
use crate::writer::PendingChange;
use crate::SyncError;

/// A single output file that a sync would change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Repository-relative path.
    pub path: PathBuf,
    pub unified_diff: String,
}

#[derive(Debug, Clone)]
pub struct DiffResult {
    /// The dry-run pass that produced the diffs.
    pub report: PassReport,
    pub diffs: Vec<FileDiff>,
}

/// Compute what `sync` would change and compare it to current on-disk content.
///
/// No files are written.
pub fn diff(config: &Config) -> Result<DiffResult, SyncError> {
    let (report, writer) = dry_run(config)?;

    let mut diffs = Vec::new();
    for (path, change) in writer.pending() {
        let absolute = config.repo.join(path);
        let unified_diff = match change {
            PendingChange::Write(rendered) => {
                let existing = read_existing_or_empty(&absolute)?;
                if existing == *rendered {
                    continue;
                }
                unified(path, &existing, rendered)
            }
            PendingChange::Delete => unified(path, &read_existing_or_empty(&absolute)?, ""),
            PendingChange::Copy(source) => format!(
                "Binary asset {} would be copied from {}\n",
                path.display(),
                source.display()
            ),
        };
        diffs.push(FileDiff {
            path: path.clone(),
            unified_diff,
        });
    }

    Ok(DiffResult { report, diffs })
}

fn unified(path: &Path, old: &str, new: &str) -> String {
    let old_header = format!("a/{}", path.display());
    let new_header = format!("b/{}", path.display());
    TextDiff::from_lines(old, new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).replace("\r\n", "\n")),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_diff_has_git_style_headers() {
        let out = unified(Path::new("content/docs/a.md"), "one\ntwo\n", "one\nthree\n");
        assert!(out.contains("--- a/content/docs/a.md"));
        assert!(out.contains("+++ b/content/docs/a.md"));
        assert!(out.contains("-two"));
        assert!(out.contains("+three"));
    }

    #[test]
    fn deletion_diff_removes_every_line() {
        let out = unified(Path::new("x.md"), "a\nb\n", "");
        assert!(out.contains("-a\n"));
        assert!(out.contains("-b\n"));
        assert!(!out.contains("\n+a"));
    }
}
