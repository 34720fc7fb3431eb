//! Per-pass outcome: counts, file changes and isolated document errors.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::writer::{DeleteResult, WriteResult};

/// What was being attempted when a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Load,
    AssignUid,
    Classify,
    Render,
    Write,
    Delete,
    CopyAsset,
    ReleaseAsset,
    Repair,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Load => "load",
            Operation::AssignUid => "assign-uid",
            Operation::Classify => "classify",
            Operation::Render => "render",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::CopyAsset => "copy-asset",
            Operation::ReleaseAsset => "release-asset",
            Operation::Repair => "repair",
        };
        f.write_str(name)
    }
}

/// A recoverable failure isolated to one document or output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentError {
    pub path: PathBuf,
    pub operation: Operation,
    pub cause: String,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path.display(), self.operation, self.cause)
    }
}

/// Everything one full or incremental pass did.
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    /// Source documents examined.
    pub processed: usize,
    /// Documents in the publish set after the pass.
    pub published: usize,
    /// Documents rendered (whether or not the output changed).
    pub rendered: usize,
    pub writes: Vec<WriteResult>,
    pub deletions: Vec<DeleteResult>,
    pub errors: Vec<DocumentError>,
    /// Every published document was re-rendered against a changed snapshot.
    pub global_rerender: bool,
    /// Uids assigned to notes that had none.
    pub assigned_uids: usize,
    /// Set when the state store could not be saved.
    pub persist_error: Option<String>,
}

impl PassReport {
    pub(crate) fn error(
        &mut self,
        path: impl Into<PathBuf>,
        operation: Operation,
        cause: impl fmt::Display,
    ) {
        let err = DocumentError {
            path: path.into(),
            operation,
            cause: cause.to_string(),
        };
        tracing::error!("{err}");
        self.errors.push(err);
    }

    /// Writes and copies that changed (or would change) a file.
    pub fn written(&self) -> usize {
        self.writes.iter().filter(|w| w.is_change()).count()
    }

    /// Deletions that removed (or would remove) a file.
    pub fn deleted(&self) -> usize {
        self.deletions.iter().filter(|d| d.is_change()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.persist_error.is_none()
    }

    /// Fold an incremental report into a running total.
    pub fn absorb(&mut self, other: PassReport) {
        self.processed += other.processed;
        self.published = other.published;
        self.rendered += other.rendered;
        self.writes.extend(other.writes);
        self.deletions.extend(other.deletions);
        self.errors.extend(other.errors);
        self.global_rerender |= other.global_rerender;
        self.assigned_uids += other.assigned_uids;
        if other.persist_error.is_some() {
            self.persist_error = other.persist_error;
        }
    }

    pub(crate) fn log_summary(&self, label: &str) {
        tracing::info!(
            "{label}: processed={} published={} rendered={} written={} deleted={} errored={}",
            self.processed,
            self.published,
            self.rendered,
            self.written(),
            self.deleted(),
            self.errors.len()
        );
    }
}
