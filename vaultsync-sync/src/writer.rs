//! Target tree writers.
//!
//! The orchestrator only talks to the output repository through
//! [`TargetWriter`]. Two implementations ship here:
//!
//! - [`FsWriter`] writes straight to disk. Each write goes to a hidden
//!   `.<name>.vaultsync.tmp` sibling and is renamed into place, so a reader
//!   never sees a half-written file. Content identical to what is on disk is
//!   reported as [`WriteResult::Unchanged`] and leaves the file untouched.
//! - [`DryRunWriter`] records what would change in an in-memory overlay and
//!   answers reads through that overlay, so a whole pass behaves as if the
//!   writes happened while the disk stays as it was.
//!
//! All paths passed to a writer are relative to the repository root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of an individual file write or copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped: on-disk content already matches.
    Unchanged { path: PathBuf },
    /// Dry run: the file *would* have been written.
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written { path } | Self::Unchanged { path } | Self::WouldWrite { path } => path,
        }
    }

    /// True for anything other than [`WriteResult::Unchanged`].
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }
}

/// Outcome of an individual delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted { path: PathBuf },
    /// Nothing to delete.
    Missing { path: PathBuf },
    /// Dry run: the file *would* have been deleted.
    WouldDelete { path: PathBuf },
}

impl DeleteResult {
    pub fn path(&self) -> &Path {
        match self {
            Self::Deleted { path } | Self::Missing { path } | Self::WouldDelete { path } => path,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Missing { .. })
    }
}

// ---------------------------------------------------------------------------
// TargetWriter
// ---------------------------------------------------------------------------

/// Write, delete and inventory operations on the output tree.
pub trait TargetWriter {
    /// Absolute repository root.
    fn root(&self) -> &Path;

    /// Write `content` (line endings normalised to LF) at `rel`.
    fn write(&mut self, rel: &Path, content: &str) -> Result<WriteResult, SyncError>;

    /// Delete the file at `rel` and prune directories left empty, stopping
    /// below the content root.
    fn delete(&mut self, rel: &Path) -> Result<DeleteResult, SyncError>;

    /// Copy an absolute `source` file to `rel`, preserving its modification
    /// time. Same size and same mtime short-circuits to `Unchanged`.
    fn copy_file(&mut self, source: &Path, rel: &Path) -> Result<WriteResult, SyncError>;

    /// Set the modification time of `rel` to now. Missing files are ignored.
    fn touch(&mut self, rel: &Path) -> Result<(), SyncError>;

    /// Text content of `rel`, `None` when absent.
    fn read(&self, rel: &Path) -> Result<Option<String>, SyncError>;

    fn exists(&self, rel: &Path) -> bool;

    fn modified(&self, rel: &Path) -> Result<Option<SystemTime>, SyncError>;

    /// Every non-hidden file below `dir`, repository-relative and sorted.
    fn inventory(&self, dir: &Path) -> Result<Vec<PathBuf>, SyncError>;
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n")
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.vaultsync.tmp"))
}

fn read_optional(path: &Path) -> Result<Option<String>, SyncError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

fn modified_optional(path: &Path) -> Result<Option<SystemTime>, SyncError> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some).map_err(|e| io_err(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Same length and same mtime as `source`.
fn same_stamp(source: &fs::Metadata, dest: &Path) -> bool {
    let Ok(dest_meta) = fs::metadata(dest) else {
        return false;
    };
    source.len() == dest_meta.len()
        && FileTime::from_last_modification_time(source)
            == FileTime::from_last_modification_time(&dest_meta)
}

fn walk_files(root: &Path, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let base = root.join(dir);
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(&base).into_iter().filter_entry(|entry| {
        entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable output entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

// ---------------------------------------------------------------------------
// FsWriter
// ---------------------------------------------------------------------------

/// Direct filesystem writer.
#[derive(Debug, Clone)]
pub struct FsWriter {
    root: PathBuf,
    content_dir: PathBuf,
}

impl FsWriter {
    /// `content_dir` is relative to `root`; directory pruning stops there.
    pub fn new(root: impl Into<PathBuf>, content_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            content_dir: content_dir.into(),
        }
    }

    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let stop = self.root.join(&self.content_dir);
        let mut current = start.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == stop || !dir.starts_with(&stop) {
                break;
            }
            let empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty || fs::remove_dir(&dir).is_err() {
                break;
            }
            tracing::debug!("removed empty directory {}", dir.display());
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}

fn atomic_write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;
    if let Err(e) = fs::rename(tmp, path) {
        let _ = fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

impl TargetWriter for FsWriter {
    fn root(&self) -> &Path {
        &self.root
    }

    fn write(&mut self, rel: &Path, content: &str) -> Result<WriteResult, SyncError> {
        let path = self.root.join(rel);
        let content = normalize(content);

        if read_optional(&path)?.as_deref() == Some(content.as_str()) {
            tracing::debug!("unchanged: {}", rel.display());
            return Ok(WriteResult::Unchanged {
                path: rel.to_path_buf(),
            });
        }

        atomic_write_with_tmp(&path, &content, &tmp_path_for(&path))?;
        tracing::info!("wrote: {}", rel.display());
        Ok(WriteResult::Written {
            path: rel.to_path_buf(),
        })
    }

    fn delete(&mut self, rel: &Path) -> Result<DeleteResult, SyncError> {
        let path = self.root.join(rel);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DeleteResult::Missing {
                    path: rel.to_path_buf(),
                });
            }
            Err(e) => return Err(io_err(&path, e)),
        }
        self.prune_empty_dirs(path.parent());
        tracing::info!("deleted: {}", rel.display());
        Ok(DeleteResult::Deleted {
            path: rel.to_path_buf(),
        })
    }

    fn copy_file(&mut self, source: &Path, rel: &Path) -> Result<WriteResult, SyncError> {
        let dest = self.root.join(rel);
        let source_meta = fs::metadata(source).map_err(|e| io_err(source, e))?;
        if same_stamp(&source_meta, &dest) {
            return Ok(WriteResult::Unchanged {
                path: rel.to_path_buf(),
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = tmp_path_for(&dest);
        fs::copy(source, &tmp).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &dest) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(&dest, e));
        }
        filetime::set_file_mtime(&dest, FileTime::from_last_modification_time(&source_meta))
            .map_err(|e| io_err(&dest, e))?;

        tracing::info!("copied asset: {}", rel.display());
        Ok(WriteResult::Written {
            path: rel.to_path_buf(),
        })
    }

    fn touch(&mut self, rel: &Path) -> Result<(), SyncError> {
        let path = self.root.join(rel);
        if !path.exists() {
            return Ok(());
        }
        filetime::set_file_mtime(&path, FileTime::now()).map_err(|e| io_err(&path, e))
    }

    fn read(&self, rel: &Path) -> Result<Option<String>, SyncError> {
        read_optional(&self.root.join(rel))
    }

    fn exists(&self, rel: &Path) -> bool {
        self.root.join(rel).is_file()
    }

    fn modified(&self, rel: &Path) -> Result<Option<SystemTime>, SyncError> {
        modified_optional(&self.root.join(rel))
    }

    fn inventory(&self, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        walk_files(&self.root, dir)
    }
}

// ---------------------------------------------------------------------------
// DryRunWriter
// ---------------------------------------------------------------------------

/// A change the dry-run writer would have made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Write(String),
    /// Copy from this absolute source path.
    Copy(PathBuf),
    Delete,
}

/// Recording writer: reads fall through to disk, changes stay in memory.
#[derive(Debug, Clone)]
pub struct DryRunWriter {
    root: PathBuf,
    pending: BTreeMap<PathBuf, PendingChange>,
}

impl DryRunWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: BTreeMap::new(),
        }
    }

    /// Everything that would change, keyed by repository-relative path.
    pub fn pending(&self) -> &BTreeMap<PathBuf, PendingChange> {
        &self.pending
    }
}

impl TargetWriter for DryRunWriter {
    fn root(&self) -> &Path {
        &self.root
    }

    fn write(&mut self, rel: &Path, content: &str) -> Result<WriteResult, SyncError> {
        let content = normalize(content);
        if self.read(rel)?.as_deref() == Some(content.as_str()) {
            return Ok(WriteResult::Unchanged {
                path: rel.to_path_buf(),
            });
        }
        tracing::info!("[dry-run] would write: {}", rel.display());
        self.pending
            .insert(rel.to_path_buf(), PendingChange::Write(content));
        Ok(WriteResult::WouldWrite {
            path: rel.to_path_buf(),
        })
    }

    fn delete(&mut self, rel: &Path) -> Result<DeleteResult, SyncError> {
        if !self.exists(rel) {
            return Ok(DeleteResult::Missing {
                path: rel.to_path_buf(),
            });
        }
        if self.root.join(rel).is_file() {
            self.pending.insert(rel.to_path_buf(), PendingChange::Delete);
        } else {
            self.pending.remove(rel);
        }
        tracing::info!("[dry-run] would delete: {}", rel.display());
        Ok(DeleteResult::WouldDelete {
            path: rel.to_path_buf(),
        })
    }

    fn copy_file(&mut self, source: &Path, rel: &Path) -> Result<WriteResult, SyncError> {
        let source_meta = fs::metadata(source).map_err(|e| io_err(source, e))?;
        if !self.pending.contains_key(rel) && same_stamp(&source_meta, &self.root.join(rel)) {
            return Ok(WriteResult::Unchanged {
                path: rel.to_path_buf(),
            });
        }
        tracing::info!("[dry-run] would copy asset: {}", rel.display());
        self.pending
            .insert(rel.to_path_buf(), PendingChange::Copy(source.to_path_buf()));
        Ok(WriteResult::WouldWrite {
            path: rel.to_path_buf(),
        })
    }

    fn touch(&mut self, _rel: &Path) -> Result<(), SyncError> {
        Ok(())
    }

    fn read(&self, rel: &Path) -> Result<Option<String>, SyncError> {
        match self.pending.get(rel) {
            Some(PendingChange::Write(content)) => Ok(Some(content.clone())),
            Some(PendingChange::Copy(source)) => read_optional(source),
            Some(PendingChange::Delete) => Ok(None),
            None => read_optional(&self.root.join(rel)),
        }
    }

    fn exists(&self, rel: &Path) -> bool {
        match self.pending.get(rel) {
            Some(PendingChange::Delete) => false,
            Some(_) => true,
            None => self.root.join(rel).is_file(),
        }
    }

    fn modified(&self, rel: &Path) -> Result<Option<SystemTime>, SyncError> {
        match self.pending.get(rel) {
            Some(PendingChange::Delete) => Ok(None),
            Some(_) => Ok(Some(SystemTime::now())),
            None => modified_optional(&self.root.join(rel)),
        }
    }

    fn inventory(&self, dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
        let mut files: Vec<PathBuf> = walk_files(&self.root, dir)?
            .into_iter()
            .filter(|path| !matches!(self.pending.get(path), Some(PendingChange::Delete)))
            .collect();
        for (path, change) in &self.pending {
            if !matches!(change, PendingChange::Delete) && path.starts_with(dir) {
                files.push(path.clone());
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
