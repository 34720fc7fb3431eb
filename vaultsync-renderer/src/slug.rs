//! Canonical output locations.
//!
//! # Path mapping
//!
//! | Vault path                   | Output path (content_dir = `content/docs`) | Link path               |
//! |------------------------------|--------------------------------------------|-------------------------|
//! | `guides/seo.md`              | `content/docs/guides/seo.md`               | `docs/guides/seo`       |
//! | `My Notes/Read_Me.md`        | `content/docs/my-notes/read-me.md`         | `docs/my-notes/read-me` |
//! | `Intro.md`                   | `content/docs/posts/intro.md`              | `docs/posts/intro`      |
//! | `guides/img/chart.png` asset | `content/docs/guides/img/chart.png`        | `/docs/guides/img/chart.png` |
//!
//! Link paths are relative to the content root (the first component of
//! `content_dir`), not to `content_dir` itself.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use vaultsync_core::types::Uid;

/// Subdirectory for notes at the vault root.
pub const ROOT_SECTION: &str = "posts";
pub const UNTITLED: &str = "untitled";
pub const SECTION_INDEX: &str = "_index.md";

const MAX_SLUG_LEN: usize = 50;
const TRUNCATED_LEN: usize = 42;

fn non_alnum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

fn separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ _]+").expect("static regex"))
}

/// Filename slug without extension.
///
/// Slugs longer than 50 characters keep their first 42 and gain
/// `-<first 8 of uid>`.
pub fn slugify(file_name: &str, uid: &Uid) -> String {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    let lowered = stem.to_lowercase();
    let slug = non_alnum_re().replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { UNTITLED } else { slug };

    if slug.len() > MAX_SLUG_LEN {
        // ASCII only after the regex pass, so byte slicing is safe.
        format!("{}-{}", &slug[..TRUNCATED_LEN], uid.short())
    } else {
        slug.to_string()
    }
}

/// Directory segment: lowercase, runs of spaces and underscores become `-`.
pub fn normalize_segment(segment: &str) -> String {
    separator_re()
        .replace_all(&segment.to_lowercase(), "-")
        .into_owned()
}

/// Anchor for a `#section` suffix.
pub fn anchor(section: &str) -> String {
    let lowered = section.trim().to_lowercase();
    non_alnum_re()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Maps vault-relative locations onto the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    content_dir: PathBuf,
}

impl Layout {
    /// `content_dir` is relative to the output repository root.
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    /// Repo-relative output path for a note.
    pub fn output_path(&self, source: &Path, uid: &Uid) -> PathBuf {
        let mut out = self.content_dir.clone();
        let segments = directory_segments(source);
        if segments.is_empty() {
            out.push(ROOT_SECTION);
        }
        for segment in segments {
            out.push(normalize_segment(&segment));
        }
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push(format!("{}.md", slugify(&file_name, uid)));
        out
    }

    /// Link target for an output path: content-root relative, `/`-separated,
    /// without the `.md` extension.
    pub fn link_path(&self, output: &Path) -> String {
        let mut parts = path_parts(self.content_root_relative(output));
        if let Some(last) = parts.last_mut() {
            if let Some(stripped) = last.strip_suffix(".md") {
                *last = stripped.to_string();
            }
        }
        parts.join("/")
    }

    /// Repo-relative output path for a vault-relative asset key.
    pub fn asset_output(&self, asset: &str) -> PathBuf {
        let mut out = self.content_dir.clone();
        for part in asset.split('/').filter(|p| !p.is_empty()) {
            out.push(part);
        }
        out
    }

    /// Absolute site URL of an asset, e.g. `/docs/guides/img/chart.png`.
    pub fn asset_url(&self, asset: &str) -> String {
        let output = self.asset_output(asset);
        let parts = path_parts(self.content_root_relative(&output));
        format!("/{}", parts.join("/").replace(' ', "%20"))
    }

    /// Every directory between `content_dir` (exclusive) and `output`'s parent
    /// (inclusive), outermost first.
    pub fn section_dirs(&self, output: &Path) -> Vec<PathBuf> {
        let Some(parent) = output.parent() else {
            return Vec::new();
        };
        let Ok(below) = parent.strip_prefix(&self.content_dir) else {
            return Vec::new();
        };
        let mut dirs = Vec::new();
        let mut current = self.content_dir.clone();
        for component in below.components() {
            if let Component::Normal(part) = component {
                current.push(part);
                dirs.push(current.clone());
            }
        }
        dirs
    }

    /// Depth of a section directory below `content_dir`, starting at 0.
    pub fn section_depth(&self, dir: &Path) -> usize {
        dir.strip_prefix(&self.content_dir)
            .map(|rel| rel.components().count().saturating_sub(1))
            .unwrap_or(0)
    }

    fn content_root_relative<'a>(&self, path: &'a Path) -> &'a Path {
        match self.content_dir.components().next() {
            Some(Component::Normal(root)) => path.strip_prefix(root).unwrap_or(path),
            _ => path,
        }
    }
}

/// Folder weight: `100 * (depth + 1)`.
pub fn folder_weight(depth: usize) -> i64 {
    100 * (depth as i64 + 1)
}

/// Title for a section index: `getting-started` → `Getting Started`.
pub fn section_title(dir: &Path) -> String {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split(['-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn directory_segments(source: &Path) -> Vec<String> {
    source
        .parent()
        .map(|dir| path_parts(dir))
        .unwrap_or_default()
}

fn path_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
