//! Image references inside note bodies.

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use vaultsync_core::types::{is_asset_path, AssetRef, SourceDocument};

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"!\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)|!\[\[([^\]|]+)(?:\|[^\]]*)?\]\]"#)
            .expect("static regex")
    })
}

/// Every local, supported image referenced by `doc`, vault-relative with `/`
/// separators, in order of first appearance.
pub fn asset_references(doc: &SourceDocument) -> Vec<AssetRef> {
    let mut refs: Vec<AssetRef> = Vec::new();
    for caps in image_re().captures_iter(&doc.body) {
        let (target, alt_text, embed) = match (caps.get(2), caps.get(3)) {
            (Some(path), _) => (
                path.as_str(),
                caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
                false,
            ),
            (None, Some(file)) => (file.as_str().trim(), file.as_str().trim(), true),
            _ => continue,
        };
        let Some(path) = resolve_reference(doc.directory(), target) else {
            continue;
        };
        if !is_supported_asset(Path::new(&path)) || refs.iter().any(|r| r.path == path) {
            continue;
        }
        refs.push(AssetRef {
            path,
            alt_text: alt_text.to_string(),
            embed,
        });
    }
    refs
}

/// Resolve a reference written inside a note in `doc_dir`.
///
/// Remote URLs and paths escaping the vault yield `None`. A leading `/` is
/// relative to the vault root.
pub fn resolve_reference(doc_dir: &Path, target: &str) -> Option<String> {
    let target = target.trim();
    if target.is_empty() || target.contains("://") || target.starts_with("data:") {
        return None;
    }
    let target = target.split(['?', '#']).next().unwrap_or_default().replace("%20", " ");

    let joined = match target.strip_prefix('/') {
        Some(rooted) => Path::new(rooted).to_path_buf(),
        None => doc_dir.join(&target),
    };

    let mut parts: Vec<String> = Vec::new();
    for component in joined.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Image formats copied to the output tree; anything else is left alone.
pub fn is_supported_asset(path: &Path) -> bool {
    is_asset_path(path)
}
