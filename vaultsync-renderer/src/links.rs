//! Cross-reference resolution.
//!
//! # Body transform order
//!
//! 1. Escape example shortcodes (`{{< relref "path" >}}` → `{{</* relref "path" */>}}`)
//! 2. Protect explicit links, then fenced code, then inline code
//! 3. Rewrite `![[asset]]` embeds to plain image links
//! 4. Substitute `[[target#section|text]]` against the publish set
//! 5. Restore protected spans
//!
//! Protection order matters: a later pattern must never match text that an
//! earlier placeholder already replaced.

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use vaultsync_core::config::{LinkFormat, UnpublishedLink};
use vaultsync_core::types::{is_asset_path, CrossReference};

use crate::slug::{anchor, Layout};
use crate::snapshot::PublishSet;

/// Shortcode paths that only ever appear as documentation examples.
pub const EXAMPLE_SHORTCODE_PATHS: &[&str] =
    &["folder/slug", "folder/note", "path", "folder/path", "docs/path"];

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

fn wikilink_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").expect("static regex"))
}

fn embed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[\[([^\]|]+)(?:\|([^\]]*))?\]\]").expect("static regex"))
}

fn explicit_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]\[]*)\]\(([^)]*)\)").expect("static regex"))
}

fn fenced_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("static regex"))
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`\n]*`").expect("static regex"))
}

fn shortcode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\{\{<\s*(\w+)\s+"([^"]+)"\s*>\}\}"#).expect("static regex"))
}

/// How resolved and unresolved references are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStyle {
    pub format: LinkFormat,
    pub unpublished: UnpublishedLink,
}

/// Result of transforming one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedBody {
    pub body: String,
    pub cross_references: Vec<CrossReference>,
}

/// Apply the full body transform for a note living in `doc_dir`.
pub fn transform_body(
    body: &str,
    doc_dir: &Path,
    snapshot: &PublishSet,
    layout: &Layout,
    style: LinkStyle,
) -> TransformedBody {
    let escaped = escape_example_shortcodes(body);

    let mut spans = ProtectedSpans::for_text(&escaped);
    let mut text = spans.protect(&escaped, explicit_link_re(), 'l');
    text = spans.protect(&text, fenced_code_re(), 'c');
    text = spans.protect(&text, inline_code_re(), 'i');

    text = rewrite_embeds(&text, doc_dir, layout);

    let mut cross_references = Vec::new();
    let text = wikilink_re()
        .replace_all(&text, |caps: &Captures| {
            let reference = parse_reference(caps, doc_dir);
            let rendered = render_reference(&reference, snapshot, style);
            cross_references.push(reference);
            rendered
        })
        .into_owned();

    TransformedBody {
        body: spans.restore(text),
        cross_references,
    }
}

/// Cross-references outside code spans, in order of appearance.
pub fn extract_cross_references(body: &str, doc_dir: &Path) -> Vec<CrossReference> {
    let mut spans = ProtectedSpans::for_text(body);
    let mut text = spans.protect(body, fenced_code_re(), 'c');
    text = spans.protect(&text, inline_code_re(), 'i');
    wikilink_re()
        .captures_iter(&text)
        .map(|caps| parse_reference(&caps, doc_dir))
        .collect()
}

/// Neutralise shortcodes whose path is a known documentation example.
pub fn escape_example_shortcodes(body: &str) -> String {
    shortcode_re()
        .replace_all(body, |caps: &Captures| {
            let name = &caps[1];
            let path = &caps[2];
            if EXAMPLE_SHORTCODE_PATHS.contains(&path) {
                format!("{{{{</* {name} \"{path}\" */>}}}}")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Reference handling
// ---------------------------------------------------------------------------

fn parse_reference(caps: &Captures, doc_dir: &Path) -> CrossReference {
    let target = caps[1].trim();
    let display_text = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| target.to_string());

    let (key, section) = match target.split_once('#') {
        Some((key, section)) => (key.trim(), Some(section.trim().to_string())),
        None => (target, None),
    };
    let target_key = if key.starts_with("../") || key.starts_with("./") {
        resolve_relative(doc_dir, key)
    } else {
        key.to_string()
    };

    CrossReference {
        raw: caps[0].to_string(),
        target_key,
        display_text,
        section,
    }
}

fn render_reference(reference: &CrossReference, snapshot: &PublishSet, style: LinkStyle) -> String {
    let fragment = reference
        .section
        .as_deref()
        .map(anchor)
        .filter(|a| !a.is_empty())
        .map(|a| format!("#{a}"))
        .unwrap_or_default();

    if reference.target_key.is_empty() {
        // Same-document heading link.
        return if fragment.is_empty() {
            reference.display_text.clone()
        } else {
            format!("[{}]({fragment})", reference.display_text)
        };
    }

    match snapshot.lookup(&reference.target_key) {
        Some(target) => match style.format {
            LinkFormat::Relref => format!(
                "[{}]({{{{< relref \"{}{fragment}\" >}}}})",
                reference.display_text, target.link
            ),
            LinkFormat::Md => format!("[{}](/{}/{fragment})", reference.display_text, target.link),
        },
        None => match style.unpublished {
            UnpublishedLink::Text => reference.display_text.clone(),
            UnpublishedLink::Hash => format!("[{}](#)", reference.display_text),
        },
    }
}

/// `![[file.png]]` → `![file.png](/docs/dir/file.png)`; other embeds become
/// ordinary cross-references.
fn rewrite_embeds(text: &str, doc_dir: &Path, layout: &Layout) -> String {
    embed_re()
        .replace_all(text, |caps: &Captures| {
            let target = caps[1].trim();
            if is_asset_path(Path::new(target)) {
                let key = resolve_relative(doc_dir, target);
                let alt = caps
                    .get(2)
                    .map(|m| m.as_str().trim())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(target);
                format!("![{alt}]({})", layout.asset_url(&key))
            } else {
                caps[0][1..].to_string()
            }
        })
        .into_owned()
}

/// Join `target` onto `doc_dir`, folding `.` and `..`, `/`-separated.
fn resolve_relative(doc_dir: &Path, target: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in doc_dir.join(target).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.join("/")
}

// ---------------------------------------------------------------------------
// Literal span protection
// ---------------------------------------------------------------------------

/// Per-render scratch: protected spans in protection order.
#[derive(Debug)]
struct ProtectedSpans {
    /// Token prefix that does not occur anywhere in the input.
    prefix: String,
    spans: Vec<(String, String)>,
}

impl ProtectedSpans {
    fn for_text(text: &str) -> Self {
        let mut salt = 0usize;
        let mut prefix = format!("{OPEN}{salt}:");
        while text.contains(&prefix) {
            salt += 1;
            prefix = format!("{OPEN}{salt}:");
        }
        Self {
            prefix,
            spans: Vec::new(),
        }
    }

    /// Replace each match of `re` with a unique placeholder.
    fn protect(&mut self, text: &str, re: &Regex, kind: char) -> String {
        re.replace_all(text, |caps: &Captures| {
            let token = format!("{}{kind}{}{CLOSE}", self.prefix, self.spans.len());
            self.spans.push((token.clone(), caps[0].to_string()));
            token
        })
        .into_owned()
    }

    /// Restore in reverse so spans nested inside later placeholders come back too.
    fn restore(self, mut text: String) -> String {
        for (token, original) in self.spans.into_iter().rev() {
            text = text.replacen(&token, &original, 1);
        }
        text
    }
}
