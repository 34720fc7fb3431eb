//! Tera rendering engine: [`Renderer`].
//!
//! # Output files
//!
//! | Kind          | Path                                   | Template                 |
//! |---------------|----------------------------------------|--------------------------|
//! | Document      | `<content_dir>/<dirs>/<slug>.md`       | `document.md.tera`       |
//! | Section index | `<content_dir>/<dirs>/_index.md`       | `section_index.md.tera`  |
//!
//! Rendering is a pure function of (document, snapshot, weight): the same
//! inputs always produce byte-identical output.

use std::path::{Path, PathBuf};

use tera::Tera;

use vaultsync_core::config::Config;
use vaultsync_core::types::{CrossReference, SourceDocument};

use crate::context::{DocumentContext, SectionContext};
use crate::error::RenderError;
use crate::links::{transform_body, LinkStyle};
use crate::slug::{section_title, Layout, SECTION_INDEX};
use crate::snapshot::PublishSet;

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const DOCUMENT_TEMPLATE: &str = "document.md.tera";
const SECTION_TEMPLATE: &str = "section_index.md.tera";

const TPLS: &[(&str, &str)] = &[
    (DOCUMENT_TEMPLATE, include_str!("templates/document.md.tera")),
    (SECTION_TEMPLATE, include_str!("templates/section_index.md.tera")),
];

fn build_tera() -> Result<Tera, RenderError> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_templates(TPLS.iter().map(|(name, body)| (*name, *body)))?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// RenderedOutput
// ---------------------------------------------------------------------------

/// One serialized output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    /// Repo-relative path.
    pub path: PathBuf,
    pub content: String,
    /// References found while rendering, resolved or not.
    pub cross_references: Vec<CrossReference>,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Stateless across calls. Create once per configuration and reuse.
pub struct Renderer {
    tera: Tera,
    layout: Layout,
    style: LinkStyle,
}

impl Renderer {
    pub fn new(layout: Layout, style: LinkStyle) -> Result<Self, RenderError> {
        Ok(Renderer {
            tera: build_tera()?,
            layout,
            style,
        })
    }

    /// Layout and link style from a resolved [`Config`].
    pub fn from_config(config: &Config) -> Result<Self, RenderError> {
        Self::new(
            Layout::new(&config.content_dir),
            LinkStyle {
                format: config.link_format,
                unpublished: config.unpublished_link,
            },
        )
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Render `doc` against `snapshot`.
    pub fn render(
        &self,
        doc: &SourceDocument,
        snapshot: &PublishSet,
        weight: i64,
    ) -> Result<RenderedOutput, RenderError> {
        let uid = doc.uid().ok_or_else(|| RenderError::MissingUid {
            path: doc.path.clone(),
        })?;
        let path = self.layout.output_path(&doc.path, &uid);

        let transformed =
            transform_body(&doc.body, doc.directory(), snapshot, &self.layout, self.style);

        let ctx = DocumentContext::new(
            &doc.title(),
            weight,
            uid.as_str(),
            doc.modified_at,
            transformed.body,
        )?;
        let content = self.tera.render(DOCUMENT_TEMPLATE, &ctx.to_tera_context()?)?;

        Ok(RenderedOutput {
            path,
            content,
            cross_references: transformed.cross_references,
        })
    }

    /// `_index.md` for a section directory (repo-relative).
    pub fn render_section_index(&self, dir: &Path, weight: i64) -> Result<RenderedOutput, RenderError> {
        let ctx = SectionContext::new(&section_title(dir), weight)?;
        let content = self.tera.render(SECTION_TEMPLATE, &ctx.to_tera_context()?)?;
        Ok(RenderedOutput {
            path: dir.join(SECTION_INDEX),
            content,
            cross_references: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
