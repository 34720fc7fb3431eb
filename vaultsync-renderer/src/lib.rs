//! # vaultsync-renderer
//!
//! Link resolution and output serialization for published notes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vaultsync_renderer::{Layout, LinkStyle, PublishSet, Renderer};
//! use vaultsync_core::types::SourceDocument;
//!
//! fn render_all(docs: &[SourceDocument]) {
//!     let layout = Layout::new("content/docs");
//!     let snapshot = PublishSet::build(docs.iter().filter(|d| d.is_published()), &layout);
//!     if let Ok(renderer) = Renderer::new(layout, LinkStyle::default()) {
//!         for doc in docs.iter().filter(|d| d.is_published()) {
//!             let Some(uid) = doc.uid() else { continue };
//!             let weight = snapshot.weight_for(&uid, true);
//!             if let Ok(out) = renderer.render(doc, &snapshot, weight) {
//!                 println!("{}: {} bytes", out.path.display(), out.content.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod links;
pub mod slug;
pub mod snapshot;

pub use engine::{RenderedOutput, Renderer};
pub use error::RenderError;
pub use links::{extract_cross_references, LinkStyle};
pub use slug::Layout;
pub use snapshot::{PublishSet, PublishedDoc};
