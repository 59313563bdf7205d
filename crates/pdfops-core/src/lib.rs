//! PDF transformation and recovery engine
//!
//! Takes uploaded documents plus a declarative [`Operation`] (crop, rotate,
//! merge, split, organize, watermark, redact, sign, page numbers, repair, ...)
//! and produces a new, structurally valid PDF or a ZIP of PDFs.
//!
//! Everything goes through [`Engine::execute`]. The modules underneath can
//! also be used on their own:
//! - [`ranges`], [`coords`], [`rotation`], [`placement`]: pure geometry and
//!   page-selection helpers
//! - [`transform`], [`stamp`]: in-place edits of a loaded document
//! - [`merge`], [`split`]: building new documents out of existing pages
//! - [`repair`]: byte patching, round-trip repair and raster rebuild

pub mod archive;
pub mod batch;
pub mod command;
pub mod config;
pub mod content;
pub mod coords;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod image;
pub mod merge;
pub mod operations;
pub mod placement;
pub mod ranges;
pub mod render;
pub mod repair;
pub mod rotation;
pub mod split;
pub mod stamp;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use command::{Artifact, ArtifactKind, InputFile, ProcessMetrics, ProcessResult, Warning};
pub use config::EngineConfig;
pub use coords::{to_pdf_rect, to_ui_rect, PageSize, PdfRect, UiRect};
pub use dispatch::{parse_request, Engine};
pub use document::{is_encrypted, page_count, probe, EncryptionProbe};
pub use error::EngineError;
pub use operations::Operation;
pub use ranges::{parse as parse_ranges, PageIndexSet};
pub use render::{CancellationToken, PageRasterizer, RasterDocument, RasterImage, RenderingContext};
pub use repair::{RepairPipeline, RepairReport};
pub use rotation::{normalize_rotation, Rotation};
