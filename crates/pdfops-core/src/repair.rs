//! Recovery of damaged documents.
//!
//! The pipeline patches missing header/trailer markers, then tries a plain
//! load-and-save round trip. If that fails (or a visual rebuild was asked
//! for) every page is rasterized and the document is rebuilt from images.

use lopdf::Document;
use tracing::{debug, info, warn};

use crate::command::Warning;
use crate::config::EngineConfig;
use crate::content::{CommitMode, PageCanvas, ResourcePool};
use crate::coords::{PageSize, PdfRect};
use crate::document::{save_document, DocumentBuilder};
use crate::error::EngineError;
use crate::image::DecodedImage;
use crate::operations::RepairMode;
use crate::render::{CancellationToken, RasterDocument, RenderingContext};

const PDF_HEADER: &[u8] = b"%PDF-1.7\n";
const PDF_EOF: &[u8] = b"\n%%EOF";
/// How many bytes at each end are searched for the markers.
const MARKER_WINDOW: usize = 10;

/// What the byte-level patch changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub header_added: bool,
    pub eof_added: bool,
}

/// Prepend a `%PDF-` header and append `%%EOF` when either is missing.
pub fn patch_bytes(bytes: &[u8]) -> (Vec<u8>, PatchReport) {
    let head = &bytes[..bytes.len().min(MARKER_WINDOW)];
    let tail = &bytes[bytes.len().saturating_sub(MARKER_WINDOW)..];
    let report = PatchReport {
        header_added: !contains(head, b"%PDF-"),
        eof_added: !contains(tail, b"%%EOF"),
    };

    let mut patched = Vec::with_capacity(bytes.len() + PDF_HEADER.len() + PDF_EOF.len());
    if report.header_added {
        patched.extend_from_slice(PDF_HEADER);
    }
    patched.extend_from_slice(bytes);
    if report.eof_added {
        patched.extend_from_slice(PDF_EOF);
    }
    (patched, report)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// States the pipeline passed through, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RepairStage {
    Patched(PatchReport),
    StructurallyValid,
    StructurallyInvalid(String),
    RasterAttempt,
    RasterSuccess { pages_recovered: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    /// The object model survived; text and vectors are intact.
    Structural,
    /// Rebuilt from page images; only the look survived.
    Raster { pages_recovered: usize },
}

#[derive(Debug)]
pub struct RepairReport {
    pub bytes: Vec<u8>,
    pub kind: RepairKind,
    pub patch: PatchReport,
    pub stages: Vec<RepairStage>,
    pub warnings: Vec<Warning>,
}

pub struct RepairPipeline<'a> {
    rendering: &'a RenderingContext,
    raster_scale: f32,
}

impl<'a> RepairPipeline<'a> {
    pub fn new(rendering: &'a RenderingContext, config: &EngineConfig) -> Self {
        Self {
            rendering,
            raster_scale: config.raster_scale,
        }
    }

    pub fn run(
        &self,
        bytes: &[u8],
        mode: RepairMode,
        cancel: &CancellationToken,
    ) -> Result<RepairReport, EngineError> {
        let (patched, patch) = patch_bytes(bytes);
        let mut stages = vec![RepairStage::Patched(patch)];
        debug!(?patch, "patched input");

        if mode == RepairMode::Auto {
            match structural_round_trip(&patched) {
                Ok(repaired) => {
                    stages.push(RepairStage::StructurallyValid);
                    info!("structural repair succeeded");
                    return Ok(RepairReport {
                        bytes: repaired,
                        kind: RepairKind::Structural,
                        patch,
                        stages,
                        warnings: Vec::new(),
                    });
                }
                Err(err) => {
                    warn!(error = %err, "structural repair failed, rasterizing");
                    stages.push(RepairStage::StructurallyInvalid(err.to_string()));
                }
            }
        }

        stages.push(RepairStage::RasterAttempt);
        let raster = self
            .rendering
            .open(&patched)
            .map_err(|e| EngineError::Unrecoverable(format!("cannot open for rendering: {}", e)))?;
        let (bytes, pages_recovered, mut warnings) = self.rebuild_from_raster(raster.as_ref(), cancel)?;
        stages.push(RepairStage::RasterSuccess { pages_recovered });
        warnings.push(Warning::RasterReconstructed { pages_recovered });
        info!(pages_recovered, "rebuilt document from page images");

        Ok(RepairReport {
            bytes,
            kind: RepairKind::Raster { pages_recovered },
            patch,
            stages,
            warnings,
        })
    }

    fn rebuild_from_raster(
        &self,
        source: &dyn RasterDocument,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, usize, Vec<Warning>), EngineError> {
        let scale = self.raster_scale;
        let mut builder = DocumentBuilder::new();
        let mut pool = ResourcePool::default();
        let mut warnings = Vec::new();

        for index in 0..source.page_count() {
            if cancel.is_cancelled() {
                return Err(EngineError::Unrecoverable("repair cancelled".into()));
            }
            let raster = match source.render_page(index, scale, cancel) {
                Ok(raster) if raster.width > 0 && raster.height > 0 => raster,
                Ok(_) => {
                    warnings.push(Warning::SkippedPage {
                        page: index + 1,
                        reason: "rendered an empty image".into(),
                    });
                    continue;
                }
                Err(_) if cancel.is_cancelled() => {
                    return Err(EngineError::Unrecoverable("repair cancelled".into()));
                }
                Err(err) => {
                    warn!(page = index + 1, error = %err, "failed to recover page");
                    warnings.push(Warning::SkippedPage {
                        page: index + 1,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let size = PageSize::new(
                raster.width as f64 / scale as f64,
                raster.height as f64 / scale as f64,
            );
            let page_id = builder.add_blank_page(size);
            let doc = builder.document_mut();
            let image_id = DecodedImage::from_raster(&raster).embed(doc)?;
            let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
            canvas.draw_image(
                doc,
                image_id,
                &PdfRect::new(0.0, 0.0, size.width, size.height),
                0.0,
                1.0,
            );
            canvas.commit(doc, CommitMode::Replace)?;
        }

        let pages_recovered = builder.page_count();
        if pages_recovered == 0 {
            return Err(EngineError::Unrecoverable(
                "Could not recover any pages from the PDF".into(),
            ));
        }
        Ok((builder.finish()?, pages_recovered, warnings))
    }
}

/// Load and immediately re-save. Encrypted documents are written back
/// without recompression so their streams stay decryptable.
fn structural_round_trip(bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
    let mut doc = Document::load_mem(bytes)
        .map_err(|e| EngineError::StructurallyInvalid(e.to_string()))?;
    if doc.get_pages().is_empty() {
        return Err(EngineError::StructurallyInvalid("document has no pages".into()));
    }
    if doc.is_encrypted() {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| EngineError::Operation(format!("Save failed: {}", e)))?;
        return Ok(buffer);
    }
    save_document(&mut doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{load_document, page_ids, page_size};
    use crate::render::fake::FakeRasterizer;
    use crate::test_support::sample_pdf;
    use pretty_assertions::assert_eq;

    fn context(pages: usize, failing: &[usize]) -> RenderingContext {
        let mut fake = FakeRasterizer::with_pages(pages);
        fake.failing.extend(failing.iter().copied());
        RenderingContext::new(fake)
    }

    fn strip_markers(bytes: &[u8]) -> Vec<u8> {
        let start = bytes
            .iter()
            .position(|&b| b == b'\n')
            .map_or(0, |newline| newline + 1);
        let mut end = bytes.len();
        while end > 0 && bytes[..end].ends_with(b"\n") {
            end -= 1;
        }
        let body = &bytes[start..end];
        body[..body.len() - b"%%EOF".len()].to_vec()
    }

    #[test]
    fn test_patch_adds_missing_markers() {
        let (patched, report) = patch_bytes(b"1 0 obj << >> endobj");
        assert_eq!(
            report,
            PatchReport {
                header_added: true,
                eof_added: true
            }
        );
        assert!(patched.starts_with(b"%PDF-1.7\n"));
        assert!(patched.ends_with(b"\n%%EOF"));
    }

    #[test]
    fn test_patch_leaves_well_formed_bytes_alone() {
        let bytes = sample_pdf(1);
        let (patched, report) = patch_bytes(&bytes);
        assert_eq!(report, PatchReport::default());
        assert_eq!(patched, bytes);
    }

    #[test]
    fn test_patch_handles_tiny_input() {
        let (patched, report) = patch_bytes(b"");
        assert!(report.header_added && report.eof_added);
        assert_eq!(patched, b"%PDF-1.7\n\n%%EOF".to_vec());
    }

    #[test]
    fn test_valid_document_repairs_structurally() {
        let ctx = context(0, &[]);
        let report = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(&sample_pdf(3), RepairMode::Auto, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.kind, RepairKind::Structural);
        assert_eq!(
            report.stages,
            vec![
                RepairStage::Patched(PatchReport::default()),
                RepairStage::StructurallyValid
            ]
        );
        assert_eq!(load_document(&report.bytes).unwrap().get_pages().len(), 3);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_markers_are_patched_before_loading() {
        let ctx = context(2, &[]);
        let damaged = strip_markers(&sample_pdf(2));
        let report = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(&damaged, RepairMode::Auto, &CancellationToken::new())
            .unwrap();
        assert!(report.patch.header_added);
        assert!(report.patch.eof_added);
        assert_eq!(report.stages[0], RepairStage::Patched(report.patch));
    }

    #[test]
    fn test_garbage_falls_back_to_raster() {
        let ctx = context(3, &[1]);
        let report = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(b"definitely not a pdf", RepairMode::Auto, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.kind, RepairKind::Raster { pages_recovered: 2 });
        assert!(matches!(report.stages[1], RepairStage::StructurallyInvalid(_)));
        assert_eq!(report.stages[2], RepairStage::RasterAttempt);
        assert_eq!(
            report.warnings,
            vec![
                Warning::SkippedPage {
                    page: 2,
                    reason: "Render failed: page 1 is damaged".into()
                },
                Warning::RasterReconstructed { pages_recovered: 2 },
            ]
        );

        // 100x50 pt pages rendered at 2x come back at their point size.
        let doc = load_document(&report.bytes).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(ids.len(), 2);
        assert_eq!(page_size(&doc, ids[0]), PageSize::new(100.0, 50.0));
    }

    #[test]
    fn test_visual_mode_skips_structural_attempt() {
        let ctx = context(1, &[]);
        let report = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(&sample_pdf(1), RepairMode::Visual, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.kind, RepairKind::Raster { pages_recovered: 1 });
        assert!(!report
            .stages
            .iter()
            .any(|stage| matches!(stage, RepairStage::StructurallyValid)));
    }

    #[test]
    fn test_no_recoverable_pages_is_unrecoverable() {
        let ctx = context(2, &[0, 1]);
        let err = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(b"junk", RepairMode::Auto, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unrecoverable(_)));
    }

    #[test]
    fn test_without_renderer_garbage_is_unrecoverable() {
        let ctx = RenderingContext::unavailable();
        let err = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(b"junk", RepairMode::Auto, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unrecoverable(_)));
    }

    #[test]
    fn test_cancelled_repair_stops() {
        let ctx = context(2, &[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = RepairPipeline::new(&ctx, &EngineConfig::default())
            .run(b"junk", RepairMode::Auto, &cancel)
            .unwrap_err();
        assert!(matches!(err, EngineError::Unrecoverable(ref reason) if reason == "repair cancelled"));
    }
}
