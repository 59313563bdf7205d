//! Per-page geometric edits: crop, rotate, redact, plus metadata scrubbing.

use std::collections::BTreeMap;

use lopdf::{dictionary, Document, Object};
use tracing::debug;

use crate::command::Warning;
use crate::content::{embed_page_as_form, Color, CommitMode, PageCanvas, ResourcePool};
use crate::coords::{to_pdf_rect, PageSize, PdfRect, UiRect};
use crate::document::{page_dict_mut, page_ids, page_rotation, page_size};
use crate::error::EngineError;
use crate::operations::{CropParams, RedactParams, RedactionMode, RotateParams, RotationMode};
use crate::ranges;
use crate::rotation::Rotation;

/// Page boxes and annotations that stop making sense once a page is cropped.
const CROP_DROPPED_KEYS: [&[u8]; 5] = [b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox", b"Annots"];

const HIGHLIGHT_OPACITY: f64 = 0.4;

/// Geometry of cropping one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPlan {
    pub source: PageSize,
    /// The kept region, in the source page's space.
    pub crop: PdfRect,
    /// Where the source page is drawn on the new, crop-sized page.
    pub offset: (f64, f64),
}

impl CropPlan {
    pub fn page_size(&self) -> PageSize {
        PageSize::new(self.crop.width, self.crop.height)
    }
}

pub fn plan_crop(ui: &UiRect, source: PageSize) -> Result<CropPlan, EngineError> {
    let crop = to_pdf_rect(ui, source);
    if crop.is_empty() {
        return Err(EngineError::Validation("crop box has no area".into()));
    }
    Ok(CropPlan {
        source,
        crop,
        // crop.y is already H - top - height, so this is -(H - y - h).
        offset: (-crop.x, -crop.y),
    })
}

/// Crop the targeted pages in place. Each cropped page is resized to the
/// crop box and redraws its old self, as a form, shifted by the crop offset.
pub fn crop_pages(doc: &mut Document, params: &CropParams) -> Result<Vec<CropPlan>, EngineError> {
    let pages = page_ids(doc);
    let targets: Vec<usize> = if params.apply_to_all {
        (0..pages.len()).collect()
    } else {
        let page = params.page.ok_or_else(|| {
            EngineError::Validation("a page is required when not cropping all pages".into())
        })?;
        if page == 0 || page > pages.len() {
            return Err(EngineError::Validation(format!(
                "page {} is out of range (document has {} pages)",
                page,
                pages.len()
            )));
        }
        vec![page - 1]
    };

    let plans = targets
        .iter()
        .map(|&index| plan_crop(&params.crop_box, page_size(doc, pages[index])))
        .collect::<Result<Vec<_>, _>>()?;

    let mut pool = ResourcePool::default();
    for (&index, plan) in targets.iter().zip(&plans) {
        let page_id = pages[index];
        let rotation = page_rotation(doc, page_id).rotated_by(params.rotation);
        let form_id = embed_page_as_form(doc, page_id)?;
        {
            let page = page_dict_mut(doc, page_id)?;
            for key in CROP_DROPPED_KEYS {
                page.remove(key);
            }
            page.set(
                "MediaBox",
                vec![
                    0.into(),
                    0.into(),
                    plan.crop.width.into(),
                    plan.crop.height.into(),
                ],
            );
            page.set("Rotate", rotation.degrees());
        }

        let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
        canvas.draw_form(doc, form_id, plan.offset.0, plan.offset.1, None);
        canvas.commit(doc, CommitMode::Replace)?;
        debug!(page = index + 1, width = plan.crop.width, height = plan.crop.height, "cropped page");
    }
    Ok(plans)
}

/// Rotate the pages selected by `params.pages`.
pub fn rotate_pages(doc: &mut Document, params: &RotateParams) -> Result<Vec<Warning>, EngineError> {
    let pages = page_ids(doc);
    let (selection, warnings) = ranges::parse_with_warnings(&params.pages, pages.len());
    if selection.is_empty() {
        return Err(EngineError::Validation(format!(
            "page range '{}' selects no pages",
            params.pages
        )));
    }

    for index in selection.iter() {
        let page_id = pages[index];
        let rotation = match params.mode {
            RotationMode::Relative => page_rotation(doc, page_id).rotated_by(params.angle),
            RotationMode::Absolute => Rotation::normalize(params.angle),
        };
        page_dict_mut(doc, page_id)?.set("Rotate", rotation.degrees());
    }
    Ok(warnings)
}

/// Paint filled rectangles over the requested areas.
///
/// This only hides content visually. The returned warnings always include
/// [`Warning::VisualRedactionOnly`].
pub fn redact_pages(doc: &mut Document, params: &RedactParams) -> Result<Vec<Warning>, EngineError> {
    if params.redactions.is_empty() {
        return Err(EngineError::Validation("no redactions requested".into()));
    }

    let pages = page_ids(doc);
    let mut warnings = Vec::new();
    let mut by_page: BTreeMap<usize, Vec<_>> = BTreeMap::new();
    for entry in &params.redactions {
        if entry.page == 0 || entry.page > pages.len() {
            warnings.push(Warning::SkippedPage {
                page: entry.page,
                reason: format!("document has {} pages", pages.len()),
            });
            continue;
        }
        by_page.entry(entry.page - 1).or_default().push(entry);
    }

    let mut pool = ResourcePool::default();
    for (index, entries) in by_page {
        let page_id = pages[index];
        let size = page_size(doc, page_id);
        let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
        for entry in entries {
            let rect = to_pdf_rect(&entry.rect, size);
            if rect.is_empty() {
                continue;
            }
            let (color, opacity) = match entry.mode {
                RedactionMode::Redact => (
                    entry
                        .color
                        .as_deref()
                        .map_or(Color::BLACK, |c| Color::parse_or(c, Color::BLACK)),
                    entry.opacity.unwrap_or(1.0),
                ),
                RedactionMode::Highlight => {
                    let yellow = Color::rgb(1.0, 1.0, 0.0);
                    (
                        entry
                            .color
                            .as_deref()
                            .map_or(yellow, |c| Color::parse_or(c, yellow)),
                        entry.opacity.unwrap_or(HIGHLIGHT_OPACITY),
                    )
                }
            };
            canvas.fill_rect(doc, &rect, color, opacity);
        }
        canvas.commit(doc, CommitMode::Overlay)?;
    }

    warnings.push(Warning::VisualRedactionOnly);
    Ok(warnings)
}

/// Drop the document information entries and XMP metadata, leaving only
/// fresh creation and modification dates.
pub fn clean_metadata(doc: &mut Document) -> Result<(), EngineError> {
    let stamp = format!("D:{}Z", chrono::Utc::now().format("%Y%m%d%H%M%S"));
    let info_id = doc.add_object(dictionary! {
        "CreationDate" => Object::string_literal(stamp.clone()),
        "ModDate" => Object::string_literal(stamp),
    });
    doc.trailer.set("Info", info_id);

    let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    doc.get_object_mut(catalog_id)
        .and_then(Object::as_dict_mut)?
        .remove(b"Metadata");
    for page_id in page_ids(doc) {
        page_dict_mut(doc, page_id)?.remove(b"Metadata");
    }

    doc.prune_objects();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{effective_resources, load_document, media_box, number, resolve_dict};
    use crate::test_support::{sample_document, sample_pdf};
    use lopdf::content::Content;
    use pretty_assertions::assert_eq;

    fn crop_all(rect: UiRect) -> CropParams {
        CropParams {
            crop_box: rect,
            rotation: 0.0,
            apply_to_all: true,
            page: None,
        }
    }

    #[test]
    fn test_crop_offset_matches_top_left_box() {
        let plan = plan_crop(
            &UiRect::new(10.0, 10.0, 50.0, 50.0),
            PageSize::new(600.0, 800.0),
        )
        .unwrap();
        assert!((plan.page_size().width - 300.0).abs() < 1e-9);
        assert!((plan.page_size().height - 400.0).abs() < 1e-9);
        assert!((plan.offset.0 + 60.0).abs() < 1e-9);
        assert!((plan.offset.1 + 320.0).abs() < 1e-9);
    }

    #[test]
    fn test_crop_rejects_empty_box() {
        let err = plan_crop(&UiRect::new(10.0, 10.0, 0.0, 50.0), PageSize::LETTER).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_crop_rewrites_page_as_offset_form() {
        let mut doc = sample_document(2, 600.0, 800.0);
        let plans = crop_pages(&mut doc, &crop_all(UiRect::new(10.0, 10.0, 50.0, 50.0))).unwrap();
        assert_eq!(plans.len(), 2);

        let page_id = page_ids(&doc)[0];
        let [_, _, width, height] = media_box(&doc, page_id);
        assert!((width - 300.0).abs() < 1e-3 && (height - 400.0).abs() < 1e-3);

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .unwrap();
        let e = number(&cm.operands[4]).unwrap();
        let f = number(&cm.operands[5]).unwrap();
        assert!((e + 60.0).abs() < 1e-3);
        assert!((f + 320.0).abs() < 1e-3);

        let resources = effective_resources(&doc, page_id);
        let xobjects = resolve_dict(&doc, resources.get(b"XObject").unwrap()).unwrap();
        assert_eq!(xobjects.len(), 1);
    }

    #[test]
    fn test_crop_single_page_leaves_others_alone() {
        let mut doc = sample_document(3, 600.0, 800.0);
        let params = CropParams {
            apply_to_all: false,
            page: Some(2),
            ..crop_all(UiRect::new(0.0, 0.0, 50.0, 50.0))
        };
        crop_pages(&mut doc, &params).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(page_size(&doc, ids[0]), PageSize::new(600.0, 800.0));
        assert_eq!(page_size(&doc, ids[1]), PageSize::new(300.0, 400.0));
    }

    #[test]
    fn test_crop_requires_valid_target_page() {
        let mut doc = sample_document(1, 600.0, 800.0);
        let params = CropParams {
            apply_to_all: false,
            page: Some(4),
            ..crop_all(UiRect::new(0.0, 0.0, 50.0, 50.0))
        };
        assert!(matches!(
            crop_pages(&mut doc, &params),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_rotate_relative_and_absolute() {
        let mut doc = load_document(&sample_pdf(3)).unwrap();
        let relative = RotateParams {
            angle: 450.0,
            pages: "1-2".into(),
            mode: RotationMode::Relative,
        };
        rotate_pages(&mut doc, &relative).unwrap();
        rotate_pages(&mut doc, &relative).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(page_rotation(&doc, ids[0]), Rotation::Deg180);
        assert_eq!(page_rotation(&doc, ids[2]), Rotation::Deg0);

        let absolute = RotateParams {
            angle: -90.0,
            pages: "all".into(),
            mode: RotationMode::Absolute,
        };
        rotate_pages(&mut doc, &absolute).unwrap();
        for id in page_ids(&doc) {
            assert_eq!(page_rotation(&doc, id), Rotation::Deg270);
        }
    }

    #[test]
    fn test_rotate_empty_selection_fails() {
        let mut doc = load_document(&sample_pdf(2)).unwrap();
        let params = RotateParams {
            angle: 90.0,
            pages: "7-9".into(),
            mode: RotationMode::Relative,
        };
        assert!(matches!(
            rotate_pages(&mut doc, &params),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_redaction_always_warns_and_skips_bad_pages() {
        let mut doc = load_document(&sample_pdf(2)).unwrap();
        let params: RedactParams = serde_json::from_str(
            r#"{"redactions":[
                {"page":1,"rect":{"x":10,"y":10,"width":20,"height":5}},
                {"page":9,"rect":{"x":10,"y":10,"width":20,"height":5}},
                {"page":2,"rect":{"x":0,"y":0,"width":100,"height":10},"mode":"highlight"}
            ]}"#,
        )
        .unwrap();
        let warnings = redact_pages(&mut doc, &params).unwrap();
        assert_eq!(
            warnings,
            vec![
                Warning::SkippedPage {
                    page: 9,
                    reason: "document has 2 pages".into()
                },
                Warning::VisualRedactionOnly,
            ]
        );

        let first = page_ids(&doc)[0];
        let ops = Content::decode(&doc.get_page_content(first).unwrap()).unwrap();
        assert!(ops.operations.iter().any(|op| op.operator == "re"));
        // the underlying text is untouched
        assert!(ops.operations.iter().any(|op| op.operator == "Tj"));
    }

    #[test]
    fn test_clean_metadata_replaces_info() {
        let mut doc = load_document(&sample_pdf(1)).unwrap();
        let old_info = doc.add_object(dictionary! {
            "Author" => Object::string_literal("someone"),
            "Title" => Object::string_literal("secret"),
        });
        doc.trailer.set("Info", old_info);

        clean_metadata(&mut doc).unwrap();

        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_object(info_id).unwrap().as_dict().unwrap();
        assert!(!info.has(b"Author"));
        assert!(!info.has(b"Title"));
        assert!(info.has(b"ModDate"));
        assert!(doc.get_object(old_info).is_err());
    }
}
