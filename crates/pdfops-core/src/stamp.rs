//! Stamping operations that add marks on top of (or beneath) page content:
//! watermarks, signature images and page numbers.

use lopdf::{Document, ObjectId};
use tracing::debug;

use crate::command::Warning;
use crate::config::EngineConfig;
use crate::content::{
    embed_page_as_form, BlendMode, Color, CommitMode, PageCanvas, ResourcePool, StandardFont,
    TEXT_HEIGHT_RATIO,
};
use crate::coords::{to_pdf_rect, PageSize};
use crate::document::{page_ids, page_size};
use crate::error::EngineError;
use crate::image::DecodedImage;
use crate::operations::{
    Layer, PageNumberParams, SignParams, SignaturePlacement, WatermarkContent, WatermarkParams,
};
use crate::placement::{self, fit_contain, named_box};
use crate::ranges::{self, PageIndexSet};

enum Mark {
    Text {
        text: String,
        font: StandardFont,
        color: Color,
    },
    Image {
        id: ObjectId,
        aspect_ratio: f64,
        width_percent: Option<f64>,
    },
}

/// Width of a text watermark and the font size that produces it, shrunk so
/// the text never exceeds `max_width`.
pub fn fit_text(font: StandardFont, text: &str, font_size: f64, max_width: f64) -> (f64, f64) {
    let width = font.text_width(text, font_size);
    if width > max_width && width > 0.0 {
        (max_width, font_size * max_width / width)
    } else {
        (width, font_size)
    }
}

/// Draw a text or image watermark on every selected page.
pub fn watermark_pages(
    doc: &mut Document,
    params: &WatermarkParams,
    config: &EngineConfig,
) -> Result<Vec<Warning>, EngineError> {
    let pages = page_ids(doc);
    let (selection, warnings) = ranges::parse_with_warnings(&params.pages, pages.len());
    if selection.is_empty() {
        return Err(EngineError::Validation(format!(
            "page range '{}' selects no pages",
            params.pages
        )));
    }
    if !is_usable_font_size(params.font_size) {
        return Err(EngineError::Validation("font size must be positive".into()));
    }

    let mark = match &params.content {
        WatermarkContent::Text {
            text,
            color,
            font_family,
            bold,
        } => {
            if text.trim().is_empty() {
                return Err(EngineError::Validation("watermark text is empty".into()));
            }
            Mark::Text {
                text: text.clone(),
                font: StandardFont::from_family(font_family, *bold),
                color: Color::parse_or(color, Color::GRAY),
            }
        }
        WatermarkContent::Image {
            data,
            width_percent,
        } => {
            let image = DecodedImage::decode_data_url(data)?;
            Mark::Image {
                id: image.embed(doc)?,
                aspect_ratio: image.aspect_ratio(),
                width_percent: *width_percent,
            }
        }
    };

    // Screen rotation is clockwise, PDF rotation counter-clockwise.
    let rotation = -params.rotation;
    let mut pool = ResourcePool::default();
    for index in selection.iter() {
        let page_id = pages[index];
        let size = page_size(doc, page_id);
        let under = match params.layer {
            Layer::Over => None,
            Layer::Under => Some(embed_page_as_form(doc, page_id)?),
        };

        let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
        match &mark {
            Mark::Text { text, font, color } => {
                let max_width = size.width * config.watermark_max_width_ratio;
                let (width, font_size) = fit_text(*font, text, params.font_size, max_width);
                let placed = placement::plan(
                    &params.anchor,
                    size,
                    (width, font_size * TEXT_HEIGHT_RATIO),
                    rotation,
                    params.opacity,
                );
                for rect in &placed.boxes {
                    canvas.draw_text(
                        doc,
                        text,
                        *font,
                        font_size,
                        *color,
                        rect,
                        placed.rotation,
                        placed.opacity,
                    );
                }
            }
            Mark::Image {
                id,
                aspect_ratio,
                width_percent,
            } => {
                let width = width_percent
                    .map(|percent| size.width * percent.clamp(0.0, 100.0) / 100.0)
                    .unwrap_or(params.font_size * 2.0);
                let placed = placement::plan(
                    &params.anchor,
                    size,
                    (width, width / aspect_ratio),
                    rotation,
                    params.opacity,
                );
                for rect in &placed.boxes {
                    canvas.draw_image(doc, *id, rect, placed.rotation, placed.opacity);
                }
            }
        }

        match under {
            // The old page goes back on top, multiplied so the mark shows
            // through light areas.
            Some(form_id) => {
                canvas.draw_form(doc, form_id, 0.0, 0.0, Some(BlendMode::Multiply));
                canvas.commit(doc, CommitMode::Replace)?;
            }
            None => canvas.commit(doc, CommitMode::Overlay)?,
        }
    }
    debug!(pages = selection.len(), "watermarked");
    Ok(warnings)
}

/// Resolve a signature page selector: `first`, `last`, `all` or a range.
pub fn signature_pages(spec: &str, total_pages: usize) -> PageIndexSet {
    match spec.trim().to_ascii_lowercase().as_str() {
        "first" => PageIndexSet::from_indices([0], total_pages),
        "last" => PageIndexSet::from_indices(total_pages.checked_sub(1), total_pages),
        "all" | "" => PageIndexSet::all(total_pages),
        other => ranges::parse(other, total_pages),
    }
}

/// Stamp a signature image on the selected pages.
pub fn sign_pages(
    doc: &mut Document,
    params: &SignParams,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let pages = page_ids(doc);
    let selection = signature_pages(&params.pages, pages.len());
    if selection.is_empty() {
        return Err(EngineError::Validation(format!(
            "'{}' selects no pages to sign",
            params.pages
        )));
    }
    if let SignaturePlacement::Box { rect } = &params.placement {
        let clamped = rect.clamped();
        if clamped.width <= 0.0 || clamped.height <= 0.0 {
            return Err(EngineError::Validation("signature box has no area".into()));
        }
    }

    let image = DecodedImage::decode_data_url(&params.image)?;
    let image_id = image.embed(doc)?;
    let (image_width, image_height) = (image.width as f64, image.height as f64);

    let mut pool = ResourcePool::default();
    for index in selection.iter() {
        let page_id = pages[index];
        let size = page_size(doc, page_id);
        let target = match &params.placement {
            SignaturePlacement::Box { rect } => {
                fit_contain(image_width, image_height, &to_pdf_rect(rect, size))
            }
            SignaturePlacement::Named { position, scale } => named_box(
                *position,
                size,
                (image_width * scale.factor(), image_height * scale.factor()),
                config.signature_margin,
            ),
        };
        let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
        canvas.draw_image(doc, image_id, &target, 0.0, 1.0);
        canvas.commit(doc, CommitMode::Overlay)?;
    }
    Ok(())
}

/// Label the selected pages. Numbering counts selected pages only, so the
/// total shown is the last number printed.
pub fn number_pages(
    doc: &mut Document,
    params: &PageNumberParams,
    config: &EngineConfig,
) -> Result<Vec<Warning>, EngineError> {
    let pages = page_ids(doc);
    let (selection, warnings) = ranges::parse_with_warnings(&params.pages, pages.len());
    if selection.is_empty() {
        return Err(EngineError::Validation(format!(
            "page range '{}' selects no pages",
            params.pages
        )));
    }
    let font_size = params.font_size.unwrap_or(config.default_font_size);
    if !is_usable_font_size(font_size) {
        return Err(EngineError::Validation("font size must be positive".into()));
    }

    let font = StandardFont::from_family(&params.font_family, false);
    let color = Color::parse_or(&params.color, Color::BLACK);
    // Every printed number is at most `last`, so the per-page sums below cannot overflow.
    let last = params
        .start_from
        .checked_add(selection.len() - 1)
        .ok_or_else(|| EngineError::Validation("start_from is too large".into()))?;

    let mut pool = ResourcePool::default();
    for (offset, index) in selection.iter().enumerate() {
        let page_id = pages[index];
        let label = params.format.label(params.start_from + offset, last);
        let size: PageSize = page_size(doc, page_id);
        let rect = named_box(
            params.position,
            size,
            (font.text_width(&label, font_size), font_size * TEXT_HEIGHT_RATIO),
            params.margin,
        );
        let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
        canvas.draw_text(doc, &label, font, font_size, color, &rect, 0.0, 1.0);
        canvas.commit(doc, CommitMode::Overlay)?;
    }
    Ok(warnings)
}

fn is_usable_font_size(size: f64) -> bool {
    size.is_finite() && size > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{effective_resources, load_document, resolve_dict};
    use crate::operations::NumberFormat;
    use crate::placement::Anchor;
    use crate::test_support::{png_bytes, sample_pdf};
    use base64::Engine as _;
    use lopdf::content::Content;
    use lopdf::Object;
    use pretty_assertions::assert_eq;

    fn shown_strings(doc: &Document, page_id: ObjectId) -> Vec<String> {
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    fn count_operator(doc: &Document, page_id: ObjectId, operator: &str) -> usize {
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
            .iter()
            .filter(|op| op.operator == operator)
            .count()
    }

    fn png_data_url(width: u32, height: u32) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_bytes(width, height))
        )
    }

    fn text_watermark(anchor: Anchor) -> WatermarkParams {
        WatermarkParams {
            content: WatermarkContent::Text {
                text: "DRAFT".into(),
                color: "#ff0000".into(),
                font_family: "Helvetica".into(),
                bold: true,
            },
            anchor,
            rotation: 45.0,
            opacity: 0.3,
            font_size: 48.0,
            layer: Layer::Over,
            pages: "all".into(),
        }
    }

    #[test]
    fn test_fit_text_shrinks_only_when_too_wide() {
        let font = StandardFont::Helvetica;
        let (width, size) = fit_text(font, "WIDE WATERMARK TEXT", 200.0, 100.0);
        assert!((width - 100.0).abs() < 1e-9);
        assert!(size < 200.0);
        assert!((font.text_width("WIDE WATERMARK TEXT", size) - 100.0).abs() < 1e-6);

        let (_, unchanged) = fit_text(font, "ok", 12.0, 500.0);
        assert_eq!(unchanged, 12.0);
    }

    #[test]
    fn test_mosaic_text_watermark_draws_twelve_copies() {
        let mut doc = load_document(&sample_pdf(2)).unwrap();
        watermark_pages(&mut doc, &text_watermark(Anchor::Mosaic), &EngineConfig::default())
            .unwrap();
        for page_id in page_ids(&doc) {
            let strings = shown_strings(&doc, page_id);
            assert_eq!(strings.iter().filter(|s| *s == "DRAFT").count(), 12);
        }
    }

    #[test]
    fn test_under_layer_redraws_page_with_multiply() {
        let mut doc = load_document(&sample_pdf(1)).unwrap();
        let params = WatermarkParams {
            layer: Layer::Under,
            ..text_watermark(Anchor::default())
        };
        watermark_pages(&mut doc, &params, &EngineConfig::default()).unwrap();

        let page_id = page_ids(&doc)[0];
        // Original text now lives in the form, not the page stream.
        assert_eq!(shown_strings(&doc, page_id), vec!["DRAFT".to_string()]);
        assert_eq!(count_operator(&doc, page_id, "Do"), 1);

        let resources = effective_resources(&doc, page_id);
        let states = resolve_dict(&doc, resources.get(b"ExtGState").unwrap()).unwrap();
        let multiply = states.iter().any(|(_, value)| {
            resolve_dict(&doc, value)
                .map_or(false, |gs| {
                    matches!(gs.get(b"BM"), Ok(Object::Name(name)) if name == b"Multiply")
                })
        });
        assert!(multiply);
    }

    #[test]
    fn test_empty_watermark_text_is_rejected() {
        let mut doc = load_document(&sample_pdf(1)).unwrap();
        let mut params = text_watermark(Anchor::default());
        params.content = WatermarkContent::Text {
            text: "   ".into(),
            color: "#000".into(),
            font_family: "Helvetica".into(),
            bold: false,
        };
        assert!(matches!(
            watermark_pages(&mut doc, &params, &EngineConfig::default()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_image_watermark_on_selected_pages() {
        let mut doc = load_document(&sample_pdf(3)).unwrap();
        let params = WatermarkParams {
            content: WatermarkContent::Image {
                data: png_data_url(40, 20),
                width_percent: Some(50.0),
            },
            pages: "2".into(),
            ..text_watermark(Anchor::default())
        };
        watermark_pages(&mut doc, &params, &EngineConfig::default()).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(count_operator(&doc, ids[0], "Do"), 0);
        assert_eq!(count_operator(&doc, ids[1], "Do"), 1);
    }

    #[test]
    fn test_signature_page_selectors() {
        assert_eq!(signature_pages("first", 4).as_slice(), &[0]);
        assert_eq!(signature_pages("LAST", 4).as_slice(), &[3]);
        assert_eq!(signature_pages("all", 3).as_slice(), &[0, 1, 2]);
        assert_eq!(signature_pages("2-3", 4).as_slice(), &[1, 2]);
        assert!(signature_pages("last", 0).is_empty());
    }

    #[test]
    fn test_sign_last_page_with_named_position() {
        let mut doc = load_document(&sample_pdf(3)).unwrap();
        let params: SignParams = serde_json::from_value(serde_json::json!({
            "image": png_data_url(200, 100),
            "placement": {"kind": "named", "position": "bottom-right", "scale": "large"},
            "pages": "last",
        }))
        .unwrap();
        sign_pages(&mut doc, &params, &EngineConfig::default()).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(count_operator(&doc, ids[0], "Do"), 0);
        assert_eq!(count_operator(&doc, ids[2], "Do"), 1);
    }

    #[test]
    fn test_sign_rejects_empty_box() {
        let mut doc = load_document(&sample_pdf(1)).unwrap();
        let params: SignParams = serde_json::from_value(serde_json::json!({
            "image": png_data_url(10, 10),
            "placement": {"kind": "box", "rect": {"x": 10, "y": 10, "width": 0, "height": 5}},
        }))
        .unwrap();
        assert!(matches!(
            sign_pages(&mut doc, &params, &EngineConfig::default()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_page_numbers_count_selected_pages() {
        let mut doc = load_document(&sample_pdf(4)).unwrap();
        let params = PageNumberParams {
            format: NumberFormat::PageOfTotal,
            start_from: 3,
            pages: "2-3".into(),
            ..PageNumberParams::default()
        };
        number_pages(&mut doc, &params, &EngineConfig::default()).unwrap();
        let ids = page_ids(&doc);
        assert_eq!(shown_strings(&doc, ids[0]), vec!["Page 1".to_string()]);
        assert_eq!(
            shown_strings(&doc, ids[1]),
            vec!["Page 2".to_string(), "Page 3 of 4".to_string()]
        );
        assert_eq!(
            shown_strings(&doc, ids[2]),
            vec!["Page 3".to_string(), "Page 4 of 4".to_string()]
        );
    }

    #[test]
    fn test_page_numbers_reject_start_past_usize_range() {
        let mut doc = load_document(&sample_pdf(2)).unwrap();
        let params = PageNumberParams {
            start_from: usize::MAX,
            ..PageNumberParams::default()
        };
        let err = number_pages(&mut doc, &params, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref msg) if msg == "start_from is too large"));

        // A single selected page can still carry the largest number.
        let params = PageNumberParams {
            start_from: usize::MAX,
            pages: "1".into(),
            ..PageNumberParams::default()
        };
        number_pages(&mut doc, &params, &EngineConfig::default()).unwrap();
    }

    #[test]
    fn test_non_finite_font_sizes_are_rejected() {
        let mut doc = load_document(&sample_pdf(2)).unwrap();
        for size in [f64::NAN, f64::INFINITY, 0.0, -4.0] {
            let params = PageNumberParams {
                font_size: Some(size),
                ..PageNumberParams::default()
            };
            assert!(
                matches!(
                    number_pages(&mut doc, &params, &EngineConfig::default()),
                    Err(EngineError::Validation(_))
                ),
                "font size {}",
                size
            );

            let mut watermark = text_watermark(Anchor::default());
            watermark.font_size = size;
            assert!(matches!(
                watermark_pages(&mut doc, &watermark, &EngineConfig::default()),
                Err(EngineError::Validation(_))
            ));
        }
    }
}
