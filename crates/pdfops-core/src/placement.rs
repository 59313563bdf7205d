//! Where stamps, watermarks and signatures land on a page.

use serde::{Deserialize, Serialize};

use crate::coords::{to_pdf_point, PageSize, PdfRect, UiPoint};

/// Columns and rows of the tiled watermark grid.
pub const MOSAIC_COLUMNS: usize = 3;
pub const MOSAIC_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedPosition {
    TopLeft,
    TopCenter,
    TopRight,
    Center,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Where a stamp goes on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anchor {
    /// Stamp centered on a UI percentage point.
    Point { x: f64, y: f64 },
    /// Stamp at a named spot, `margin` points in from the edges.
    Named {
        position: NamedPosition,
        #[serde(default)]
        margin: f64,
    },
    /// Stamp repeated on the 3x4 grid.
    Mosaic,
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::Named {
            position: NamedPosition::Center,
            margin: 0.0,
        }
    }
}

/// Resolved draw boxes for one page. Rotation (degrees, counter-clockwise in
/// PDF space, about each box's center) and opacity are carried through as given.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementResult {
    pub boxes: Vec<PdfRect>,
    pub rotation: f64,
    pub opacity: f64,
}

/// Plan every box for a stamp of `size` (width, height in points).
pub fn plan(
    anchor: &Anchor,
    page: PageSize,
    size: (f64, f64),
    rotation: f64,
    opacity: f64,
) -> PlacementResult {
    let boxes = match anchor {
        Anchor::Point { x, y } => {
            let center = to_pdf_point(&UiPoint { x: *x, y: *y }, page);
            vec![centered_box(center, size)]
        }
        Anchor::Named { position, margin } => vec![named_box(*position, page, size, *margin)],
        Anchor::Mosaic => mosaic_centers(page)
            .into_iter()
            .map(|center| centered_box(center, size))
            .collect(),
    };
    PlacementResult {
        boxes,
        rotation,
        opacity,
    }
}

/// Centers of the 3x4 grid cells, row-major from the bottom-left cell.
pub fn mosaic_centers(page: PageSize) -> Vec<(f64, f64)> {
    let step_x = page.width / MOSAIC_COLUMNS as f64;
    let step_y = page.height / MOSAIC_ROWS as f64;
    let mut centers = Vec::with_capacity(MOSAIC_COLUMNS * MOSAIC_ROWS);
    for row in 0..MOSAIC_ROWS {
        for col in 0..MOSAIC_COLUMNS {
            centers.push((
                col as f64 * step_x + step_x / 2.0,
                row as f64 * step_y + step_y / 2.0,
            ));
        }
    }
    centers
}

pub fn centered_box(center: (f64, f64), size: (f64, f64)) -> PdfRect {
    let (width, height) = size;
    PdfRect::new(center.0 - width / 2.0, center.1 - height / 2.0, width, height)
}

/// Box of `size` at a named position, inset by `margin` from the touching edges.
pub fn named_box(position: NamedPosition, page: PageSize, size: (f64, f64), margin: f64) -> PdfRect {
    let (width, height) = size;
    let left = margin;
    let center_x = (page.width - width) / 2.0;
    let right = page.width - width - margin;
    let top = page.height - height - margin;
    let middle = (page.height - height) / 2.0;
    let bottom = margin;

    let (x, y) = match position {
        NamedPosition::TopLeft => (left, top),
        NamedPosition::TopCenter => (center_x, top),
        NamedPosition::TopRight => (right, top),
        NamedPosition::Center => (center_x, middle),
        NamedPosition::BottomLeft => (left, bottom),
        NamedPosition::BottomCenter => (center_x, bottom),
        NamedPosition::BottomRight => (right, bottom),
    };
    PdfRect::new(x, y, width, height)
}

/// Largest box with the image's aspect ratio that fits inside `target`,
/// centered in it.
pub fn fit_contain(image_width: f64, image_height: f64, target: &PdfRect) -> PdfRect {
    if image_width <= 0.0 || image_height <= 0.0 || target.is_empty() {
        return PdfRect::new(target.x, target.y, 0.0, 0.0);
    }
    let image_aspect = image_width / image_height;
    let box_aspect = target.width / target.height;

    let (final_width, final_height) = if image_aspect > box_aspect {
        (target.width, target.width / image_aspect)
    } else {
        (target.height * image_aspect, target.height)
    };

    PdfRect::new(
        target.x + (target.width - final_width) / 2.0,
        target.y + (target.height - final_height) / 2.0,
        final_width,
        final_height,
    )
}
