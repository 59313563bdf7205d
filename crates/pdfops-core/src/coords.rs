//! Coordinate transformation between UI percentage space and PDF point space
//!
//! UI space: origin top-left, Y grows downward, values are percentages (0-100)
//! of the page's width/height. PDF space: origin bottom-left, Y grows upward,
//! values are points.

use serde::{Deserialize, Serialize};

/// Page dimensions in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Rectangle in UI percentage space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Point in UI percentage space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UiPoint {
    pub x: f64,
    pub y: f64,
}

/// Rectangle in PDF user space; (x, y) is the lower-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

impl UiRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp into the page: origin in [0, 100], extent no further than the edge.
    pub fn clamped(&self) -> UiRect {
        let x = clamp_percent(self.x);
        let y = clamp_percent(self.y);
        UiRect {
            x,
            y,
            width: clamp_percent(self.width).min(100.0 - x),
            height: clamp_percent(self.height).min(100.0 - y),
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Map a UI rectangle onto a page. The result always lies inside the page.
pub fn to_pdf_rect(ui: &UiRect, page: PageSize) -> PdfRect {
    let ui = ui.clamped();
    let width = ui.width / 100.0 * page.width;
    let height = ui.height / 100.0 * page.height;
    let x = ui.x / 100.0 * page.width;
    // The UI top edge lands on the PDF rectangle's y + height.
    let y = page.height - ui.y / 100.0 * page.height - height;

    let x = x.max(0.0);
    let y = y.max(0.0);
    PdfRect {
        x,
        y,
        width: width.min(page.width - x).max(0.0),
        height: height.min(page.height - y).max(0.0),
    }
}

/// Inverse of [`to_pdf_rect`].
pub fn to_ui_rect(pdf: &PdfRect, page: PageSize) -> UiRect {
    UiRect {
        x: pdf.x / page.width * 100.0,
        y: (page.height - pdf.y - pdf.height) / page.height * 100.0,
        width: pdf.width / page.width * 100.0,
        height: pdf.height / page.height * 100.0,
    }
}

/// Map a UI point onto a page (no clamping).
pub fn to_pdf_point(ui: &UiPoint, page: PageSize) -> (f64, f64) {
    (
        ui.x / 100.0 * page.width,
        page.height - ui.y / 100.0 * page.height,
    )
}
