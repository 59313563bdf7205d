//! Operation requests
//!
//! Requests are JSON objects tagged by `"type"`, one variant per operation,
//! each carrying its own parameters. Anything the UI may omit has a default.

use serde::{Deserialize, Serialize};

use crate::coords::UiRect;
use crate::placement::{Anchor, NamedPosition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Crop(CropParams),
    Rotate(RotateParams),
    Merge(MergeParams),
    Split(SplitParams),
    Organize(OrganizeParams),
    Watermark(WatermarkParams),
    Redact(RedactParams),
    Sign(SignParams),
    PageNumbers(PageNumberParams),
    Repair(RepairParams),
    CleanMetadata,
    Unlock(UnlockParams),
    Compress,
    ConvertToPdf,
    Protect(ProtectParams),
    Ocr,
    PdfToPdfa,
    PdfToWord,
    PdfToExcel,
    PdfToPowerpoint,
    WordToPdf,
}

impl Operation {
    /// Every `"type"` tag the engine understands.
    pub const TAGS: [&'static str; 21] = [
        "crop",
        "rotate",
        "merge",
        "split",
        "organize",
        "watermark",
        "redact",
        "sign",
        "page_numbers",
        "repair",
        "clean_metadata",
        "unlock",
        "compress",
        "convert_to_pdf",
        "protect",
        "ocr",
        "pdf_to_pdfa",
        "pdf_to_word",
        "pdf_to_excel",
        "pdf_to_powerpoint",
        "word_to_pdf",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Crop(_) => "crop",
            Operation::Rotate(_) => "rotate",
            Operation::Merge(_) => "merge",
            Operation::Split(_) => "split",
            Operation::Organize(_) => "organize",
            Operation::Watermark(_) => "watermark",
            Operation::Redact(_) => "redact",
            Operation::Sign(_) => "sign",
            Operation::PageNumbers(_) => "page_numbers",
            Operation::Repair(_) => "repair",
            Operation::CleanMetadata => "clean_metadata",
            Operation::Unlock(_) => "unlock",
            Operation::Compress => "compress",
            Operation::ConvertToPdf => "convert_to_pdf",
            Operation::Protect(_) => "protect",
            Operation::Ocr => "ocr",
            Operation::PdfToPdfa => "pdf_to_pdfa",
            Operation::PdfToWord => "pdf_to_word",
            Operation::PdfToExcel => "pdf_to_excel",
            Operation::PdfToPowerpoint => "pdf_to_powerpoint",
            Operation::WordToPdf => "word_to_pdf",
        }
    }

    /// Operations that only a remote conversion service can perform.
    pub fn requires_remote(&self) -> bool {
        matches!(
            self,
            Operation::Protect(_)
                | Operation::Ocr
                | Operation::PdfToPdfa
                | Operation::PdfToWord
                | Operation::PdfToExcel
                | Operation::PdfToPowerpoint
                | Operation::WordToPdf
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_all() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropParams {
    pub crop_box: UiRect,
    /// Rotation given to cropped pages, in degrees (normalized).
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_true")]
    pub apply_to_all: bool,
    /// 1-based page to crop when `apply_to_all` is false.
    #[serde(default)]
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Add to the page's current rotation.
    #[default]
    Relative,
    /// Replace the page's rotation.
    Absolute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateParams {
    pub angle: f64,
    #[serde(default = "default_all")]
    pub pages: String,
    #[serde(default)]
    pub mode: RotationMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeParams {
    /// Range spec per input file, by position. Missing entries mean all pages.
    #[serde(default)]
    pub ranges: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// One document holding the selected pages.
    #[default]
    Extract,
    /// One single-page document per selected page, zipped.
    Separate,
    /// One document per range spec in `segments`, zipped.
    Segments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitParams {
    #[serde(default)]
    pub mode: SplitMode,
    /// Range spec selecting pages for extract/separate.
    #[serde(default)]
    pub range: Option<String>,
    /// 1-based page numbers, used when `range` is absent.
    #[serde(default)]
    pub pages: Vec<usize>,
    #[serde(default)]
    pub segments: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizeItem {
    /// Zero-based page of the source document.
    #[serde(default)]
    pub original_index: usize,
    #[serde(default)]
    pub rotation: f64,
    /// Insert a blank page instead of a source page.
    #[serde(default)]
    pub blank: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizeParams {
    pub pages: Vec<OrganizeItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Over,
    Under,
}

fn default_watermark_color() -> String {
    "#808080".to_string()
}

fn default_font_family() -> String {
    "Helvetica".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatermarkContent {
    Text {
        text: String,
        #[serde(default = "default_watermark_color")]
        color: String,
        #[serde(default = "default_font_family")]
        font_family: String,
        #[serde(default)]
        bold: bool,
    },
    Image {
        /// Data URL or bare base64 of a PNG/JPEG.
        data: String,
        /// Stamp width as a percentage of page width.
        #[serde(default)]
        width_percent: Option<f64>,
    },
}

fn default_watermark_opacity() -> f64 {
    0.5
}

fn default_watermark_font_size() -> f64 {
    48.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkParams {
    pub content: WatermarkContent,
    #[serde(default)]
    pub anchor: Anchor,
    /// Clockwise degrees, as seen on screen.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_watermark_opacity")]
    pub opacity: f64,
    #[serde(default = "default_watermark_font_size")]
    pub font_size: f64,
    #[serde(default)]
    pub layer: Layer,
    #[serde(default = "default_all")]
    pub pages: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    #[default]
    Redact,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionEntry {
    /// 1-based page number.
    pub page: usize,
    pub rect: UiRect,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub mode: RedactionMode,
    /// Fill opacity; defaults to opaque for redact, 0.4 for highlight.
    #[serde(default)]
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedactParams {
    pub redactions: Vec<RedactionEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScale {
    Small,
    #[default]
    Medium,
    Large,
}

impl SignatureScale {
    /// Fraction of the image's intrinsic size drawn on the page.
    pub fn factor(self) -> f64 {
        match self {
            SignatureScale::Small => 0.1,
            SignatureScale::Medium => 0.2,
            SignatureScale::Large => 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignaturePlacement {
    /// Fit the image inside a box drawn in the UI.
    Box { rect: UiRect },
    /// Put the scaled image at a named spot.
    Named {
        position: NamedPosition,
        #[serde(default)]
        scale: SignatureScale,
    },
}

fn default_signature_pages() -> String {
    "first".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignParams {
    /// Data URL or bare base64 of a PNG/JPEG.
    pub image: String,
    pub placement: SignaturePlacement,
    /// `first`, `last`, `all` or a range spec.
    #[serde(default = "default_signature_pages")]
    pub pages: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberFormat {
    /// `3`
    #[default]
    #[serde(rename = "n")]
    Plain,
    /// `Page 3`
    #[serde(rename = "page-n")]
    Page,
    /// `3 of 10`
    #[serde(rename = "n-of-m")]
    OfTotal,
    /// `Page 3 of 10`
    #[serde(rename = "page-n-of-m")]
    PageOfTotal,
}

impl NumberFormat {
    pub fn label(self, number: usize, last: usize) -> String {
        match self {
            NumberFormat::Plain => number.to_string(),
            NumberFormat::Page => format!("Page {}", number),
            NumberFormat::OfTotal => format!("{} of {}", number, last),
            NumberFormat::PageOfTotal => format!("Page {} of {}", number, last),
        }
    }
}

fn default_start_from() -> usize {
    1
}

fn default_number_color() -> String {
    "#000000".to_string()
}

fn default_number_margin() -> f64 {
    20.0
}

fn default_number_position() -> NamedPosition {
    NamedPosition::BottomCenter
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageNumberParams {
    #[serde(default)]
    pub format: NumberFormat,
    #[serde(default = "default_start_from")]
    pub start_from: usize,
    #[serde(default = "default_all")]
    pub pages: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Falls back to the engine's default font size.
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default = "default_number_color")]
    pub color: String,
    #[serde(default = "default_number_margin")]
    pub margin: f64,
    #[serde(default = "default_number_position")]
    pub position: NamedPosition,
}

impl Default for PageNumberParams {
    fn default() -> Self {
        Self {
            format: NumberFormat::default(),
            start_from: default_start_from(),
            pages: default_all(),
            font_family: default_font_family(),
            font_size: None,
            color: default_number_color(),
            margin: default_number_margin(),
            position: default_number_position(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Structural repair, rasterizing only when that fails.
    #[default]
    Auto,
    /// Always rebuild from page images.
    Visual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairParams {
    #[serde(default)]
    pub mode: RepairMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnlockParams {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub printing: bool,
    #[serde(default)]
    pub copying: bool,
    #[serde(default)]
    pub modifying: bool,
}

/// Forwarded as-is to the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectParams {
    pub user_password: String,
    #[serde(default)]
    pub owner_password: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
}
