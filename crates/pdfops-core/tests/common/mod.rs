//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use pdfops_core::{CancellationToken, EngineError, PageRasterizer, RasterDocument, RasterImage};

/// Create a synthetic PDF whose pages each show "{prefix} Page N".
pub fn create_synthetic_pdf(num_pages: u32, width: i64, height: i64, prefix: &str) -> Vec<u8> {
    let mut doc = synthetic_document(num_pages, width, height, prefix);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn synthetic_document(num_pages: u32, width: i64, height: i64, prefix: &str) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(50), Object::Integer(50)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("{} Page {}", prefix, i + 1).into_bytes(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => num_pages as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

/// A PDF carrying a standard security handler whose password is unknown.
pub fn create_encrypted_pdf() -> Vec<u8> {
    let mut doc = synthetic_document(1, 612, 792, "Locked");
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "Length" => 40,
        "O" => Object::String(vec![0x3c; 32], StringFormat::Hexadecimal),
        "U" => Object::String(vec![0xc3; 32], StringFormat::Hexadecimal),
        "P" => -4,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set(
        "ID",
        vec![
            Object::String(vec![0x22; 16], StringFormat::Hexadecimal),
            Object::String(vec![0x22; 16], StringFormat::Hexadecimal),
        ],
    );
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn create_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        let data: Vec<u8> = (0..width * height)
            .flat_map(|i| [20, 40, 200, if i % 2 == 0 { 255 } else { 0 }])
            .collect();
        writer.write_image_data(&data).unwrap();
    }
    out
}

/// Text shown by the first `Tj` of every page, in page order.
pub fn first_strings(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let content = Content::decode(&doc.get_page_content(id).unwrap()).unwrap();
            content
                .operations
                .iter()
                .find(|op| op.operator == "Tj")
                .and_then(|op| match op.operands.first() {
                    Some(Object::String(bytes, _)) => {
                        Some(String::from_utf8_lossy(bytes).into_owned())
                    }
                    _ => None,
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Rasterizer stand-in: every page renders as a flat image of a fixed point
/// size unless listed in `failing`.
pub struct StubRasterizer {
    pub pages: usize,
    pub failing: BTreeSet<usize>,
    pub points: (f32, f32),
}

impl StubRasterizer {
    pub fn new(pages: usize, failing: &[usize]) -> Self {
        Self {
            pages,
            failing: failing.iter().copied().collect(),
            points: (300.0, 400.0),
        }
    }
}

struct StubDocument<'a> {
    owner: &'a StubRasterizer,
}

impl PageRasterizer for StubRasterizer {
    fn open<'a>(&'a self, _bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>, EngineError> {
        Ok(Box::new(StubDocument { owner: self }))
    }
}

impl RasterDocument for StubDocument<'_> {
    fn page_count(&self) -> usize {
        self.owner.pages
    }

    fn render_page(
        &self,
        index: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<RasterImage, EngineError> {
        cancel.check()?;
        if self.owner.failing.contains(&index) {
            return Err(EngineError::Render(format!("page {} unreadable", index + 1)));
        }
        let width = (self.owner.points.0 * scale) as u32;
        let height = (self.owner.points.1 * scale) as u32;
        Ok(RasterImage {
            width,
            height,
            rgb: vec![240; (width * height * 3) as usize],
        })
    }
}
