//! Drawing onto existing pages.
//!
//! A [`PageCanvas`] collects content-stream operations plus the resources
//! they name, then commits them to the page either over the existing content
//! or in place of it.

use std::collections::{BTreeSet, HashMap};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::coords::PdfRect;
use crate::document::{effective_resources, media_box, page_dict_mut, resolve, resolve_dict};
use crate::error::EngineError;

/// Cap height approximation used to center text vertically.
pub const TEXT_HEIGHT_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `#rgb` or a handful of color names.
    pub fn parse(input: &str) -> Option<Color> {
        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "black" => return Some(Color::BLACK),
            "white" => return Some(Color::WHITE),
            "gray" | "grey" => return Some(Color::GRAY),
            "red" => return Some(Color::rgb(1.0, 0.0, 0.0)),
            "green" => return Some(Color::rgb(0.0, 0.5, 0.0)),
            "blue" => return Some(Color::rgb(0.0, 0.0, 1.0)),
            "yellow" => return Some(Color::rgb(1.0, 1.0, 0.0)),
            _ => {}
        }

        let hex = input.strip_prefix('#').unwrap_or(input);
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 if hex.is_ascii() => Some(Color::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 if hex.is_ascii() => {
                let expand = |i: usize| channel(hex[i..i + 1].repeat(2).as_str());
                Some(Color::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => None,
        }
    }

    pub fn parse_or(input: &str, fallback: Color) -> Color {
        Self::parse(input).unwrap_or(fallback)
    }
}

/// The standard Type1 fonts every viewer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    TimesBold,
    Courier,
    CourierBold,
}

// Advance widths in 1/1000 em for WinAnsi 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

const TIMES_ROMAN_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, //
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, //
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, //
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, //
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, //
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

impl StandardFont {
    /// Map a loose family name ("Times New Roman", "monospace", ...) to a
    /// standard font.
    pub fn from_family(family: &str, bold: bool) -> Self {
        let lower = family.to_lowercase();
        let serif = lower == "serif"
            || lower.contains("times")
            || lower.contains("georgia")
            || lower.contains("garamond");
        let mono = lower == "monospace"
            || lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas");
        let bold = bold || lower.contains("bold");

        match (serif, mono, bold) {
            (true, _, false) => StandardFont::TimesRoman,
            (true, _, true) => StandardFont::TimesBold,
            (false, true, false) => StandardFont::Courier,
            (false, true, true) => StandardFont::CourierBold,
            (false, false, false) => StandardFont::Helvetica,
            (false, false, true) => StandardFont::HelveticaBold,
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
        }
    }

    fn char_width(self, byte: u8) -> f64 {
        let table = match self {
            StandardFont::Courier | StandardFont::CourierBold => return 600.0,
            StandardFont::Helvetica => &HELVETICA_WIDTHS,
            StandardFont::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
            // Times-Bold metrics are close enough to Times-Roman for layout.
            StandardFont::TimesRoman | StandardFont::TimesBold => &TIMES_ROMAN_WIDTHS,
        };
        if (32..=126).contains(&byte) {
            table[(byte - 32) as usize] as f64
        } else {
            600.0
        }
    }

    /// Width of `text` in points at `size`.
    pub fn text_width(self, text: &str, size: f64) -> f64 {
        let units: f64 = encode_win_ansi(text)
            .into_iter()
            .map(|b| self.char_width(b))
            .sum();
        units * size / 1000.0
    }
}

/// Encode for a WinAnsi simple font. Characters outside Latin-1 become '?'.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Normal,
    Multiply,
}

impl BlendMode {
    fn name(self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
        }
    }
}

/// How a canvas lands on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Keep the page's content and paint on top of it.
    Overlay,
    /// Drop the page's content and resources; the canvas becomes the page.
    Replace,
}

#[derive(Debug, Clone, Copy)]
enum ResourceKind {
    Font,
    ExtGState,
    XObject,
}

impl ResourceKind {
    fn key(self) -> &'static [u8] {
        match self {
            ResourceKind::Font => b"Font",
            ResourceKind::ExtGState => b"ExtGState",
            ResourceKind::XObject => b"XObject",
        }
    }
}

/// Fonts and graphics states shared by every page of one operation.
#[derive(Debug, Default)]
pub struct ResourcePool {
    fonts: HashMap<StandardFont, ObjectId>,
    states: HashMap<(u32, Option<BlendMode>), ObjectId>,
}

impl ResourcePool {
    fn font(&mut self, doc: &mut Document, font: StandardFont) -> ObjectId {
        *self.fonts.entry(font).or_insert_with(|| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            })
        })
    }

    fn state(&mut self, doc: &mut Document, opacity: f32, blend: Option<BlendMode>) -> ObjectId {
        *self
            .states
            .entry((opacity.to_bits(), blend))
            .or_insert_with(|| {
                let mut state = dictionary! {
                    "Type" => "ExtGState",
                    "ca" => Object::Real(opacity),
                    "CA" => Object::Real(opacity),
                };
                if let Some(blend) = blend {
                    state.set("BM", blend.name());
                }
                doc.add_object(state)
            })
    }
}

/// Pending drawing for one page.
pub struct PageCanvas<'p> {
    page_id: ObjectId,
    origin: (f64, f64),
    pool: &'p mut ResourcePool,
    operations: Vec<Operation>,
    resources: Vec<(ResourceKind, String, ObjectId)>,
    fonts: HashMap<StandardFont, String>,
    taken: BTreeSet<String>,
}

impl<'p> PageCanvas<'p> {
    pub fn new(doc: &Document, page_id: ObjectId, pool: &'p mut ResourcePool) -> Self {
        let [llx, lly, _, _] = media_box(doc, page_id);
        let existing = effective_resources(doc, page_id);
        let mut taken = BTreeSet::new();
        for kind in [ResourceKind::Font, ResourceKind::ExtGState, ResourceKind::XObject] {
            if let Some(dict) = existing
                .get(kind.key())
                .ok()
                .and_then(|obj| resolve_dict(doc, obj))
            {
                taken.extend(dict.iter().map(|(k, _)| String::from_utf8_lossy(k).into_owned()));
            }
        }

        Self {
            page_id,
            origin: (llx, lly),
            pool,
            operations: Vec::new(),
            resources: Vec::new(),
            fonts: HashMap::new(),
            taken,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn register(&mut self, kind: ResourceKind, prefix: &str, id: ObjectId) -> String {
        let mut n = self.resources.len() + 1;
        let name = loop {
            let candidate = format!("{}{}", prefix, n);
            if !self.taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.taken.insert(name.clone());
        self.resources.push((kind, name.clone(), id));
        name
    }

    fn font_name(&mut self, doc: &mut Document, font: StandardFont) -> String {
        if let Some(name) = self.fonts.get(&font) {
            return name.clone();
        }
        let id = self.pool.font(doc, font);
        let name = self.register(ResourceKind::Font, "PoF", id);
        self.fonts.insert(font, name.clone());
        name
    }

    fn push_state(&mut self, doc: &mut Document, opacity: f64, blend: Option<BlendMode>) {
        let opacity = opacity.clamp(0.0, 1.0) as f32;
        if opacity >= 1.0 && blend.is_none() {
            return;
        }
        let id = self.pool.state(doc, opacity, blend);
        let name = self.register(ResourceKind::ExtGState, "PoGs", id);
        self.op("gs", vec![Object::Name(name.into_bytes())]);
    }

    /// Register an XObject (image or form) and return its resource name.
    pub fn xobject(&mut self, id: ObjectId) -> String {
        self.register(ResourceKind::XObject, "PoX", id)
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn transform(&mut self, m: [f64; 6]) {
        self.op("cm", m.iter().map(|&v| Object::Real(v as f32)).collect());
    }

    /// Move the origin to the box center and rotate counter-clockwise.
    fn center_and_rotate(&mut self, rect: &PdfRect, rotation: f64) {
        let (cx, cy) = rect.center();
        self.transform([1.0, 0.0, 0.0, 1.0, cx, cy]);
        if rotation != 0.0 {
            let (sin, cos) = rotation.to_radians().sin_cos();
            self.transform([cos, sin, -sin, cos, 0.0, 0.0]);
        }
    }

    fn fill_color(&mut self, color: Color) {
        self.op(
            "rg",
            vec![Object::Real(color.r), Object::Real(color.g), Object::Real(color.b)],
        );
    }

    pub fn fill_rect(&mut self, doc: &mut Document, rect: &PdfRect, color: Color, opacity: f64) {
        self.op("q", vec![]);
        self.push_state(doc, opacity, None);
        self.fill_color(color);
        self.op(
            "re",
            [rect.x, rect.y, rect.width, rect.height]
                .iter()
                .map(|&v| Object::Real(v as f32))
                .collect(),
        );
        self.op("f", vec![]);
        self.op("Q", vec![]);
    }

    /// Draw one line of text centered in `rect`, rotated about its center.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_text(
        &mut self,
        doc: &mut Document,
        text: &str,
        font: StandardFont,
        size: f64,
        color: Color,
        rect: &PdfRect,
        rotation: f64,
        opacity: f64,
    ) {
        let font_name = self.font_name(doc, font);
        let width = font.text_width(text, size);
        let height = size * TEXT_HEIGHT_RATIO;

        self.op("q", vec![]);
        self.push_state(doc, opacity, None);
        self.fill_color(color);
        self.center_and_rotate(rect, rotation);
        self.op("BT", vec![]);
        self.op(
            "Tf",
            vec![Object::Name(font_name.into_bytes()), Object::Real(size as f32)],
        );
        self.op(
            "Td",
            vec![
                Object::Real((-width / 2.0) as f32),
                Object::Real((-height / 2.0) as f32),
            ],
        );
        self.op(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        );
        self.op("ET", vec![]);
        self.op("Q", vec![]);
    }

    /// Paint an image XObject stretched over `rect`, rotated about its center.
    pub fn draw_image(
        &mut self,
        doc: &mut Document,
        image_id: ObjectId,
        rect: &PdfRect,
        rotation: f64,
        opacity: f64,
    ) {
        let name = self.xobject(image_id);
        self.op("q", vec![]);
        self.push_state(doc, opacity, None);
        self.center_and_rotate(rect, rotation);
        self.transform([
            rect.width,
            0.0,
            0.0,
            rect.height,
            -rect.width / 2.0,
            -rect.height / 2.0,
        ]);
        self.op("Do", vec![Object::Name(name.into_bytes())]);
        self.op("Q", vec![]);
    }

    /// Paint a form XObject translated by (dx, dy).
    pub fn draw_form(
        &mut self,
        doc: &mut Document,
        form_id: ObjectId,
        dx: f64,
        dy: f64,
        blend: Option<BlendMode>,
    ) {
        let name = self.xobject(form_id);
        self.op("q", vec![]);
        self.push_state(doc, 1.0, blend);
        self.transform([1.0, 0.0, 0.0, 1.0, dx, dy]);
        self.op("Do", vec![Object::Name(name.into_bytes())]);
        self.op("Q", vec![]);
    }

    /// Write the collected drawing to the page.
    pub fn commit(self, doc: &mut Document, mode: CommitMode) -> Result<(), EngineError> {
        if self.operations.is_empty() && mode == CommitMode::Overlay {
            return Ok(());
        }

        let mut operations = Vec::with_capacity(self.operations.len() + 3);
        let shifted = self.origin != (0.0, 0.0);
        if shifted {
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    Object::Real(self.origin.0 as f32),
                    Object::Real(self.origin.1 as f32),
                ],
            ));
        }
        operations.extend(self.operations);
        if shifted {
            operations.push(Operation::new("Q", vec![]));
        }
        let encoded = Content { operations }.encode()?;
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut resources = match mode {
            CommitMode::Overlay => effective_resources(doc, self.page_id),
            CommitMode::Replace => Dictionary::new(),
        };
        for (kind, name, id) in self.resources {
            let mut entries = resources
                .get(kind.key())
                .ok()
                .and_then(|obj| resolve_dict(doc, obj))
                .unwrap_or_default();
            entries.set(name.into_bytes(), Object::Reference(id));
            resources.set(kind.key().to_vec(), Object::Dictionary(entries));
        }

        let contents = match mode {
            CommitMode::Overlay => {
                let existing = existing_contents(doc, self.page_id);
                if existing.is_empty() {
                    vec![Object::Reference(stream_id)]
                } else {
                    // Isolate the old content's graphics state from ours.
                    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
                    let close = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
                    let mut all = Vec::with_capacity(existing.len() + 3);
                    all.push(Object::Reference(open));
                    all.extend(existing);
                    all.push(Object::Reference(close));
                    all.push(Object::Reference(stream_id));
                    all
                }
            }
            CommitMode::Replace => vec![Object::Reference(stream_id)],
        };

        let page = page_dict_mut(doc, self.page_id)?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

/// The page's content stream references, flattened from a single
/// reference, an inline array or an indirect array.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Some(contents) = doc
        .get_object(page_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|page| page.get(b"Contents").ok())
    else {
        return Vec::new();
    };

    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Stream(_)) => vec![Object::Reference(*id)],
            _ => Vec::new(),
        },
        Object::Array(items) => items
            .iter()
            .filter(|item| matches!(resolve(doc, item), Some(Object::Stream(_))))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Wrap a page's content and resources into a reusable form XObject whose
/// lower-left corner sits at the origin.
pub fn embed_page_as_form(doc: &mut Document, page_id: ObjectId) -> Result<ObjectId, EngineError> {
    let [llx, lly, urx, ury] = media_box(doc, page_id);
    let content = doc.get_page_content(page_id)?;
    let resources = effective_resources(doc, page_id);
    let form = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => vec![llx.into(), lly.into(), urx.into(), ury.into()],
        "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), (-llx).into(), (-lly).into()],
        "Resources" => resources,
    };
    Ok(doc.add_object(Stream::new(form, content)))
}
