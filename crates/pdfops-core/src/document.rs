//! Loading, saving and page-tree helpers on top of lopdf.

use std::collections::BTreeSet;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::coords::PageSize;
use crate::error::EngineError;
use crate::rotation::Rotation;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against cyclic /Parent chains in damaged files.
const MAX_TREE_DEPTH: usize = 64;

/// Result of a tolerant open, keeping encryption apart from corruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionProbe {
    Readable,
    Encrypted,
    Corrupt(String),
}

/// Load a document, bypassing encryption that opens with an empty password.
pub fn load_document(bytes: &[u8]) -> Result<Document, EngineError> {
    load_with_password(bytes, "")
}

/// Load and decrypt a document with `password`.
///
/// Fails with `PasswordRequired` when the file is encrypted and the password
/// does not open it, and with `StructurallyInvalid` for any other parse failure.
pub fn load_with_password(bytes: &[u8], password: &str) -> Result<Document, EngineError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| classify_load_error(e, bytes))?;
    if doc.is_encrypted() {
        doc.decrypt(password)
            .map_err(|e| EngineError::PasswordRequired(e.to_string()))?;
        doc.trailer.remove(b"Encrypt");
        debug!("decrypted document");
    }
    Ok(doc)
}

fn classify_load_error(err: lopdf::Error, bytes: &[u8]) -> EngineError {
    let message = err.to_string();
    match err {
        lopdf::Error::Decryption(_) => EngineError::PasswordRequired(message),
        _ if declares_encryption(bytes) => EngineError::PasswordRequired(message),
        _ => EngineError::StructurallyInvalid(message),
    }
}

/// True when the file tail carries an /Encrypt entry.
fn declares_encryption(bytes: &[u8]) -> bool {
    let tail = &bytes[bytes.len().saturating_sub(4096)..];
    tail.windows(8).any(|w| w == b"/Encrypt")
}

pub fn probe(bytes: &[u8]) -> EncryptionProbe {
    match load_document(bytes) {
        Ok(_) => EncryptionProbe::Readable,
        Err(EngineError::PasswordRequired(_)) => EncryptionProbe::Encrypted,
        Err(err) => EncryptionProbe::Corrupt(err.to_string()),
    }
}

pub fn is_encrypted(bytes: &[u8]) -> bool {
    probe(bytes) == EncryptionProbe::Encrypted
}

pub fn page_count(bytes: &[u8]) -> Result<usize, EngineError> {
    Ok(load_document(bytes)?.get_pages().len())
}

/// Compress streams and serialize. Never returns an empty buffer.
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, EngineError> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| EngineError::Serialization(format!("Failed to save PDF: {}", e)))?;
    if buffer.is_empty() {
        return Err(EngineError::Serialization("serializer produced no bytes".into()));
    }
    Ok(buffer)
}

/// Page object ids in document order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Follow a reference to the object it names.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Owned copy of a dictionary given inline or by reference.
pub fn resolve_dict(doc: &Document, obj: &Object) -> Option<Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict.clone()),
        _ => None,
    }
}

pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Look up a page attribute on the page itself or its nearest ancestor.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

/// The page's MediaBox as `[llx, lly, urx, ury]`, Letter when missing or malformed.
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    let parsed = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok())
        .filter(|values| values.len() == 4)
        .and_then(|values| {
            let mut out = [0.0; 4];
            for (slot, value) in out.iter_mut().zip(values) {
                *slot = number(resolve(doc, value)?)?;
            }
            Some(out)
        });

    match parsed {
        Some([x0, y0, x1, y1]) if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
            [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
        }
        _ => [0.0, 0.0, PageSize::LETTER.width, PageSize::LETTER.height],
    }
}

pub fn page_size(doc: &Document, page_id: ObjectId) -> PageSize {
    let [llx, lly, urx, ury] = media_box(doc, page_id);
    PageSize::new(urx - llx, ury - lly)
}

pub fn page_rotation(doc: &Document, page_id: ObjectId) -> Rotation {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| resolve(doc, obj))
        .and_then(number)
        .map(Rotation::normalize)
        .unwrap_or_default()
}

/// Owned copy of the page's resource dictionary (empty when it has none).
pub fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_default()
}

pub fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary, EngineError> {
    Ok(doc.get_object_mut(page_id)?.as_dict_mut()?)
}

/// Recursively shift every reference in `obj` by `offset`.
fn remap_references(obj: &mut Object, offset: u32) {
    match obj {
        Object::Reference(id) => id.0 += offset,
        Object::Array(items) => {
            for item in items.iter_mut() {
                remap_references(item, offset);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                remap_references(value, offset);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                remap_references(value, offset);
            }
        }
        _ => {}
    }
}

/// Builds a fresh document page by page, from blank pages or pages imported
/// out of other documents.
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    placed: BTreeSet<ObjectId>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            placed: BTreeSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Move every object of `source` into this document under fresh ids.
    /// Returns the source's pages (in order) as ids valid in this document.
    pub fn import(&mut self, source: Document) -> Vec<ObjectId> {
        let offset = self.doc.max_id;
        let source_max = source.max_id;
        let pages: Vec<ObjectId> = source
            .get_pages()
            .values()
            .map(|&(number, generation)| (number + offset, generation))
            .collect();

        for ((number, generation), mut object) in source.objects {
            remap_references(&mut object, offset);
            self.doc.objects.insert((number + offset, generation), object);
        }
        self.doc.max_id = self.doc.max_id.max(source_max + offset);
        pages
    }

    /// Append an imported page. Inherited attributes are copied onto the page
    /// so it no longer depends on its old page tree. Placing the same page
    /// again appends an independent copy.
    pub fn append_imported(&mut self, page_id: ObjectId) -> Result<ObjectId, EngineError> {
        let mut page = self.doc.get_object(page_id)?.as_dict()?.clone();
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(&self.doc, page_id, key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        page.set("Parent", Object::Reference(self.pages_id));

        let id = if self.placed.insert(page_id) {
            self.doc.objects.insert(page_id, Object::Dictionary(page));
            page_id
        } else {
            self.doc.add_object(page)
        };
        self.kids.push(id);
        Ok(id)
    }

    pub fn add_blank_page(&mut self, size: PageSize) -> ObjectId {
        let content_id = self.doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        self.add_page(dictionary! {
            "MediaBox" => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
            "Resources" => Dictionary::new(),
            "Contents" => content_id,
        })
    }

    /// Append a page dictionary built by the caller.
    pub fn add_page(&mut self, mut page: Dictionary) -> ObjectId {
        page.set("Type", "Page");
        page.set("Parent", Object::Reference(self.pages_id));
        let id = self.doc.add_object(page);
        self.kids.push(id);
        id
    }

    /// Write the page tree and catalog and drop everything unreachable.
    pub fn build(mut self) -> Document {
        let kids: Vec<Object> = self.kids.iter().map(|&id| Object::Reference(id)).collect();
        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.prune_objects();
        self.doc
    }

    pub fn finish(self) -> Result<Vec<u8>, EngineError> {
        let mut doc = self.build();
        save_document(&mut doc)
    }
}
