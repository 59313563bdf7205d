//! Page extraction and reordering.
//!
//! Extraction works by whitelist: clone the source, delete every page that
//! was not asked for, then prune whatever nothing references anymore.

use lopdf::Document;
use rayon::prelude::*;
use tracing::debug;

use crate::command::Warning;
use crate::coords::PageSize;
use crate::document::{load_document, page_dict_mut, page_rotation, save_document, DocumentBuilder};
use crate::error::EngineError;
use crate::operations::{OrganizeItem, SplitParams};
use crate::ranges::{self, PageIndexSet};

/// Pages chosen by a split request: the range spec when given, else the
/// explicit 1-based page list.
pub fn select_pages(params: &SplitParams, total_pages: usize) -> (PageIndexSet, Vec<Warning>) {
    match params.range.as_deref() {
        Some(spec) => ranges::parse_with_warnings(spec, total_pages),
        None if !params.pages.is_empty() => (
            PageIndexSet::from_page_numbers(&params.pages, total_pages),
            Vec::new(),
        ),
        None => (PageIndexSet::all(total_pages), Vec::new()),
    }
}

/// A copy of `source` holding only the selected pages, in document order.
pub fn extract_pages(source: &Document, selection: &PageIndexSet) -> Result<Vec<u8>, EngineError> {
    if selection.is_empty() {
        return Err(EngineError::Validation("No pages specified".into()));
    }

    let page_count = source.get_pages().len() as u32;
    let keep = selection.page_numbers();
    let to_delete: Vec<u32> = (1..=page_count).filter(|p| !keep.contains(p)).collect();

    let mut doc = source.clone();
    doc.delete_pages(&to_delete);
    doc.prune_objects();
    save_document(&mut doc)
}

/// One single-page document per selected page, named `{base}-page-{n}.pdf`.
/// Pages are extracted in parallel, each from its own parse of `bytes`.
pub fn separate_pages(
    bytes: &[u8],
    selection: &PageIndexSet,
    base_name: &str,
) -> Result<Vec<(String, Vec<u8>)>, EngineError> {
    if selection.is_empty() {
        return Err(EngineError::Validation("No pages specified".into()));
    }
    selection
        .as_slice()
        .par_iter()
        .map(|&index| {
            let source = load_document(bytes)?;
            let single = PageIndexSet::from_indices([index], source.get_pages().len());
            let pdf = extract_pages(&source, &single)?;
            Ok((format!("{}-page-{}.pdf", base_name, index + 1), pdf))
        })
        .collect()
}

/// One document per range spec, named `part-{k}.pdf`. Every segment is
/// checked before any output is built.
pub fn split_segments(
    bytes: &[u8],
    total_pages: usize,
    segments: &[String],
) -> Result<Vec<(String, Vec<u8>)>, EngineError> {
    if segments.is_empty() {
        return Err(EngineError::Validation("no segments requested".into()));
    }
    let selections = segments
        .iter()
        .map(|spec| {
            let selection = ranges::parse(spec, total_pages);
            if selection.is_empty() {
                Err(EngineError::Validation(format!(
                    "segment '{}' selects no pages",
                    spec
                )))
            } else {
                Ok(selection)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    selections
        .par_iter()
        .enumerate()
        .map(|(k, selection)| {
            let source = load_document(bytes)?;
            let pdf = extract_pages(&source, selection)?;
            debug!(part = k + 1, pages = selection.len(), "built segment");
            Ok((format!("part-{}.pdf", k + 1), pdf))
        })
        .collect()
}

/// Rebuild `source` in the order given by `items`. Blank items insert a page
/// of `blank_size`; items pointing past the end are skipped with a warning.
pub fn organize_pages(
    source: Document,
    items: &[OrganizeItem],
    blank_size: PageSize,
) -> Result<(Vec<u8>, Vec<Warning>), EngineError> {
    let total = source.get_pages().len();
    let mut warnings = Vec::new();
    let valid: Vec<&OrganizeItem> = items
        .iter()
        .filter(|item| {
            if item.blank || item.original_index < total {
                return true;
            }
            warnings.push(Warning::SkippedPage {
                page: item.original_index + 1,
                reason: format!("document has {} pages", total),
            });
            false
        })
        .collect();
    if valid.is_empty() {
        return Err(EngineError::Validation(
            "the new page order contains no pages".into(),
        ));
    }

    let mut builder = DocumentBuilder::new();
    let pages = builder.import(source);
    for item in valid {
        let id = if item.blank {
            builder.add_blank_page(blank_size)
        } else {
            builder.append_imported(pages[item.original_index])?
        };
        if item.rotation != 0.0 {
            let doc = builder.document_mut();
            let rotation = page_rotation(doc, id).rotated_by(item.rotation);
            page_dict_mut(doc, id)?.set("Rotate", rotation.degrees());
        }
    }
    Ok((builder.finish()?, warnings))
}
