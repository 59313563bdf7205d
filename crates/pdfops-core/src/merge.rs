//! Merge several PDFs, optionally a page range of each, into one document.
//!
//! Sources are loaded in parallel batches, then imported in input order:
//! every object of a source is copied in under offset ids, and the selected
//! pages are appended to a fresh page tree.

use lopdf::Document;
use tracing::{debug, warn};

use crate::batch::process_in_batches;
use crate::command::{InputFile, Warning};
use crate::document::{load_document, DocumentBuilder};
use crate::error::EngineError;
use crate::ranges;

#[derive(Debug)]
pub struct MergeOutcome {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub warnings: Vec<Warning>,
}

/// Merge `files` in order. `page_ranges[i]`, when present and non-empty,
/// limits which pages of `files[i]` are taken.
///
/// Password-protected sources are skipped with a warning. Any other
/// unreadable source fails the whole merge.
pub fn merge_documents(
    files: &[InputFile],
    page_ranges: &[String],
    batch_size: usize,
) -> Result<MergeOutcome, EngineError> {
    if files.is_empty() {
        return Err(EngineError::Validation("No documents to merge".into()));
    }

    let loaded = process_in_batches(files, batch_size, |file| load_document(&file.bytes));

    let mut builder = DocumentBuilder::new();
    let mut warnings = Vec::new();
    let mut skipped = 0;
    for (index, (file, result)) in files.iter().zip(loaded).enumerate() {
        let source: Document = match result {
            Ok(doc) => doc,
            Err(EngineError::PasswordRequired(_)) => {
                warn!(file = %file.name, "skipping password-protected input");
                warnings.push(Warning::SkippedInput {
                    name: file.name.clone(),
                    reason: "password protected".into(),
                });
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err),
        };

        let total = source.get_pages().len();
        let selection = match page_ranges.get(index).map(|spec| spec.trim()) {
            Some(spec) if !spec.is_empty() => {
                let (selection, range_warnings) = ranges::parse_with_warnings(spec, total);
                warnings.extend(range_warnings);
                selection
            }
            _ => ranges::PageIndexSet::all(total),
        };

        let pages = builder.import(source);
        for page in selection.iter() {
            builder.append_imported(pages[page])?;
        }
        debug!(file = %file.name, pages = selection.len(), "merged source");
    }

    if skipped == files.len() {
        return Err(EngineError::PasswordRequired(
            "all inputs encrypted".into(),
        ));
    }
    if builder.page_count() == 0 {
        return Err(EngineError::Validation(
            "the requested ranges select no pages".into(),
        ));
    }

    let page_count = builder.page_count();
    Ok(MergeOutcome {
        bytes: builder.finish()?,
        page_count,
        warnings,
    })
}
