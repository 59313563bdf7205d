//! Bounded concurrent ingestion of many uploads.
//!
//! Items are processed in fixed-size batches: everything inside a batch runs
//! in parallel on the rayon pool, and the next batch starts only after the
//! whole batch has finished.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::command::InputFile;
use crate::config::EngineConfig;
use crate::document::load_document;
use crate::error::EngineError;

/// Map `f` over `items`, at most `batch_size` at a time, preserving order.
pub fn process_in_batches<T, R, F>(items: &[T], batch_size: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let mut results = Vec::with_capacity(items.len());
    for (index, batch) in items.chunks(batch_size.max(1)).enumerate() {
        debug!(batch = index, size = batch.len(), "processing batch");
        let batch_results: Vec<R> = batch.par_iter().map(&f).collect();
        results.extend(batch_results);
    }
    results
}

/// What the ingest step learned about one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size_bytes: usize,
    pub page_count: Option<usize>,
    pub encrypted: bool,
    pub error: Option<String>,
}

pub fn summarize_file(file: &InputFile) -> FileSummary {
    let mut summary = FileSummary {
        name: file.name.clone(),
        size_bytes: file.bytes.len(),
        page_count: None,
        encrypted: false,
        error: None,
    };
    match load_document(&file.bytes) {
        Ok(doc) => summary.page_count = Some(doc.get_pages().len()),
        Err(EngineError::PasswordRequired(_)) => summary.encrypted = true,
        Err(err) => {
            warn!(file = %file.name, error = %err, "could not read upload");
            summary.error = Some(err.to_string());
        }
    }
    summary
}

/// Summarize uploads in batches of `config.ingest_batch_size`.
pub fn summarize_files(files: &[InputFile], config: &EngineConfig) -> Vec<FileSummary> {
    process_in_batches(files, config.ingest_batch_size, summarize_file)
}
