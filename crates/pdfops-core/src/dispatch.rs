//! Single entry point that routes an [`Operation`] to the component doing
//! the work and wraps the result as an [`Artifact`].

use std::time::Instant;

use lopdf::Document;
use serde_json::Value;
use tracing::{debug, info};

use crate::archive::zip_entries;
use crate::batch::process_in_batches;
use crate::command::{Artifact, ArtifactKind, InputFile, ProcessMetrics, Warning};
use crate::config::EngineConfig;
use crate::content::{CommitMode, PageCanvas, ResourcePool};
use crate::coords::{PageSize, PdfRect};
use crate::document::{load_document, load_with_password, save_document, DocumentBuilder};
use crate::error::EngineError;
use crate::image::{sniff, DecodedImage};
use crate::merge::merge_documents;
use crate::operations::{Operation, SplitMode, SplitParams};
use crate::render::{CancellationToken, RenderingContext};
use crate::repair::{RepairKind, RepairPipeline};
use crate::split::{extract_pages, organize_pages, select_pages, separate_pages, split_segments};
use crate::{stamp, transform};

/// Parse a JSON request. Unknown `"type"` tags are reported as
/// [`EngineError::UnsupportedOperation`]; malformed parameters for a known
/// tag as [`EngineError::Validation`].
pub fn parse_request(json: &str) -> Result<Operation, EngineError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| EngineError::Serialization(e.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Validation("request has no \"type\"".into()))?;
    if !Operation::TAGS.contains(&tag) {
        return Err(EngineError::UnsupportedOperation(tag.to_string()));
    }
    let tag = tag.to_string();
    serde_json::from_value(value)
        .map_err(|e| EngineError::Validation(format!("invalid {} request: {}", tag, e)))
}

struct Output {
    bytes: Vec<u8>,
    file_name: String,
    kind: ArtifactKind,
    warnings: Vec<Warning>,
    page_count: Option<usize>,
}

impl Output {
    fn pdf(bytes: Vec<u8>, file_name: String, page_count: usize) -> Self {
        Self {
            bytes,
            file_name,
            kind: ArtifactKind::Pdf,
            warnings: Vec::new(),
            page_count: Some(page_count),
        }
    }

    fn zip(entries: &[(String, Vec<u8>)], file_name: &str) -> Result<Self, EngineError> {
        Ok(Self {
            bytes: zip_entries(entries)?,
            file_name: file_name.to_string(),
            kind: ArtifactKind::Zip,
            warnings: Vec::new(),
            page_count: None,
        })
    }

    fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// The engine: configuration plus an optional rendering backend.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    rendering: RenderingContext,
}

impl Engine {
    pub fn new(config: EngineConfig, rendering: RenderingContext) -> Self {
        Self { config, rendering }
    }

    /// Default configuration and no rendering backend.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rendering(&self) -> &RenderingContext {
        &self.rendering
    }

    pub fn execute_json(&self, request: &str, files: &[InputFile]) -> Result<Artifact, EngineError> {
        let operation = parse_request(request)?;
        self.execute(&operation, files)
    }

    pub fn execute(&self, operation: &Operation, files: &[InputFile]) -> Result<Artifact, EngineError> {
        self.execute_with_cancel(operation, files, &CancellationToken::new())
    }

    /// Run `operation`. `cancel` is honoured by rasterizing stages.
    pub fn execute_with_cancel(
        &self,
        operation: &Operation,
        files: &[InputFile],
        cancel: &CancellationToken,
    ) -> Result<Artifact, EngineError> {
        let started = Instant::now();
        if operation.requires_remote() {
            return Err(EngineError::RemoteProcessingRequired(
                operation.name().to_string(),
            ));
        }
        info!(operation = operation.name(), files = files.len(), "executing");

        let output = self.run(operation, files, cancel)?;
        if output.bytes.is_empty() {
            return Err(EngineError::Operation(format!(
                "{} produced no output",
                operation.name()
            )));
        }

        let metrics = ProcessMetrics {
            input_size_bytes: files.iter().map(|f| f.bytes.len()).sum(),
            output_size_bytes: output.bytes.len(),
            page_count: output.page_count.map(|n| n as u32),
            processing_time_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            operation = operation.name(),
            output = %output.file_name,
            warnings = output.warnings.len(),
            "finished"
        );
        Ok(Artifact {
            bytes: output.bytes,
            file_name: output.file_name,
            kind: output.kind,
            warnings: output.warnings,
            metrics,
        })
    }

    fn run(
        &self,
        operation: &Operation,
        files: &[InputFile],
        cancel: &CancellationToken,
    ) -> Result<Output, EngineError> {
        let config = &self.config;
        match operation {
            Operation::Crop(params) => edit(files, "cropped", |doc| {
                transform::crop_pages(doc, params).map(|_| Vec::new())
            }),
            Operation::Rotate(params) => {
                edit(files, "rotated", |doc| transform::rotate_pages(doc, params))
            }
            Operation::Merge(params) => {
                let merged = merge_documents(files, &params.ranges, config.ingest_batch_size)?;
                Ok(
                    Output::pdf(merged.bytes, "merged-document.pdf".into(), merged.page_count)
                        .with_warnings(merged.warnings),
                )
            }
            Operation::Split(params) => split(single_file(files)?, params),
            Operation::Organize(params) => {
                let file = single_file(files)?;
                let source = load_document(&file.bytes)?;
                let (bytes, warnings) = organize_pages(source, &params.pages, config.blank_page_size)?;
                let pages = params.pages.len() - skipped_pages(&warnings);
                Ok(Output::pdf(bytes, format!("organized-{}", file.name), pages).with_warnings(warnings))
            }
            Operation::Watermark(params) => edit(files, "watermarked", |doc| {
                stamp::watermark_pages(doc, params, config)
            }),
            Operation::Redact(params) => {
                edit(files, "redacted", |doc| transform::redact_pages(doc, params))
            }
            Operation::Sign(params) => edit(files, "signed", |doc| {
                stamp::sign_pages(doc, params, config).map(|_| Vec::new())
            }),
            Operation::PageNumbers(params) => edit(files, "numbered", |doc| {
                stamp::number_pages(doc, params, config)
            }),
            Operation::Repair(params) => {
                let file = single_file(files)?;
                let report = RepairPipeline::new(&self.rendering, config).run(&file.bytes, params.mode, cancel)?;
                let (file_name, pages) = match report.kind {
                    RepairKind::Structural => (format!("repaired-{}", file.name), None),
                    RepairKind::Raster { pages_recovered } => (
                        format!("repaired-scanned-{}", file.name),
                        Some(pages_recovered),
                    ),
                };
                Ok(Output {
                    bytes: report.bytes,
                    file_name,
                    kind: ArtifactKind::Pdf,
                    warnings: report.warnings,
                    page_count: pages,
                })
            }
            Operation::CleanMetadata => edit(files, "clean", |doc| {
                transform::clean_metadata(doc).map(|_| Vec::new())
            }),
            Operation::Unlock(params) => {
                let file = single_file(files)?;
                let mut doc = load_with_password(&file.bytes, params.password.as_deref().unwrap_or(""))?;
                doc.prune_objects();
                let pages = doc.get_pages().len();
                Ok(Output::pdf(save_document(&mut doc)?, format!("unlocked-{}", file.name), pages))
            }
            Operation::Compress => self.per_file(files, "compressed-files.zip", compress_file),
            Operation::ConvertToPdf => self.per_file(files, "converted-images.zip", convert_image),
            Operation::Protect(_)
            | Operation::Ocr
            | Operation::PdfToPdfa
            | Operation::PdfToWord
            | Operation::PdfToExcel
            | Operation::PdfToPowerpoint
            | Operation::WordToPdf => Err(EngineError::RemoteProcessingRequired(
                operation.name().to_string(),
            )),
        }
    }

    /// One output per input: a single file stays a PDF, several are zipped.
    fn per_file<F>(&self, files: &[InputFile], archive_name: &str, f: F) -> Result<Output, EngineError>
    where
        F: Fn(&InputFile) -> Result<Output, EngineError> + Sync + Send,
    {
        match files {
            [] => Err(EngineError::Validation("no input file".into())),
            [file] => f(file),
            _ => {
                let entries = process_in_batches(files, self.config.ingest_batch_size, &f)
                    .into_iter()
                    .map(|output| output.map(|o| (o.file_name, o.bytes)))
                    .collect::<Result<Vec<_>, _>>()?;
                Output::zip(&entries, archive_name)
            }
        }
    }
}

fn single_file(files: &[InputFile]) -> Result<&InputFile, EngineError> {
    match files {
        [file] => Ok(file),
        [] => Err(EngineError::Validation("no input file".into())),
        _ => Err(EngineError::Validation(format!(
            "expected one input file, got {}",
            files.len()
        ))),
    }
}

/// Load the only input, let `f` modify it, save it as `{verb}-{name}`.
fn edit<F>(files: &[InputFile], verb: &str, f: F) -> Result<Output, EngineError>
where
    F: FnOnce(&mut Document) -> Result<Vec<Warning>, EngineError>,
{
    let file = single_file(files)?;
    let mut doc = load_document(&file.bytes)?;
    let warnings = f(&mut doc)?;
    let pages = doc.get_pages().len();
    let bytes = save_document(&mut doc)?;
    Ok(Output::pdf(bytes, format!("{}-{}", verb, file.name), pages).with_warnings(warnings))
}

fn skipped_pages(warnings: &[Warning]) -> usize {
    warnings
        .iter()
        .filter(|w| matches!(w, Warning::SkippedPage { .. }))
        .count()
}

fn split(file: &InputFile, params: &SplitParams) -> Result<Output, EngineError> {
    let source = load_document(&file.bytes)?;
    let total = source.get_pages().len();
    match params.mode {
        SplitMode::Extract => {
            let (selection, warnings) = select_pages(params, total);
            let bytes = extract_pages(&source, &selection)?;
            Ok(Output::pdf(bytes, format!("split-{}", file.name), selection.len())
                .with_warnings(warnings))
        }
        SplitMode::Separate => {
            let (selection, warnings) = select_pages(params, total);
            let parts = separate_pages(&file.bytes, &selection, file.base_name())?;
            Ok(Output::zip(&parts, "split-pages.zip")?.with_warnings(warnings))
        }
        SplitMode::Segments => {
            let parts = split_segments(&file.bytes, total, &params.segments)?;
            Output::zip(&parts, "split-parts.zip")
        }
    }
}

fn compress_file(file: &InputFile) -> Result<Output, EngineError> {
    let mut doc = load_document(&file.bytes)?;
    doc.prune_objects();
    let pages = doc.get_pages().len();
    let bytes = save_document(&mut doc)?;
    debug!(file = %file.name, before = file.bytes.len(), after = bytes.len(), "compressed");
    Ok(Output::pdf(bytes, format!("compressed-{}", file.name), pages))
}

/// A one-page PDF sized to the image's pixel dimensions.
fn convert_image(file: &InputFile) -> Result<Output, EngineError> {
    if sniff(&file.bytes).is_none() {
        return Err(EngineError::Validation(format!(
            "{} is not a JPEG or PNG image",
            file.name
        )));
    }
    let image = DecodedImage::decode(&file.bytes)?;
    let size = PageSize::new(image.width as f64, image.height as f64);

    let mut builder = DocumentBuilder::new();
    let page_id = builder.add_blank_page(size);
    let doc = builder.document_mut();
    let image_id = image.embed(doc)?;
    let mut pool = ResourcePool::default();
    let mut canvas = PageCanvas::new(doc, page_id, &mut pool);
    canvas.draw_image(
        doc,
        image_id,
        &PdfRect::new(0.0, 0.0, size.width, size.height),
        0.0,
        1.0,
    );
    canvas.commit(doc, CommitMode::Replace)?;
    Ok(Output::pdf(builder.finish()?, format!("{}.pdf", file.stem()), 1))
}
