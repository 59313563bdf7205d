use std::fmt;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One uploaded file: raw bytes plus the name it arrived with.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// File name without a trailing `.pdf` (case-insensitive).
    pub fn base_name(&self) -> &str {
        let name = self.name.as_str();
        let cut = name.len().saturating_sub(4);
        if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".pdf") {
            &name[..cut]
        } else {
            name
        }
    }

    /// File name without any extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }
}

/// Recovered-but-degraded conditions carried on a successful result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A whole input was left out (encrypted merge source, unreadable batch file).
    SkippedInput { name: String, reason: String },
    /// A single page was left out. `page` is 1-based.
    SkippedPage { page: usize, reason: String },
    IgnoredRangeSegment { segment: String },
    /// Redaction only paints over content; the text underneath is still in the file.
    VisualRedactionOnly,
    /// Output was rebuilt from page images; text and vector content are gone.
    RasterReconstructed { pages_recovered: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SkippedInput { name, reason } => write!(f, "skipped {}: {}", name, reason),
            Warning::SkippedPage { page, reason } => write!(f, "skipped page {}: {}", page, reason),
            Warning::IgnoredRangeSegment { segment } => {
                write!(f, "ignored page range segment '{}'", segment)
            }
            Warning::VisualRedactionOnly => write!(
                f,
                "redaction is visual only; underlying text remains extractable"
            ),
            Warning::RasterReconstructed { pages_recovered } => write!(
                f,
                "rebuilt {} page(s) from images; text and vector content were lost",
                pages_recovered
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pdf,
    Zip,
}

impl ArtifactKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::Zip => "application/zip",
        }
    }
}

/// Output of a successful operation.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub kind: ArtifactKind,
    pub warnings: Vec<Warning>,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: Option<u32>,
    pub processing_time_ms: u64,
}

/// JSON envelope for callers that cannot take raw bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    pub file_name: Option<String>,
    pub mime_type: Option<&'static str>,
    /// Base64-encoded artifact bytes
    pub data: Option<String>,
    pub warnings: Vec<Warning>,
    pub error: Option<String>,
    pub error_code: Option<&'static str>,
    pub metrics: Option<ProcessMetrics>,
}

impl ProcessResult {
    pub fn from_outcome(outcome: &Result<Artifact, EngineError>) -> Self {
        match outcome {
            Ok(artifact) => Self {
                success: true,
                file_name: Some(artifact.file_name.clone()),
                mime_type: Some(artifact.kind.mime_type()),
                data: Some(base64::engine::general_purpose::STANDARD.encode(&artifact.bytes)),
                warnings: artifact.warnings.clone(),
                error: None,
                error_code: None,
                metrics: Some(artifact.metrics.clone()),
            },
            Err(err) => Self {
                success: false,
                file_name: None,
                mime_type: None,
                data: None,
                warnings: Vec::new(),
                error: Some(err.to_string()),
                error_code: Some(err.code()),
                metrics: None,
            },
        }
    }
}
