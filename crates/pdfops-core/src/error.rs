use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The document is encrypted and the supplied (or empty) password did not open it.
    #[error("Document is password protected: {0}")]
    PasswordRequired(String),

    #[error("Failed to parse PDF: {0}")]
    StructurallyInvalid(String),

    /// Repair could not recover a single page.
    #[error("Could not recover the document: {0}")]
    Unrecoverable(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Operation '{0}' requires remote processing")]
    RemoteProcessingRequired(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Invalid image: {0}")]
    Image(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Stable machine-readable code, used at the JSON boundary.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::PasswordRequired(_) => "password_required",
            EngineError::StructurallyInvalid(_) => "structurally_invalid",
            EngineError::Unrecoverable(_) => "unrecoverable",
            EngineError::UnsupportedOperation(_) => "unsupported_operation",
            EngineError::Validation(_) => "validation",
            EngineError::RemoteProcessingRequired(_) => "remote_processing_required",
            EngineError::Operation(_) => "operation_failed",
            EngineError::Image(_) => "invalid_image",
            EngineError::Archive(_) => "archive_failed",
            EngineError::Render(_) => "render_failed",
            EngineError::Serialization(_) => "serialization_failed",
        }
    }
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        EngineError::Operation(err.to_string())
    }
}
