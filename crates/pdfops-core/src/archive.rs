//! ZIP packaging for operations that produce several files.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::EngineError;

/// Pack `(name, bytes)` entries into an in-memory ZIP, in order.
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, EngineError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| EngineError::Archive(format!("{}: {}", name, e)))?;
        writer
            .write_all(bytes)
            .map_err(|e| EngineError::Archive(format!("{}: {}", name, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| EngineError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
