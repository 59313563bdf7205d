//! Rasterizer backed by the native pdfium library.

use pdfium_render::prelude::*;

use super::{CancellationToken, PageRasterizer, RasterDocument, RasterImage};
use crate::error::EngineError;

pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind pdfium from the working directory, falling back to the system library.
    pub fn bind() -> Result<Self, EngineError> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name()))
            .map_err(|e| EngineError::Render(format!("Failed to bind to Pdfium library: {}", e)))?;
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>, EngineError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl RasterDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(
        &self,
        index: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<RasterImage, EngineError> {
        cancel.check()?;
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| EngineError::Render(e.to_string()))?;

        let config = PdfRenderConfig::new()
            .set_target_width((page.width().value * scale) as i32)
            .set_maximum_height((page.height().value * scale) as i32);
        cancel.check()?;
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        cancel.check()?;

        Ok(RasterImage::from_rgba(
            bitmap.width() as u32,
            bitmap.height() as u32,
            &bitmap.as_rgba_bytes(),
        ))
    }
}
