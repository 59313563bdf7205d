//! Page rasterization
//!
//! The engine never binds a rasterizer itself. Callers build one
//! [`RenderingContext`] per process (for example from the pdfium backend) and
//! pass it to whatever needs page images.

#[cfg(feature = "pdfium")]
pub mod pdfium;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::EngineError;

/// Cooperative cancellation flag shared between a caller and a render.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Render)` once cancelled; call between render steps.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Render("render cancelled".into()))
        } else {
            Ok(())
        }
    }
}

/// Packed 8-bit RGB pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RasterImage {
    /// Flatten RGBA onto a white background.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Self {
        let rgb = rgba
            .chunks_exact(4)
            .flat_map(|px| {
                let alpha = px[3] as u32;
                let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
                [blend(px[0]), blend(px[1]), blend(px[2])]
            })
            .collect();
        Self { width, height, rgb }
    }
}

/// A rasterizer backend.
pub trait PageRasterizer: Send + Sync {
    /// Open `bytes` as leniently as the backend allows.
    fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>, EngineError>;
}

/// A document opened by a [`PageRasterizer`].
pub trait RasterDocument {
    fn page_count(&self) -> usize;

    /// Render one zero-based page at `scale` times its point size.
    /// Implementations poll `cancel` between steps.
    fn render_page(
        &self,
        index: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<RasterImage, EngineError>;
}

/// Handle to the process's rasterizer, if one is configured.
#[derive(Clone, Default)]
pub struct RenderingContext {
    backend: Option<Arc<dyn PageRasterizer>>,
}

impl fmt::Debug for RenderingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderingContext")
            .field("available", &self.is_available())
            .finish()
    }
}

impl RenderingContext {
    pub fn new(backend: impl PageRasterizer + 'static) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
        }
    }

    /// A context without a backend; every render fails.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Bind the native pdfium library.
    #[cfg(feature = "pdfium")]
    pub fn pdfium() -> Result<Self, EngineError> {
        Ok(Self::new(pdfium::PdfiumRasterizer::bind()?))
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn open<'a>(&'a self, bytes: &'a [u8]) -> Result<Box<dyn RasterDocument + 'a>, EngineError> {
        match &self.backend {
            Some(backend) => backend.open(bytes),
            None => Err(EngineError::Render(
                "no rendering backend is configured".into(),
            )),
        }
    }
}

/// Proof that a render was started for a page, and which generation it is.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    page: usize,
    generation: u64,
    token: CancellationToken,
}

impl RenderTicket {
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    token: CancellationToken,
    image: Option<RasterImage>,
}

/// Per-page render bookkeeping for preview-style callers.
///
/// Starting a render for a page cancels the one in flight for that page, and
/// a superseded render can never write its result into the slot.
#[derive(Default)]
pub struct RenderSlots {
    slots: Mutex<HashMap<usize, Slot>>,
}

impl RenderSlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel any in-flight render of `page` and start a new generation.
    pub fn begin(&self, page: usize) -> RenderTicket {
        let mut slots = self.lock();
        let slot = slots.entry(page).or_default();
        slot.token.cancel();
        slot.generation += 1;
        slot.token = CancellationToken::new();
        RenderTicket {
            page,
            generation: slot.generation,
            token: slot.token.clone(),
        }
    }

    /// Store `image` if `ticket` is still the newest render of its page.
    pub fn commit(&self, ticket: &RenderTicket, image: RasterImage) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(&ticket.page) {
            Some(slot) if slot.generation == ticket.generation && !ticket.token.is_cancelled() => {
                slot.image = Some(image);
                true
            }
            _ => {
                debug!(page = ticket.page, "dropping superseded render");
                false
            }
        }
    }

    pub fn image(&self, page: usize) -> Option<RasterImage> {
        self.lock().get(&page).and_then(|slot| slot.image.clone())
    }

    /// Render `page` of `doc` into its slot. Returns whether the result landed.
    pub fn render(
        &self,
        doc: &dyn RasterDocument,
        page: usize,
        scale: f32,
    ) -> Result<bool, EngineError> {
        let ticket = self.begin(page);
        let image = doc.render_page(page, scale, ticket.token())?;
        Ok(self.commit(&ticket, image))
    }
}
