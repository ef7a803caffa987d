//! The rendering engine as seen by the pipeline.
//!
//! The pipeline never names PDFium. It talks to four narrow operations:
//!
//! ```text
//! RenderEngine::open_document ──▶ EngineDocument::page ──▶ EnginePage::viewport
//!                                                         └▶ EnginePage::render ──▶ Surface
//! ```
//!
//! [`EngineModule`] is the factory the loader drives: it is loaded once,
//! then bound against a resolved [`WorkerSource`] to yield the shared
//! `Arc<dyn RenderEngine>`. Tests plug in their own module to exercise the
//! loader and pipeline without a real PDFium library.
//!
//! Documents and pages borrow from their engine, so a whole
//! open → page → render sequence runs inside one blocking task.

#[cfg(test)]
pub(crate) mod mock;
pub mod pdfium;

use crate::error::{ConvertError, EngineError};
use crate::loader::WorkerSource;
use std::sync::Arc;

/// Settings applied when a document is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Only report errors from the engine's own diagnostics.
    pub errors_only: bool,
    /// Where character-map data lives, for engines that fetch it.
    pub cmap_url: Option<String>,
    /// Where standard (base-14) font data lives, for engines that fetch it.
    pub standard_font_data_url: Option<String>,
    /// Fall back to system fonts for missing glyphs.
    pub use_system_fonts: bool,
}

impl DocumentOptions {
    /// Options with auxiliary resources resolved under `base`, if any.
    pub fn with_aux_base(base: Option<&str>) -> Self {
        let join = |leaf: &str| base.map(|b| format!("{}/{}/", b.trim_end_matches('/'), leaf));
        Self {
            errors_only: true,
            cmap_url: join("cmaps"),
            standard_font_data_url: join("standard_fonts"),
            use_system_fonts: true,
        }
    }
}

/// A loaded, ready-to-use engine.
pub trait RenderEngine: Send + Sync {
    /// Human-readable backend name, for logs and diagnostics.
    fn name(&self) -> &str;

    /// Parse a document from its raw bytes.
    fn open_document(
        &self,
        bytes: Vec<u8>,
        options: &DocumentOptions,
    ) -> Result<Box<dyn EngineDocument + '_>, EngineError>;
}

/// An open document.
pub trait EngineDocument {
    fn page_count(&self) -> usize;

    /// Load a page by its 1-indexed number.
    fn page(&self, number: usize) -> Result<Box<dyn EnginePage + '_>, EngineError>;
}

/// A loaded page.
pub trait EnginePage {
    /// The page's pixel rectangle at `scale`.
    fn viewport(&self, scale: f32) -> Viewport;

    /// Draw the page into `surface`, which is sized to `viewport`.
    fn render(
        &self,
        viewport: &Viewport,
        surface: &mut Surface,
        smoothing: bool,
    ) -> Result<(), EngineError>;
}

/// The factory the loader initialises exactly once.
pub trait EngineModule: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Engine version the pinned remote worker must match.
    fn version(&self) -> &str;

    /// Make sure the module itself can run here. Called before the worker
    /// source is resolved.
    fn load(&self) -> Result<(), EngineError>;

    /// Bind the engine to its worker. Blocking; may download.
    fn bind(&self, worker: &WorkerSource) -> Result<Arc<dyn RenderEngine>, EngineError>;
}

/// Page size in PDF points together with the requested scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width_pt: f32,
    pub height_pt: f32,
    pub scale: f32,
}

impl Viewport {
    pub fn new(width_pt: f32, height_pt: f32, scale: f32) -> Self {
        Self {
            width_pt,
            height_pt,
            scale,
        }
    }

    /// Whole pixels across; fractional pixels are dropped.
    pub fn pixel_width(&self) -> u32 {
        to_pixels(self.width_pt * self.scale)
    }

    pub fn pixel_height(&self) -> u32 {
        to_pixels(self.height_pt * self.scale)
    }
}

fn to_pixels(v: f32) -> u32 {
    if v.is_finite() && v > 0.0 {
        // saturating float → int cast
        v.floor() as u32
    } else {
        0
    }
}

/// An RGBA8 pixel buffer a page is drawn onto before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    /// Allocate a cleared surface, or report that the host cannot provide one.
    pub fn try_new(width: u32, height: u32) -> Result<Self, ConvertError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| surface_unavailable(width, height, "size overflow"))?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|e| surface_unavailable(width, height, &e.to_string()))?;
        pixels.resize(len, 0);

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Fill every pixel with one RGBA colour.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }
}

fn surface_unavailable(width: u32, height: u32, reason: &str) -> ConvertError {
    ConvertError::Environment(format!(
        "2D drawing surface ({width}x{height}) is not supported in this environment: {reason}"
    ))
}
