//! PDFium backend for the engine traits.
//!
//! The worker source is the PDFium shared library. A local path is bound
//! directly; a URL is first materialised into the pdfium-fetch cache
//! directory and then bound from there.

use super::{DocumentOptions, EngineDocument, EngineModule, EnginePage, RenderEngine, Surface, Viewport};
use crate::config::ResourceLocation;
use crate::error::EngineError;
use crate::loader::WorkerSource;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine module backed by the PDFium library.
#[derive(Debug, Default, Clone)]
pub struct PdfiumModule {
    /// Where a downloaded library is stored. Default: pdfium-fetch's cache.
    download_dir: Option<PathBuf>,
}

impl PdfiumModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store downloaded libraries under `dir` instead of the shared cache.
    pub fn with_download_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: Some(dir.into()),
        }
    }

    fn download_target(&self) -> Result<PathBuf, EngineError> {
        let info = pdfium_fetch::detect_platform().map_err(|e| EngineError::new(e.to_string()))?;
        Ok(match &self.download_dir {
            Some(dir) => dir.join(info.lib_name),
            None => pdfium_fetch::pdfium_cache_dir().join(info.lib_name),
        })
    }
}

impl EngineModule for PdfiumModule {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn version(&self) -> &str {
        pdfium_fetch::PDFIUM_VERSION
    }

    fn load(&self) -> Result<(), EngineError> {
        pdfium_fetch::detect_platform()
            .map(|_| ())
            .map_err(|e| EngineError::new(e.to_string()))
    }

    fn bind(&self, worker: &WorkerSource) -> Result<Arc<dyn RenderEngine>, EngineError> {
        let lib_path = match &worker.location {
            ResourceLocation::Path(path) => path.clone(),
            ResourceLocation::Url(url) => {
                let dest = self.download_target()?;
                if dest.exists() {
                    debug!("Reusing downloaded PDFium at {}", dest.display());
                } else {
                    info!("Fetching PDFium worker from {}", url);
                    pdfium_fetch::fetch_library(url, &dest).map_err(|e| EngineError::new(e.to_string()))?;
                }
                dest
            }
        };

        let pdfium = pdfium_fetch::bind_from_path(&lib_path).map_err(|e| {
            // A library in our own download dir that won't bind is discarded
            // so the next attempt fetches it again.
            if self.download_target().is_ok_and(|target| target == lib_path) {
                warn!("Discarding unusable PDFium at {}", lib_path.display());
                if let Err(rm) = std::fs::remove_file(&lib_path) {
                    warn!("Could not remove {}: {}", lib_path.display(), rm);
                }
            }
            EngineError::new(e.to_string())
        })?;
        info!("PDFium bound from {}", lib_path.display());

        Ok(Arc::new(PdfiumEngine { pdfium }))
    }
}

/// A bound PDFium library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl RenderEngine for PdfiumEngine {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn open_document(
        &self,
        bytes: Vec<u8>,
        options: &DocumentOptions,
    ) -> Result<Box<dyn EngineDocument + '_>, EngineError> {
        // PDFium ships its own cmaps and base-14 fonts; the remote hints only
        // matter to engines that fetch them.
        if options.cmap_url.is_some() || options.standard_font_data_url.is_some() {
            debug!("Ignoring remote cmap/font hints: embedded in PDFium");
        }

        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| EngineError::new(format!("{:?}", e)))?;

        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl EngineDocument for PdfiumDocument<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page(&self, number: usize) -> Result<Box<dyn EnginePage + '_>, EngineError> {
        let index = number
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| EngineError::new(format!("page {number} is not addressable")))?;

        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| EngineError::new(format!("{:?}", e)))?;

        Ok(Box::new(PdfiumPage { page }))
    }
}

struct PdfiumPage<'a> {
    page: PdfPage<'a>,
}

impl EnginePage for PdfiumPage<'_> {
    fn viewport(&self, scale: f32) -> Viewport {
        Viewport::new(self.page.width().value, self.page.height().value, scale)
    }

    fn render(
        &self,
        viewport: &Viewport,
        surface: &mut Surface,
        smoothing: bool,
    ) -> Result<(), EngineError> {
        let config = PdfRenderConfig::new()
            .set_target_width(viewport.pixel_width() as i32)
            .set_target_height(viewport.pixel_height() as i32)
            .set_text_smoothing(smoothing)
            .set_image_smoothing(smoothing)
            .set_path_smoothing(smoothing);

        let bitmap = self
            .page
            .render_with_config(&config)
            .map_err(|e| EngineError::new(format!("{:?}", e)))?;

        let image = bitmap.as_image().into_rgba8();
        debug!(
            "PDFium rendered {}x{} px into {}x{} surface",
            image.width(),
            image.height(),
            surface.width(),
            surface.height()
        );

        blit(image.as_raw(), image.width(), surface);
        Ok(())
    }
}

/// Copy the overlapping region of an RGBA buffer into `surface`.
///
/// PDFium may round the target size differently from [`Viewport`]; any
/// extra row or column on either side is dropped.
fn blit(src: &[u8], src_width: u32, surface: &mut Surface) {
    let src_stride = src_width as usize * 4;
    if src_stride == 0 {
        return;
    }
    let dst_stride = surface.width() as usize * 4;
    let row_len = src_stride.min(dst_stride);

    for (dst_row, src_row) in surface
        .pixels_mut()
        .chunks_exact_mut(dst_stride.max(1))
        .zip(src.chunks_exact(src_stride))
    {
        dst_row[..row_len].copy_from_slice(&src_row[..row_len]);
    }
}
