//! Page rasterisation: open the document, pick the page, size a surface,
//! draw.
//!
//! Documents and pages borrow from the engine and PDFium handles are not
//! `Send`, so the whole sequence runs as one unit inside
//! `tokio::task::spawn_blocking`. The steps still happen strictly in order
//! and each maps to its own error.

use crate::config::MAX_DIMENSION;
use crate::engine::{DocumentOptions, RenderEngine, Surface};
use crate::error::ConvertError;
use std::sync::Arc;
use tracing::{debug, info};

/// Render one page of `bytes` at `scale`.
pub async fn render_page(
    engine: Arc<dyn RenderEngine>,
    bytes: Vec<u8>,
    options: DocumentOptions,
    page_number: usize,
    scale: f32,
) -> Result<Surface, ConvertError> {
    tokio::task::spawn_blocking(move || {
        render_page_blocking(engine.as_ref(), bytes, &options, page_number, scale)
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("Render task panicked: {}", e)))?
}

/// Blocking implementation of page rendering.
pub fn render_page_blocking(
    engine: &dyn RenderEngine,
    bytes: Vec<u8>,
    options: &DocumentOptions,
    page_number: usize,
    scale: f32,
) -> Result<Surface, ConvertError> {
    let invalid_document = || ConvertError::Document("PDF document is invalid or has no pages".into());

    let document = engine.open_document(bytes, options).map_err(|e| {
        debug!("{} rejected document: {}", engine.name(), e);
        invalid_document()
    })?;

    let total_pages = document.page_count();
    if total_pages == 0 {
        return Err(invalid_document());
    }
    info!("PDF loaded: {} pages", total_pages);

    if page_number < 1 || page_number > total_pages {
        return Err(ConvertError::Validation(format!(
            "Invalid page number {}. Document has {} pages.",
            page_number, total_pages
        )));
    }

    let page = document
        .page(page_number)
        .map_err(|e| ConvertError::Document(format!("Failed to load page {}: {}", page_number, e)))?;

    let viewport = page.viewport(scale);
    let (width, height) = (viewport.pixel_width(), viewport.pixel_height());
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ConvertError::Validation(format!(
            "Rendered page would be {}x{} pixels, exceeding the {}x{} limit. Try reducing the scale.",
            width, height, MAX_DIMENSION, MAX_DIMENSION
        )));
    }

    let mut surface = Surface::try_new(width, height)?;

    page.render(&viewport, &mut surface, true)
        .map_err(|e| ConvertError::Document(format!("Failed to render page {}: {}", page_number, e)))?;

    debug!("Rendered page {} → {}x{} px", page_number, width, height);
    Ok(surface)
}
