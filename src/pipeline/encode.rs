//! Image encoding: [`Surface`] → PNG bytes → `data:` URL.
//!
//! PNG is lossless, so the caller's quality hint cannot trade fidelity for
//! size. It picks compression effort instead: the default quality of 1.0
//! asks for the smallest file, low values for the fastest encode.

use crate::engine::Surface;
use crate::error::ConvertError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

pub const PNG_MIME: &str = "image/png";

/// Message reported when the encoder produces nothing.
pub const ENCODE_FAILED: &str = "Failed to create image blob from canvas";

/// Map the `[0, 1]` quality hint onto PNG compression effort.
///
/// Values outside the range are clamped; NaN counts as the 1.0 default.
pub fn compression_for(quality: f32) -> CompressionType {
    let quality = if quality.is_nan() { 1.0 } else { quality.clamp(0.0, 1.0) };
    if quality >= 0.9 {
        CompressionType::Best
    } else if quality >= 0.5 {
        CompressionType::Default
    } else {
        CompressionType::Fast
    }
}

/// Encode a rendered surface as PNG. `None` when the encoder yields no data.
pub fn encode_png(surface: &Surface, quality: f32) -> Option<Vec<u8>> {
    if surface.width() == 0 || surface.height() == 0 {
        return None;
    }

    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression_for(quality), FilterType::Adaptive);
    if let Err(e) = encoder.write_image(
        surface.pixels(),
        surface.width(),
        surface.height(),
        ExtendedColorType::Rgba8,
    ) {
        debug!("PNG encoder failed: {}", e);
        return None;
    }

    debug!(
        "Encoded {}x{} surface → {} bytes PNG",
        surface.width(),
        surface.height(),
        buf.len()
    );
    (!buf.is_empty()).then_some(buf)
}

/// [`encode_png`] on the blocking pool; encoding large pages is CPU-heavy.
pub async fn encode_png_async(surface: Surface, quality: f32) -> Result<Vec<u8>, ConvertError> {
    tokio::task::spawn_blocking(move || encode_png(&surface, quality))
        .await
        .map_err(|e| ConvertError::Internal(format!("Encode task panicked: {}", e)))?
        .ok_or_else(|| ConvertError::Encoding(ENCODE_FAILED.into()))
}

/// Wrap PNG bytes in a self-contained `data:image/png;base64,…` URL.
pub fn data_url(png: &[u8]) -> String {
    format!("data:{};base64,{}", PNG_MIME, STANDARD.encode(png))
}
