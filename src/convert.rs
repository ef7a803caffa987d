//! Conversion entry points.
//!
//! [`Converter::convert`] is the boundary: whatever happens inside, the
//! caller gets a [`ConversionResult`] back, never an `Err` and never a
//! panic from a blocking task. [`Converter::try_convert`] is the same
//! pipeline with typed errors, for callers (like [`convert_to_file`]) that
//! prefer `?`.

use crate::config::ConvertOptions;
use crate::engine::DocumentOptions;
use crate::error::ConvertError;
use crate::loader::EngineLoader;
use crate::output::{output_file_name, ConversionResult, PngFile};
use crate::pipeline::input::{self, InputFile};
use crate::pipeline::{encode, render};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives documents through the pipeline using one [`EngineLoader`].
#[derive(Debug, Clone)]
pub struct Converter {
    loader: EngineLoader,
}

impl Converter {
    pub fn new(loader: EngineLoader) -> Self {
        Self { loader }
    }

    /// A converter on the process-wide loader.
    pub fn global() -> Self {
        Self::new(EngineLoader::global().clone())
    }

    pub fn loader(&self) -> &EngineLoader {
        &self.loader
    }

    /// Convert one page of `file` to PNG.
    ///
    /// Every failure, from a missing file to a panicking encoder, comes back
    /// as a failed [`ConversionResult`] carrying a readable message.
    pub async fn convert(&self, file: Option<&InputFile>, options: &ConvertOptions) -> ConversionResult {
        match self.try_convert(file, options).await {
            Ok(png) => ConversionResult::success(png),
            Err(e) => {
                warn!(kind = e.kind(), "Conversion failed: {}", e);
                ConversionResult::failure(e.to_string())
            }
        }
    }

    /// [`Converter::convert`] with the error left typed.
    pub async fn try_convert(
        &self,
        file: Option<&InputFile>,
        options: &ConvertOptions,
    ) -> Result<PngFile, ConvertError> {
        let start = Instant::now();

        // ── Step 1: Validate (no engine access) ──────────────────────────
        let file = input::validate(file)?;
        options.validate().map_err(ConvertError::Validation)?;
        info!(
            "Converting page {} of '{}' ({} bytes) at scale {}",
            options.page_number,
            file.name(),
            file.size(),
            options.scale
        );

        // ── Step 2: Engine ───────────────────────────────────────────────
        let handle = self.loader.acquire().await?;

        // ── Step 3: Read bytes ───────────────────────────────────────────
        let bytes = file.read_bytes().await?;

        // ── Steps 4–7: Open, select page, size surface, render ───────────
        let doc_options = DocumentOptions::with_aux_base(self.loader.config().aux_resources_base.as_deref());
        let render_start = Instant::now();
        let surface = render::render_page(
            handle.engine(),
            bytes,
            doc_options,
            options.page_number,
            options.scale,
        )
        .await?;
        debug!("Rendered in {}ms", render_start.elapsed().as_millis());

        // ── Step 8: Encode ───────────────────────────────────────────────
        let png = encode::encode_png_async(surface, options.quality).await?;

        // ── Step 9: Package ──────────────────────────────────────────────
        let file = PngFile::new(output_file_name(file.name()), png);
        info!(
            "Conversion complete: '{}' ({} bytes) in {}ms",
            file.name(),
            file.size(),
            start.elapsed().as_millis()
        );
        Ok(file)
    }
}

/// Convert one page with the process-wide loader.
pub async fn convert(file: Option<&InputFile>, options: &ConvertOptions) -> ConversionResult {
    Converter::global().convert(file, options).await
}

/// Convert a local path or URL and write the PNG to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    options: &ConvertOptions,
) -> Result<PngFile, ConvertError> {
    let file = input::resolve_input(input_str.as_ref(), 120).await?;
    let png = Converter::global().try_convert(Some(&file), options).await?;
    write_atomic(output_path.as_ref(), png.bytes()).await?;
    Ok(png)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally. Blocking inside a runtime is
/// not allowed, so called from async code it returns a failure result
/// instead; use [`convert`] there.
pub fn convert_sync(file: Option<&InputFile>, options: &ConvertOptions) -> ConversionResult {
    if tokio::runtime::Handle::try_current().is_ok() {
        return ConversionResult::failure(
            "convert_sync cannot run inside an async runtime; use convert().await instead",
        );
    }
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(convert(file, options)),
        Err(e) => ConversionResult::failure(format!("Internal error: failed to create tokio runtime: {e}")),
    }
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so a
/// failed write never leaves a partial PNG behind.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let write_err = |source| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
