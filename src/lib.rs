//! # pdf2png
//!
//! Render one page of a PDF document to a PNG image.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate  presence, type, size (no engine access)
//!  ├─ 2. Engine    lazy, shared PDFium initialisation (local library, else pinned release)
//!  ├─ 3. Render    open → page → viewport → surface (CPU-bound, spawn_blocking)
//!  ├─ 4. Encode    surface → PNG (spawn_blocking)
//!  └─ 5. Output    data URL + PngFile named after the source
//! ```
//!
//! Conversion never returns `Err`: every failure comes back as a
//! [`ConversionResult`] with `error` set, so UI code can display it directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2png::{convert, ConvertOptions, InputFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = InputFile::from_path("report.pdf").await?;
//!     let options = ConvertOptions::builder().page_number(2).scale(1.5).build()?;
//!
//!     let result = convert(Some(&file), &options).await;
//!     let png = result.into_result()?;
//!     std::fs::write(png.name(), png.bytes())?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2png` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2png = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing the PDFium library
//!
//! On first use the loader looks for a PDFium shared library in the
//! pdfium-fetch cache directory. If it is not there, the pinned
//! `pdfium-binaries` release is downloaded into that directory. Set
//! `PDF2PNG_WORKER_SRC` (or `PDFIUM_LIB_PATH`) to skip the lookup entirely,
//! or install a custom [`EngineLoader`] with [`EngineLoader::install_global`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod loader;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConvertOptions, ConvertOptionsBuilder, LoaderConfig, ResourceLocation, MAX_DIMENSION, MAX_FILE_SIZE};
pub use convert::{convert, convert_sync, convert_to_file, Converter};
pub use diagnostics::{check_worker_resource, probe_engine, EngineProbe, WorkerResourceCheck};
pub use engine::{DocumentOptions, EngineDocument, EngineModule, EnginePage, RenderEngine, Surface, Viewport};
pub use error::{ConvertError, EngineError, EngineLoadError, LoadStage, ProbeError};
pub use loader::{acquire_engine, EngineHandle, EngineLoader, ExistenceProbe, ResourceProbe, WorkerOrigin, WorkerSource};
pub use output::{output_file_name, ConversionFailed, ConversionResult, PngFile};
pub use pipeline::input::{resolve_input, InputFile};
