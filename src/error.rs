//! Error types for the pdf2png library.
//!
//! [`ConvertError`] is the taxonomy of everything that can stop a page from
//! becoming a PNG. It never escapes [`crate::convert::Converter::convert`]:
//! the pipeline renders it to a message with `Display` and packs that into a
//! failed [`crate::output::ConversionResult`].
//!
//! [`EngineLoadError`] is what the loader hands back from
//! [`crate::loader::EngineLoader::acquire`]. It is `Clone` because every
//! caller that joined the same in-flight initialisation receives its own copy
//! of the one outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Why a conversion failed.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Malformed or out-of-policy input; the caller can fix it by changing
    /// the file or the options.
    #[error("{0}")]
    Validation(String),

    /// The rendering engine or its worker library failed to initialise.
    #[error(transparent)]
    EngineLoad(#[from] EngineLoadError),

    /// The bytes do not parse into a usable document, or a page could not be
    /// loaded or rendered.
    #[error("{0}")]
    Document(String),

    /// The host cannot provide a drawing surface.
    #[error("{0}")]
    Environment(String),

    /// The surface could not be encoded to an image.
    #[error("{0}")]
    Encoding(String),

    /// A URL input could not be downloaded.
    #[error("Failed to download '{url}': {reason}")]
    Download { url: String, reason: String },

    /// The PNG could not be written to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Short machine-friendly name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::Validation(_) => "validation",
            ConvertError::EngineLoad(_) => "engine_load",
            ConvertError::Document(_) => "document",
            ConvertError::Environment(_) => "environment",
            ConvertError::Encoding(_) => "encoding",
            ConvertError::Download { .. } => "download",
            ConvertError::OutputWriteFailed { .. } => "output",
            ConvertError::Internal(_) => "internal",
        }
    }
}

/// The stage of engine initialisation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// The engine module itself is unavailable (e.g. unsupported platform).
    Module,
    /// Binding the engine against the resolved worker source failed.
    Bind,
    /// The initialisation task panicked or was aborted.
    Task,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadStage::Module => "module",
            LoadStage::Bind => "bind",
            LoadStage::Task => "task",
        };
        f.write_str(s)
    }
}

/// Engine initialisation failed.
#[derive(Debug, Clone, Error)]
#[error("Failed to load PDF engine ({stage}): {detail}")]
pub struct EngineLoadError {
    pub stage: LoadStage,
    pub detail: String,
}

impl EngineLoadError {
    pub fn new(stage: LoadStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

/// A failure reported by a [`crate::engine::RenderEngine`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// The worker resource could not be confirmed to exist.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// HTTP probe answered with a non-success status.
    #[error("HEAD {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// HTTP probe did not complete.
    #[error("HEAD {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Filesystem probe found nothing usable at the path.
    #[error("'{path}' is not a readable file")]
    Missing { path: String },
}
