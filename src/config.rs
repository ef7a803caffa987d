//! Configuration types for page-to-PNG conversion.
//!
//! Two structs cover everything tunable:
//!
//! * [`ConvertOptions`] — per-call knobs (page, scale, quality), built via
//!   [`ConvertOptionsBuilder`] or used with [`ConvertOptions::default()`].
//! * [`LoaderConfig`] — process-wide engine loading policy: where the local
//!   worker library lives, the pinned remote fallback, and an optional
//!   externally configured worker source that skips probing altogether.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Largest accepted input: 50 MiB.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Largest accepted rendered width or height, in pixels.
pub const MAX_DIMENSION: u32 = 8192;

/// Options for a single conversion.
///
/// # Example
/// ```rust
/// use pdf2png::ConvertOptions;
///
/// let options = ConvertOptions::builder()
///     .page_number(3)
///     .scale(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(options.page_number, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Linear render scale. 1.0 renders one pixel per PDF point. Default: 2.0.
    ///
    /// The default of 2 produces crisp previews on high-density screens; an
    /// A4 page comes out at 1190 × 1684 px.
    pub scale: f32,

    /// 1-indexed page to render. Default: 1.
    ///
    /// Not range-checked until the document is open, because only then is
    /// the page count known.
    pub page_number: usize,

    /// Encoder quality hint in `[0.0, 1.0]`. Default: 1.0.
    ///
    /// Out-of-range values are clamped by the encoder, never rejected.
    ///
    /// PNG is lossless, so the hint selects compression effort rather than
    /// fidelity: see [`crate::pipeline::encode::compression_for`].
    pub quality: f32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            page_number: 1,
            quality: 1.0,
        }
    }
}

impl ConvertOptions {
    /// Create a new builder for `ConvertOptions`.
    pub fn builder() -> ConvertOptionsBuilder {
        ConvertOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Check the constraints that do not depend on the document.
    pub fn validate(&self) -> Result<(), String> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(format!("Scale must be a positive number, got {}", self.scale));
        }
        Ok(())
    }
}

/// Builder for [`ConvertOptions`].
#[derive(Debug)]
pub struct ConvertOptionsBuilder {
    options: ConvertOptions,
}

impl ConvertOptionsBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.options.scale = scale;
        self
    }

    pub fn page_number(mut self, page: usize) -> Self {
        self.options.page_number = page;
        self
    }

    pub fn quality(mut self, quality: f32) -> Self {
        self.options.quality = quality;
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ConvertOptions, ConvertError> {
        self.options.validate().map_err(ConvertError::Validation)?;
        Ok(self.options)
    }
}

// ── Resource locations ───────────────────────────────────────────────────

/// Where a worker resource lives: on the local filesystem or behind HTTP(S).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceLocation {
    Path(PathBuf),
    Url(String),
}

impl ResourceLocation {
    /// Interpret `s` as a URL when it has an `http://` / `https://` scheme,
    /// otherwise as a path.
    pub fn parse(s: &str) -> Self {
        if crate::pipeline::input::is_url(s) {
            ResourceLocation::Url(s.to_string())
        } else {
            ResourceLocation::Path(PathBuf::from(s))
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ResourceLocation::Url(_))
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocation::Path(p) => write!(f, "{}", p.display()),
            ResourceLocation::Url(u) => f.write_str(u),
        }
    }
}

// ── Loader configuration ─────────────────────────────────────────────────

/// Engine loading policy.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Worker source chosen by the host. When set, the loader uses it as-is
    /// and never probes.
    pub worker_src: Option<ResourceLocation>,

    /// Preferred local worker resource, probed before falling back.
    /// Default: the platform library inside the pdfium-fetch cache directory.
    pub local_worker: Option<ResourceLocation>,

    /// Pinned remote worker used when the local probe fails.
    /// Default: the pdfium-binaries release asset for this platform.
    pub remote_worker: ResourceLocation,

    /// Base URL for engines that fetch character maps and standard font data
    /// remotely. `None` for PDFium, which embeds both.
    pub aux_resources_base: Option<String>,

    /// Timeout for the HTTP `HEAD` probe. Default: 10.
    pub probe_timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let remote = pdfium_fetch::release_url().unwrap_or_else(|_| {
            format!(
                "{}/chromium%2F{}",
                pdfium_fetch::BASE_URL,
                pdfium_fetch::PDFIUM_VERSION
            )
        });

        Self {
            worker_src: None,
            local_worker: pdfium_fetch::local_library_path()
                .ok()
                .map(ResourceLocation::Path),
            remote_worker: ResourceLocation::Url(remote),
            aux_resources_base: None,
            probe_timeout_secs: 10,
        }
    }
}

impl LoaderConfig {
    /// Defaults, overridden by the environment:
    ///
    /// * `PDF2PNG_WORKER_SRC` — externally configured worker source (no probe)
    /// * `PDFIUM_LIB_PATH` — same, kept for pdfium-render familiarity
    /// * `PDF2PNG_LOCAL_WORKER` — replaces the local worker candidate
    /// * `PDF2PNG_AUX_BASE` — base URL for character maps / standard fonts
    pub fn from_env() -> Self {
        let mut config = Self::default();

        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(src) = non_empty("PDF2PNG_WORKER_SRC").or_else(|| non_empty("PDFIUM_LIB_PATH")) {
            config.worker_src = Some(ResourceLocation::parse(&src));
        }
        if let Some(local) = non_empty("PDF2PNG_LOCAL_WORKER") {
            config.local_worker = Some(ResourceLocation::parse(&local));
        }
        if let Some(base) = non_empty("PDF2PNG_AUX_BASE") {
            config.aux_resources_base = Some(base);
        }

        config
    }

    pub fn worker_src(mut self, location: ResourceLocation) -> Self {
        self.worker_src = Some(location);
        self
    }

    pub fn local_worker(mut self, location: ResourceLocation) -> Self {
        self.local_worker = Some(location);
        self
    }

    pub fn remote_worker(mut self, location: ResourceLocation) -> Self {
        self.remote_worker = location;
        self
    }
}
