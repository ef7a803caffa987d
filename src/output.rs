//! What a conversion hands back.
//!
//! [`ConversionResult`] mirrors the shape UI code expects: an `image_url` to
//! show, a `file` to offer for download, and an `error` to display. On
//! success `error` is `None`; on failure `image_url` is empty and `file` is
//! `None`.

use crate::pipeline::encode::{data_url, PNG_MIME};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

static RE_PDF_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.pdf$").unwrap());

/// Output name for a source document: a trailing `.pdf` (any case) is
/// replaced by `.png`; any other name gets `.png` appended.
pub fn output_file_name(source_name: &str) -> String {
    format!("{}.png", RE_PDF_SUFFIX.replace(source_name, ""))
}

/// An encoded PNG with the name it should be saved under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PngFile {
    name: String,
    mime_type: String,
    size: usize,
    #[serde(skip)]
    bytes: Vec<u8>,
}

impl PngFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: PNG_MIME.to_string(),
            size: bytes.len(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// The outcome of one conversion. Exactly one of `file` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    /// `data:image/png;base64,…`, or empty on failure.
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PngFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A failed [`ConversionResult`] turned into an error value.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionFailed(pub String);

impl ConversionResult {
    pub fn success(file: PngFile) -> Self {
        Self {
            image_url: data_url(file.bytes()),
            file: Some(file),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            image_url: String::new(),
            file: None,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.file.is_some()
    }

    /// The PNG on success, the error message otherwise.
    pub fn into_result(self) -> Result<PngFile, ConversionFailed> {
        match (self.file, self.error) {
            (Some(file), None) => Ok(file),
            (_, Some(error)) => Err(ConversionFailed(error)),
            (None, None) => Err(ConversionFailed("Conversion produced no image".into())),
        }
    }
}
