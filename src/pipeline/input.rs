//! Input files: where the PDF bytes come from, and the up-front checks.
//!
//! An [`InputFile`] carries what a browser `File` would: a name, a MIME type
//! and a byte length, plus the content itself (in memory or on disk). The
//! checks in [`validate`] only look at that metadata; the bytes are read
//! later by [`InputFile::read_bytes`], after the engine is ready.

use crate::config::MAX_FILE_SIZE;
use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub const PDF_MIME: &str = "application/pdf";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Where an input's bytes live.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Vec<u8>),
    Path(PathBuf),
}

/// A named document awaiting conversion.
#[derive(Debug, Clone)]
pub struct InputFile {
    name: String,
    mime_type: String,
    size: u64,
    source: FileSource,
}

impl InputFile {
    /// Wrap bytes already in memory.
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    /// Describe a file on disk without reading it.
    ///
    /// The MIME type is `application/pdf` when the extension is `.pdf` or the
    /// file starts with the `%PDF` magic, and `application/octet-stream`
    /// otherwise.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ConvertError::Validation(format!("Cannot open '{}': {}", path.display(), e)))?;
        if !meta.is_file() {
            return Err(ConvertError::Validation(format!(
                "'{}' is not a file",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mime_type = if has_pdf_extension(&name) || starts_with_pdf_magic(path).await {
            PDF_MIME
        } else {
            FALLBACK_MIME
        };

        debug!("Resolved local input: {} ({} bytes, {})", path.display(), meta.len(), mime_type);
        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            size: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Download a document into memory.
    ///
    /// The name comes from the last URL path segment (default
    /// `downloaded.pdf`); the MIME type from `Content-Type`. Bodies over
    /// [`MAX_FILE_SIZE`] are refused without being buffered in full.
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, ConvertError> {
        info!("Downloading PDF from: {}", url);
        let download_err = |e: reqwest::Error| ConvertError::Download {
            url: url.to_string(),
            reason: if e.is_timeout() {
                format!("timed out after {timeout_secs}s")
            } else {
                e.to_string()
            },
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(download_err)?;

        let mut response = client.get(url).send().await.map_err(download_err)?;

        if !response.status().is_success() {
            return Err(ConvertError::Download {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        if let Some(len) = response.content_length().filter(|&len| len > MAX_FILE_SIZE) {
            return Err(too_large(Some(len)));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        let mut bytes = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await.map_err(download_err)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > MAX_FILE_SIZE {
                debug!("Aborting download of {} after {} bytes", url, bytes.len());
                return Err(too_large(None));
            }
        }

        info!("Downloaded {} bytes ({})", bytes.len(), mime_type);
        Ok(Self::from_bytes(filename_from_url(url), mime_type, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// `true` when the MIME type or the filename says PDF.
    pub fn looks_like_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PDF_MIME) || has_pdf_extension(&self.name)
    }

    /// Read the whole document. Empty or unreadable content is a
    /// validation failure.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, ConvertError> {
        let bytes = match &self.source {
            FileSource::Memory(bytes) => Some(bytes.clone()),
            FileSource::Path(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    debug!("Reading {} failed: {}", path.display(), e);
                    None
                }
            },
        };

        bytes
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ConvertError::Validation("Failed to read file or file is empty".into()))
    }
}

/// Check presence, type and size. Never touches the engine or the bytes.
pub fn validate(file: Option<&InputFile>) -> Result<&InputFile, ConvertError> {
    let file = file.ok_or_else(|| ConvertError::Validation("No file provided".into()))?;

    if !file.looks_like_pdf() {
        return Err(ConvertError::Validation("File must be a PDF".into()));
    }

    if file.size > MAX_FILE_SIZE {
        return Err(too_large(Some(file.size)));
    }

    Ok(file)
}

/// The size-limit failure. `size` is `None` when a download was cut off
/// before its length was known.
fn too_large(size: Option<u64>) -> ConvertError {
    let limit = MAX_FILE_SIZE / (1024 * 1024);
    ConvertError::Validation(match size {
        Some(size) => format!(
            "File is too large ({:.1} MB). Maximum size is {} MB.",
            size as f64 / (1024.0 * 1024.0),
            limit
        ),
        None => format!("File is too large (over {limit} MB). Maximum size is {limit} MB."),
    })
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a CLI-style input (local path or HTTP/HTTPS URL) to an [`InputFile`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputFile, ConvertError> {
    if is_url(input) {
        InputFile::from_url(input, timeout_secs).await
    } else {
        InputFile::from_path(input).await
    }
}

fn has_pdf_extension(name: &str) -> bool {
    name.len() >= 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"))
}

async fn starts_with_pdf_magic(path: &Path) -> bool {
    let Ok(mut f) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    f.read_exact(&mut magic).await.is_ok() && &magic == b"%PDF"
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
