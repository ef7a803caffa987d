//! # pdfium-fetch
//!
//! Locate, download and bind the [PDFium](https://pdfium.googlesource.com/pdfium/)
//! shared library that `pdf2png` renders with.
//!
//! PDFium plays the part of the engine's *worker*: a separately shipped
//! binary that does the heavy parsing and rasterisation. This crate knows
//! where that binary lives:
//!
//! * **Locally** — [`local_library_path`] inside the per-version cache
//!   directory (or any path the caller configured).
//! * **Remotely** — [`release_url`], a pinned
//!   [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//!   release asset for the current platform.
//!
//! Deciding *which* of the two to use is the caller's job; this crate only
//! materialises a location on disk ([`fetch_library`]) and binds it
//! ([`bind_from_path`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_fetch::{bind_from_path, fetch_library, local_library_path, release_url};
//!
//! let dest = local_library_path().expect("supported platform");
//! if !dest.exists() {
//!     let url = release_url().expect("supported platform");
//!     fetch_library(&url, &dest).expect("download failed");
//! }
//! let pdfium = bind_from_path(&dest).expect("bind failed");
//! ```
//!
//! ## Environment variable overrides
//!
//! - `PDFIUM_FETCH_CACHE_DIR` — override the default cache directory.

use std::io::Read;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// The pdfium-binaries release tag the remote fallback is pinned to.
///
/// Maps to [`bblanchon/pdfium-binaries chromium/7690`](https://github.com/bblanchon/pdfium-binaries/releases/tag/chromium%2F7690).
pub const PDFIUM_VERSION: &str = "7690";

/// GitHub release base URL.
pub const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by pdfium-fetch operations.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The current OS/architecture combination is not supported.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// Could not create or navigate the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// gzip/tar extraction failed.
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// `libloading` / `pdfium-render` could not load the library.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform metadata ────────────────────────────────────────────────────────

/// Release asset naming for one OS/architecture pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Asset filename in the GitHub release, e.g. `pdfium-mac-arm64.tgz`.
    pub archive_name: &'static str,
    /// Relative path inside the archive, e.g. `lib/libpdfium.dylib`.
    pub lib_path_in_archive: &'static str,
    /// Filename to write on disk, e.g. `libpdfium.dylib`.
    pub lib_name: &'static str,
}

/// Detect the release asset matching the running platform.
pub fn detect_platform() -> Result<PlatformInfo, FetchError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_for(os: &str, arch: &str) -> Result<PlatformInfo, FetchError> {
    let (archive_name, lib_path_in_archive, lib_name) = match (os, arch) {
        ("macos", "aarch64") => ("pdfium-mac-arm64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("macos", "x86_64") => ("pdfium-mac-x64.tgz", "lib/libpdfium.dylib", "libpdfium.dylib"),
        ("linux", "x86_64") => ("pdfium-linux-x64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("linux", "aarch64") => ("pdfium-linux-arm64.tgz", "lib/libpdfium.so", "libpdfium.so"),
        ("windows", "x86_64") => ("pdfium-win-x64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "aarch64") => ("pdfium-win-arm64.tgz", "bin/pdfium.dll", "pdfium.dll"),
        ("windows", "x86") => ("pdfium-win-x86.tgz", "bin/pdfium.dll", "pdfium.dll"),
        (os, arch) => {
            return Err(FetchError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };

    Ok(PlatformInfo {
        archive_name,
        lib_path_in_archive,
        lib_name,
    })
}

// ── Locations ────────────────────────────────────────────────────────────────

/// Returns the per-version cache directory for the PDFium library.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/pdf2png/pdfium-{VERSION}/`
/// - **Linux**: `~/.cache/pdf2png/pdfium-{VERSION}/`
/// - **Windows**: `%LOCALAPPDATA%\pdf2png\pdfium-{VERSION}\`
///
/// Override by setting `PDFIUM_FETCH_CACHE_DIR`.
pub fn pdfium_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("PDFIUM_FETCH_CACHE_DIR") {
        return PathBuf::from(override_dir).join(format!("pdfium-{PDFIUM_VERSION}"));
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("pdf2png").join(format!("pdfium-{PDFIUM_VERSION}"))
}

/// Where the platform library is expected to live when it is available locally.
pub fn local_library_path() -> Result<PathBuf, FetchError> {
    let info = detect_platform()?;
    Ok(pdfium_cache_dir().join(info.lib_name))
}

/// The pinned remote release asset for the running platform.
pub fn release_url() -> Result<String, FetchError> {
    let info = detect_platform()?;
    Ok(format!(
        "{}/chromium%2F{}/{}",
        BASE_URL, PDFIUM_VERSION, info.archive_name
    ))
}

// ── Fetch & bind ─────────────────────────────────────────────────────────────

/// Downloads `url` and stores the PDFium library at `dest`.
///
/// `.tgz` / `.tar.gz` URLs are treated as release archives and the platform
/// library is extracted from them; anything else is assumed to be the bare
/// library and written as-is.
///
/// The library is written to a `.part` sibling and renamed into place, so
/// `dest` never holds a truncated download. Blocking.
pub fn fetch_library(url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(FetchError::CacheDir)?;
    }

    let bytes = download_bytes(url)?;
    if bytes.is_empty() {
        return Err(FetchError::Download(format!("empty response body from {url}")));
    }

    let part = partial_path(dest);
    let written = if is_archive(url) {
        detect_platform().and_then(|info| extract_library(&bytes, info.lib_path_in_archive, &part))
    } else {
        std::fs::write(&part, &bytes)
            .map_err(|e| FetchError::Extract(format!("write {}: {e}", part.display())))
    };

    if let Err(e) = written.and_then(|()| {
        std::fs::rename(&part, dest)
            .map_err(|e| FetchError::Extract(format!("rename into {}: {e}", dest.display())))
    }) {
        let _ = std::fs::remove_file(&part);
        return Err(e);
    }

    Ok(dest.to_path_buf())
}

/// Binds to a PDFium library at an explicit `path`.
pub fn bind_from_path(path: &Path) -> Result<Pdfium, FetchError> {
    Pdfium::bind_to_library(path)
        .map(Pdfium::new)
        .map_err(|e| FetchError::Bind {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn is_archive(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.ends_with(".tgz") || lower.ends_with(".tar.gz")
}

/// Where a download is staged before it is renamed to `dest`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Streams a URL into a `Vec<u8>`.
fn download_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-fetch/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| FetchError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| FetchError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(FetchError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let capacity = total.unwrap_or(35 * 1024 * 1024) as usize;
    let mut buf = Vec::with_capacity(capacity);

    let mut stream = response;
    let mut chunk = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(FetchError::Download(format!("Read error: {e}")));
            }
        }
    }

    if let Some(expected) = total.filter(|&t| t != downloaded) {
        return Err(FetchError::Download(format!(
            "truncated download from {url}: got {downloaded} of {expected} bytes"
        )));
    }

    Ok(buf)
}

/// Extracts a single file from a gzipped tar archive into `dest_path`.
fn extract_library(
    archive_bytes: &[u8],
    lib_path_in_archive: &str,
    dest_path: &Path,
) -> Result<(), FetchError> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let gz = GzDecoder::new(archive_bytes);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| FetchError::Extract(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| FetchError::Extract(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| FetchError::Extract(e.to_string()))?;

        if entry_path.to_string_lossy() == lib_path_in_archive {
            entry
                .unpack(dest_path)
                .map_err(|e| FetchError::Extract(format!("Unpack failed: {e}")))?;
            return Ok(());
        }
    }

    Err(FetchError::Extract(format!(
        "Library '{}' not found in archive",
        lib_path_in_archive
    )))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Serve `response` verbatim to one connection and return the base URL.
    fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = Vec::new();
                let mut byte = [0u8; 1];
                while !request.ends_with(b"\r\n\r\n") {
                    match stream.read(&mut byte) {
                        Ok(1) => request.push(byte[0]),
                        _ => break,
                    }
                }
                let _ = stream.write_all(&response);
            }
        });
        format!("http://{addr}")
    }

    fn http_ok(body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn tgz_with(path: &str, contents: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, contents).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn detect_platform_is_supported() {
        detect_platform().expect("current platform should be supported");
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = platform_for("plan9", "mips").unwrap_err();
        assert!(err.to_string().contains("plan9/mips"));
    }

    #[test]
    fn cache_dir_is_versioned() {
        let d = pdfium_cache_dir();
        assert_eq!(d, pdfium_cache_dir());
        assert!(d.to_str().unwrap().contains(PDFIUM_VERSION));
    }

    #[test]
    fn release_url_is_pinned() {
        let url = release_url().unwrap();
        assert!(url.starts_with(BASE_URL));
        assert!(url.contains(&format!("chromium%2F{PDFIUM_VERSION}")));
        assert!(url.ends_with(".tgz"));
    }

    #[test]
    fn local_path_uses_platform_library_name() {
        let info = detect_platform().unwrap();
        let p = local_library_path().unwrap();
        assert!(p.ends_with(info.lib_name));
    }

    #[test]
    fn archive_detection() {
        assert!(is_archive("https://x/pdfium-linux-x64.tgz"));
        assert!(is_archive("https://x/pdfium.TAR.GZ"));
        assert!(!is_archive("http://localhost:8080/libpdfium.so"));
    }

    #[test]
    fn extracts_named_entry() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        let archive = tgz_with("lib/libpdfium.so", b"ELF-ish");

        extract_library(&archive, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF-ish");
    }

    #[test]
    fn missing_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tgz_with("lib/other.so", b"x");

        let err = extract_library(&archive, "lib/libpdfium.so", &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, FetchError::Extract(_)));
    }

    #[test]
    fn fetch_bare_library_lands_at_dest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cache/libpdfium.so");
        let base = serve_once(http_ok(b"ELF-ish"));

        fetch_library(&format!("{base}/libpdfium.so"), &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"ELF-ish");
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn fetch_empty_body_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        let base = serve_once(http_ok(b""));

        let err = fetch_library(&format!("{base}/libpdfium.so"), &dest).unwrap_err();

        assert!(matches!(err, FetchError::Download(_)), "got: {err}");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn fetch_truncated_body_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(b"ELF-ish, then the connection drops");
        let base = serve_once(response);

        fetch_library(&format!("{base}/libpdfium.so"), &dest).unwrap_err();

        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn fetch_archive_without_library_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        let base = serve_once(http_ok(&tgz_with("lib/other.so", b"x")));

        let err = fetch_library(&format!("{base}/pdfium.tgz"), &dest).unwrap_err();

        assert!(matches!(err, FetchError::Extract(_)), "got: {err}");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn partial_path_is_a_sibling() {
        let p = partial_path(Path::new("/cache/libpdfium.so"));
        assert_eq!(p, Path::new("/cache/libpdfium.so.part"));
    }
}
