//! Input loading: turn a user-supplied path or URL into a [`SourceDocument`].
//!
//! The library core takes bytes plus a declared MIME type; this is the layer
//! that produces them for the CLI. Local files are read whole. URLs are
//! fetched with a timeout; the MIME type comes from `Content-Type` when the
//! server sends a specific one, otherwise from the filename.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::document::{mime_for_filename, SourceDocument, MIME_OCTET};
use crate::error::InputError;

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (path or URL) into memory.
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceDocument, InputError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O failures onto friendly errors.
pub async fn read_local(path: &Path) -> Result<SourceDocument, InputError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => InputError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => InputError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InputError::Read {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());

    debug!(path = %path.display(), size = bytes.len(), "Loaded local input");
    Ok(SourceDocument::from_filename(bytes, filename))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, InputError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InputError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InputError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InputError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);
    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InputError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let mime = choose_mime(declared.as_deref(), &filename);
    info!(size = bytes.len(), %mime, "Downloaded {}", filename);
    Ok(SourceDocument::new(bytes, mime, filename))
}

/// Prefer a specific `Content-Type`; fall back to the filename for generic ones.
fn choose_mime(declared: Option<&str>, filename: &str) -> String {
    match declared {
        Some(ct) if !ct.is_empty() && !ct.starts_with(MIME_OCTET) && !ct.starts_with("binary/") => {
            ct.to_string()
        }
        _ => mime_for_filename(filename).to_string(),
    }
}

/// Last path segment of the URL when it looks like a filename.
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

    "downloaded".to_string()
}

/// Default output path: the input's directory (or cwd for URLs) + `file_name`.
pub fn default_output_path(input: &str, file_name: &str) -> PathBuf {
    if is_url(input) {
        return PathBuf::from(file_name);
    }
    Path::new(input)
        .parent()
        .map(|p| p.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
