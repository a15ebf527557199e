//! # pdfrest-client
//!
//! A small async client for the [pdfRest](https://pdfrest.com) conversion API.
//!
//! The API works in two legs:
//!
//! 1. `POST {base}/{endpoint}` with a multipart `file` field and an `Api-Key`
//!    header. The service answers with a JSON receipt carrying `outputUrl`.
//! 2. `GET outputUrl` downloads the converted document. While the output is
//!    still being produced the resource answers `202`/`404`, which this crate
//!    reports as [`OutputState::Pending`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfrest_client::{Endpoint, OutputState, PdfRestClient};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), pdfrest_client::PdfRestError> {
//! let client = PdfRestClient::new("my-key", pdfrest_client::DEFAULT_BASE_URL, Duration::from_secs(120))?;
//! let receipt = client
//!     .upload(Endpoint::Word, "report.pdf", "application/pdf", std::fs::read("report.pdf").unwrap())
//!     .await?;
//! match client.fetch_output(&receipt.output_url).await? {
//!     OutputState::Ready(bytes) => std::fs::write("report.docx", bytes).unwrap(),
//!     OutputState::Pending => eprintln!("not ready yet"),
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

// ── Public constants ─────────────────────────────────────────────────────────

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.pdfrest.com";

/// Header carrying the account key.
pub const API_KEY_HEADER: &str = "Api-Key";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by pdfrest-client operations.
#[derive(Error, Debug)]
pub enum PdfRestError {
    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The request did not complete within the client timeout.
    #[error("Request to '{url}' timed out")]
    Timeout { url: String },

    /// Connection, TLS or body transfer failure.
    #[error("Transport error for '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The service answered with a non-success status.
    #[error("pdfRest returned HTTP {status} for '{url}': {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The service explicitly rejected the job (`{"error": "..."}`).
    #[error("pdfRest rejected the request: {0}")]
    Rejected(String),

    /// The receipt could not be decoded or lacked `outputUrl`.
    #[error("Malformed pdfRest response: {0}")]
    MalformedResponse(String),
}

impl PdfRestError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PdfRestError::Timeout {
                url: url.to_string(),
            }
        } else {
            PdfRestError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

// ── Endpoints and responses ──────────────────────────────────────────────────

/// Conversion endpoints used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Any supported document → Word (`/word`).
    Word,
    /// Any supported document → PDF (`/pdf`).
    Pdf,
}

impl Endpoint {
    /// Path segment appended to the base URL.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Word => "word",
            Endpoint::Pdf => "pdf",
        }
    }
}

/// Receipt returned by an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Where the converted document can be downloaded.
    pub output_url: String,
    /// Server-side identifier of the output, when provided.
    pub output_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    output_url: Option<String>,
    output_id: Option<String>,
    error: Option<String>,
}

/// State of a requested output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputState {
    /// Not yet available; poll again later.
    Pending,
    /// The converted bytes. May be empty; callers decide whether that is acceptable.
    Ready(Vec<u8>),
}

/// Decode the JSON body of an upload response.
pub fn parse_receipt(body: &str) -> Result<UploadReceipt, PdfRestError> {
    let raw: RawReceipt = serde_json::from_str(body)
        .map_err(|e| PdfRestError::MalformedResponse(format!("{e}: {}", truncate(body, 200))))?;

    if let Some(err) = raw.error {
        return Err(PdfRestError::Rejected(err));
    }

    match raw.output_url {
        Some(url) if !url.trim().is_empty() => Ok(UploadReceipt {
            output_url: url,
            output_id: raw.output_id,
        }),
        _ => Err(PdfRestError::MalformedResponse(
            "response has no outputUrl".to_string(),
        )),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Async pdfRest client. Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct PdfRestClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for PdfRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfRestClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl PdfRestClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PdfRestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PdfRestError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Full URL of an endpoint.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    /// Upload a document for conversion and return the receipt.
    pub async fn upload(
        &self,
        endpoint: Endpoint,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, PdfRestError> {
        let url = self.endpoint_url(endpoint);
        debug!(%url, file_name, size = bytes.len(), "Uploading to pdfRest");

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| PdfRestError::Client(format!("invalid MIME type '{mime_type}': {e}")))?;
        let form = Form::new().part("file", part);

        let resp = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PdfRestError::from_reqwest(&url, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PdfRestError::from_reqwest(&url, e))?;

        if !status.is_success() {
            return Err(PdfRestError::Status {
                url,
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            });
        }

        parse_receipt(&body)
    }

    /// Download an output document, or report that it is not ready yet.
    pub async fn fetch_output(&self, output_url: &str) -> Result<OutputState, PdfRestError> {
        let resp = self
            .http
            .get(output_url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| PdfRestError::from_reqwest(output_url, e))?;

        let status = resp.status();
        if is_pending(status) {
            debug!(url = output_url, status = status.as_u16(), "pdfRest output pending");
            return Ok(OutputState::Pending);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PdfRestError::Status {
                url: output_url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PdfRestError::from_reqwest(output_url, e))?;
        debug!(url = output_url, size = bytes.len(), "pdfRest output downloaded");
        Ok(OutputState::Ready(bytes.to_vec()))
    }
}

fn is_pending(status: StatusCode) -> bool {
    status == StatusCode::ACCEPTED || status == StatusCode::NOT_FOUND
}

// ── Tests ────────────────────────────────────────────────────────────────────
