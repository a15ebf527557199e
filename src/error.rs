//! Error types for the multitool-convert library.
//!
//! Two tiers mirror the two ways a conversion can go wrong:
//!
//! * [`ConvertError`] — **Terminal**: the request produced no output at all
//!   (no strategy handles the direction, the request deadline elapsed, or
//!   every strategy in the plan failed). This is the only error the
//!   orchestrator returns.
//!
//! * [`AttemptError`] — **Recoverable**: a single strategy attempt failed.
//!   The orchestrator records it in the attempt log and moves on to the next
//!   strategy; it is never returned on its own.
//!
//! Collaborator boundaries ([`ServiceError`], [`ExtractionError`],
//! [`PersistenceError`], [`ArtifactError`]) have their own types so fakes
//! in tests can produce them without touching orchestrator internals.
//! [`ErrorKind`] is the closed taxonomy every one of them maps onto.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::ConversionAttempt;

// ── Taxonomy ─────────────────────────────────────────────────────────────────

/// Closed set of failure categories callers and tests branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No capable strategy exists for the source/target combination.
    UnsupportedFormat,
    /// An attempt (or the whole request) exceeded its time budget.
    Timeout,
    /// A strategy reported success with zero bytes.
    EmptyResult,
    /// The remote conversion service failed or answered nonsense.
    ExternalServiceError,
    /// An in-process library rejected the input or faulted.
    LibraryFailure,
    /// Every strategy in the plan failed.
    ExhaustedStrategies,
    /// Storing the result failed. Logged only, never terminal.
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Timeout => "timeout",
            ErrorKind::EmptyResult => "empty_result",
            ErrorKind::ExternalServiceError => "external_service_error",
            ErrorKind::LibraryFailure => "library_failure",
            ErrorKind::ExhaustedStrategies => "exhausted_strategies",
            ErrorKind::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Terminal error ───────────────────────────────────────────────────────────

/// The single terminal error of a conversion request.
///
/// `attempts` carries the attempt log so callers can see what was tried;
/// it is empty for [`ErrorKind::UnsupportedFormat`].
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ConvertError {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: Vec<ConversionAttempt>,
}

impl ConvertError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, message)
    }

    /// Request-level deadline elapsed; `attempts` holds whatever finished first.
    pub fn timeout(secs: u64, attempts: Vec<ConversionAttempt>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            message: format!("request did not complete within {secs}s"),
            attempts,
        }
    }

    /// Every strategy failed. The message names the last failure.
    pub fn exhausted(attempts: Vec<ConversionAttempt>) -> Self {
        let message = match attempts.last().and_then(|a| a.failure()) {
            Some((kind, msg)) => format!(
                "all {} strategies failed; last failure ({kind}): {msg}",
                attempts.len()
            ),
            None => "no strategy produced a result".to_string(),
        };
        Self {
            kind: ErrorKind::ExhaustedStrategies,
            message,
            attempts,
        }
    }

    /// Kind of the last failed attempt, if any attempt ran.
    pub fn last_attempt_kind(&self) -> Option<ErrorKind> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.failure().map(|(k, _)| k))
    }
}

// ── Attempt-level error ──────────────────────────────────────────────────────

/// Failure of one strategy attempt. Recorded in the attempt log.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptError {
    /// The strategy cannot handle this direction at all.
    #[error("strategy does not handle {0}")]
    Unsupported(String),

    /// The attempt exceeded its own timeout.
    #[error("timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The strategy produced zero bytes.
    #[error("produced an empty result")]
    EmptyResult,

    /// The remote service failed.
    #[error("external service: {0}")]
    ExternalService(String),

    /// An in-process library rejected the input.
    #[error("library: {0}")]
    Library(String),

    /// The attempt panicked. Caught at the orchestrator boundary.
    #[error("fault: {0}")]
    Fault(String),
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::Unsupported(_) => ErrorKind::UnsupportedFormat,
            AttemptError::Timeout { .. } => ErrorKind::Timeout,
            AttemptError::EmptyResult => ErrorKind::EmptyResult,
            AttemptError::ExternalService(_) => ErrorKind::ExternalServiceError,
            AttemptError::Library(_) | AttemptError::Fault(_) => ErrorKind::LibraryFailure,
        }
    }

    pub fn library(e: impl fmt::Display) -> Self {
        AttemptError::Library(e.to_string())
    }

    pub fn timeout(limit: Duration) -> Self {
        AttemptError::Timeout {
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// A service call made under `limit`. Service-side timeouts keep their
    /// timeout classification; everything else is an external-service error.
    pub fn from_service(e: ServiceError, limit: Duration) -> Self {
        match e {
            ServiceError::Timeout { .. } => AttemptError::timeout(limit),
            other => AttemptError::ExternalService(other.to_string()),
        }
    }
}

impl From<ArtifactError> for AttemptError {
    fn from(e: ArtifactError) -> Self {
        AttemptError::Library(e.to_string())
    }
}

// ── Collaborator errors ──────────────────────────────────────────────────────

/// Errors from an [`crate::service::ExternalConversionService`].
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The service is not configured (no credentials, no endpoint).
    #[error("service not configured: {0}")]
    NotConfigured(String),

    /// Network, TLS or HTTP-status failure.
    #[error("transport: {0}")]
    Transport(String),

    /// The service explicitly refused or failed the job.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// The response could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service did not answer in time.
    #[error("timed out calling {url}")]
    Timeout { url: String },
}

impl From<pdfrest_client::PdfRestError> for ServiceError {
    fn from(e: pdfrest_client::PdfRestError) -> Self {
        use pdfrest_client::PdfRestError as E;
        match e {
            E::Client(m) => ServiceError::NotConfigured(m),
            E::Timeout { url } => ServiceError::Timeout { url },
            E::Transport { .. } | E::Status { .. } => ServiceError::Transport(e.to_string()),
            E::Rejected(m) => ServiceError::JobFailed(m),
            E::MalformedResponse(m) => ServiceError::Malformed(m),
        }
    }
}

/// Text extraction failed. The classifier swallows it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("document could not be parsed: {0}")]
    Parse(String),

    #[error("document is encrypted")]
    Encrypted,

    #[error("extractor panicked: {0}")]
    Panicked(String),
}

/// A [`crate::persistence::PersistenceGateway`] could not store a result.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode metadata: {0}")]
    Encode(String),

    #[error("store rejected the object: {0}")]
    Rejected(String),

    #[error("preference lookup failed: {0}")]
    Preference(String),
}

/// The temporary artifact manager could not create or use an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create temporary {what} under '{root}': {source}")]
    Create {
        what: &'static str,
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write temporary artifact: {0}")]
    Write(#[source] std::io::Error),

    #[error("artifact was already released")]
    Released,

    #[error("staging task failed: {0}")]
    Staging(String),
}

// ── Configuration and input errors ───────────────────────────────────────────

/// Builder validation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Loading a source document from a path or URL failed.
#[derive(Debug, Error)]
pub enum InputError {
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Could not read an otherwise accessible file.
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
