//! Output types: the converted document, the attempt log, and the report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classify::ContentProfile;
use crate::document::Direction;
use crate::error::{AttemptError, ErrorKind};
use crate::persistence::StoredLocation;
use crate::strategy::StrategyKind;

/// Bytes produced by a successful strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub bytes: Vec<u8>,
    pub output_mime_type: String,
    pub output_filename: String,
}

impl ConversionResult {
    pub fn new(bytes: Vec<u8>, output_mime_type: impl Into<String>, output_filename: impl Into<String>) -> Self {
        Self {
            bytes,
            output_mime_type: output_mime_type.into(),
            output_filename: output_filename.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ── Attempt log ──────────────────────────────────────────────────────────────

/// How one attempt ended. Successful bytes are not kept in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { bytes: usize },
    Failure { kind: ErrorKind, message: String },
}

impl AttemptOutcome {
    pub fn failure(err: &AttemptError) -> Self {
        AttemptOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One strategy tried for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionAttempt {
    pub strategy: StrategyKind,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
}

impl ConversionAttempt {
    pub(crate) fn finished(
        strategy: StrategyKind,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            strategy,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success { .. })
    }

    /// Failure kind and message, if this attempt failed.
    pub fn failure(&self) -> Option<(ErrorKind, &str)> {
        match &self.outcome {
            AttemptOutcome::Failure { kind, message } => Some((*kind, message.as_str())),
            AttemptOutcome::Success { .. } => None,
        }
    }
}

// ── Persistence outcome ──────────────────────────────────────────────────────

/// What happened to the result after conversion succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceOutcome {
    /// The request did not ask for storage, or carried no user.
    NotRequested,
    /// The user's preference said no.
    Declined,
    Stored { location: StoredLocation },
    /// Storage failed; the conversion result is still returned.
    Failed { reason: String },
}

impl PersistenceOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PersistenceOutcome::Stored { .. })
    }
}

// ── Report / response ────────────────────────────────────────────────────────

/// Diagnostics for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub request_id: Uuid,
    pub direction: Direction,
    pub profile: ContentProfile,
    /// Strategies in the order they were going to be tried.
    pub plan: Vec<StrategyKind>,
    pub attempts: Vec<ConversionAttempt>,
    pub persistence: PersistenceOutcome,
    /// Separate outcome for storing the uploaded original (Word → PDF only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_persistence: Option<PersistenceOutcome>,
    pub duration_ms: u64,
}

/// Successful response returned to the host.
#[derive(Debug, Clone)]
pub struct ConvertResponse {
    pub bytes: Vec<u8>,
    pub output_mime_type: String,
    pub output_filename: String,
    pub report: ConversionReport,
}

impl ConvertResponse {
    /// Strategy that produced the bytes.
    pub fn produced_by(&self) -> Option<StrategyKind> {
        self.report
            .attempts
            .iter()
            .rev()
            .find(|a| a.is_success())
            .map(|a| a.strategy)
    }

    /// Whether the output is the degraded placeholder document.
    pub fn is_placeholder(&self) -> bool {
        self.produced_by() == Some(StrategyKind::Placeholder)
    }

    pub fn into_result(self) -> ConversionResult {
        ConversionResult {
            bytes: self.bytes,
            output_mime_type: self.output_mime_type,
            output_filename: self.output_filename,
        }
    }
}
