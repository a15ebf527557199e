//! Remote conversion service seam.
//!
//! [`ExternalConversionService`] is the interface the external strategy
//! drives: submit an upload, then poll the job until it is ready or failed.
//! Deadlines are owned by the caller, which wraps the whole exchange in
//! `tokio::time::timeout`. Dropping the future cancels any in-flight HTTP
//! request.
//!
//! [`PdfRestService`] implements it on top of the `pdfrest-client` crate.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::document::{Direction, TargetFormat};
use crate::error::ServiceError;

/// Identifies a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
    /// Where the service said the result will appear.
    pub location: String,
}

/// State of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready(Vec<u8>),
    Failed(String),
}

/// A staged upload: the source bytes on disk plus how to describe them.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub path: &'a Path,
    pub file_name: &'a str,
    pub mime_type: &'a str,
}

/// Remote conversion service.
#[async_trait]
pub trait ExternalConversionService: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether this service can perform `direction` at all.
    fn supports(&self, direction: Direction) -> bool;

    async fn submit(&self, upload: Upload<'_>, target: TargetFormat) -> Result<JobHandle, ServiceError>;

    async fn poll(&self, job: &JobHandle) -> Result<JobStatus, ServiceError>;
}

// ── pdfRest ──────────────────────────────────────────────────────────────────

/// [`ExternalConversionService`] backed by pdfRest.
#[derive(Debug, Clone)]
pub struct PdfRestService {
    client: pdfrest_client::PdfRestClient,
}

impl PdfRestService {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = pdfrest_client::PdfRestClient::new(api_key, base_url, timeout)?;
        Ok(Self { client })
    }

    fn endpoint(target: TargetFormat) -> Option<pdfrest_client::Endpoint> {
        match target {
            TargetFormat::Docx => Some(pdfrest_client::Endpoint::Word),
            TargetFormat::Pdf => Some(pdfrest_client::Endpoint::Pdf),
            TargetFormat::Text => None,
        }
    }
}

#[async_trait]
impl ExternalConversionService for PdfRestService {
    fn name(&self) -> &str {
        "pdfrest"
    }

    fn supports(&self, direction: Direction) -> bool {
        matches!(direction, Direction::PdfToDocx | Direction::WordToPdf)
    }

    async fn submit(&self, upload: Upload<'_>, target: TargetFormat) -> Result<JobHandle, ServiceError> {
        let endpoint = Self::endpoint(target)
            .ok_or_else(|| ServiceError::NotConfigured(format!("pdfRest has no endpoint for {target}")))?;
        let bytes = tokio::fs::read(upload.path)
            .await
            .map_err(|e| ServiceError::Transport(format!("reading staged upload: {e}")))?;

        let receipt = self
            .client
            .upload(endpoint, upload.file_name, upload.mime_type, bytes)
            .await?;
        debug!(output_url = %receipt.output_url, "pdfRest accepted upload");

        Ok(JobHandle {
            id: receipt.output_id.unwrap_or_else(|| receipt.output_url.clone()),
            location: receipt.output_url,
        })
    }

    async fn poll(&self, job: &JobHandle) -> Result<JobStatus, ServiceError> {
        match self.client.fetch_output(&job.location).await {
            Ok(pdfrest_client::OutputState::Pending) => Ok(JobStatus::Pending),
            Ok(pdfrest_client::OutputState::Ready(bytes)) => Ok(JobStatus::Ready(bytes)),
            Err(pdfrest_client::PdfRestError::Rejected(m)) => Ok(JobStatus::Failed(m)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdfrest_supports_word_directions_only() {
        let s = PdfRestService::new("k", "https://example.test", Duration::from_secs(5)).unwrap();
        assert!(s.supports(Direction::PdfToDocx));
        assert!(s.supports(Direction::WordToPdf));
        assert!(!s.supports(Direction::ImageToPdf));
        assert!(!s.supports(Direction::MergePdfs));
        assert!(!s.supports(Direction::PdfToText));
        assert_eq!(s.name(), "pdfrest");
    }

    #[test]
    fn endpoint_mapping() {
        assert_eq!(PdfRestService::endpoint(TargetFormat::Docx), Some(pdfrest_client::Endpoint::Word));
        assert_eq!(PdfRestService::endpoint(TargetFormat::Text), None);
    }

    #[tokio::test]
    async fn submit_reports_unreadable_upload() {
        let s = PdfRestService::new("k", "https://example.test", Duration::from_secs(5)).unwrap();
        let err = s
            .submit(
                Upload {
                    path: Path::new("/nonexistent/upload.pdf"),
                    file_name: "upload.pdf",
                    mime_type: "application/pdf",
                },
                TargetFormat::Docx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(ref m) if m.contains("staged upload")));
    }
}
