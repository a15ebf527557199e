//! Remote conversion: stage the upload, submit it, poll until the job ends.
//!
//! The staged upload file is a temporary artifact released on every exit
//! path, including when the orchestrator's timeout drops this future
//! mid-poll (the handle's `Drop` releases it).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AttemptContext, ConversionStrategy, StrategyKind};
use crate::document::Direction;
use crate::error::AttemptError;
use crate::output::ConversionResult;
use crate::service::{ExternalConversionService, JobStatus, Upload};

/// Strategy delegating to an [`ExternalConversionService`].
#[derive(Clone)]
pub struct ExternalServiceConversion {
    service: Arc<dyn ExternalConversionService>,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for ExternalServiceConversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalServiceConversion")
            .field("service", &self.service.name())
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ExternalServiceConversion {
    pub fn new(service: Arc<dyn ExternalConversionService>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            service,
            timeout,
            poll_interval,
        }
    }

    async fn run(&self, ctx: &AttemptContext<'_>, upload: Upload<'_>) -> Result<Vec<u8>, AttemptError> {
        let job = self
            .service
            .submit(upload, ctx.request.target)
            .await
            .map_err(|e| AttemptError::from_service(e, self.timeout))?;
        debug!(request_id = %ctx.request_id, job = %job.id, service = self.service.name(), "Job submitted");

        let mut polls: u32 = 0;
        loop {
            polls += 1;
            let status = self
                .service
                .poll(&job)
                .await
                .map_err(|e| AttemptError::from_service(e, self.timeout))?;
            match status {
                JobStatus::Pending => tokio::time::sleep(self.poll_interval).await,
                JobStatus::Ready(bytes) if bytes.is_empty() => return Err(AttemptError::EmptyResult),
                JobStatus::Ready(bytes) => {
                    info!(
                        request_id = %ctx.request_id,
                        job = %job.id,
                        polls,
                        size = bytes.len(),
                        "Remote conversion finished"
                    );
                    return Ok(bytes);
                }
                JobStatus::Failed(reason) => {
                    return Err(AttemptError::ExternalService(format!(
                        "{} job {} failed: {reason}",
                        self.service.name(),
                        job.id
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl ConversionStrategy for ExternalServiceConversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::External
    }

    fn supports(&self, direction: Direction) -> bool {
        self.service.supports(direction)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError> {
        let source = &ctx.request.source;
        let suffix = source.extension().map(|e| format!(".{e}")).unwrap_or_default();
        let staged = ctx
            .artifacts
            .stage_file(&ctx.namespace(self.kind()), &suffix, source.bytes().clone())
            .await?;

        let outcome = match staged.path() {
            Some(path) => {
                let upload = Upload {
                    path,
                    file_name: source.filename(),
                    mime_type: source.mime_type(),
                };
                self.run(ctx, upload).await
            }
            None => Err(AttemptError::Fault("staged upload has no path".into())),
        };
        staged.release();

        let bytes = outcome?;
        Ok(ConversionResult::new(
            bytes,
            ctx.request.target.mime_type(),
            ctx.output_filename(),
        ))
    }
}
