//! Last-resort output: a small document saying the conversion failed.
//!
//! Has no external dependency and does not look at the source, so in
//! practice it cannot fail. The orchestrator only appends it to a plan when
//! the direction and the per-target policy allow a degraded result.

use std::time::Duration;

use async_trait::async_trait;

use super::{AttemptContext, ConversionStrategy, StrategyKind};
use crate::document::{Direction, TargetFormat};
use crate::error::AttemptError;
use crate::output::ConversionResult;
use crate::pipeline::docx::{self, Block};
use crate::pipeline::pdf::{self, TextRun};

pub const NOTICE_TITLE: &str = "Document conversion failed";
pub const NOTICE_HINT: &str = "Please try with a different document format";

const NOTICE_PAGE: (f32, f32) = (600.0, 800.0);

/// Placeholder strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPlaceholderConversion;

impl FallbackPlaceholderConversion {
    /// Notice document in `target` format.
    pub fn render(target: TargetFormat) -> Result<Vec<u8>, String> {
        match target {
            TargetFormat::Pdf => pdf::build_notice_pdf(
                NOTICE_PAGE,
                &[
                    TextRun {
                        text: NOTICE_TITLE,
                        size: 30.0,
                        x: 50.0,
                        y: 700.0,
                    },
                    TextRun {
                        text: NOTICE_HINT,
                        size: 14.0,
                        x: 50.0,
                        y: 650.0,
                    },
                ],
            ),
            TargetFormat::Docx => docx::write_docx(&[
                Block::Paragraph(NOTICE_TITLE.to_string()),
                Block::Paragraph(NOTICE_HINT.to_string()),
            ]),
            TargetFormat::Text => Ok(format!("{NOTICE_TITLE}\n{NOTICE_HINT}\n").into_bytes()),
        }
    }
}

#[async_trait]
impl ConversionStrategy for FallbackPlaceholderConversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Placeholder
    }

    fn supports(&self, direction: Direction) -> bool {
        direction.permits_placeholder()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError> {
        let target = ctx.request.target;
        let bytes = Self::render(target).map_err(AttemptError::Fault)?;
        Ok(ConversionResult::new(bytes, target.mime_type(), ctx.output_filename()))
    }
}
