//! Conversion strategies.
//!
//! Every strategy satisfies one contract: given the request and its context,
//! produce a [`ConversionResult`] or an [`AttemptError`]. The orchestrator
//! owns the order they are tried in; strategies never call each other.
//!
//! | Kind | Module | Directions |
//! |------|--------|------------|
//! | [`StrategyKind::Native`] | [`native`] | all five, in-process |
//! | [`StrategyKind::OfficeSuite`] | [`office`] | Word → PDF via headless `soffice` |
//! | [`StrategyKind::External`] | [`external`] | whatever the remote service supports |
//! | [`StrategyKind::Placeholder`] | [`placeholder`] | degraded notice document |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::TemporaryArtifactManager;
use crate::classify::ContentProfile;
use crate::document::{ConversionRequest, Direction};
use crate::error::AttemptError;
use crate::output::ConversionResult;

pub mod external;
pub mod native;
pub mod office;
pub mod placeholder;

pub use external::ExternalServiceConversion;
pub use native::NativeLibraryConversion;
pub use office::OfficeSuiteConversion;
pub use placeholder::FallbackPlaceholderConversion;

/// Closed set of strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Native,
    OfficeSuite,
    External,
    Placeholder,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Native => "native",
            StrategyKind::OfficeSuite => "office_suite",
            StrategyKind::External => "external",
            StrategyKind::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an attempt may read. Borrowed from the orchestrator for the
/// duration of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub request: &'a ConversionRequest,
    pub direction: Direction,
    pub profile: &'a ContentProfile,
    pub artifacts: &'a TemporaryArtifactManager,
    pub request_id: Uuid,
}

impl AttemptContext<'_> {
    /// Artifact namespace unique to this request and strategy.
    pub fn namespace(&self, kind: StrategyKind) -> String {
        format!("{}-{}", self.request_id.simple(), kind.as_str())
    }

    pub fn output_filename(&self) -> String {
        self.request.output_filename()
    }
}

/// One way of performing a conversion.
#[async_trait]
pub trait ConversionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can handle `direction`. Checked when the plan is
    /// built; a strategy that is not capable is left out of it.
    fn supports(&self, direction: Direction) -> bool;

    /// Time budget for one attempt. The orchestrator enforces it.
    fn timeout(&self) -> Duration;

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{SourceDocument, TargetFormat, MIME_PDF};

    #[test]
    fn namespace_is_request_scoped() {
        let request = ConversionRequest::new(SourceDocument::new(vec![1u8], MIME_PDF, "a.pdf"), TargetFormat::Docx);
        let profile = ContentProfile::unclassified();
        let artifacts = TemporaryArtifactManager::new(std::env::temp_dir());
        let a = AttemptContext {
            request: &request,
            direction: Direction::PdfToDocx,
            profile: &profile,
            artifacts: &artifacts,
            request_id: Uuid::new_v4(),
        };
        let b = AttemptContext {
            request_id: Uuid::new_v4(),
            ..a
        };
        assert_ne!(a.namespace(StrategyKind::Native), b.namespace(StrategyKind::Native));
        assert!(a.namespace(StrategyKind::External).ends_with("-external"));
        assert_eq!(a.output_filename(), "a.docx");
    }

    #[test]
    fn kind_names() {
        assert_eq!(StrategyKind::OfficeSuite.to_string(), "office_suite");
        assert_eq!(serde_json::to_string(&StrategyKind::Placeholder).unwrap(), "\"placeholder\"");
    }
}
