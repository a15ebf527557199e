//! # multitool-convert
//!
//! Document conversion with content classification and tiered fallback.
//!
//! ## Why this crate?
//!
//! No single converter handles every document. In-process libraries are fast
//! but lose layout; remote services keep fidelity but fail, stall, or return
//! nothing; office suites are not always installed. This crate treats each of
//! them as a strategy, tries them in a fixed order per conversion direction,
//! and returns the first real result. When every strategy fails and the
//! target allows it, a short notice document is returned instead of an
//! error.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Direction  source kind (MIME, then extension) × target format
//!  ├─ 2. Classify   image-heavy vs text-heavy (PDF sources only, advisory)
//!  ├─ 3. Plan       ordered strategies: native / office suite / external / placeholder
//!  ├─ 4. Attempt    one at a time, each under its own timeout; first success wins
//!  ├─ 5. Persist    best-effort, only after success, only if the user opted in
//!  └─ 6. Respond    bytes + MIME type + filename + ConversionReport
//! ```
//!
//! Temporary files and directories used by an attempt are released when the
//! attempt ends, however it ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multitool_convert::{ConversionConfig, ConversionOrchestrator, ConversionRequest, SourceDocument, TargetFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = ConversionOrchestrator::new(ConversionConfig::default())?;
//!     let source = SourceDocument::from_filename(std::fs::read("report.pdf")?, "report.pdf");
//!     let response = orchestrator
//!         .convert(ConversionRequest::new(source, TargetFormat::Docx))
//!         .await?;
//!     std::fs::write(&response.output_filename, &response.bytes)?;
//!     eprintln!("produced by {:?}", response.produced_by());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mtconvert` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! multitool-convert = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod persistence;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod strategy;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ArtifactHandle, ArtifactKind, ArtifactStats, TemporaryArtifactManager};
pub use classify::{ContentClassifier, ContentProfile, DominantContent, ExtractedText, LopdfTextExtractor, TextExtractor};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use document::{ConversionRequest, Direction, SourceDocument, SourceKind, TargetFormat};
pub use error::{AttemptError, ConfigError, ConvertError, ErrorKind, InputError, PersistenceError, ServiceError};
pub use orchestrator::{ConversionOrchestrator, OrchestratorBuilder, StrategyPlan};
pub use output::{ConversionAttempt, ConversionReport, ConversionResult, ConvertResponse, PersistenceOutcome};
pub use persistence::{
    FileMetadata, LocalDirectoryGateway, PersistenceGateway, ProcessingType, StaticPreference, StoredLocation,
    UserPreferenceLookup,
};
pub use progress::{ConversionObserver, ConversionState, NoopObserver, ObserverHandle};
pub use service::{ExternalConversionService, JobHandle, JobStatus, PdfRestService};
pub use strategy::{AttemptContext, ConversionStrategy, StrategyKind};
pub use stream::{convert_all, convert_stream};
