//! The conversion state machine.
//!
//! ```text
//! Received ─▶ Classifying ─▶ SelectingStrategy ─▶ Attempting(0) ─▶ … ─▶ Succeeded
//!     │        (skipped for          │                  │ failure
//!     │         non-PDF sources)     │                  ▼
//!     │                              │            Attempting(i+1)
//!     └──────────── no plan ─────────┴──────────▶ ExhaustedFallback
//! ```
//!
//! Rules (applied in order):
//! 1. No direction for the source/target pair, or an empty plan, fails with
//!    `UnsupportedFormat` before any attempt.
//! 2. Strategies run strictly one after another in plan order. The first
//!    success wins; later strategies are never invoked.
//! 3. Each attempt runs under its strategy's own timeout, with panics
//!    caught. A zero-byte result counts as `EmptyResult`, the same
//!    transition as any other failure.
//! 4. The whole request runs under `request_timeout_secs`. When it elapses
//!    the in-flight attempt is dropped, which releases its artifacts, kills
//!    child processes and aborts HTTP calls.
//! 5. Only after success, storage is attempted. Storage problems are logged
//!    and reported, never returned as errors.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::artifact::TemporaryArtifactManager;
use crate::classify::{panic_message, ContentClassifier, ContentProfile};
use crate::config::ConversionConfig;
use crate::document::{ConversionRequest, Direction, TargetFormat};
use crate::error::{AttemptError, ConfigError, ConvertError, ErrorKind};
use crate::output::{
    AttemptOutcome, ConversionAttempt, ConversionReport, ConversionResult, ConvertResponse, PersistenceOutcome,
};
use crate::persistence::{FileMetadata, PersistenceGateway, ProcessingType, UserPreferenceLookup};
use crate::progress::{ConversionState, NoopObserver, ObserverHandle};
use crate::service::{ExternalConversionService, PdfRestService};
use crate::strategy::{
    AttemptContext, ConversionStrategy, ExternalServiceConversion, FallbackPlaceholderConversion,
    NativeLibraryConversion, OfficeSuiteConversion, StrategyKind,
};

// ── Plan table ───────────────────────────────────────────────────────────────

/// Strategy order per direction, before availability and placeholder policy.
///
/// The placeholder never appears here; it is appended by policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyPlan {
    orders: HashMap<Direction, Vec<StrategyKind>>,
}

impl Default for StrategyPlan {
    fn default() -> Self {
        use StrategyKind::*;
        let orders = HashMap::from([
            (Direction::PdfToDocx, vec![External, Native]),
            (Direction::PdfToText, vec![Native]),
            (Direction::WordToPdf, vec![Native, OfficeSuite, External]),
            (Direction::ImageToPdf, vec![Native]),
            (Direction::MergePdfs, vec![Native]),
        ]);
        Self { orders }
    }
}

impl StrategyPlan {
    pub fn order(&self, direction: Direction) -> &[StrategyKind] {
        self.orders.get(&direction).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the order for one direction.
    pub fn set(&mut self, direction: Direction, order: impl IntoIterator<Item = StrategyKind>) {
        let order = order
            .into_iter()
            .filter(|k| *k != StrategyKind::Placeholder)
            .collect();
        self.orders.insert(direction, order);
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

/// Sequences classification, strategy selection, attempts and persistence.
///
/// Cheap to share behind an `Arc`; requests hold no state on it.
pub struct ConversionOrchestrator {
    config: Arc<ConversionConfig>,
    classifier: ContentClassifier,
    artifacts: TemporaryArtifactManager,
    plan: StrategyPlan,
    strategies: HashMap<StrategyKind, Arc<dyn ConversionStrategy>>,
    gateway: Option<Arc<dyn PersistenceGateway>>,
    preference: Option<Arc<dyn UserPreferenceLookup>>,
    observer: ObserverHandle,
}

impl fmt::Debug for ConversionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.strategies.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ConversionOrchestrator")
            .field("strategies", &kinds)
            .field("plan", &self.plan)
            .field("artifacts", &self.artifacts)
            .field("persistence", &self.gateway.is_some())
            .finish()
    }
}

/// Result of the timed part of a request.
struct Converted {
    result: ConversionResult,
    profile: ContentProfile,
    plan: Vec<StrategyKind>,
}

impl ConversionOrchestrator {
    /// Orchestrator with default collaborators derived from `config`.
    pub fn new(config: ConversionConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ConversionConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            classifier: None,
            artifacts: None,
            plan: StrategyPlan::default(),
            strategies: HashMap::new(),
            gateway: None,
            preference: None,
            observer: None,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &TemporaryArtifactManager {
        &self.artifacts
    }

    /// Classify a document without converting it.
    pub async fn inspect(&self, bytes: bytes::Bytes) -> ContentProfile {
        self.classifier.classify(bytes).await
    }

    /// Strategies that would be tried for `direction` → `target`, in order.
    pub fn plan_for(&self, direction: Direction, target: TargetFormat) -> Vec<StrategyKind> {
        self.planned(direction, target).iter().map(|s| s.kind()).collect()
    }

    fn planned(&self, direction: Direction, target: TargetFormat) -> Vec<Arc<dyn ConversionStrategy>> {
        let mut steps: Vec<Arc<dyn ConversionStrategy>> = self
            .plan
            .order(direction)
            .iter()
            .filter_map(|kind| self.strategies.get(kind))
            .filter(|s| s.supports(direction))
            .cloned()
            .collect();

        if direction.permits_placeholder() && self.config.placeholder_allowed(target) {
            if let Some(p) = self.strategies.get(&StrategyKind::Placeholder) {
                if p.supports(direction) {
                    steps.push(Arc::clone(p));
                }
            }
        }
        steps
    }

    fn enter(&self, request_id: Uuid, state: ConversionState) {
        debug!(%request_id, state = %state, "Conversion state");
        self.observer.on_transition(request_id, &state);
    }

    /// Convert one request. Exactly one response or one error per call.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConvertResponse, ConvertError> {
        let request_id = Uuid::new_v4();
        let clock = Instant::now();
        self.enter(request_id, ConversionState::Received);
        info!(
            %request_id,
            source = request.source.filename(),
            mime = request.source.mime_type(),
            inputs = request.source_count(),
            target = %request.target,
            "Conversion request received"
        );

        let outcome = self.convert_inner(&request, request_id).await;
        let (direction, converted, attempts) = match outcome {
            Ok(done) => done,
            Err(e) => {
                self.enter(request_id, ConversionState::ExhaustedFallback { kind: e.kind });
                warn!(%request_id, kind = %e.kind, attempts = e.attempts.len(), "Conversion failed: {}", e.message);
                return Err(e);
            }
        };
        self.enter(request_id, ConversionState::Succeeded);

        let Converted { result, profile, plan } = converted;
        let (persistence, original_persistence) = self.persist(&request, direction, &result, request_id).await;
        self.observer.on_persistence(request_id, &persistence);

        let duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            %request_id,
            size = result.len(),
            file = %result.output_filename,
            duration_ms,
            "Conversion succeeded"
        );
        Ok(ConvertResponse {
            bytes: result.bytes,
            output_mime_type: result.output_mime_type,
            output_filename: result.output_filename,
            report: ConversionReport {
                request_id,
                direction,
                profile,
                plan,
                attempts,
                persistence,
                original_persistence,
                duration_ms,
            },
        })
    }

    async fn convert_inner(
        &self,
        request: &ConversionRequest,
        request_id: Uuid,
    ) -> Result<(Direction, Converted, Vec<ConversionAttempt>), ConvertError> {
        let direction = request.direction().ok_or_else(|| {
            ConvertError::unsupported(format!(
                "no conversion from '{}' ({}) to {}",
                request.source.filename(),
                request.source.mime_type(),
                request.target
            ))
        })?;

        if direction == Direction::MergePdfs && request.source_count() > self.config.max_merge_inputs {
            return Err(ConvertError::unsupported(format!(
                "merge accepts at most {} inputs, got {}",
                self.config.max_merge_inputs,
                request.source_count()
            )));
        }

        let mut log = Vec::new();
        let converted = match self.config.request_timeout_secs {
            Some(secs) => {
                let timed = tokio::time::timeout(
                    Duration::from_secs(secs),
                    self.run(request, direction, request_id, &mut log),
                )
                .await;
                match timed {
                    Ok(r) => r?,
                    Err(_) => {
                        warn!(%request_id, secs, "Request deadline elapsed; in-flight attempt cancelled");
                        return Err(ConvertError::timeout(secs, log));
                    }
                }
            }
            None => self.run(request, direction, request_id, &mut log).await?,
        };
        Ok((direction, converted, log))
    }

    /// Classification, selection and attempts. Fills `log` as it goes so a
    /// request-level timeout can still report what ran.
    async fn run(
        &self,
        request: &ConversionRequest,
        direction: Direction,
        request_id: Uuid,
        log: &mut Vec<ConversionAttempt>,
    ) -> Result<Converted, ConvertError> {
        let profile = if direction.classifies() {
            self.enter(request_id, ConversionState::Classifying);
            self.classifier.classify(request.source.bytes().clone()).await
        } else {
            ContentProfile::unclassified()
        };

        self.enter(request_id, ConversionState::SelectingStrategy);
        let steps = self.planned(direction, request.target);
        let plan: Vec<StrategyKind> = steps.iter().map(|s| s.kind()).collect();
        if steps.is_empty() {
            return Err(ConvertError::unsupported(format!(
                "no strategy is available for {direction}"
            )));
        }
        info!(
            %request_id,
            %direction,
            dominant = %profile.dominant,
            ratio = profile.size_to_text_ratio,
            plan = ?plan,
            "Strategy plan selected"
        );

        let ctx = AttemptContext {
            request,
            direction,
            profile: &profile,
            artifacts: &self.artifacts,
            request_id,
        };

        for (index, strategy) in steps.iter().enumerate() {
            let kind = strategy.kind();
            self.enter(request_id, ConversionState::Attempting { index, strategy: kind });

            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = attempt_once(strategy.as_ref(), &ctx).await;

            let attempt = ConversionAttempt::finished(
                kind,
                started_at,
                clock.elapsed(),
                match &outcome {
                    Ok(r) => AttemptOutcome::Success { bytes: r.len() },
                    Err(e) => AttemptOutcome::failure(e),
                },
            );
            self.observer.on_attempt_complete(request_id, &attempt);
            log.push(attempt);

            match outcome {
                Ok(result) => {
                    info!(%request_id, strategy = %kind, attempt = index + 1, "Strategy succeeded");
                    return Ok(Converted { result, profile, plan });
                }
                Err(e) => {
                    warn!(
                        %request_id,
                        strategy = %kind,
                        attempt = index + 1,
                        kind = %e.kind(),
                        "Strategy failed: {}",
                        e
                    );
                }
            }
        }

        Err(ConvertError::exhausted(std::mem::take(log)))
    }

    /// Best-effort storage of the result (and, for Word → PDF, the original).
    async fn persist(
        &self,
        request: &ConversionRequest,
        direction: Direction,
        result: &ConversionResult,
        request_id: Uuid,
    ) -> (PersistenceOutcome, Option<PersistenceOutcome>) {
        let user_id = match (&request.user_id, request.persist_on_success) {
            (Some(u), true) => u.as_str(),
            _ => return (PersistenceOutcome::NotRequested, None),
        };
        let Some(gateway) = &self.gateway else {
            warn!(%request_id, "Storage requested but no persistence gateway is configured");
            return (
                PersistenceOutcome::Failed {
                    reason: "no persistence gateway configured".into(),
                },
                None,
            );
        };

        if let Some(pref) = &self.preference {
            match pref.should_persist(user_id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%request_id, user_id, "User has storage disabled; skipping");
                    return (PersistenceOutcome::Declined, None);
                }
                Err(e) => {
                    warn!(%request_id, kind = %ErrorKind::PersistenceFailure, error = %e, "Preference lookup failed");
                    return (PersistenceOutcome::Failed { reason: e.to_string() }, None);
                }
            }
        }

        let now = Utc::now();
        let stored = store_one(
            gateway.as_ref(),
            &result.bytes,
            FileMetadata {
                user_id: user_id.to_string(),
                original_name: request.source.filename().to_string(),
                file_name: result.output_filename.clone(),
                mime_type: result.output_mime_type.clone(),
                size: result.bytes.len(),
                processing_type: direction.processing_type(),
                created_at: now,
            },
            request_id,
        )
        .await;

        let original = if direction == Direction::WordToPdf && self.config.persist_original_source {
            Some(
                store_one(
                    gateway.as_ref(),
                    request.source.bytes(),
                    FileMetadata {
                        user_id: user_id.to_string(),
                        original_name: request.source.filename().to_string(),
                        file_name: request.source.filename().to_string(),
                        mime_type: request.source.mime_type().to_string(),
                        size: request.source.len(),
                        processing_type: ProcessingType::OriginalSource,
                        created_at: now,
                    },
                    request_id,
                )
                .await,
            )
        } else {
            None
        };

        (stored, original)
    }
}

/// One attempt under its own timeout, with panics turned into faults and
/// empty output turned into `EmptyResult`.
async fn attempt_once(
    strategy: &dyn ConversionStrategy,
    ctx: &AttemptContext<'_>,
) -> Result<ConversionResult, AttemptError> {
    let limit = strategy.timeout();
    let guarded = AssertUnwindSafe(strategy.attempt(ctx)).catch_unwind();
    match tokio::time::timeout(limit, guarded).await {
        Ok(Ok(Ok(result))) if result.is_empty() => Err(AttemptError::EmptyResult),
        Ok(Ok(outcome)) => outcome,
        Ok(Err(payload)) => Err(AttemptError::Fault(panic_message(payload.as_ref()))),
        Err(_) => Err(AttemptError::timeout(limit)),
    }
}

async fn store_one(
    gateway: &dyn PersistenceGateway,
    bytes: &[u8],
    metadata: FileMetadata,
    request_id: Uuid,
) -> PersistenceOutcome {
    match gateway.store(bytes, &metadata).await {
        Ok(location) => {
            info!(%request_id, key = %location.key, kind = %metadata.processing_type, "Stored file");
            PersistenceOutcome::Stored { location }
        }
        Err(e) => {
            warn!(
                %request_id,
                kind = %ErrorKind::PersistenceFailure,
                processing_type = %metadata.processing_type,
                error = %e,
                "Failed to store file; returning result anyway"
            );
            PersistenceOutcome::Failed { reason: e.to_string() }
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

/// Builder for [`ConversionOrchestrator`]. Collaborators not supplied are
/// derived from the config.
pub struct OrchestratorBuilder {
    config: ConversionConfig,
    classifier: Option<ContentClassifier>,
    artifacts: Option<TemporaryArtifactManager>,
    plan: StrategyPlan,
    strategies: HashMap<StrategyKind, Arc<dyn ConversionStrategy>>,
    gateway: Option<Arc<dyn PersistenceGateway>>,
    preference: Option<Arc<dyn UserPreferenceLookup>>,
    observer: Option<ObserverHandle>,
}

impl OrchestratorBuilder {
    pub fn classifier(mut self, classifier: ContentClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn artifacts(mut self, artifacts: TemporaryArtifactManager) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Register a strategy, replacing any other of the same kind.
    pub fn strategy(mut self, strategy: Arc<dyn ConversionStrategy>) -> Self {
        self.strategies.insert(strategy.kind(), strategy);
        self
    }

    /// Register a remote service as the external strategy.
    pub fn external_service(self, service: Arc<dyn ExternalConversionService>) -> Self {
        let strategy = ExternalServiceConversion::new(
            service,
            self.config.external_timeout(),
            self.config.poll_interval(),
        );
        self.strategy(Arc::new(strategy))
    }

    /// Override the strategy order for one direction.
    pub fn plan(mut self, direction: Direction, order: impl IntoIterator<Item = StrategyKind>) -> Self {
        self.plan.set(direction, order);
        self
    }

    pub fn persistence(
        mut self,
        gateway: Arc<dyn PersistenceGateway>,
        preference: Arc<dyn UserPreferenceLookup>,
    ) -> Self {
        self.gateway = Some(gateway);
        self.preference = Some(preference);
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<ConversionOrchestrator, ConfigError> {
        let config = self.config;
        let mut strategies = self.strategies;

        strategies
            .entry(StrategyKind::Native)
            .or_insert_with(|| Arc::new(NativeLibraryConversion::new(&config)));
        strategies
            .entry(StrategyKind::Placeholder)
            .or_insert_with(|| Arc::new(FallbackPlaceholderConversion));

        if !strategies.contains_key(&StrategyKind::OfficeSuite) {
            if let Some(binary) = &config.office_binary {
                strategies.insert(
                    StrategyKind::OfficeSuite,
                    Arc::new(OfficeSuiteConversion::new(binary.clone(), config.office_timeout())),
                );
            }
        }

        if !strategies.contains_key(&StrategyKind::External) {
            if let Some(key) = &config.pdfrest_api_key {
                let service = PdfRestService::new(key, &config.pdfrest_base_url, config.external_timeout())
                    .map_err(|e| ConfigError(format!("pdfRest client: {e}")))?;
                strategies.insert(
                    StrategyKind::External,
                    Arc::new(ExternalServiceConversion::new(
                        Arc::new(service),
                        config.external_timeout(),
                        config.poll_interval(),
                    )),
                );
            }
        }

        let classifier = self
            .classifier
            .unwrap_or_else(|| ContentClassifier::with_defaults(&config));
        let artifacts = self
            .artifacts
            .unwrap_or_else(|| TemporaryArtifactManager::new(config.artifact_root()));
        let observer = self
            .observer
            .or_else(|| config.observer.clone())
            .unwrap_or_else(|| Arc::new(NoopObserver));

        Ok(ConversionOrchestrator {
            config: Arc::new(config),
            classifier,
            artifacts,
            plan: self.plan,
            strategies,
            gateway: self.gateway,
            preference: self.preference,
            observer,
        })
    }
}
