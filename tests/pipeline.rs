//! End-to-end tests for the conversion orchestrator.
//!
//! Every test builds its inputs in memory (text PDFs via `lopdf`, images via
//! `image`) and swaps in fake collaborators where a real one would need the
//! network or an office suite. Nothing here touches a remote service.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use uuid::Uuid;

use multitool_convert::document::{MIME_DOCX, MIME_PDF};
use multitool_convert::output::AttemptOutcome;
use multitool_convert::pipeline::{docx, image as img, pdf};
use multitool_convert::service::Upload;
use multitool_convert::{
    AttemptContext, AttemptError, ConversionAttempt, ConversionConfig, ConversionObserver, ConversionOrchestrator,
    ConversionRequest, ConversionResult, ConversionState, ConversionStrategy, DominantContent, ErrorKind,
    ExternalConversionService, FileMetadata, JobHandle, JobStatus, PersistenceError, PersistenceGateway,
    PersistenceOutcome, ProcessingType, ServiceError, SourceDocument, StaticPreference, StoredLocation,
    StrategyKind, TargetFormat, TemporaryArtifactManager,
};

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn text_pdf(paragraphs: &[&str]) -> Vec<u8> {
    let owned: Vec<String> = paragraphs.iter().map(|s| s.to_string()).collect();
    pdf::build_text_pdf(&owned, &pdf::TextLayout::default()).unwrap()
}

/// Three lines per page, so five paragraphs span two pages.
fn two_page_pdf() -> Vec<u8> {
    let layout = pdf::TextLayout {
        page_height: 200.0,
        ..pdf::TextLayout::default()
    };
    let paragraphs: Vec<String> = (1..=5).map(|i| format!("Paragraph number {i}")).collect();
    pdf::build_text_pdf(&paragraphs, &layout).unwrap()
}

fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 120, 40])));
    let mut out = Vec::new();
    image.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

fn image_pdf() -> Vec<u8> {
    let jpeg = img::prepare_image(&encoded_image(64, 48, ImageFormat::Png), 1200, 10 * 1024 * 1024).unwrap();
    pdf::build_image_pdf(&jpeg, 10).unwrap()
}

fn docx_source() -> SourceDocument {
    SourceDocument::new(vec![b'P', b'K', 3, 4], MIME_DOCX, "letter.docx")
}

struct Harness {
    _root: tempfile::TempDir,
    config: ConversionConfig,
    artifacts: TemporaryArtifactManager,
}

impl Harness {
    fn new() -> Self {
        Self::with(|b| b)
    }

    fn with(
        tweak: impl FnOnce(multitool_convert::ConversionConfigBuilder) -> multitool_convert::ConversionConfigBuilder,
    ) -> Self {
        let root = tempfile::TempDir::new().unwrap();
        let config = tweak(ConversionConfig::builder().temp_dir(root.path())).build().unwrap();
        let artifacts = TemporaryArtifactManager::new(root.path());
        Self {
            _root: root,
            config,
            artifacts,
        }
    }

    fn builder(&self) -> multitool_convert::OrchestratorBuilder {
        ConversionOrchestrator::builder(self.config.clone()).artifacts(self.artifacts.clone())
    }
}

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Behaviour {
    Succeed(&'static [u8]),
    Fail(AttemptError),
    Empty,
    /// Acquire a temp file, then panic while holding it.
    PanicHolding,
    /// Acquire a temp file, then sleep past any reasonable timeout.
    StallHolding,
}

/// Strategy that records how often it ran and does what it is told.
struct Counting {
    kind: StrategyKind,
    behaviour: Behaviour,
    timeout: Duration,
    calls: AtomicUsize,
}

impl Counting {
    fn new(kind: StrategyKind, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            timeout: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
        })
    }

    fn with_timeout(kind: StrategyKind, behaviour: Behaviour, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behaviour,
            timeout,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversionStrategy for Counting {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn supports(&self, _direction: multitool_convert::Direction) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Succeed(bytes) => Ok(ConversionResult::new(
                bytes.to_vec(),
                ctx.request.target.mime_type(),
                ctx.output_filename(),
            )),
            Behaviour::Fail(e) => Err(e.clone()),
            Behaviour::Empty => Ok(ConversionResult::new(
                Vec::new(),
                ctx.request.target.mime_type(),
                ctx.output_filename(),
            )),
            Behaviour::PanicHolding => {
                let held = ctx.artifacts.acquire_file(&ctx.namespace(self.kind), ".tmp")?;
                held.write_all(b"partial")?;
                panic!("converter crashed mid-write");
            }
            Behaviour::StallHolding => {
                let _held = ctx.artifacts.acquire_file(&ctx.namespace(self.kind), ".tmp")?;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(AttemptError::Fault("woke up".into()))
            }
        }
    }
}

/// Remote service whose submissions always fail at the transport level.
struct Unreachable {
    submits: AtomicUsize,
}

#[async_trait]
impl ExternalConversionService for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn supports(&self, _direction: multitool_convert::Direction) -> bool {
        true
    }

    async fn submit(&self, _upload: Upload<'_>, _target: TargetFormat) -> Result<JobHandle, ServiceError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::Transport("connection refused".into()))
    }

    async fn poll(&self, _job: &JobHandle) -> Result<JobStatus, ServiceError> {
        Err(ServiceError::Transport("connection refused".into()))
    }
}

/// Gateway that records every call and optionally refuses them all.
#[derive(Default)]
struct RecordingGateway {
    refuse: bool,
    stored: Mutex<Vec<(FileMetadata, usize)>>,
}

impl RecordingGateway {
    fn refusing() -> Arc<Self> {
        Arc::new(Self {
            refuse: true,
            ..Self::default()
        })
    }

    fn calls(&self) -> Vec<(FileMetadata, usize)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn store(&self, bytes: &[u8], metadata: &FileMetadata) -> Result<StoredLocation, PersistenceError> {
        self.stored.lock().unwrap().push((metadata.clone(), bytes.len()));
        if self.refuse {
            return Err(PersistenceError::Rejected("bucket is read-only".into()));
        }
        Ok(StoredLocation {
            key: metadata.storage_key(),
            uri: format!("mem://{}", metadata.storage_key()),
        })
    }
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<String>>,
    attempts: Mutex<Vec<ConversionAttempt>>,
}

impl Recorder {
    fn states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }
}

impl ConversionObserver for Recorder {
    fn on_transition(&self, _request_id: Uuid, state: &ConversionState) {
        self.states.lock().unwrap().push(state.to_string());
    }

    fn on_attempt_complete(&self, _request_id: Uuid, attempt: &ConversionAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }
}

// ── Resource safety ──────────────────────────────────────────────────────────

#[tokio::test]
async fn artifacts_released_when_strategy_panics() {
    let h = Harness::new();
    let crashing = Counting::new(StrategyKind::External, Behaviour::PanicHolding);
    let orchestrator = h
        .builder()
        .strategy(crashing.clone())
        .strategy(Counting::new(StrategyKind::Native, Behaviour::Succeed(b"docx")))
        .build()
        .unwrap();

    let src = SourceDocument::new(text_pdf(&["hello"]), MIME_PDF, "a.pdf");
    let response = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Docx))
        .await
        .unwrap();

    assert_eq!(crashing.calls(), 1);
    assert_eq!(response.produced_by(), Some(StrategyKind::Native));
    let first = &response.report.attempts[0];
    assert_eq!(first.failure().map(|(k, _)| k), Some(ErrorKind::LibraryFailure));

    let stats = orchestrator.artifacts().stats();
    assert_eq!(stats.acquired(), 1);
    assert_eq!(stats.released(), stats.acquired());
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn artifacts_released_when_attempt_times_out() {
    let h = Harness::new();
    let stalling = Counting::with_timeout(
        StrategyKind::Native,
        Behaviour::StallHolding,
        Duration::from_millis(100),
    );
    let orchestrator = h.builder().strategy(stalling).build().unwrap();

    let src = SourceDocument::new(text_pdf(&["hello"]), MIME_PDF, "a.pdf");
    let err = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Text))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExhaustedStrategies);
    assert_eq!(err.last_attempt_kind(), Some(ErrorKind::Timeout));
    match err.attempts.last().map(|a| &a.outcome) {
        Some(AttemptOutcome::Failure { message, .. }) => assert_eq!(message, "timed out after 100ms"),
        other => panic!("expected a failed attempt, got {other:?}"),
    }
    let stats = orchestrator.artifacts().stats();
    assert_eq!(stats.acquired(), 1);
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn artifacts_balanced_across_real_strategies() {
    let h = Harness::new();
    let unreachable = Arc::new(Unreachable {
        submits: AtomicUsize::new(0),
    });
    let orchestrator = h.builder().external_service(unreachable.clone()).build().unwrap();

    let requests = vec![
        ConversionRequest::new(SourceDocument::new(text_pdf(&["one"]), MIME_PDF, "one.pdf"), TargetFormat::Docx),
        ConversionRequest::new(SourceDocument::new(b"garbage".to_vec(), MIME_PDF, "bad.pdf"), TargetFormat::Docx),
        ConversionRequest::new(
            SourceDocument::new(b"garbage".to_vec(), MIME_DOCX, "bad.docx"),
            TargetFormat::Pdf,
        ),
    ];
    for request in requests {
        let _ = orchestrator.convert(request).await;
    }

    assert!(unreachable.submits.load(Ordering::SeqCst) >= 1);
    let stats = orchestrator.artifacts().stats();
    assert!(stats.acquired() >= 1);
    assert_eq!(stats.released(), stats.acquired());
}

#[test]
fn release_twice_is_a_no_op() {
    let root = tempfile::TempDir::new().unwrap();
    let manager = TemporaryArtifactManager::new(root.path());
    let handle = manager.acquire_file_with("twice", ".bin", b"abc").unwrap();
    let path = handle.path().unwrap().to_path_buf();
    assert!(path.exists());

    handle.release();
    let after_one = (manager.stats().acquired(), manager.stats().released());
    handle.release();
    manager.release(&handle);
    drop(handle);

    assert!(!path.exists());
    assert_eq!((manager.stats().acquired(), manager.stats().released()), after_one);
    assert_eq!(after_one, (1, 1));
    assert_eq!(manager.stats().release_failures(), 0);
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_success_wins_and_later_strategies_never_run() {
    let h = Harness::new();
    let a = Counting::new(StrategyKind::Native, Behaviour::Fail(AttemptError::Library("bad input".into())));
    let b = Counting::new(StrategyKind::OfficeSuite, Behaviour::Succeed(b"%PDF-office"));
    let c = Counting::new(StrategyKind::External, Behaviour::Succeed(b"%PDF-remote"));
    let orchestrator = h
        .builder()
        .strategy(a.clone())
        .strategy(b.clone())
        .strategy(c.clone())
        .build()
        .unwrap();

    let response = orchestrator
        .convert(ConversionRequest::new(docx_source(), TargetFormat::Pdf))
        .await
        .unwrap();

    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
    assert_eq!(response.bytes, b"%PDF-office");
    assert_eq!(response.produced_by(), Some(StrategyKind::OfficeSuite));
    assert_eq!(
        response.report.plan,
        vec![
            StrategyKind::Native,
            StrategyKind::OfficeSuite,
            StrategyKind::External,
            StrategyKind::Placeholder
        ]
    );
    assert_eq!(response.report.attempts.len(), 2);
    assert_eq!(response.output_filename, "letter.pdf");
}

#[tokio::test]
async fn empty_output_is_handled_like_a_failure() {
    async fn transitions(first: Behaviour) -> (Vec<String>, ErrorKind) {
        let h = Harness::new();
        let recorder = Arc::new(Recorder::default());
        let orchestrator = h
            .builder()
            .strategy(Counting::new(StrategyKind::Native, first))
            .strategy(Counting::new(StrategyKind::OfficeSuite, Behaviour::Succeed(b"%PDF")))
            .observer(recorder.clone())
            .build()
            .unwrap();
        let response = orchestrator
            .convert(ConversionRequest::new(docx_source(), TargetFormat::Pdf))
            .await
            .unwrap();
        let kind = response.report.attempts[0].failure().unwrap().0;
        (recorder.states(), kind)
    }

    let (empty_states, empty_kind) = transitions(Behaviour::Empty).await;
    let (failed_states, failed_kind) = transitions(Behaviour::Fail(AttemptError::Library("boom".into()))).await;

    assert_eq!(empty_states, failed_states);
    assert_eq!(empty_kind, ErrorKind::EmptyResult);
    assert_eq!(failed_kind, ErrorKind::LibraryFailure);
    assert_eq!(
        empty_states,
        vec![
            "received",
            "selecting strategy",
            "attempting #1 (native)",
            "attempting #2 (office_suite)",
            "succeeded"
        ]
    );
}

#[tokio::test]
async fn request_deadline_reports_finished_attempts() {
    let h = Harness::with(|b| b.request_timeout_secs(Some(1)));
    let orchestrator = h
        .builder()
        .strategy(Counting::new(StrategyKind::Native, Behaviour::Fail(AttemptError::Library("no".into()))))
        .strategy(Counting::with_timeout(
            StrategyKind::OfficeSuite,
            Behaviour::StallHolding,
            Duration::from_secs(30),
        ))
        .build()
        .unwrap();

    let err = orchestrator
        .convert(ConversionRequest::new(docx_source(), TargetFormat::Pdf))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.attempts.len(), 1);
    assert_eq!(err.attempts[0].strategy, StrategyKind::Native);
    assert_eq!(orchestrator.artifacts().stats().outstanding(), 0);
}

// ── Classification ───────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_inputs_classify_without_failing() {
    let orchestrator = ConversionOrchestrator::new(ConversionConfig::default()).unwrap();
    let full = text_pdf(&["Some ordinary text for the classifier to find."]);

    let mut inputs: Vec<Vec<u8>> = vec![Vec::new(), b"%PDF-".to_vec(), b"\x00\xff\x13garbage".to_vec()];
    for cut in [1, 9, full.len() / 3, full.len() / 2, full.len() - 10] {
        inputs.push(full[..cut].to_vec());
    }

    for input in inputs {
        let len = input.len();
        let profile = orchestrator.inspect(input.into()).await;
        if profile.extraction_error.is_some() {
            assert_eq!(profile.dominant, DominantContent::TextHeavy, "input of {len} bytes");
        }
    }

    let junk = orchestrator.inspect(b"not a pdf at all".to_vec().into()).await;
    assert!(junk.extraction_error.is_some());
    assert_eq!(junk.dominant, DominantContent::TextHeavy);
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_gateway_does_not_fail_the_conversion() {
    let h = Harness::new();
    let gateway = RecordingGateway::refusing();
    let orchestrator = h
        .builder()
        .strategy(Counting::new(StrategyKind::Native, Behaviour::Succeed(b"%PDF-1.5 result")))
        .persistence(gateway.clone(), Arc::new(StaticPreference(true)))
        .build()
        .unwrap();

    let request = ConversionRequest::new(docx_source(), TargetFormat::Pdf).for_user("u-42", true);
    let response = orchestrator.convert(request).await.unwrap();

    assert_eq!(response.bytes, b"%PDF-1.5 result");
    assert!(matches!(response.report.persistence, PersistenceOutcome::Failed { .. }));
    assert!(matches!(
        response.report.original_persistence,
        Some(PersistenceOutcome::Failed { .. })
    ));
    assert_eq!(gateway.calls().len(), 2);
}

#[tokio::test]
async fn word_to_pdf_stores_result_and_original() {
    let h = Harness::new();
    let gateway = Arc::new(RecordingGateway::default());
    let orchestrator = h
        .builder()
        .strategy(Counting::new(StrategyKind::Native, Behaviour::Succeed(b"%PDF-ok")))
        .persistence(gateway.clone(), Arc::new(StaticPreference(true)))
        .build()
        .unwrap();

    let request = ConversionRequest::new(docx_source(), TargetFormat::Pdf).for_user("u-7", true);
    let response = orchestrator.convert(request).await.unwrap();

    assert!(response.report.persistence.is_stored());
    let calls = gateway.calls();
    let types: Vec<ProcessingType> = calls.iter().map(|(m, _)| m.processing_type).collect();
    assert_eq!(types, vec![ProcessingType::Conversion, ProcessingType::OriginalSource]);
    assert_eq!(calls[0].0.file_name, "letter.pdf");
    assert_eq!(calls[0].1, 7);
    assert_eq!(calls[1].0.file_name, "letter.docx");
    assert_eq!(calls[1].0.mime_type, MIME_DOCX);
    assert!(calls.iter().all(|(m, _)| m.user_id == "u-7"));
}

#[tokio::test]
async fn declined_preference_skips_storage() {
    let h = Harness::new();
    let gateway = Arc::new(RecordingGateway::default());
    let orchestrator = h
        .builder()
        .persistence(gateway.clone(), Arc::new(StaticPreference(false)))
        .build()
        .unwrap();

    let src = SourceDocument::new(text_pdf(&["kept private"]), MIME_PDF, "private.pdf");
    let request = ConversionRequest::new(src, TargetFormat::Text).for_user("u-1", true);
    let response = orchestrator.convert(request).await.unwrap();

    assert!(gateway.calls().is_empty());
    assert_eq!(response.report.persistence, PersistenceOutcome::Declined);
    assert!(String::from_utf8(response.bytes).unwrap().contains("kept private"));
}

#[tokio::test]
async fn anonymous_requests_are_never_stored() {
    let h = Harness::new();
    let gateway = Arc::new(RecordingGateway::default());
    let orchestrator = h
        .builder()
        .persistence(gateway.clone(), Arc::new(StaticPreference(true)))
        .build()
        .unwrap();

    let src = SourceDocument::new(text_pdf(&["anon"]), MIME_PDF, "anon.pdf");
    let response = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Text))
        .await
        .unwrap();

    assert!(gateway.calls().is_empty());
    assert_eq!(response.report.persistence, PersistenceOutcome::NotRequested);
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn text_pdf_to_word_succeeds_first_time() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let bytes = two_page_pdf();
    assert_eq!(pdf::page_count(&pdf::load(&bytes).unwrap()), 2);

    let src = SourceDocument::new(bytes, MIME_PDF, "notes.pdf");
    let response = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Docx))
        .await
        .unwrap();

    assert_eq!(response.report.profile.dominant, DominantContent::TextHeavy);
    assert_eq!(response.report.profile.page_count, 2);
    assert_eq!(response.report.attempts.len(), 1);
    assert!(response.report.attempts[0].is_success());
    assert!(!response.is_placeholder());
    assert_eq!(response.output_mime_type, MIME_DOCX);
    assert_eq!(response.output_filename, "notes.docx");

    let paragraphs = docx::read_paragraphs(&response.bytes).unwrap().join("\n");
    assert!(paragraphs.contains("Paragraph number 1"));
    assert!(paragraphs.contains("Paragraph number 5"));
}

#[tokio::test]
async fn image_heavy_pdf_with_remote_failure_moves_on() {
    let h = Harness::new();
    let unreachable = Arc::new(Unreachable {
        submits: AtomicUsize::new(0),
    });
    let orchestrator = h.builder().external_service(unreachable.clone()).build().unwrap();

    let bytes = image_pdf();
    let profile = orchestrator.inspect(bytes.clone().into()).await;
    assert_eq!(profile.dominant, DominantContent::ImageHeavy);
    assert!(profile.marker_hit.is_some());

    let src = SourceDocument::new(bytes, MIME_PDF, "scan.pdf");
    let err = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Docx))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExhaustedStrategies);
    assert_eq!(err.attempts.len(), 2);
    assert_eq!(err.attempts[0].strategy, StrategyKind::External);
    assert_eq!(
        err.attempts[0].failure().map(|(k, _)| k),
        Some(ErrorKind::ExternalServiceError)
    );
    assert_eq!(err.attempts[1].strategy, StrategyKind::Native);
    assert_eq!(unreachable.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn image_heavy_pdf_falls_back_to_notice_when_allowed() {
    let h = Harness::with(|b| b.placeholder_targets([TargetFormat::Pdf, TargetFormat::Docx]));
    let unreachable = Arc::new(Unreachable {
        submits: AtomicUsize::new(0),
    });
    let orchestrator = h.builder().external_service(unreachable).build().unwrap();

    let src = SourceDocument::new(image_pdf(), MIME_PDF, "scan.pdf");
    let response = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Docx))
        .await
        .unwrap();

    assert!(response.report.profile.is_image_heavy());
    assert!(response.is_placeholder());
    assert_eq!(
        response.report.attempts[0].failure().map(|(k, _)| k),
        Some(ErrorKind::ExternalServiceError)
    );
    assert_eq!(response.output_mime_type, MIME_DOCX);
}

#[tokio::test]
async fn jpeg_becomes_single_page_pdf_with_margin() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let src = SourceDocument::new(encoded_image(200, 100, ImageFormat::Jpeg), "image/jpeg", "photo.jpg");

    let response = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Pdf))
        .await
        .unwrap();

    assert_eq!(response.report.plan, vec![StrategyKind::Native]);
    assert_eq!(response.output_filename, "photo.pdf");
    let doc = pdf::load(&response.bytes).unwrap();
    assert_eq!(pdf::page_count(&doc), 1);
    let page_id = *doc.get_pages().values().next().unwrap();
    let media_box = doc
        .get_dictionary(page_id)
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .clone();
    let (w, h) = (media_box[2].as_float().unwrap(), media_box[3].as_float().unwrap());
    assert_eq!((w, h), (220.0, 120.0));
}

#[tokio::test]
async fn merge_keeps_every_page_in_input_order() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let first = SourceDocument::new(text_pdf(&["alpha page"]), MIME_PDF, "a.pdf");
    let second = SourceDocument::new(two_page_pdf(), MIME_PDF, "b.pdf");

    let response = orchestrator
        .convert(ConversionRequest::merge(first, vec![second]))
        .await
        .unwrap();

    assert_eq!(response.output_filename, "merged.pdf");
    let doc = pdf::load(&response.bytes).unwrap();
    assert_eq!(pdf::page_count(&doc), 3);
    let pages = pdf::extract_pages_text(&doc);
    assert!(pages[0].contains("alpha page"));
    assert!(pages[1].contains("Paragraph number 1"));
    assert!(pages[2].contains("Paragraph number 5"));
}

#[tokio::test]
async fn corrupt_blob_to_word_fails_cleanly() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let src = SourceDocument::new(b"\x00\x01 definitely not a pdf".to_vec(), MIME_PDF, "broken.pdf");

    let err = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Docx))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExhaustedStrategies);
    assert!(!err.attempts.is_empty());
    assert!(err.attempts.iter().all(|a| !a.is_success()));
    assert_eq!(orchestrator.artifacts().stats().outstanding(), 0);
}

#[tokio::test]
async fn unsupported_pairing_runs_nothing() {
    let h = Harness::new();
    let native = Counting::new(StrategyKind::Native, Behaviour::Succeed(b"x"));
    let orchestrator = h.builder().strategy(native.clone()).build().unwrap();

    let src = SourceDocument::new(b"plain".to_vec(), "text/plain", "notes.txt");
    let err = orchestrator
        .convert(ConversionRequest::new(src, TargetFormat::Pdf))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
    assert!(err.attempts.is_empty());
    assert_eq!(native.calls(), 0);
}
