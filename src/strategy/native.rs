//! In-process conversion with `lopdf`, `zip` and `image`.
//!
//! Fast and network-free but low fidelity: text is reflowed, layout is
//! dropped. The actual work is CPU-bound, so each attempt takes a permit
//! from a shared semaphore of `native_workers` and runs on the blocking
//! pool. If the orchestrator's timeout fires first, the blocking task keeps
//! its permit until it finishes, so the pool bound holds even under
//! timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{AttemptContext, ConversionStrategy, StrategyKind};
use crate::classify::panic_message;
use crate::config::ConversionConfig;
use crate::document::{Direction, SourceKind};
use crate::error::AttemptError;
use crate::output::ConversionResult;
use crate::pipeline::pdf::TextLayout;
use crate::pipeline::{docx, image, pdf, text};

/// Knobs copied into the blocking task.
#[derive(Debug, Clone, Copy)]
struct Settings {
    layout: TextLayout,
    image_max_width: u32,
    image_margin: u32,
    max_image_bytes: usize,
}

/// Owned description of the work, so it can move to another thread.
enum Job {
    PdfToDocx(Bytes),
    PdfToText(Bytes),
    WordToPdf { bytes: Bytes, kind: SourceKind },
    ImageToPdf(Bytes),
    Merge(Vec<Bytes>),
}

impl Job {
    fn from_context(ctx: &AttemptContext<'_>) -> Self {
        let source = ctx.request.source.bytes().clone();
        match ctx.direction {
            Direction::PdfToDocx => Job::PdfToDocx(source),
            Direction::PdfToText => Job::PdfToText(source),
            Direction::WordToPdf => Job::WordToPdf {
                bytes: source,
                kind: ctx.request.source.kind(),
            },
            Direction::ImageToPdf => Job::ImageToPdf(source),
            Direction::MergePdfs => Job::Merge(ctx.request.sources().map(|s| s.bytes().clone()).collect()),
        }
    }

    fn run(self, settings: Settings) -> Result<Vec<u8>, AttemptError> {
        match self {
            Job::PdfToDocx(bytes) => {
                let pages = extract_clean_pages(&bytes)?;
                docx::write_docx(&docx::blocks_from_pages(&pages)).map_err(AttemptError::Library)
            }
            Job::PdfToText(bytes) => {
                let pages = extract_clean_pages(&bytes)?;
                Ok(text::join_pages(&pages).into_bytes())
            }
            Job::WordToPdf { bytes, kind } => {
                if kind == SourceKind::LegacyDoc {
                    return Err(AttemptError::Library(
                        "legacy .doc is a binary format the in-process reader cannot open".into(),
                    ));
                }
                let paragraphs = docx::read_paragraphs(&bytes).map_err(AttemptError::Library)?;
                pdf::build_text_pdf(&paragraphs, &settings.layout).map_err(AttemptError::Library)
            }
            Job::ImageToPdf(bytes) => {
                let jpeg = image::prepare_image(&bytes, settings.image_max_width, settings.max_image_bytes)
                    .map_err(AttemptError::library)?;
                pdf::build_image_pdf(&jpeg, settings.image_margin).map_err(AttemptError::Library)
            }
            Job::Merge(inputs) => {
                let slices: Vec<&[u8]> = inputs.iter().map(|b| b.as_ref()).collect();
                pdf::merge(&slices).map_err(AttemptError::Library)
            }
        }
    }
}

/// Cleaned text per page. No text on any page is an empty result.
fn extract_clean_pages(bytes: &[u8]) -> Result<Vec<String>, AttemptError> {
    let doc = pdf::load(bytes).map_err(AttemptError::Library)?;
    let pages: Vec<String> = pdf::extract_pages_text(&doc)
        .iter()
        .map(|p| text::clean_text(p))
        .collect();
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(AttemptError::EmptyResult);
    }
    Ok(pages)
}

/// In-process strategy. Handles every direction.
#[derive(Debug, Clone)]
pub struct NativeLibraryConversion {
    workers: Arc<Semaphore>,
    timeout: Duration,
    settings: Settings,
}

impl NativeLibraryConversion {
    pub fn new(config: &ConversionConfig) -> Self {
        Self::with_pool(config, Arc::new(Semaphore::new(config.native_workers.max(1))))
    }

    /// Share one worker pool between several orchestrators.
    pub fn with_pool(config: &ConversionConfig, workers: Arc<Semaphore>) -> Self {
        Self {
            workers,
            timeout: config.native_timeout(),
            settings: Settings {
                layout: TextLayout::default(),
                image_max_width: config.image_max_width,
                image_margin: config.image_margin,
                max_image_bytes: config.max_image_bytes,
            },
        }
    }

    /// Permits currently free in the worker pool.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }
}

#[async_trait]
impl ConversionStrategy for NativeLibraryConversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Native
    }

    fn supports(&self, _direction: Direction) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<ConversionResult, AttemptError> {
        let job = Job::from_context(ctx);
        let settings = self.settings;
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| AttemptError::Fault("native worker pool is closed".into()))?;

        let bytes = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job.run(settings)
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                AttemptError::Fault(panic_message(e.into_panic().as_ref()))
            } else {
                AttemptError::Fault(format!("native task cancelled: {e}"))
            }
        })??;

        debug!(
            request_id = %ctx.request_id,
            direction = %ctx.direction,
            size = bytes.len(),
            "Native conversion produced output"
        );
        Ok(ConversionResult::new(
            bytes,
            ctx.request.target.mime_type(),
            ctx.output_filename(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TemporaryArtifactManager;
    use crate::classify::ContentProfile;
    use crate::document::{ConversionRequest, SourceDocument, TargetFormat, MIME_DOC, MIME_DOCX, MIME_PDF};
    use ::image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use uuid::Uuid;

    fn text_pdf(lines: &[&str]) -> Vec<u8> {
        let paragraphs: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        pdf::build_text_pdf(&paragraphs, &TextLayout::default()).unwrap()
    }

    async fn run(request: ConversionRequest) -> Result<ConversionResult, AttemptError> {
        let config = ConversionConfig::default();
        let strategy = NativeLibraryConversion::new(&config);
        let artifacts = TemporaryArtifactManager::new(std::env::temp_dir());
        let profile = ContentProfile::unclassified();
        let direction = request.direction().unwrap();
        let ctx = AttemptContext {
            request: &request,
            direction,
            profile: &profile,
            artifacts: &artifacts,
            request_id: Uuid::new_v4(),
        };
        strategy.attempt(&ctx).await
    }

    #[tokio::test]
    async fn pdf_to_docx_keeps_text() {
        let src = SourceDocument::new(text_pdf(&["Quarterly results", "Revenue grew"]), MIME_PDF, "q.pdf");
        let out = run(ConversionRequest::new(src, TargetFormat::Docx)).await.unwrap();
        assert_eq!(out.output_mime_type, MIME_DOCX);
        assert_eq!(out.output_filename, "q.docx");
        let paragraphs = docx::read_paragraphs(&out.bytes).unwrap().join("\n");
        assert!(paragraphs.contains("Quarterly results"), "got: {paragraphs:?}");
    }

    #[tokio::test]
    async fn pdf_to_text() {
        let src = SourceDocument::new(text_pdf(&["Hello there"]), MIME_PDF, "h.pdf");
        let out = run(ConversionRequest::new(src, TargetFormat::Text)).await.unwrap();
        assert!(String::from_utf8(out.bytes).unwrap().contains("Hello there"));
    }

    #[tokio::test]
    async fn pdf_without_text_is_empty_result() {
        let src = SourceDocument::new(text_pdf(&[]), MIME_PDF, "blank.pdf");
        let err = run(ConversionRequest::new(src, TargetFormat::Docx)).await.unwrap_err();
        assert_eq!(err, AttemptError::EmptyResult);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_library_failure() {
        let src = SourceDocument::new(b"%PDF-1.4 garbage".to_vec(), MIME_PDF, "bad.pdf");
        let err = run(ConversionRequest::new(src, TargetFormat::Docx)).await.unwrap_err();
        assert!(matches!(err, AttemptError::Library(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn docx_to_pdf() {
        let docx_bytes = docx::write_docx(&[docx::Block::Paragraph("Meeting notes".into())]).unwrap();
        let src = SourceDocument::new(docx_bytes, MIME_DOCX, "notes.docx");
        let out = run(ConversionRequest::new(src, TargetFormat::Pdf)).await.unwrap();
        let doc = pdf::load(&out.bytes).unwrap();
        assert!(pdf::extract_all_text(&doc).unwrap().contains("Meeting notes"));
    }

    #[tokio::test]
    async fn legacy_doc_is_rejected() {
        let src = SourceDocument::new(vec![0xD0, 0xCF, 0x11, 0xE0], MIME_DOC, "old.doc");
        let err = run(ConversionRequest::new(src, TargetFormat::Pdf)).await.unwrap_err();
        assert!(matches!(err, AttemptError::Library(ref m) if m.contains("legacy")));
    }

    #[tokio::test]
    async fn image_to_pdf_page_is_image_plus_margin() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([10, 20, 30])));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        let src = SourceDocument::new(png, "image/png", "photo.png");
        let out = run(ConversionRequest::new(src, TargetFormat::Pdf)).await.unwrap();

        let doc = pdf::load(&out.bytes).unwrap();
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
        let w = media_box[2].as_float().unwrap();
        let h = media_box[3].as_float().unwrap();
        assert_eq!((w, h), (120.0, 70.0));
    }

    #[tokio::test]
    async fn merge_concatenates_pages() {
        let a = SourceDocument::new(text_pdf(&["first"]), MIME_PDF, "a.pdf");
        let b = SourceDocument::new(text_pdf(&["second"]), MIME_PDF, "b.pdf");
        let out = run(ConversionRequest::merge(a, vec![b])).await.unwrap();
        assert_eq!(out.output_filename, "merged.pdf");
        let doc = pdf::load(&out.bytes).unwrap();
        assert_eq!(pdf::page_count(&doc), 2);
    }

    #[tokio::test]
    async fn permit_is_returned_after_attempt() {
        let config = ConversionConfig::builder().native_workers(2).build().unwrap();
        let strategy = NativeLibraryConversion::new(&config);
        let request = ConversionRequest::new(
            SourceDocument::new(text_pdf(&["x"]), MIME_PDF, "x.pdf"),
            TargetFormat::Text,
        );
        let artifacts = TemporaryArtifactManager::new(std::env::temp_dir());
        let profile = ContentProfile::unclassified();
        let ctx = AttemptContext {
            request: &request,
            direction: Direction::PdfToText,
            profile: &profile,
            artifacts: &artifacts,
            request_id: Uuid::new_v4(),
        };
        strategy.attempt(&ctx).await.unwrap();
        assert_eq!(strategy.available_workers(), 2);
    }
}
