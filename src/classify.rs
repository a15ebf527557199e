//! Content classification: is a PDF dominated by raster images or by text?
//!
//! Two independent signals:
//!
//! 1. **Marker scan** — a bounded prefix of the raw bytes is searched,
//!    ASCII-case-insensitively, for tokens that appear in image XObjects and
//!    inline images (`/Subtype/Image`, `/DCTDecode`, `BI … EI`, …).
//! 2. **Size-to-text ratio** — total byte length divided by the length of the
//!    extracted text. Scans carry megabytes of pixels and almost no text.
//!
//! Either signal alone marks the document image-heavy. When extraction
//! fails (corrupt file, encryption, a panic inside the parser) the profile
//! falls back to text-heavy and records why. [`ContentClassifier::classify`]
//! never returns an error.
//!
//! The profile is advisory: the orchestrator logs it and hands it to
//! strategies, but never refuses a request because of it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ConversionConfig;
use crate::error::ExtractionError;
use crate::pipeline::pdf;

// ── Text extraction seam ─────────────────────────────────────────────────────

/// Plain text pulled out of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
}

/// Extracts plain text from raw document bytes.
///
/// Called from a blocking thread; implementations may be CPU-heavy.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError>;
}

/// [`TextExtractor`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextExtractor;

impl TextExtractor for LopdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let doc = pdf::load(bytes).map_err(|e| {
            if e.contains("encrypted") {
                ExtractionError::Encrypted
            } else {
                ExtractionError::Parse(e)
            }
        })?;
        let page_count = pdf::page_count(&doc);
        let text = pdf::extract_all_text(&doc).map_err(ExtractionError::Parse)?;
        Ok(ExtractedText { text, page_count })
    }
}

// ── Profile ──────────────────────────────────────────────────────────────────

/// Dominant content of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantContent {
    ImageHeavy,
    TextHeavy,
    /// Not classified (the direction skips classification).
    Unknown,
}

impl fmt::Display for DominantContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DominantContent::ImageHeavy => "image-heavy",
            DominantContent::TextHeavy => "text-heavy",
            DominantContent::Unknown => "unknown",
        })
    }
}

/// Outcome of classifying one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProfile {
    pub dominant: DominantContent,
    pub page_count: usize,
    pub size_to_text_ratio: f64,
    /// First marker token found in the scanned prefix.
    pub marker_hit: Option<String>,
    /// Why extraction failed, when it did.
    pub extraction_error: Option<String>,
}

impl ContentProfile {
    /// Profile for requests that skip classification.
    pub fn unclassified() -> Self {
        Self {
            dominant: DominantContent::Unknown,
            page_count: 0,
            size_to_text_ratio: 0.0,
            marker_hit: None,
            extraction_error: None,
        }
    }

    pub fn is_image_heavy(&self) -> bool {
        self.dominant == DominantContent::ImageHeavy
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// Heuristic classifier. Cheap to clone; the extractor is shared.
#[derive(Clone)]
pub struct ContentClassifier {
    extractor: Arc<dyn TextExtractor>,
    markers: Arc<Vec<Vec<u8>>>,
    scan_prefix_bytes: usize,
    size_ratio_threshold: f64,
    force_text_heavy: bool,
}

impl fmt::Debug for ContentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentClassifier")
            .field("markers", &self.markers.len())
            .field("scan_prefix_bytes", &self.scan_prefix_bytes)
            .field("size_ratio_threshold", &self.size_ratio_threshold)
            .field("force_text_heavy", &self.force_text_heavy)
            .finish()
    }
}

impl ContentClassifier {
    pub fn new(extractor: Arc<dyn TextExtractor>, config: &ConversionConfig) -> Self {
        Self {
            extractor,
            markers: Arc::new(
                config
                    .image_markers
                    .iter()
                    .map(|m| m.as_bytes().to_ascii_lowercase())
                    .collect(),
            ),
            scan_prefix_bytes: config.scan_prefix_bytes,
            size_ratio_threshold: config.size_ratio_threshold,
            force_text_heavy: config.force_text_heavy,
        }
    }

    /// Classifier using the built-in `lopdf` extractor.
    pub fn with_defaults(config: &ConversionConfig) -> Self {
        Self::new(Arc::new(LopdfTextExtractor), config)
    }

    /// Classify on a blocking thread. Never fails.
    pub async fn classify(&self, bytes: bytes::Bytes) -> ContentProfile {
        let this = self.clone();
        let len = bytes.len();
        match tokio::task::spawn_blocking(move || this.classify_blocking(&bytes)).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Classifier task failed; defaulting to text-heavy");
                ContentProfile {
                    dominant: DominantContent::TextHeavy,
                    page_count: 0,
                    size_to_text_ratio: len as f64,
                    marker_hit: None,
                    extraction_error: Some(format!("classifier task failed: {e}")),
                }
            }
        }
    }

    /// Synchronous classification. Never panics outward and never fails.
    pub fn classify_blocking(&self, bytes: &[u8]) -> ContentProfile {
        let total = bytes.len();

        if self.force_text_heavy {
            debug!("Classification forced to text-heavy");
            return ContentProfile {
                dominant: DominantContent::TextHeavy,
                page_count: 0,
                size_to_text_ratio: 0.0,
                marker_hit: None,
                extraction_error: None,
            };
        }

        let marker_hit = self.scan_markers(bytes);

        let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.extractor.extract_text(bytes)
        }))
        .unwrap_or_else(|payload| Err(ExtractionError::Panicked(panic_message(payload.as_ref()))));

        let profile = match extracted {
            Ok(ExtractedText { text, page_count }) => {
                let text_len = text.trim().chars().count();
                let ratio = total as f64 / text_len.max(1) as f64;
                let image_heavy = marker_hit.is_some() || ratio > self.size_ratio_threshold;
                ContentProfile {
                    dominant: if image_heavy {
                        DominantContent::ImageHeavy
                    } else {
                        DominantContent::TextHeavy
                    },
                    page_count,
                    size_to_text_ratio: ratio,
                    marker_hit,
                    extraction_error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Text extraction failed; defaulting to text-heavy");
                ContentProfile {
                    dominant: DominantContent::TextHeavy,
                    page_count: 0,
                    size_to_text_ratio: total as f64,
                    marker_hit,
                    extraction_error: Some(e.to_string()),
                }
            }
        };

        debug!(
            dominant = %profile.dominant,
            pages = profile.page_count,
            ratio = profile.size_to_text_ratio,
            marker = ?profile.marker_hit,
            "Classified document"
        );
        profile
    }

    /// First configured marker present in the scan window, if any.
    fn scan_markers(&self, bytes: &[u8]) -> Option<String> {
        let window = &bytes[..bytes.len().min(self.scan_prefix_bytes)];
        let lowered = window.to_ascii_lowercase();
        self.markers
            .iter()
            .find(|m| !m.is_empty() && contains(&lowered, m))
            .map(|m| String::from_utf8_lossy(m).into_owned())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pdf::{build_text_pdf, TextLayout};

    struct FixedText(&'static str);

    impl TextExtractor for FixedText {
        fn extract_text(&self, _bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
            Ok(ExtractedText {
                text: self.0.to_string(),
                page_count: 1,
            })
        }
    }

    struct Failing;

    impl TextExtractor for Failing {
        fn extract_text(&self, _bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
            Err(ExtractionError::Parse("bad xref".into()))
        }
    }

    struct Panicking;

    impl TextExtractor for Panicking {
        fn extract_text(&self, _bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
            panic!("parser blew up")
        }
    }

    fn classifier(ex: impl TextExtractor + 'static) -> ContentClassifier {
        ContentClassifier::new(Arc::new(ex), &ConversionConfig::default())
    }

    #[test]
    fn marker_hit_is_case_insensitive() {
        let c = classifier(FixedText("plenty of text here"));
        let p = c.classify_blocking(b"%PDF-1.4 << /SUBTYPE/IMAGE /Width 10 >>");
        assert_eq!(p.dominant, DominantContent::ImageHeavy);
        assert_eq!(p.marker_hit.as_deref(), Some("/subtype/image"));
    }

    #[test]
    fn marker_beyond_prefix_is_ignored() {
        let config = ConversionConfig::builder().scan_prefix_bytes(16).build().unwrap();
        let c = ContentClassifier::new(Arc::new(FixedText("some text")), &config);
        let mut bytes = vec![b' '; 64];
        bytes.extend_from_slice(b"/DCTDecode");
        assert_eq!(c.classify_blocking(&bytes).dominant, DominantContent::TextHeavy);
    }

    #[test]
    fn high_ratio_is_image_heavy() {
        let c = classifier(FixedText("x"));
        let p = c.classify_blocking(&vec![b' '; 10_000]);
        assert_eq!(p.dominant, DominantContent::ImageHeavy);
        assert!(p.size_to_text_ratio > 500.0);
        assert!(p.marker_hit.is_none());
    }

    #[test]
    fn extraction_error_defaults_to_text_heavy() {
        let p = classifier(Failing).classify_blocking(b"garbage");
        assert_eq!(p.dominant, DominantContent::TextHeavy);
        assert!(p.extraction_error.unwrap().contains("bad xref"));
    }

    #[test]
    fn extractor_panic_defaults_to_text_heavy() {
        let p = classifier(Panicking).classify_blocking(b"garbage");
        assert_eq!(p.dominant, DominantContent::TextHeavy);
        assert!(p.extraction_error.unwrap().contains("parser blew up"));
    }

    #[test]
    fn force_text_heavy_skips_heuristic() {
        let config = ConversionConfig::builder().force_text_heavy(true).build().unwrap();
        let c = ContentClassifier::new(Arc::new(Panicking), &config);
        assert_eq!(c.classify_blocking(b"/Subtype/Image").dominant, DominantContent::TextHeavy);
    }

    #[test]
    fn real_text_pdf_is_text_heavy() {
        let paras: Vec<String> = (0..40)
            .map(|i| format!("Line {i} of an ordinary text document with plenty of words."))
            .collect();
        let bytes = build_text_pdf(&paras, &TextLayout::default()).unwrap();
        let p = ContentClassifier::with_defaults(&ConversionConfig::default()).classify_blocking(&bytes);
        assert_eq!(p.dominant, DominantContent::TextHeavy, "{p:?}");
        assert_eq!(p.page_count, 1);
        assert!(p.extraction_error.is_none());
    }

    #[test]
    fn truncated_inputs_never_fail() {
        let paras = vec!["hello".to_string()];
        let bytes = build_text_pdf(&paras, &TextLayout::default()).unwrap();
        let c = ContentClassifier::with_defaults(&ConversionConfig::default());
        for cut in [0, 1, 8, bytes.len() / 2, bytes.len() - 1] {
            let p = c.classify_blocking(&bytes[..cut]);
            assert_ne!(p.dominant, DominantContent::Unknown);
        }
    }

    #[tokio::test]
    async fn async_classify_matches_blocking() {
        let c = classifier(Failing);
        let p = c.classify(bytes::Bytes::from_static(b"x")).await;
        assert_eq!(p.dominant, DominantContent::TextHeavy);
    }
}
