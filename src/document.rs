//! Source documents, target formats, and the conversion request.
//!
//! A [`SourceDocument`] is immutable: the bytes live in a reference-counted
//! [`Bytes`] buffer so strategies, the classifier's blocking task, and the
//! persistence step can all hold it without copying.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::persistence::ProcessingType;

// ── MIME constants ───────────────────────────────────────────────────────────

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_TEXT: &str = "text/plain; charset=utf-8";
pub const MIME_OCTET: &str = "application/octet-stream";

/// Image extensions accepted for image → PDF.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

// ── SourceDocument ───────────────────────────────────────────────────────────

/// Immutable input document: bytes, declared MIME type, original filename.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    bytes: Bytes,
    mime_type: String,
    filename: String,
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    pub fn new(
        bytes: impl Into<Bytes>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    /// Build a document whose MIME type is guessed from the filename extension.
    pub fn from_filename(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let mime = mime_for_filename(&filename);
        Self::new(bytes, mime, filename)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Filename without its final extension. Falls back to `"document"`.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
    }

    /// Lower-cased extension of the filename, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
    }

    /// What the document is. The declared MIME type wins; the extension is
    /// consulted only when the MIME type is generic or unknown.
    pub fn kind(&self) -> SourceKind {
        match SourceKind::from_mime(&self.mime_type) {
            SourceKind::Other => self
                .extension()
                .map(|ext| SourceKind::from_extension(&ext))
                .unwrap_or(SourceKind::Other),
            kind => kind,
        }
    }
}

/// Coarse document family, enough to pick a conversion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Docx,
    /// Legacy binary Word (`.doc`).
    LegacyDoc,
    Image,
    Other,
}

impl SourceKind {
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => SourceKind::Pdf,
            MIME_DOCX => SourceKind::Docx,
            MIME_DOC => SourceKind::LegacyDoc,
            m => match m.strip_prefix("image/") {
                Some(sub) if IMAGE_EXTENSIONS.contains(&sub) => SourceKind::Image,
                _ => SourceKind::Other,
            },
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => SourceKind::Pdf,
            "docx" => SourceKind::Docx,
            "doc" => SourceKind::LegacyDoc,
            e if IMAGE_EXTENSIONS.contains(&e) => SourceKind::Image,
            _ => SourceKind::Other,
        }
    }
}

/// Best-effort MIME type for a filename.
pub fn mime_for_filename(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => MIME_PDF,
        "docx" => MIME_DOCX,
        "doc" => MIME_DOC,
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "txt" => MIME_TEXT,
        _ => MIME_OCTET,
    }
}

// ── TargetFormat ─────────────────────────────────────────────────────────────

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Pdf,
    Docx,
    Text,
}

impl TargetFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            TargetFormat::Pdf => MIME_PDF,
            TargetFormat::Docx => MIME_DOCX,
            TargetFormat::Text => MIME_TEXT,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
            TargetFormat::Text => "txt",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
            TargetFormat::Text => "text",
        })
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(TargetFormat::Pdf),
            "docx" | "word" => Ok(TargetFormat::Docx),
            "text" | "txt" => Ok(TargetFormat::Text),
            other => Err(format!("unknown target format '{other}' (expected pdf, docx, text)")),
        }
    }
}

// ── Direction ────────────────────────────────────────────────────────────────

/// A supported (source kind, target format) pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PdfToDocx,
    PdfToText,
    WordToPdf,
    ImageToPdf,
    MergePdfs,
}

impl Direction {
    /// Whether the classifier runs for this direction.
    pub fn classifies(self) -> bool {
        matches!(self, Direction::PdfToDocx | Direction::PdfToText)
    }

    /// Whether a degraded placeholder output is acceptable at all.
    ///
    /// Image and merge requests produce structural output whose absence
    /// cannot be papered over with an explanatory page.
    pub fn permits_placeholder(self) -> bool {
        !matches!(self, Direction::ImageToPdf | Direction::MergePdfs)
    }

    pub fn processing_type(self) -> ProcessingType {
        match self {
            Direction::MergePdfs => ProcessingType::Merge,
            Direction::ImageToPdf => ProcessingType::ImageToPdf,
            _ => ProcessingType::Conversion,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::PdfToDocx => "pdf → docx",
            Direction::PdfToText => "pdf → text",
            Direction::WordToPdf => "word → pdf",
            Direction::ImageToPdf => "image → pdf",
            Direction::MergePdfs => "merge pdfs",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ConversionRequest ────────────────────────────────────────────────────────

/// One conversion: source document(s), target, and persistence intent.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: SourceDocument,
    /// Further inputs for a merge, in output order after `source`.
    pub additional_sources: Vec<SourceDocument>,
    pub target: TargetFormat,
    pub user_id: Option<String>,
    pub persist_on_success: bool,
}

impl ConversionRequest {
    pub fn new(source: SourceDocument, target: TargetFormat) -> Self {
        Self {
            source,
            additional_sources: Vec::new(),
            target,
            user_id: None,
            persist_on_success: false,
        }
    }

    /// Merge `first` followed by `rest` into one PDF.
    pub fn merge(first: SourceDocument, rest: Vec<SourceDocument>) -> Self {
        Self {
            additional_sources: rest,
            ..Self::new(first, TargetFormat::Pdf)
        }
    }

    /// Attach an authenticated user and whether they want the result stored.
    pub fn for_user(mut self, user_id: impl Into<String>, persist: bool) -> Self {
        self.user_id = Some(user_id.into());
        self.persist_on_success = persist;
        self
    }

    /// All inputs in order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDocument> {
        std::iter::once(&self.source).chain(self.additional_sources.iter())
    }

    pub fn source_count(&self) -> usize {
        1 + self.additional_sources.len()
    }

    /// The direction this request asks for, or `None` when no pairing exists.
    pub fn direction(&self) -> Option<Direction> {
        if !self.additional_sources.is_empty() {
            let all_pdf = self.sources().all(|s| s.kind() == SourceKind::Pdf);
            return (all_pdf && self.target == TargetFormat::Pdf).then_some(Direction::MergePdfs);
        }
        match (self.source.kind(), self.target) {
            (SourceKind::Pdf, TargetFormat::Docx) => Some(Direction::PdfToDocx),
            (SourceKind::Pdf, TargetFormat::Text) => Some(Direction::PdfToText),
            (SourceKind::Docx | SourceKind::LegacyDoc, TargetFormat::Pdf) => {
                Some(Direction::WordToPdf)
            }
            (SourceKind::Image, TargetFormat::Pdf) => Some(Direction::ImageToPdf),
            _ => None,
        }
    }

    /// Output filename: source stem + target extension, or `merged.pdf`.
    pub fn output_filename(&self) -> String {
        if self.direction() == Some(Direction::MergePdfs) {
            return "merged.pdf".to_string();
        }
        format!("{}.{}", self.source.stem(), self.target.extension())
    }
}
