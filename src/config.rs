//! Configuration for the conversion pipeline.
//!
//! All tunables (classifier thresholds, per-strategy timeouts, worker pool
//! size, placeholder policy, remote-service credentials) live in
//! [`ConversionConfig`], built via its [`ConversionConfigBuilder`]. The config
//! is read-only once built and is the only state shared between concurrent
//! requests.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::document::TargetFormat;
use crate::error::ConfigError;
use crate::progress::ObserverHandle;

/// Marker tokens associated with embedded raster images in PDF syntax.
/// Matched case-insensitively against the scanned prefix.
pub const DEFAULT_IMAGE_MARKERS: &[&str] = &[
    "/subtype/image",
    "/bitspercomponent",
    "/colorspace/devicergb",
    "/filter/dct",
    "/jpxdecode",
    "/BI ",
    "/EI ",
    "/Im",
];

/// Configuration for a [`crate::ConversionOrchestrator`].
///
/// # Example
/// ```rust
/// use multitool_convert::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .external_timeout_secs(60)
///     .native_workers(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.native_workers, 2);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    // ── Classifier ───────────────────────────────────────────────────────
    /// Bytes scanned for image markers. Default: 50 000.
    pub scan_prefix_bytes: usize,

    /// Marker allow-list, matched case-insensitively.
    pub image_markers: Vec<String>,

    /// `size / text_len` above which a PDF counts as image-heavy. Default: 500.
    ///
    /// Kept high so ordinary text documents never trip it. Scanned documents
    /// with subset fonts can still land on either side.
    pub size_ratio_threshold: f64,

    /// Skip the heuristic and always report text-heavy. Default: false.
    pub force_text_heavy: bool,

    // ── Timeouts ─────────────────────────────────────────────────────────
    /// Per-attempt timeout for in-process conversion. Default: 30.
    pub native_timeout_secs: u64,

    /// Per-attempt timeout for the remote service (upload + poll + download). Default: 120.
    pub external_timeout_secs: u64,

    /// Per-attempt timeout for the headless office suite. Default: 60.
    pub office_timeout_secs: u64,

    /// Deadline for the whole request, across all attempts. Default: Some(300).
    pub request_timeout_secs: Option<u64>,

    /// Delay between polls of a pending remote job. Default: 1000.
    pub poll_interval_ms: u64,

    // ── Resources ────────────────────────────────────────────────────────
    /// Concurrent CPU-bound native conversions across all requests. Default: 4.
    pub native_workers: usize,

    /// Root for temporary artifacts. Default: the OS temp dir.
    pub temp_dir: Option<PathBuf>,

    // ── Policy ───────────────────────────────────────────────────────────
    /// Targets for which a placeholder document may stand in for a failed
    /// conversion. Default: PDF only.
    pub placeholder_targets: Vec<TargetFormat>,

    /// Also store the uploaded Word document when a Word → PDF result is
    /// persisted. Default: true.
    pub persist_original_source: bool,

    // ── Image → PDF ──────────────────────────────────────────────────────
    /// Images wider than this are shrunk, preserving aspect ratio. Default: 1200.
    pub image_max_width: u32,

    /// Margin around the image on its page, in points. Default: 10.
    pub image_margin: u32,

    /// Largest accepted image upload. Default: 10 MiB.
    pub max_image_bytes: usize,

    // ── Merge ────────────────────────────────────────────────────────────
    /// Most PDFs accepted by one merge. Default: 10.
    pub max_merge_inputs: usize,

    // ── External collaborators ───────────────────────────────────────────
    /// pdfRest account key. The remote strategy is disabled without it.
    pub pdfrest_api_key: Option<String>,

    /// pdfRest API root. Default: `https://api.pdfrest.com`.
    pub pdfrest_base_url: String,

    /// Path to `soffice`. The office-suite strategy is disabled without it.
    pub office_binary: Option<PathBuf>,

    /// Receives state transitions and attempt outcomes. Default: None.
    pub observer: Option<ObserverHandle>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scan_prefix_bytes: 50_000,
            image_markers: DEFAULT_IMAGE_MARKERS.iter().map(|s| s.to_string()).collect(),
            size_ratio_threshold: 500.0,
            force_text_heavy: false,
            native_timeout_secs: 30,
            external_timeout_secs: 120,
            office_timeout_secs: 60,
            request_timeout_secs: Some(300),
            poll_interval_ms: 1000,
            native_workers: 4,
            temp_dir: None,
            placeholder_targets: vec![TargetFormat::Pdf],
            persist_original_source: true,
            image_max_width: 1200,
            image_margin: 10,
            max_image_bytes: 10 * 1024 * 1024,
            max_merge_inputs: 10,
            pdfrest_api_key: None,
            pdfrest_base_url: pdfrest_client::DEFAULT_BASE_URL.to_string(),
            office_binary: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("scan_prefix_bytes", &self.scan_prefix_bytes)
            .field("image_markers", &self.image_markers)
            .field("size_ratio_threshold", &self.size_ratio_threshold)
            .field("force_text_heavy", &self.force_text_heavy)
            .field("native_timeout_secs", &self.native_timeout_secs)
            .field("external_timeout_secs", &self.external_timeout_secs)
            .field("office_timeout_secs", &self.office_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("native_workers", &self.native_workers)
            .field("placeholder_targets", &self.placeholder_targets)
            .field("image_max_width", &self.image_max_width)
            .field("max_merge_inputs", &self.max_merge_inputs)
            .field(
                "pdfrest_api_key",
                &self.pdfrest_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("pdfrest_base_url", &self.pdfrest_base_url)
            .field("office_binary", &self.office_binary)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn ConversionObserver>"))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn native_timeout(&self) -> Duration {
        Duration::from_secs(self.native_timeout_secs)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn office_timeout(&self) -> Duration {
        Duration::from_secs(self.office_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Whether a placeholder may stand in for a failed conversion to `target`.
    pub fn placeholder_allowed(&self, target: TargetFormat) -> bool {
        self.placeholder_targets.contains(&target)
    }

    /// Directory temporary artifacts are created under.
    pub fn artifact_root(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn scan_prefix_bytes(mut self, n: usize) -> Self {
        self.config.scan_prefix_bytes = n;
        self
    }

    pub fn image_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.image_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    pub fn size_ratio_threshold(mut self, t: f64) -> Self {
        self.config.size_ratio_threshold = t;
        self
    }

    pub fn force_text_heavy(mut self, v: bool) -> Self {
        self.config.force_text_heavy = v;
        self
    }

    pub fn native_timeout_secs(mut self, secs: u64) -> Self {
        self.config.native_timeout_secs = secs;
        self
    }

    pub fn external_timeout_secs(mut self, secs: u64) -> Self {
        self.config.external_timeout_secs = secs;
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn native_workers(mut self, n: usize) -> Self {
        self.config.native_workers = n.max(1);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn placeholder_targets(mut self, targets: impl IntoIterator<Item = TargetFormat>) -> Self {
        self.config.placeholder_targets = targets.into_iter().collect();
        self
    }

    pub fn persist_original_source(mut self, v: bool) -> Self {
        self.config.persist_original_source = v;
        self
    }

    pub fn image_max_width(mut self, px: u32) -> Self {
        self.config.image_max_width = px;
        self
    }

    pub fn image_margin(mut self, pt: u32) -> Self {
        self.config.image_margin = pt;
        self
    }

    pub fn max_image_bytes(mut self, n: usize) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn max_merge_inputs(mut self, n: usize) -> Self {
        self.config.max_merge_inputs = n;
        self
    }

    pub fn pdfrest_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.pdfrest_api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    pub fn pdfrest_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.pdfrest_base_url = url.into();
        self
    }

    pub fn office_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.office_binary = Some(path.into());
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConfigError> {
        let c = &self.config;
        if c.scan_prefix_bytes == 0 {
            return Err(ConfigError("scan_prefix_bytes must be ≥ 1".into()));
        }
        if !(c.size_ratio_threshold.is_finite() && c.size_ratio_threshold > 0.0) {
            return Err(ConfigError(format!(
                "size_ratio_threshold must be a positive number, got {}",
                c.size_ratio_threshold
            )));
        }
        if c.native_timeout_secs == 0 || c.external_timeout_secs == 0 || c.office_timeout_secs == 0 {
            return Err(ConfigError("strategy timeouts must be ≥ 1s".into()));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(ConfigError("request_timeout_secs must be ≥ 1 when set".into()));
        }
        if c.image_max_width < 16 {
            return Err(ConfigError(format!(
                "image_max_width must be ≥ 16, got {}",
                c.image_max_width
            )));
        }
        if c.max_merge_inputs < 2 {
            return Err(ConfigError("max_merge_inputs must be ≥ 2".into()));
        }
        if c.image_markers.iter().any(|m| m.is_empty()) {
            return Err(ConfigError("image markers must not be empty strings".into()));
        }
        Ok(self.config)
    }
}
