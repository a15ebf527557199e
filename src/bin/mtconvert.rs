//! CLI binary for multitool-convert.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, loads inputs, and writes results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use multitool_convert::pipeline::input;
use multitool_convert::{
    convert_all, ConversionAttempt, ConversionConfig, ConversionObserver, ConversionOrchestrator, ConversionRequest,
    ConversionState, ConvertResponse, Direction, LocalDirectoryGateway, ObserverHandle, PersistenceOutcome,
    SourceDocument, StaticPreference, TargetFormat,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner showing the current state, plus one log line per attempt.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionObserver for CliObserver {
    fn on_transition(&self, _request_id: Uuid, state: &ConversionState) {
        self.bar.set_message(state.to_string());
    }

    fn on_attempt_complete(&self, _request_id: Uuid, attempt: &ConversionAttempt) {
        let line = match attempt.failure() {
            None => format!("  {} {:<13} {}", green("✓"), attempt.strategy, dim(&format!("{}ms", attempt.duration_ms))),
            Some((kind, message)) => {
                let msg = if message.chars().count() > 80 {
                    format!("{}\u{2026}", message.chars().take(79).collect::<String>())
                } else {
                    message.to_string()
                };
                format!(
                    "  {} {:<13} {}  {}",
                    red("✗"),
                    attempt.strategy,
                    red(&format!("{kind}: {msg}")),
                    dim(&format!("{}ms", attempt.duration_ms))
                )
            }
        };
        self.bar.println(line);
    }

    fn on_persistence(&self, _request_id: Uuid, outcome: &PersistenceOutcome) {
        match outcome {
            PersistenceOutcome::Stored { location } => {
                self.bar.println(format!("  {} stored as {}", green("✓"), dim(&location.key)))
            }
            PersistenceOutcome::Failed { reason } => {
                self.bar.println(format!("  {} storage failed: {}", yellow("⚠"), reason))
            }
            PersistenceOutcome::NotRequested | PersistenceOutcome::Declined => {}
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # PDF to Word (remote service first when a key is set, then in-process)
  mtconvert report.pdf --to docx

  # Word to PDF with a headless office suite as second choice
  mtconvert letter.docx --to pdf --office-binary /usr/bin/soffice

  # Image to a single-page PDF
  mtconvert scan.png --to pdf -o scan.pdf

  # Merge PDFs in the given order
  mtconvert a.pdf b.pdf c.pdf --to pdf -o bundle.pdf

  # Several independent conversions, four at a time
  mtconvert *.pdf --to text --jobs 4

  # Classify only (image-heavy vs text-heavy)
  mtconvert --inspect scan.pdf

  # Keep a copy of each result under ./store/<user>/...
  mtconvert report.pdf --to docx --store-dir ./store --user alice

  # Machine-readable report
  mtconvert report.pdf --to text --json > report.json

STRATEGY ORDER:
  pdf  → docx   external → native
  pdf  → text   native
  word → pdf    native → office suite → external
  image → pdf   native
  merge         native
  A placeholder notice is appended for targets listed in --placeholder
  (never for image → pdf or merges).

ENVIRONMENT VARIABLES:
  PDFREST_API_KEY           Enables the remote conversion service
  PDFREST_BASE_URL          Override the service root
  MTCONVERT_OFFICE_BINARY   Path to soffice; enables the office-suite strategy
  MTCONVERT_USER            User id for --store-dir
  RUST_LOG                  Override log filtering (e.g. multitool_convert=debug)
"#;

/// Convert documents between PDF, Word, text and image formats.
#[derive(Parser, Debug)]
#[command(
    name = "mtconvert",
    version,
    about = "Convert documents between PDF, Word, text and images with automatic fallback",
    long_about = "Convert documents (local files or URLs) between PDF, Word (.docx), plain text and \
images. Each conversion tries a fixed sequence of strategies (in-process, headless office suite, \
remote service) and returns the first result that succeeds.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file paths or HTTP/HTTPS URLs. Two or more PDFs with `--to pdf` are merged.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Target format: pdf, docx, text.
    #[arg(short = 't', long, env = "MTCONVERT_TO", default_value = "pdf")]
    to: TargetFormat,

    /// Output file (single result only). Default: next to the input.
    #[arg(short, long, env = "MTCONVERT_OUTPUT")]
    output: Option<PathBuf>,

    /// Requests in flight when converting several independent inputs.
    #[arg(short, long, env = "MTCONVERT_JOBS", default_value_t = 4)]
    jobs: usize,

    // ── Classifier ───────────────────────────────────────────────────────
    /// Bytes scanned for image markers.
    #[arg(long, env = "MTCONVERT_SCAN_PREFIX_BYTES", default_value_t = 50_000)]
    scan_prefix_bytes: usize,

    /// size / text length above which a PDF counts as image-heavy.
    #[arg(long, env = "MTCONVERT_SIZE_RATIO_THRESHOLD", default_value_t = 500.0)]
    size_ratio_threshold: f64,

    /// Skip classification heuristics and treat every PDF as text-heavy.
    #[arg(long, env = "MTCONVERT_FORCE_TEXT_HEAVY")]
    force_text_heavy: bool,

    // ── Timeouts ─────────────────────────────────────────────────────────
    /// Per-attempt timeout for in-process conversion, seconds.
    #[arg(long, env = "MTCONVERT_NATIVE_TIMEOUT", default_value_t = 30)]
    native_timeout: u64,

    /// Per-attempt timeout for the remote service, seconds.
    #[arg(long, env = "MTCONVERT_EXTERNAL_TIMEOUT", default_value_t = 120)]
    external_timeout: u64,

    /// Per-attempt timeout for the office suite, seconds.
    #[arg(long, env = "MTCONVERT_OFFICE_TIMEOUT", default_value_t = 60)]
    office_timeout: u64,

    /// Deadline for one whole request, seconds (0 disables).
    #[arg(long, env = "MTCONVERT_REQUEST_TIMEOUT", default_value_t = 300)]
    request_timeout: u64,

    /// Delay between polls of a pending remote job, milliseconds.
    #[arg(long, env = "MTCONVERT_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// HTTP download timeout for URL inputs, seconds.
    #[arg(long, env = "MTCONVERT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    // ── Resources and policy ─────────────────────────────────────────────
    /// Concurrent CPU-bound conversions.
    #[arg(long, env = "MTCONVERT_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Directory for temporary files. Default: the OS temp dir.
    #[arg(long, env = "MTCONVERT_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Targets that may fall back to a placeholder notice (comma-separated).
    #[arg(long, env = "MTCONVERT_PLACEHOLDER", value_delimiter = ',', default_value = "pdf")]
    placeholder: Vec<TargetFormat>,

    /// Do not store the uploaded Word document next to its PDF.
    #[arg(long, env = "MTCONVERT_NO_PERSIST_ORIGINAL")]
    no_persist_original: bool,

    /// Images wider than this are shrunk, pixels.
    #[arg(long, env = "MTCONVERT_IMAGE_MAX_WIDTH", default_value_t = 1200)]
    image_max_width: u32,

    /// Margin around an embedded image, points.
    #[arg(long, env = "MTCONVERT_IMAGE_MARGIN", default_value_t = 10)]
    image_margin: u32,

    /// Largest accepted image, bytes.
    #[arg(long, env = "MTCONVERT_MAX_IMAGE_BYTES", default_value_t = 10 * 1024 * 1024)]
    max_image_bytes: usize,

    /// Most PDFs accepted by one merge.
    #[arg(long, env = "MTCONVERT_MAX_MERGE_INPUTS", default_value_t = 10)]
    max_merge_inputs: usize,

    // ── Collaborators ────────────────────────────────────────────────────
    /// pdfRest API key. Enables the remote strategy.
    #[arg(long, env = "PDFREST_API_KEY", hide_env_values = true)]
    pdfrest_api_key: Option<String>,

    /// pdfRest API root.
    #[arg(long, env = "PDFREST_BASE_URL", default_value = "https://api.pdfrest.com")]
    pdfrest_base_url: String,

    /// Path to `soffice`. Enables the office-suite strategy.
    #[arg(long, env = "MTCONVERT_OFFICE_BINARY")]
    office_binary: Option<PathBuf>,

    /// Store results under this directory (needs --user).
    #[arg(long, env = "MTCONVERT_STORE_DIR", requires = "user")]
    store_dir: Option<PathBuf>,

    /// User id results are stored under.
    #[arg(long, env = "MTCONVERT_USER")]
    user: Option<String>,

    // ── Output ───────────────────────────────────────────────────────────
    /// Print the ConversionReport as JSON on stdout.
    #[arg(long, env = "MTCONVERT_JSON")]
    json: bool,

    /// Classify the first input and print its content profile; no conversion.
    #[arg(long)]
    inspect: bool,

    /// Disable the spinner.
    #[arg(long, env = "MTCONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MTCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MTCONVERT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives enough feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Load inputs ──────────────────────────────────────────────────────
    let mut sources = Vec::with_capacity(cli.inputs.len());
    for raw in &cli.inputs {
        let doc = input::load_source(raw, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load input '{raw}'"))?;
        sources.push(doc);
    }

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone().map(|o| o as ObserverHandle))?;
    let mut builder = ConversionOrchestrator::builder(config);
    if let (Some(dir), Some(_)) = (&cli.store_dir, &cli.user) {
        builder = builder.persistence(Arc::new(LocalDirectoryGateway::new(dir)), Arc::new(StaticPreference(true)));
    }
    let orchestrator = Arc::new(builder.build().context("Invalid configuration")?);

    // ── Inspect mode ─────────────────────────────────────────────────────
    if cli.inspect {
        let first = &sources[0];
        let profile = orchestrator.inspect(first.bytes().clone()).await;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&profile).context("Failed to serialise profile")?);
        } else {
            println!("File:        {}", first.filename());
            println!("Kind:        {:?}", first.kind());
            println!("Size:        {} bytes", first.len());
            println!("Dominant:    {}", profile.dominant);
            println!("Pages:       {}", profile.page_count);
            println!("Size/text:   {:.1}", profile.size_to_text_ratio);
            if let Some(ref m) = profile.marker_hit {
                println!("Marker:      {m}");
            }
            if let Some(ref e) = profile.extraction_error {
                println!("Extraction:  {}", red(e));
            }
        }
        return Ok(());
    }

    // ── Build requests ───────────────────────────────────────────────────
    let requests = build_requests(&cli, sources);
    if cli.output.is_some() && requests.len() > 1 {
        bail!("--output needs a single result; {} inputs produce {} outputs", cli.inputs.len(), requests.len());
    }
    let input_paths: Vec<String> = if requests.len() == 1 {
        vec![cli.inputs[0].clone()]
    } else {
        cli.inputs.clone()
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let results = convert_all(Arc::clone(&orchestrator), requests, cli.jobs).await;
    if let Some(o) = &observer {
        o.finish();
    }

    let mut failures = 0usize;
    let mut reports = Vec::new();
    for (raw, result) in input_paths.iter().zip(results) {
        match result {
            Ok(response) => {
                let path = cli
                    .output
                    .clone()
                    .unwrap_or_else(|| input::default_output_path(raw, &response.output_filename));
                write_atomic(&path, &response.bytes).await?;
                if !cli.quiet && !cli.json {
                    print_summary(&response, &path);
                }
                reports.push(serde_json::to_value(&response.report).context("Failed to serialise report")?);
            }
            Err(e) => {
                failures += 1;
                eprintln!("{} {}: {}", red("✘"), bold(raw), e);
                reports.push(serde_json::to_value(&e).context("Failed to serialise error")?);
            }
        }
    }

    if cli.json {
        let out = if reports.len() == 1 {
            reports.remove(0)
        } else {
            serde_json::Value::Array(reports)
        };
        println!("{}", serde_json::to_string_pretty(&out).context("Failed to serialise output")?);
    }

    if failures > 0 {
        bail!("{failures} conversion(s) failed");
    }
    Ok(())
}

/// One merge when every input is a PDF and the target is PDF; otherwise one
/// request per input.
fn build_requests(cli: &Cli, sources: Vec<SourceDocument>) -> Vec<ConversionRequest> {
    let attach = |r: ConversionRequest| match (&cli.user, &cli.store_dir) {
        (Some(user), Some(_)) => r.for_user(user.clone(), true),
        _ => r,
    };

    let mut iter = sources.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let rest: Vec<SourceDocument> = iter.collect();

    if !rest.is_empty() && cli.to == TargetFormat::Pdf {
        let merge = ConversionRequest::merge(first.clone(), rest.clone());
        if merge.direction() == Some(Direction::MergePdfs) {
            return vec![attach(merge)];
        }
    }

    std::iter::once(first)
        .chain(rest)
        .map(|s| attach(ConversionRequest::new(s, cli.to)))
        .collect()
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, observer: Option<ObserverHandle>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .scan_prefix_bytes(cli.scan_prefix_bytes)
        .size_ratio_threshold(cli.size_ratio_threshold)
        .force_text_heavy(cli.force_text_heavy)
        .native_timeout_secs(cli.native_timeout)
        .external_timeout_secs(cli.external_timeout)
        .office_timeout_secs(cli.office_timeout)
        .request_timeout_secs((cli.request_timeout > 0).then_some(cli.request_timeout))
        .poll_interval_ms(cli.poll_interval_ms)
        .native_workers(cli.workers)
        .placeholder_targets(cli.placeholder.iter().copied())
        .persist_original_source(!cli.no_persist_original)
        .image_max_width(cli.image_max_width)
        .image_margin(cli.image_margin)
        .max_image_bytes(cli.max_image_bytes)
        .max_merge_inputs(cli.max_merge_inputs)
        .pdfrest_base_url(&cli.pdfrest_base_url);

    if let Some(ref key) = cli.pdfrest_api_key {
        builder = builder.pdfrest_api_key(key);
    }
    if let Some(ref bin) = cli.office_binary {
        builder = builder.office_binary(bin);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_summary(response: &ConvertResponse, path: &Path) {
    let report = &response.report;
    let by = response
        .produced_by()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "?".to_string());
    let mark = if response.is_placeholder() { yellow("⚠") } else { green("✔") };
    eprintln!(
        "{}  {}  via {}  {} bytes  {}ms  →  {}",
        mark,
        report.direction,
        by,
        response.bytes.len(),
        report.duration_ms,
        bold(&path.display().to_string()),
    );
    if response.is_placeholder() {
        eprintln!("   {}", yellow("every strategy failed; wrote a placeholder notice instead"));
    }
    if report.profile.page_count > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} · {} pages · size/text {:.0}",
                report.profile.dominant, report.profile.page_count, report.profile.size_to_text_ratio
            ))
        );
    }
}
