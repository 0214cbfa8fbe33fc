//! CLI binary for edgequake-doc2md.
//!
//! A thin shim over the library crate: maps CLI flags to
//! `ConversionConfig`, streams fragments to stdout as they arrive and
//! renders a spinner on stderr.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doc2md::config::{DEFAULT_HOSTED_OCR_ENDPOINT, DEFAULT_MODEL};
use edgequake_doc2md::convert::write_markdown;
use edgequake_doc2md::{
    BackendKind, ConversionConfig, ConversionOutput, ConversionProgressCallback, FragmentKind,
    MarkdownFragment, Orchestrator, ProgressCallback,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner line for the file in flight and
/// a log line per warning, error and finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: std::sync::Mutex<Option<Instant>>,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos}/{len} files  {msg}  ⏱ {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: std::sync::Mutex::new(None),
            failed: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_prefix("Converting");
    }

    fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut started) = self.file_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_backend_selected(&self, _index: usize, backend: BackendKind) {
        self.bar.set_prefix(backend.label());
    }

    fn on_fragment(&self, fragment: &MarkdownFragment) {
        let headline = fragment
            .text
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default();
        match fragment.kind {
            FragmentKind::Warning => self.bar.println(format!("  {}", yellow(headline))),
            FragmentKind::Error => self.bar.println(format!("  {}", red(headline))),
            _ => {}
        }
    }

    fn on_file_complete(&self, index: usize, total: usize, name: &str, converted: bool) {
        let mark = if converted {
            green("✓")
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
            red("✗")
        };
        self.bar.println(format!(
            "  {} File {:>3}/{:<3}  {}  {}",
            mark,
            index + 1,
            total,
            name,
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_files: usize, converted_files: usize) {
        self.bar.finish_and_clear();
        let failed = self.failed.load(Ordering::SeqCst);
        if total_files == 0 {
            return;
        }
        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&converted_files.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total_files { red("✘") } else { yellow("⚠") },
                bold(&converted_files.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a PDF and an image, streaming Markdown to stdout
  doc2md report.pdf photo.jpg

  # Write the assembled document to a file
  doc2md report.pdf -o report.md

  # Hosted OCR first, VLM fallback
  MISTRAL_API_KEY=... doc2md scan.pdf

  # Local VLM through Ollama, 4 pages in flight
  doc2md --model ollama/llava --concurrency 4 scan.pdf

  # Structured output (fragments + stats)
  doc2md --json report.pdf > report.json

MODEL IDENTIFIERS:
  hosted_vllm/<model>   OpenAI-compatible vLLM server (default: nanonets/Nanonets-OCR-s)
  ollama/<model>        Local Ollama
  openrouter/<model>    OpenRouter
  openai/<model>        OpenAI (also anthropic/, gemini/, mistral/, azure/, lmstudio/)
  <model>               Provider auto-detected from API key env vars

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Enables hosted OCR (Mistral OCR)
  MISTRAL_OCR_ENDPOINT    Override the hosted OCR endpoint
  DOC2MD_MODEL            VLM model identifier
  VLM_MODEL_URL           Base URL of a self-hosted VLM (hosted_vllm/, ollama/)
  API_KEY                 Key for the self-hosted VLM (default: EMPTY)
  OPENAI_API_KEY          Key for openai/ models
  PDFIUM_LIB_PATH         Path to libpdfium (default: system library)
  RUST_LOG                Log filter (overrides -v / -q)

A .env file in the working directory is loaded on start-up.
"#;

/// Convert PDFs and images to Markdown with hosted OCR and a VLM fallback.
#[derive(Parser, Debug)]
#[command(
    name = "doc2md",
    version,
    about = "Convert PDFs and images to Markdown with hosted OCR and a VLM fallback",
    long_about = "Convert PDF documents and images to Markdown. Each file is sent to Mistral OCR \
when MISTRAL_API_KEY is set; on failure (or without a key) pages are rasterised and transcribed \
by a Vision Language Model. Output is streamed as it is produced.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image files, converted in order.
    files: Vec<PathBuf>,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DOC2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// VLM model identifier (family/model).
    #[arg(long, env = "DOC2MD_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Longest edge of a rasterised page, in pixels.
    #[arg(long, env = "DOC2MD_MAX_IMAGE_SIZE", default_value_t = 1024,
          value_parser = clap::value_parser!(u32).range(100..=8192))]
    max_image_size: u32,

    /// Pages transcribed concurrently by the VLM.
    #[arg(short, long, env = "DOC2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Max VLM output tokens per page.
    #[arg(long, env = "DOC2MD_MAX_TOKENS", default_value_t = 10_000)]
    max_tokens: usize,

    /// VLM temperature (0.0–2.0).
    #[arg(long, env = "DOC2MD_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Path to a text file containing a custom transcription prompt.
    #[arg(long, env = "DOC2MD_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Mistral OCR API key. Hosted OCR is skipped when unset.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    mistral_api_key: Option<String>,

    /// Mistral OCR endpoint.
    #[arg(long, env = "MISTRAL_OCR_ENDPOINT", default_value = DEFAULT_HOSTED_OCR_ENDPOINT)]
    mistral_endpoint: String,

    /// Base URL of a self-hosted VLM server (hosted_vllm/ and ollama/ models).
    #[arg(long, env = "VLM_MODEL_URL")]
    vlm_url: Option<String>,

    /// API key for the self-hosted VLM server.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    vlm_api_key: Option<String>,

    /// Path to libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Per-page VLM call timeout in seconds.
    #[arg(long, env = "DOC2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Pause after each content fragment, in milliseconds.
    #[arg(long, env = "DOC2MD_FRAGMENT_DELAY_MS", default_value_t = 10)]
    fragment_delay_ms: u64,

    /// Output structured JSON (ConversionOutput) instead of Markdown.
    #[arg(long, env = "DOC2MD_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOC2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads `env = ...` fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress.clone().map(|cb| cb as ProgressCallback),
    )
    .await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let stream_stdout = cli.output.is_none() && !cli.json;
    let start = Instant::now();
    let mut fragments = Vec::new();
    let mut stream = Orchestrator::new(config).run(cli.files.clone());

    let stdout = io::stdout();
    while let Some(fragment) = stream.next().await {
        if stream_stdout {
            let write = || -> io::Result<()> {
                let mut handle = stdout.lock();
                handle.write_all(fragment.text.as_bytes())?;
                handle.flush()
            };
            match progress.as_ref() {
                Some(cb) => cb.bar.suspend(write),
                None => write(),
            }
            .context("Failed to write to stdout")?;
        }
        fragments.push(fragment);
    }

    let output = ConversionOutput::from_fragments(fragments, start.elapsed().as_millis() as u64);

    if let Some(ref output_path) = cli.output {
        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            write_markdown(output_path, &json)
                .await
                .context("Failed to write output")?;
        } else {
            write_markdown(output_path, &output.markdown)
                .await
                .context("Failed to write output")?;
        }
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} files  {}ms  →  {}",
                if output.stats.failed_files == 0 {
                    green("✔")
                } else {
                    yellow("⚠")
                },
                output.stats.total_files - output.stats.failed_files,
                output.stats.total_files,
                output.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !output.markdown.ends_with('\n') {
        println!();
    }

    if !cli.quiet && !show_progress && cli.output.is_none() {
        eprintln!(
            "Converted {} file(s) in {}ms: {} via hosted OCR, {} via VLM, {} failed",
            output.stats.total_files,
            output.stats.total_duration_ms,
            output.stats.hosted_files,
            output.stats.vlm_files,
            output.stats.failed_files,
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .model(cli.model.clone())
        .max_image_size(cli.max_image_size)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .hosted_ocr_endpoint(cli.mistral_endpoint.clone())
        .fragment_delay_ms(cli.fragment_delay_ms);

    if let Some(ref key) = cli.mistral_api_key {
        builder = builder.hosted_ocr_api_key(key.clone());
    }
    if let Some(ref url) = cli.vlm_url {
        builder = builder.vlm_base_url(url.clone());
    }
    if let Some(ref key) = cli.vlm_api_key {
        builder = builder.vlm_api_key(key.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
