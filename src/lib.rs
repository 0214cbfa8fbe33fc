//! # edgequake-doc2md
//!
//! Convert PDFs and images to Markdown through a two-tier OCR pipeline:
//! a hosted OCR API first, a Vision Language Model (VLM) as fallback.
//!
//! ## Why two tiers?
//!
//! Hosted OCR (Mistral OCR) reads a whole document in one call and is hard
//! to beat on clean scans, but it needs a credential and it can fail. A VLM
//! reading rasterised pages one at a time is slower yet always available
//! when a model endpoint is. This crate tries the first and falls back to
//! the second per file, streaming every step so a reader sees progress
//! rather than a spinner.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Route     hosted OCR if a credential is configured, else VLM
//!  ├─ 2. Hosted    one call per file, pages split on "\n\n---\n\n"
//!  ├─ 3. Fallback  rasterise via pdfium (images pass through)
//!  ├─ 4. VLM       per-page calls, bounded concurrency, page order kept
//!  ├─ 5. Sanitize  escape <img>, <watermark>, <page_number>, <signature>
//!  └─ 6. Output    ordered stream of MarkdownFragments
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Hosted OCR is enabled when MISTRAL_API_KEY is set.
//!     let config = ConversionConfig::from_env()?;
//!     let output = convert(vec!["report.pdf".into()], &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} file(s), {} failed", output.stats.total_files, output.stats.failed_files);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a VLM
//!
//! The model identifier's prefix picks the provider family:
//!
//! | Identifier | Provider |
//! |------------|----------|
//! | `hosted_vllm/nanonets/Nanonets-OCR-s` | OpenAI-compatible vLLM server at `vlm_base_url` (default) |
//! | `ollama/llava` | local Ollama (`vlm_base_url` when set) |
//! | `openrouter/…`, `openai/…`, `anthropic/…`, `gemini/…` | hosted APIs |
//! | anything else | auto-detected from the environment |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{convert, convert_sync, convert_to_file};
pub use error::{Doc2MdError, FailureKind};
pub use orchestrator::Orchestrator;
pub use output::{
    BackendKind, ConversionOutput, ConversionStats, FragmentKind, MarkdownFragment,
    FILE_SEPARATOR, PAGE_SEPARATOR,
};
pub use pipeline::hosted::{HostedOcr, HostedOcrConnector, MistralOcrClient};
pub use pipeline::rasterize::{PageImage, PdfiumRasterizer, RasterizedPages, Rasterizer};
pub use pipeline::sanitize::sanitize;
pub use pipeline::vlm::{LlmTranscriber, ModelSpec, PageTranscriber, VlmDriver};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, FragmentStream};
