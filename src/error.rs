//! Error types for the edgequake-doc2md library.
//!
//! Two layers of failure exist:
//!
//! * [`Doc2MdError`]: every concrete failure a backend, the rasteriser or
//!   the configuration can produce. Backend calls return
//!   `Result<_, Doc2MdError>`; the orchestrator decides the next step (fall
//!   back, skip, report) from the stage that failed.
//!
//! * [`FailureKind`]: the stage stamped on an error
//!   [`crate::output::MarkdownFragment`]. It is set by the stage that was
//!   running, not derived from the variant: an unreadable page image is an
//!   `Internal` error but a VLM failure.
//!
//! None of the backend variants ever escape a conversion run: the
//! orchestrator turns them into fragments. Only the eager entry points in
//! [`crate::convert`] return `Err`, and only for configuration, runtime or
//! output-file problems.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the edgequake-doc2md library.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Hosted OCR errors ─────────────────────────────────────────────────
    /// The hosted OCR client was requested but no API key is configured.
    #[error("Hosted OCR credential is missing.\nSet MISTRAL_API_KEY (or pass --mistral-api-key) to enable it.")]
    CredentialMissing,

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file's MIME type could not be determined, or is neither PDF nor image.
    #[error("Unsupported media type for '{path}': {detail}")]
    UnsupportedMediaType { path: PathBuf, detail: String },

    /// Network, HTTP status or response-decoding failure from a backend.
    #[error("Backend request failed: {message}")]
    BackendRequestFailed { message: String },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The rasteriser produced no page images for the file.
    #[error("Could not convert '{path}' to page images: no pages were produced")]
    RasterizationEmpty { path: PathBuf },

    /// The rasteriser failed outright (corrupt PDF, pdfium unavailable, …).
    #[error("Rasterisation failed for '{path}': {detail}")]
    RasterizationFailed { path: PathBuf, detail: String },

    // ── VLM errors ────────────────────────────────────────────────────────
    /// A page conversion failed part-way through the VLM stream.
    #[error("VLM conversion failed on page {page}: {detail}")]
    StreamFailure { page: usize, detail: String },

    /// The VLM provider could not be initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which stage of the pipeline a failure fragment reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The hosted OCR client could not be built or its call failed.
    HostedOcr,
    /// The file could not be turned into page images.
    Rasterization,
    /// The VLM conversion stream failed.
    Vlm,
}
