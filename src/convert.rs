//! Eager (whole-batch) conversion entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for every file, then return.
//! It drains the fragment stream into memory and assembles the final
//! Markdown document before returning. Use [`crate::stream::convert_stream`]
//! instead when you want to display progress as it happens.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::orchestrator::Orchestrator;
use crate::output::{ConversionOutput, ConversionStats};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Convert a batch of documents to Markdown.
///
/// # Returns
/// `Ok(ConversionOutput)` whenever the run completes, even if some files
/// failed (check `output.stats.failed_files` or the `error` fragments).
/// Backend failures never surface as `Err` here.
pub async fn convert(
    files: Vec<PathBuf>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    collect(Orchestrator::new(config.clone()), files).await
}

/// Drain an orchestrator run into a [`ConversionOutput`].
pub async fn collect(
    orchestrator: Orchestrator,
    files: Vec<PathBuf>,
) -> Result<ConversionOutput, Doc2MdError> {
    let start = Instant::now();
    let total = files.len();
    let fragments: Vec<_> = orchestrator.run(files).collect().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let output = ConversionOutput::from_fragments(fragments, elapsed_ms);
    info!(
        "Converted {} file(s): {} via hosted OCR, {} via VLM, {} failed in {}ms",
        total,
        output.stats.hosted_files,
        output.stats.vlm_files,
        output.stats.failed_files,
        elapsed_ms
    );
    Ok(output)
}

/// Convert a batch and write the assembled Markdown to `output_path`.
///
/// The write is atomic: the document lands in a sibling temp file first and
/// is renamed into place.
pub async fn convert_to_file(
    files: Vec<PathBuf>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Doc2MdError> {
    let output = convert(files, config).await?;
    write_markdown(output_path.as_ref(), &output.markdown).await?;
    Ok(output.stats)
}

/// Atomically write `markdown` to `path`, creating parent directories.
pub async fn write_markdown(path: &Path, markdown: &str) -> Result<(), Doc2MdError> {
    let write_failed = |source| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, markdown)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)?;
    Ok(())
}

/// Synchronous wrapper around [`convert`] for non-async callers.
///
/// Creates a fresh tokio runtime; do not call from inside one.
pub fn convert_sync(
    files: Vec<PathBuf>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(files, config))
}
