//! Streaming conversion API: emit Markdown fragments as they are produced.
//!
//! ## Why stream?
//!
//! A batch of scanned documents takes minutes, and most of that time is
//! spent waiting on remote backends. The stream lets a caller render each
//! attempt notice, page and completion marker the moment it exists instead
//! of staring at a blank screen until the last file finishes.
//!
//! Unlike the eager [`crate::convert::convert`], which returns once every
//! file is done, [`convert_stream`] hands back a lazy [`FragmentStream`].
//! Fragments arrive strictly in document order: files in input order, pages
//! in page order, whatever the VLM concurrency.

use crate::config::ConversionConfig;
use crate::orchestrator::Orchestrator;
use crate::output::MarkdownFragment;
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of Markdown fragments.
///
/// The stream never yields an error item: per-file failures are reported as
/// `warning` and `error` fragments. Dropping it cancels the remaining work.
pub type FragmentStream = Pin<Box<dyn Stream<Item = MarkdownFragment> + Send>>;

/// Convert `files` to Markdown with the default backends, streaming
/// fragments as they are ready.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2md::{convert_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::from_env()?;
/// let mut stream = convert_stream(vec!["report.pdf".into(), "photo.jpg".into()], config);
/// while let Some(fragment) = stream.next().await {
///     print!("{}", fragment.text);
/// }
/// # Ok(())
/// # }
/// ```
pub fn convert_stream(files: Vec<PathBuf>, config: ConversionConfig) -> FragmentStream {
    info!("Starting streaming conversion of {} file(s)", files.len());
    Orchestrator::new(config).run(files)
}
