//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator works through a batch. The fragment stream is
//! the primary output; callbacks exist for side channels such as a terminal
//! spinner or a metrics sink that should not consume the stream.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, _name: &str, _ok: bool) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("file {}/{} done", index + 1, total);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BackendKind, MarkdownFragment};
use std::sync::Arc;

/// Called by the orchestrator as it processes a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls arrive from the orchestrator task, one at a
/// time, in the same order as the fragments they describe.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file starts. `index` is 0-based.
    fn on_file_start(&self, index: usize, total_files: usize, name: &str) {
        let _ = (index, total_files, name);
    }

    /// Called when a backend takes over a file (hosted attempt or VLM fallback).
    fn on_backend_selected(&self, index: usize, backend: BackendKind) {
        let _ = (index, backend);
    }

    /// Called for every fragment, just before it is handed to the consumer.
    fn on_fragment(&self, fragment: &MarkdownFragment) {
        let _ = fragment;
    }

    /// Called after the `file-complete` fragment. `converted` is false when
    /// only an error stands in for the file's content.
    fn on_file_complete(&self, index: usize, total_files: usize, name: &str, converted: bool) {
        let _ = (index, total_files, name, converted);
    }

    /// Called once after the last file.
    fn on_run_complete(&self, total_files: usize, converted_files: usize) {
        let _ = (total_files, converted_files);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
