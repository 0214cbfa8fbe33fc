//! Conversion orchestrator: route each file, fall back, stream fragments.
//!
//! ## Routing
//!
//! ```text
//! run(files)
//!  │
//!  ├─ connect hosted OCR once ── Ok ──▶ Route::Hosted(client)
//!  │                           └ Err ─▶ one run-level warning, Route::VlmOnly
//!  │
//!  └─ for each file, in order
//!       ├─ Route::Hosted:  ⏳ attempt → extract → 📄 pages ──────────────┐
//!       │                                  └ Err → ⚠️ warning ─┐         │
//!       ├─ VLM:            ⏳ notice → rasterize → 📄 pages     ◀┘         │
//!       │                              └ Err/empty → ❌ error             │
//!       └─ ✅ file complete  ◀─────────────────────────────────────────────┘
//! ```
//!
//! ## Backpressure and cancellation
//!
//! The run is one tokio task writing into an `mpsc` channel of capacity 1,
//! so the producer is never more than one fragment ahead of the consumer.
//! Dropping the returned stream closes the channel; the task notices at its
//! next send and stops, dropping whatever per-file state it held (rendered
//! page directories included).

use crate::config::ConversionConfig;
use crate::error::{Doc2MdError, FailureKind};
use crate::output::{BackendKind, FragmentKind, MarkdownFragment, FILE_SEPARATOR, PAGE_SEPARATOR};
use crate::pipeline::hosted::{mistral_connector, HostedOcr, HostedOcrConnector};
use crate::pipeline::input::display_name;
use crate::pipeline::rasterize::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::sanitize::sanitize;
use crate::pipeline::vlm::{LlmTranscriber, PageTranscriber, VlmDriver};
use crate::progress::ProgressCallback;
use crate::stream::FragmentStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Text of the warning emitted for an empty batch.
pub const NO_FILES_MESSAGE: &str = "No files uploaded. Please upload one or more documents.";

/// Which backend handles files for the rest of a run.
enum Route {
    Hosted(Arc<dyn HostedOcr>),
    VlmOnly,
}

/// The consumer went away.
#[derive(Debug)]
struct Cancelled;

/// Drives a batch of files through the backends.
///
/// Cheap to clone; all backends are shared behind `Arc`s.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ConversionConfig>,
    connect_hosted: HostedOcrConnector,
    rasterizer: Arc<dyn Rasterizer>,
    transcriber: Arc<dyn PageTranscriber>,
}

impl Orchestrator {
    /// An orchestrator with the default backends: Mistral OCR, pdfium and an
    /// `edgequake-llm` transcriber, all configured from `config`.
    pub fn new(config: ConversionConfig) -> Self {
        let rasterizer = Arc::new(PdfiumRasterizer::from_config(&config));
        let transcriber = Arc::new(LlmTranscriber::from_config(&config));
        Self {
            config: Arc::new(config),
            connect_hosted: mistral_connector(),
            rasterizer,
            transcriber,
        }
    }

    pub fn with_hosted_connector(mut self, connector: HostedOcrConnector) -> Self {
        self.connect_hosted = connector;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn PageTranscriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// Convert `files` in order, returning the fragments as a lazy stream.
    ///
    /// Must be called from within a tokio runtime. The stream always ends;
    /// per-file failures appear as `warning`/`error` fragments, never as a
    /// stream error.
    pub fn run(&self, files: Vec<PathBuf>) -> FragmentStream {
        let (tx, rx) = mpsc::channel(1);
        let this = self.clone();

        tokio::spawn(async move {
            let emitter = Emitter {
                tx,
                callback: this.config.progress_callback.clone(),
                delay: Duration::from_millis(this.config.fragment_delay_ms),
            };
            if this.drive(&files, &emitter).await.is_err() {
                debug!("Fragment consumer dropped the stream; stopping run");
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive(&self, files: &[PathBuf], out: &Emitter) -> Result<(), Cancelled> {
        let total = files.len();
        out.with_callback(|cb| cb.on_run_start(total));

        if files.is_empty() {
            warn!("Conversion requested with no files");
            out.emit(MarkdownFragment::warning(NO_FILES_MESSAGE)).await?;
            out.with_callback(|cb| cb.on_run_complete(0, 0));
            return Ok(());
        }

        info!("Converting {} file(s)", total);
        let route = self.connect(out).await?;

        let mut converted = 0;
        for (index, path) in files.iter().enumerate() {
            let name = display_name(path);
            let span = info_span!("file", index, name = %name);
            let ok = self
                .process_file(&route, index, total, path, &name, out)
                .instrument(span)
                .await?;
            if ok {
                converted += 1;
            }
        }

        info!("Run complete: {}/{} file(s) converted", converted, total);
        out.with_callback(|cb| cb.on_run_complete(total, converted));
        Ok(())
    }

    /// Pick the route for the run. A hosted client that cannot be built
    /// disables hosted OCR for every file, with one warning.
    async fn connect(&self, out: &Emitter) -> Result<Route, Cancelled> {
        if !self.config.hosted_ocr_enabled() {
            debug!("No hosted OCR credential; using VLM for every file");
            return Ok(Route::VlmOnly);
        }

        match (self.connect_hosted)(&self.config) {
            Ok(client) => Ok(Route::Hosted(client)),
            Err(e) => {
                warn!("Hosted OCR unavailable for this run: {}", e);
                out.emit(
                    MarkdownFragment::warning(format!(
                        "⚠️ **Warning**: Could not initialize Mistral OCR client: {e}. \
                         Falling back to default processing.{PAGE_SEPARATOR}"
                    ))
                    .with_backend(BackendKind::HostedOcr)
                    .with_failure(FailureKind::HostedOcr),
                )
                .await?;
                Ok(Route::VlmOnly)
            }
        }
    }

    /// Convert one file. Returns whether its content was produced without
    /// an error fragment.
    async fn process_file(
        &self,
        route: &Route,
        index: usize,
        total: usize,
        path: &Path,
        name: &str,
        out: &Emitter,
    ) -> Result<bool, Cancelled> {
        out.with_callback(|cb| cb.on_file_start(index, total, name));

        let converted = match route {
            Route::Hosted(client) => {
                if self.try_hosted(client.as_ref(), index, path, name, out).await? {
                    true
                } else {
                    self.convert_with_vlm(index, path, name, out).await?
                }
            }
            Route::VlmOnly => self.convert_with_vlm(index, path, name, out).await?,
        };

        out.emit(
            MarkdownFragment::new(
                FragmentKind::FileComplete,
                format!("✅ Finished processing {name}.{FILE_SEPARATOR}"),
            )
            .for_file(index),
        )
        .await?;
        out.with_callback(|cb| cb.on_file_complete(index, total, name, converted));
        Ok(converted)
    }

    /// Hosted OCR attempt. Returns false when the file needs the VLM path.
    async fn try_hosted(
        &self,
        client: &dyn HostedOcr,
        index: usize,
        path: &Path,
        name: &str,
        out: &Emitter,
    ) -> Result<bool, Cancelled> {
        out.with_callback(|cb| cb.on_backend_selected(index, BackendKind::HostedOcr));
        out.emit(
            MarkdownFragment::new(
                FragmentKind::Attempt,
                format!("⏳ Attempting Mistral OCR for {name}...{PAGE_SEPARATOR}"),
            )
            .for_file(index)
            .with_backend(BackendKind::HostedOcr),
        )
        .await?;

        let text = match client.extract(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Hosted OCR failed for {}: {}", name, e);
                out.emit(
                    MarkdownFragment::new(
                        FragmentKind::Warning,
                        format!(
                            "⚠️ **Mistral OCR Error for {name}**: {e}. Falling back to VLM.{PAGE_SEPARATOR}"
                        ),
                    )
                    .for_file(index)
                    .with_backend(BackendKind::HostedOcr)
                    .with_failure(FailureKind::HostedOcr),
                )
                .await?;
                return Ok(false);
            }
        };

        let pages: Vec<&str> = text.split(PAGE_SEPARATOR).collect();
        let n = pages.len();
        info!("Hosted OCR produced {} page(s) for {}", n, name);

        for (i, page) in pages.iter().enumerate() {
            let k = i + 1;
            let body = sanitize(page);
            let fragment = if n > 1 {
                MarkdownFragment::new(
                    FragmentKind::PageProgress,
                    format!(
                        "📄 **Mistral OCR Output** `[File {name}]` (Page {k} of {n})\n\n{body}{PAGE_SEPARATOR}"
                    ),
                )
            } else {
                MarkdownFragment::new(FragmentKind::Success, format!("{body}\n\n"))
            };
            out.emit(
                fragment
                    .for_file(index)
                    .with_backend(BackendKind::HostedOcr)
                    .with_page(k, n),
            )
            .await?;
        }
        Ok(true)
    }

    /// Rasterise the file and stream its pages through the VLM.
    async fn convert_with_vlm(
        &self,
        index: usize,
        path: &Path,
        name: &str,
        out: &Emitter,
    ) -> Result<bool, Cancelled> {
        out.with_callback(|cb| cb.on_backend_selected(index, BackendKind::Vlm));
        out.emit(
            MarkdownFragment::new(
                FragmentKind::Attempt,
                format!(
                    "⏳ Using default VLM model for {name} (converting to images first)...{PAGE_SEPARATOR}"
                ),
            )
            .for_file(index)
            .with_backend(BackendKind::Vlm),
        )
        .await?;

        let file = [path.to_path_buf()];
        let rasterized = self
            .rasterizer
            .rasterize(&file, self.config.max_image_size)
            .await
            .and_then(|pages| {
                if pages.is_empty() {
                    Err(Doc2MdError::RasterizationEmpty {
                        path: path.to_path_buf(),
                    })
                } else {
                    Ok(pages)
                }
            });

        let pages = match rasterized {
            Ok(pages) => pages,
            Err(e) => {
                error!("Could not rasterise {}: {}", name, e);
                out.emit(
                    MarkdownFragment::new(
                        FragmentKind::Error,
                        format!(
                            "❌ Could not convert {name} to page images for VLM processing: {e}{PAGE_SEPARATOR}"
                        ),
                    )
                    .for_file(index)
                    .with_backend(BackendKind::Vlm)
                    .with_failure(FailureKind::Rasterization),
                )
                .await?;
                return Ok(false);
            }
        };
        debug!("{} rasterised into {} page(s)", name, pages.len());

        let driver = VlmDriver::new(Arc::clone(&self.transcriber), self.config.concurrency);
        let mut chunks = driver.stream(pages.pages());

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    let kind = if chunk.total > 1 {
                        FragmentKind::PageProgress
                    } else {
                        FragmentKind::Success
                    };
                    out.emit(
                        MarkdownFragment::new(kind, sanitize(&chunk.markdown))
                            .for_file(index)
                            .with_backend(BackendKind::Vlm)
                            .with_page(chunk.page, chunk.total),
                    )
                    .await?;
                }
                Err(e) => {
                    error!("VLM conversion failed for {}: {}", name, e);
                    out.emit(
                        MarkdownFragment::new(
                            FragmentKind::Error,
                            format!("❌ **Error in VLM processing for {name}**: {e}{PAGE_SEPARATOR}"),
                        )
                        .for_file(index)
                        .with_backend(BackendKind::Vlm)
                        .with_failure(FailureKind::Vlm),
                    )
                    .await?;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Sending half of a run: forwards fragments to the consumer and mirrors
/// them to the progress callback.
struct Emitter {
    tx: mpsc::Sender<MarkdownFragment>,
    callback: Option<ProgressCallback>,
    delay: Duration,
}

impl Emitter {
    /// Deliver one fragment. The callback only sees fragments that made it
    /// into the channel.
    async fn emit(&self, fragment: MarkdownFragment) -> Result<(), Cancelled> {
        let permit = self.tx.reserve().await.map_err(|_| Cancelled)?;
        self.with_callback(|cb| cb.on_fragment(&fragment));
        let pause = fragment.is_content() && !self.delay.is_zero();
        permit.send(fragment);
        if pause {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    fn with_callback(&self, f: impl FnOnce(&ProgressCallback)) {
        if let Some(cb) = self.callback.as_ref() {
            f(cb);
        }
    }
}
