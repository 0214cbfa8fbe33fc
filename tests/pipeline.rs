//! Orchestrator integration tests with in-process fake backends.
//!
//! No network, no pdfium: the hosted OCR client, the rasteriser and the page
//! transcriber are all replaced by fakes keyed on file name, so every
//! routing and fallback path can be exercised deterministically.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_doc2md::convert::collect;
use edgequake_doc2md::{
    BackendKind, ConversionConfig, ConversionProgressCallback, Doc2MdError, FailureKind,
    FragmentKind, HostedOcr, HostedOcrConnector, MarkdownFragment, Orchestrator, PageImage,
    PageTranscriber, RasterizedPages, Rasterizer, FILE_SEPARATOR, PAGE_SEPARATOR,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What the fake rasteriser does for a given file name.
#[derive(Clone)]
enum Raster {
    Pages(usize),
    Empty,
    Fail,
}

#[derive(Default)]
struct FakeRasterizer {
    plan: HashMap<String, Raster>,
    calls: AtomicUsize,
}

impl FakeRasterizer {
    fn with(mut self, name: &str, raster: Raster) -> Self {
        self.plan.insert(name.to_string(), raster);
        self
    }
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, files: &[PathBuf], _size_bound: u32) -> Result<RasterizedPages, Doc2MdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut paths = Vec::new();
        for file in files {
            let name = file_name(file);
            match self.plan.get(&name).cloned().unwrap_or(Raster::Pages(1)) {
                Raster::Pages(n) => {
                    paths.extend((1..=n).map(|k| PathBuf::from(format!("{name}#{k}"))));
                }
                Raster::Empty => {}
                Raster::Fail => {
                    return Err(Doc2MdError::RasterizationFailed {
                        path: file.clone(),
                        detail: "corrupt document".into(),
                    })
                }
            }
        }
        Ok(RasterizedPages::from_paths(paths))
    }
}

/// Transcribes a page as `vlm:<page path>`, with a figure tag to sanitise.
#[derive(Default)]
struct FakeTranscriber {
    fail_on: Option<String>,
    delay_for: HashMap<String, u64>,
    calls: AtomicUsize,
}

#[async_trait]
impl PageTranscriber for FakeTranscriber {
    async fn transcribe(&self, page: &PageImage) -> Result<String, Doc2MdError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = page.path.display().to_string();
        if let Some(ms) = self.delay_for.get(&id) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.fail_on.as_deref() == Some(id.as_str()) {
            return Err(Doc2MdError::StreamFailure {
                page: page.page_num,
                detail: "model crashed".into(),
            });
        }
        Ok(format!("vlm:{id} <img>figure</img>"))
    }
}

/// Hosted OCR fake: per-file canned results; unknown files fail.
#[derive(Default)]
struct FakeHosted {
    results: HashMap<String, Result<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeHosted {
    fn ok(mut self, name: &str, text: &str) -> Self {
        self.results.insert(name.to_string(), Ok(text.to_string()));
        self
    }

    fn fail(mut self, name: &str, message: &str) -> Self {
        self.results.insert(name.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl HostedOcr for FakeHosted {
    async fn extract(&self, path: &Path) -> Result<String, Doc2MdError> {
        let name = file_name(path);
        self.calls.lock().unwrap().push(name.clone());
        match self.results.get(&name) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(Doc2MdError::BackendRequestFailed {
                message: message.clone(),
            }),
            None => Err(Doc2MdError::FileNotFound {
                path: path.to_path_buf(),
            }),
        }
    }
}

fn connector_for(hosted: Arc<FakeHosted>, built: Arc<AtomicUsize>) -> HostedOcrConnector {
    Arc::new(
        move |_: &ConversionConfig| -> Result<Arc<dyn HostedOcr>, Doc2MdError> {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&hosted) as Arc<dyn HostedOcr>)
        },
    )
}

fn failing_connector(built: Arc<AtomicUsize>) -> HostedOcrConnector {
    Arc::new(
        move |_: &ConversionConfig| -> Result<Arc<dyn HostedOcr>, Doc2MdError> {
            built.fetch_add(1, Ordering::SeqCst);
            Err(Doc2MdError::BackendRequestFailed {
                message: "TLS backend unavailable".into(),
            })
        },
    )
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Honour RUST_LOG when debugging a failing test; harmless when called twice.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(hosted_key: Option<&str>) -> ConversionConfig {
    let mut builder = ConversionConfig::builder().fragment_delay_ms(0);
    if let Some(key) = hosted_key {
        builder = builder.hosted_ocr_api_key(key);
    }
    builder.build().unwrap()
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from(format!("/uploads/{n}"))).collect()
}

async fn run(orchestrator: &Orchestrator, names: &[&str]) -> Vec<MarkdownFragment> {
    init_tracing();
    orchestrator.run(paths(names)).collect().await
}

fn for_file(fragments: &[MarkdownFragment], index: usize) -> Vec<&MarkdownFragment> {
    fragments.iter().filter(|f| f.file_index == Some(index)).collect()
}

fn kinds(fragments: &[&MarkdownFragment]) -> Vec<FragmentKind> {
    fragments.iter().map(|f| f.kind).collect()
}

// ── Routing without a credential ─────────────────────────────────────────────

#[tokio::test]
async fn report_and_photo_without_credential() {
    let rasterizer = Arc::new(FakeRasterizer::default().with("report.pdf", Raster::Pages(3)));
    let transcriber = Arc::new(FakeTranscriber::default());
    let built = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(rasterizer.clone())
        .with_transcriber(transcriber.clone())
        .with_hosted_connector(failing_connector(built.clone()));

    let fragments = run(&orchestrator, &["report.pdf", "photo.jpg"]).await;

    // No hosted client is ever built, so no hosted attempts.
    assert_eq!(built.load(Ordering::SeqCst), 0);
    assert!(fragments.iter().all(|f| f.backend != Some(BackendKind::HostedOcr)));
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 2);

    let report = for_file(&fragments, 0);
    assert_eq!(
        kinds(&report),
        vec![
            FragmentKind::Attempt,
            FragmentKind::PageProgress,
            FragmentKind::PageProgress,
            FragmentKind::PageProgress,
            FragmentKind::FileComplete,
        ]
    );
    for (k, fragment) in report[1..4].iter().enumerate() {
        assert!(fragment.text.contains(&format!("page {} of 3", k + 1)));
        assert!(fragment.text.ends_with(PAGE_SEPARATOR));
    }

    let photo = for_file(&fragments, 1);
    assert_eq!(
        kinds(&photo),
        vec![FragmentKind::Attempt, FragmentKind::Success, FragmentKind::FileComplete]
    );
    assert!(!photo[1].text.contains("Processing page"));
    assert!(photo[1].text.starts_with("vlm:photo.jpg#1"));

    let completions: Vec<_> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::FileComplete)
        .map(|f| f.text.clone())
        .collect();
    assert_eq!(
        completions,
        vec![
            format!("✅ Finished processing report.pdf.{FILE_SEPARATOR}"),
            format!("✅ Finished processing photo.jpg.{FILE_SEPARATOR}"),
        ]
    );
}

#[tokio::test]
async fn vlm_pages_keep_order_under_concurrency() {
    let transcriber = FakeTranscriber {
        delay_for: HashMap::from([
            ("big.pdf#1".to_string(), 60),
            ("big.pdf#2".to_string(), 30),
        ]),
        ..Default::default()
    };
    let cfg = ConversionConfig::builder()
        .fragment_delay_ms(0)
        .concurrency(4)
        .build()
        .unwrap();
    let orchestrator = Orchestrator::new(cfg)
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("big.pdf", Raster::Pages(4))))
        .with_transcriber(Arc::new(transcriber));

    let fragments = run(&orchestrator, &["big.pdf"]).await;
    let pages: Vec<usize> = fragments
        .iter()
        .filter_map(|f| f.page.map(|p| p.page))
        .collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
}

// ── Hosted OCR ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn hosted_pages_are_split_and_sanitized() {
    let hosted = Arc::new(FakeHosted::default().ok(
        "scan.pdf",
        "Page1 <watermark>DRAFT</watermark>\n\n---\n\nPage2",
    ));
    let transcriber = Arc::new(FakeTranscriber::default());
    let orchestrator = Orchestrator::new(config(Some("test-key")))
        .with_hosted_connector(connector_for(hosted, Arc::new(AtomicUsize::new(0))))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(transcriber.clone());

    let fragments = run(&orchestrator, &["scan.pdf"]).await;
    let kinds = kinds(&fragments.iter().collect::<Vec<_>>());
    assert_eq!(
        kinds,
        vec![
            FragmentKind::Attempt,
            FragmentKind::PageProgress,
            FragmentKind::PageProgress,
            FragmentKind::FileComplete,
        ]
    );

    assert_eq!(fragments[0].text, format!("⏳ Attempting Mistral OCR for scan.pdf...{PAGE_SEPARATOR}"));
    assert!(fragments[1].text.contains("(Page 1 of 2)"));
    assert!(fragments[1].text.contains("Page1 &lt;watermark&gt;DRAFT&lt;/watermark&gt;"));
    assert!(fragments[1].text.ends_with(PAGE_SEPARATOR));
    assert!(fragments[2].text.contains("(Page 2 of 2)"));
    assert!(fragments[2].text.contains("Page2"));
    assert!(fragments
        .iter()
        .all(|f| f.file_index == Some(0)));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hosted_single_page_has_no_header() {
    let hosted = Arc::new(FakeHosted::default().ok("receipt.png", "Total: 42"));
    let orchestrator = Orchestrator::new(config(Some("test-key")))
        .with_hosted_connector(connector_for(hosted, Arc::new(AtomicUsize::new(0))))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = run(&orchestrator, &["receipt.png"]).await;
    assert_eq!(fragments[1].kind, FragmentKind::Success);
    assert_eq!(fragments[1].text, "Total: 42\n\n");
    assert_eq!(fragments[1].backend, Some(BackendKind::HostedOcr));
}

#[tokio::test]
async fn hosted_failure_falls_back_for_that_file_only() {
    let hosted = Arc::new(
        FakeHosted::default()
            .fail("a.pdf", "HTTP 500")
            .ok("b.pdf", "from hosted"),
    );
    let built = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::new(config(Some("test-key")))
        .with_hosted_connector(connector_for(hosted.clone(), built.clone()))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = run(&orchestrator, &["a.pdf", "b.pdf"]).await;
    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert_eq!(*hosted.calls.lock().unwrap(), vec!["a.pdf", "b.pdf"]);

    let a = for_file(&fragments, 0);
    assert_eq!(
        kinds(&a),
        vec![
            FragmentKind::Attempt,
            FragmentKind::Warning,
            FragmentKind::Attempt,
            FragmentKind::Success,
            FragmentKind::FileComplete,
        ]
    );
    assert_eq!(a[1].failure, Some(FailureKind::HostedOcr));
    assert!(a[1].text.contains("HTTP 500"));
    assert!(a[1].text.contains("Falling back to VLM"));
    assert_eq!(a[2].backend, Some(BackendKind::Vlm));
    assert!(a[2].text.contains("converting to images first"));
    assert_eq!(a[3].backend, Some(BackendKind::Vlm));

    // Exactly one backend's content per file.
    let b = for_file(&fragments, 1);
    assert_eq!(
        kinds(&b),
        vec![FragmentKind::Attempt, FragmentKind::Success, FragmentKind::FileComplete]
    );
    assert_eq!(b[1].text, "from hosted\n\n");
}

#[tokio::test]
async fn connector_failure_warns_once_and_degrades_run() {
    let built = Arc::new(AtomicUsize::new(0));
    let orchestrator = Orchestrator::new(config(Some("test-key")))
        .with_hosted_connector(failing_connector(built.clone()))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = run(&orchestrator, &["a.png", "b.png", "c.png"]).await;
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let warnings: Vec<_> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].file_index, None);
    assert!(warnings[0].text.contains("Could not initialize Mistral OCR client"));
    assert!(warnings[0].text.contains("TLS backend unavailable"));
    assert!(std::ptr::eq(warnings[0], &fragments[0]));

    let attempts: Vec<_> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Attempt)
        .collect();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|f| f.backend == Some(BackendKind::Vlm)));
}

// ── Failures on the VLM path ────────────────────────────────────────────────

#[tokio::test]
async fn empty_rasterization_errors_without_vlm_call() {
    let transcriber = Arc::new(FakeTranscriber::default());
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("blank.pdf", Raster::Empty)))
        .with_transcriber(transcriber.clone());

    let fragments = run(&orchestrator, &["blank.pdf"]).await;
    let kinds = kinds(&fragments.iter().collect::<Vec<_>>());
    assert_eq!(
        kinds,
        vec![FragmentKind::Attempt, FragmentKind::Error, FragmentKind::FileComplete]
    );
    assert_eq!(fragments[1].failure, Some(FailureKind::Rasterization));
    assert!(fragments[1].text.contains("Could not convert blank.pdf to page images"));
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rasterization_failure_does_not_stop_the_batch() {
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("broken.pdf", Raster::Fail)))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = run(&orchestrator, &["broken.pdf", "fine.png"]).await;

    let broken = for_file(&fragments, 0);
    assert_eq!(broken[1].kind, FragmentKind::Error);
    assert!(broken[1].text.contains("corrupt document"));
    assert_eq!(broken.last().unwrap().kind, FragmentKind::FileComplete);

    let fine = for_file(&fragments, 1);
    assert_eq!(
        kinds(&fine),
        vec![FragmentKind::Attempt, FragmentKind::Success, FragmentKind::FileComplete]
    );
}

#[tokio::test]
async fn vlm_failure_ends_that_files_output() {
    let transcriber = FakeTranscriber {
        fail_on: Some("long.pdf#2".to_string()),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("long.pdf", Raster::Pages(4))))
        .with_transcriber(Arc::new(transcriber));

    let fragments = run(&orchestrator, &["long.pdf", "next.png"]).await;
    let long = for_file(&fragments, 0);
    assert_eq!(
        kinds(&long),
        vec![
            FragmentKind::Attempt,
            FragmentKind::PageProgress,
            FragmentKind::Error,
            FragmentKind::FileComplete,
        ]
    );
    assert_eq!(long[2].failure, Some(FailureKind::Vlm));
    assert!(long[2].text.contains("Error in VLM processing for long.pdf"));
    assert!(long[2].text.contains("model crashed"));

    assert_eq!(for_file(&fragments, 1).len(), 3);
}

// ── Stream-wide properties ──────────────────────────────────────────────────

#[tokio::test]
async fn completions_match_inputs_and_no_raw_tags_survive() {
    let names = ["one.pdf", "two.png", "three.pdf", "four.jpg"];
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(
            FakeRasterizer::default()
                .with("one.pdf", Raster::Pages(2))
                .with("three.pdf", Raster::Fail),
        ))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = run(&orchestrator, &names).await;

    let completed: Vec<usize> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::FileComplete)
        .filter_map(|f| f.file_index)
        .collect();
    assert_eq!(completed, vec![0, 1, 2, 3]);

    // File indices never go backwards.
    let indices: Vec<usize> = fragments.iter().filter_map(|f| f.file_index).collect();
    assert!(indices.windows(2).all(|w| w[0] <= w[1]));

    for raw in ["<img>", "</img>", "<watermark>", "<page_number>", "<signature>"] {
        assert!(fragments.iter().all(|f| !f.text.contains(raw)), "{raw} leaked");
    }
}

#[tokio::test]
async fn dropping_the_stream_cancels_remaining_work() {
    let transcriber = Arc::new(FakeTranscriber::default());
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(transcriber.clone());

    let names: Vec<String> = (0..20).map(|i| format!("p{i}.png")).collect();
    let files = names.iter().map(PathBuf::from).collect();

    let mut stream = orchestrator.run(files);
    for _ in 0..3 {
        assert!(stream.next().await.is_some());
    }
    drop(stream);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = transcriber.calls.load(Ordering::SeqCst);
    assert!(calls < 20, "producer kept working after cancellation ({calls} calls)");
}

#[tokio::test]
async fn collect_builds_document_and_stats() {
    let hosted = Arc::new(FakeHosted::default().ok("a.pdf", "hosted text").fail("b.pdf", "boom"));
    let orchestrator = Orchestrator::new(config(Some("test-key")))
        .with_hosted_connector(connector_for(hosted, Arc::new(AtomicUsize::new(0))))
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("c.pdf", Raster::Empty)))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let output = collect(orchestrator, paths(&["a.pdf", "b.pdf", "c.pdf"]))
        .await
        .unwrap();

    assert_eq!(output.stats.total_files, 3);
    assert_eq!(output.stats.hosted_files, 1);
    assert_eq!(output.stats.vlm_files, 1);
    assert_eq!(output.stats.failed_files, 1);
    assert!(output.markdown.contains("hosted text"));
    assert!(output.markdown.contains("vlm:b.pdf#1"));
    assert_eq!(
        output.markdown,
        output.fragments.iter().map(|f| f.text.as_str()).collect::<String>()
    );
}

// ── Progress callbacks ──────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConversionProgressCallback for Recorder {
    fn on_run_start(&self, total_files: usize) {
        self.push(format!("run:{total_files}"));
    }

    fn on_file_start(&self, index: usize, _total: usize, name: &str) {
        self.push(format!("start:{index}:{name}"));
    }

    fn on_backend_selected(&self, index: usize, backend: BackendKind) {
        self.push(format!("backend:{index}:{}", backend.label()));
    }

    fn on_file_complete(&self, index: usize, _total: usize, _name: &str, converted: bool) {
        self.push(format!("done:{index}:{converted}"));
    }

    fn on_run_complete(&self, total_files: usize, converted_files: usize) {
        self.push(format!("end:{total_files}:{converted_files}"));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_file() {
    let recorder = Arc::new(Recorder::default());
    let cfg = ConversionConfig::builder()
        .fragment_delay_ms(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let orchestrator = Orchestrator::new(cfg)
        .with_rasterizer(Arc::new(FakeRasterizer::default().with("bad.pdf", Raster::Empty)))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let _ = run(&orchestrator, &["good.png", "bad.pdf"]).await;

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec![
            "run:2",
            "start:0:good.png",
            "backend:0:VLM",
            "done:0:true",
            "start:1:bad.pdf",
            "backend:1:VLM",
            "done:1:false",
            "end:2:1",
        ]
    );
}

#[test]
fn sync_callers_can_drive_a_run() {
    let orchestrator = Orchestrator::new(config(None))
        .with_rasterizer(Arc::new(FakeRasterizer::default()))
        .with_transcriber(Arc::new(FakeTranscriber::default()));

    let fragments = tokio_test::block_on(run(&orchestrator, &["solo.png"]));
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[2].kind, FragmentKind::FileComplete);
}
