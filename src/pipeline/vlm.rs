//! VLM backend: transcribe rasterised pages and stream them in page order.
//!
//! Two layers live here:
//!
//! * [`PageTranscriber`] turns one page image into raw Markdown. The
//!   default [`LlmTranscriber`] sends the image to an `edgequake-llm`
//!   provider chosen from the model identifier.
//! * [`VlmDriver`] fans a file's pages out to the transcriber with a
//!   bounded number in flight, and yields one [`PageChunk`] per page in page
//!   order. Ordered buffering means concurrency never shows up as
//!   reordering.
//!
//! The driver stops at the first failure: the failing page is yielded as a
//! final `Err` item and nothing follows it.

use crate::config::{ConversionConfig, DEFAULT_VLM_BASE_URL};
use crate::error::Doc2MdError;
use crate::output::PAGE_SEPARATOR;
use crate::pipeline::encode::encode_page_file;
use crate::pipeline::postprocess::tidy_page;
use crate::pipeline::rasterize::PageImage;
use crate::prompts::DEFAULT_PAGE_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, LLMProvider, OllamaProvider, OpenAIProvider, ProviderFactory,
};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Turns one page image into raw Markdown.
#[async_trait]
pub trait PageTranscriber: Send + Sync {
    async fn transcribe(&self, page: &PageImage) -> Result<String, Doc2MdError>;
}

// ── Model routing ────────────────────────────────────────────────────────

/// Family prefix for self-hosted OpenAI-compatible servers such as vLLM.
const HOSTED_VLLM: &str = "hosted_vllm";

/// Key sent to self-hosted servers when none is configured.
const EMPTY_API_KEY: &str = "EMPTY";

/// Provider families `edgequake-llm` can build by name.
const KNOWN_PROVIDERS: [&str; 8] = [
    "openai",
    "anthropic",
    "gemini",
    "ollama",
    "lmstudio",
    "openrouter",
    "mistral",
    "azure",
];

/// A model identifier split into provider family and provider-side model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// `None` means "auto-detect the provider from the environment".
    pub provider: Option<String>,
    pub model: String,
}

impl ModelSpec {
    /// Parse `family/model` identifiers.
    ///
    /// `hosted_vllm/…` names a self-hosted OpenAI-compatible server. An
    /// unknown prefix is treated as part of the model name, e.g.
    /// `nanonets/Nanonets-OCR-s`.
    pub fn parse(id: &str) -> Self {
        let id = id.trim();
        match id.split_once('/') {
            Some((family, model)) if family == HOSTED_VLLM || KNOWN_PROVIDERS.contains(&family) => Self {
                provider: Some(family.to_string()),
                model: model.to_string(),
            },
            _ => Self {
                provider: None,
                model: id.to_string(),
            },
        }
    }
}

// ── LLM transcriber ──────────────────────────────────────────────────────

/// The default [`PageTranscriber`], backed by `edgequake-llm`.
///
/// The provider is resolved on first use, so a missing API key surfaces as
/// a VLM failure for the file being converted instead of failing the run.
pub struct LlmTranscriber {
    spec: ModelSpec,
    preset: Option<Arc<dyn LLMProvider>>,
    provider: OnceCell<Arc<dyn LLMProvider>>,
    /// Endpoint for `hosted_vllm/` and `ollama/` models.
    base_url: Option<String>,
    api_key: Option<String>,
    prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl LlmTranscriber {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            spec: ModelSpec::parse(&config.model),
            preset: config.provider.clone(),
            provider: OnceCell::new(),
            base_url: config.vlm_base_url.clone(),
            api_key: config.vlm_api_key.clone(),
            prompt: config
                .prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_PAGE_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    async fn provider(&self) -> Result<Arc<dyn LLMProvider>, Doc2MdError> {
        self.provider
            .get_or_try_init(|| async { self.resolve_provider() })
            .await
            .map(Arc::clone)
    }

    /// Resolve the provider, from most-specific to least-specific:
    /// a pre-built provider, then the model's family prefix, then
    /// `ProviderFactory::from_env` auto-detection.
    ///
    /// Self-hosted families (`hosted_vllm/`, `ollama/`) are built against
    /// the configured endpoint and never need a cloud API key.
    fn resolve_provider(&self) -> Result<Arc<dyn LLMProvider>, Doc2MdError> {
        if let Some(ref provider) = self.preset {
            return Ok(Arc::clone(provider));
        }

        if let (Some("ollama"), Some(host)) = (self.spec.provider.as_deref(), self.base_url.as_deref()) {
            let provider = OllamaProvider::builder()
                .host(host)
                .model(self.spec.model.as_str())
                .build()
                .map_err(|e| Doc2MdError::ProviderNotConfigured {
                    provider: "ollama".to_string(),
                    hint: format!("{e}"),
                })?;
            return Ok(Arc::new(provider));
        }

        match self.spec.provider.as_deref() {
            Some(HOSTED_VLLM) => {
                let base_url = self.base_url.as_deref().unwrap_or(DEFAULT_VLM_BASE_URL);
                let api_key = self.api_key.as_deref().unwrap_or(EMPTY_API_KEY);
                debug!("Using OpenAI-compatible endpoint {} for {}", base_url, self.spec.model);
                let provider =
                    OpenAIProvider::compatible(api_key, base_url).with_model(self.spec.model.as_str());
                return Ok(Arc::new(provider));
            }
            Some(name) => {
                return ProviderFactory::create_llm_provider(name, &self.spec.model).map_err(|e| {
                    Doc2MdError::ProviderNotConfigured {
                        provider: name.to_string(),
                        hint: format!("{e}"),
                    }
                });
            }
            None => {}
        }

        let (llm_provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| Doc2MdError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No VLM provider could be auto-detected for model '{}'.\n\
                    Use a family prefix (hosted_vllm/, ollama/, openai/, …) or set a provider API key.\n\
                    Error: {}",
                    self.spec.model, e
                ),
            })?;
        Ok(llm_provider)
    }
}

#[async_trait]
impl PageTranscriber for LlmTranscriber {
    async fn transcribe(&self, page: &PageImage) -> Result<String, Doc2MdError> {
        let start = Instant::now();
        let provider = self.provider().await?;
        let image = encode_page_file(&page.path).await?;

        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![image],
        )];

        let response = tokio::time::timeout(self.timeout, provider.chat(&messages, Some(&self.options)))
            .await
            .map_err(|_| Doc2MdError::StreamFailure {
                page: page.page_num,
                detail: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| Doc2MdError::StreamFailure {
                page: page.page_num,
                detail: format!("{}", e),
            })?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page.page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

/// One converted page, ready for sanitising.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// 1-indexed page number.
    pub page: usize,
    pub total: usize,
    /// Page Markdown, with the progress header when `total > 1`.
    pub markdown: String,
}

/// Streams a file's pages through a [`PageTranscriber`] in page order.
#[derive(Clone)]
pub struct VlmDriver {
    transcriber: Arc<dyn PageTranscriber>,
    concurrency: usize,
}

impl VlmDriver {
    pub fn new(transcriber: Arc<dyn PageTranscriber>, concurrency: usize) -> Self {
        Self {
            transcriber,
            concurrency: concurrency.max(1),
        }
    }

    /// Lazily convert `pages`, yielding one chunk per page in page order.
    ///
    /// The stream ends right after the first `Err` item.
    pub fn stream(&self, pages: &[PageImage]) -> BoxStream<'static, Result<PageChunk, Doc2MdError>> {
        let total = pages.len();
        let transcriber = Arc::clone(&self.transcriber);

        stream::iter(pages.to_vec().into_iter().enumerate())
            .map(move |(idx, image)| {
                let transcriber = Arc::clone(&transcriber);
                async move {
                    let page = idx + 1;
                    match transcriber.transcribe(&image).await {
                        Ok(raw) => Ok(PageChunk {
                            page,
                            total,
                            markdown: render_page(&tidy_page(&raw), page, total),
                        }),
                        Err(e) => {
                            warn!("Page {}/{} failed: {}", page, total, e);
                            Err(as_stream_failure(e, page))
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
            .boxed()
    }
}

/// Keep VLM-stage errors as they are; anything else becomes a stream failure.
fn as_stream_failure(err: Doc2MdError, page: usize) -> Doc2MdError {
    match err {
        Doc2MdError::StreamFailure { .. } | Doc2MdError::ProviderNotConfigured { .. } => err,
        other => Doc2MdError::StreamFailure {
            page,
            detail: other.to_string(),
        },
    }
}

/// Add the progress header and page separator for multi-page files.
fn render_page(markdown: &str, page: usize, total: usize) -> String {
    if total > 1 {
        format!(
            "📄 **VLM Conversion Progress** (Processing page {page} of {total})\n\n{markdown}{PAGE_SEPARATOR}"
        )
    } else {
        format!("{markdown}\n\n")
    }
}
