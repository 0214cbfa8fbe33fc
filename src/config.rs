//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`] or read once at start-up with
//! [`ConversionConfig::from_env`]. The orchestrator never looks at the
//! process environment itself: everything it needs, including the hosted
//! OCR credential, arrives through this struct.

use crate::error::Doc2MdError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default VLM model identifier (`family/model`).
pub const DEFAULT_MODEL: &str = "hosted_vllm/nanonets/Nanonets-OCR-s";

/// OpenAI-compatible base URL used for `hosted_vllm/` models when none is set.
pub const DEFAULT_VLM_BASE_URL: &str = "http://localhost:8000/v1";

/// Default hosted OCR endpoint.
pub const DEFAULT_HOSTED_OCR_ENDPOINT: &str = "https://api.mistral.ai/v1/ocr";

/// Model identifier sent to the hosted OCR endpoint.
pub const DEFAULT_HOSTED_OCR_MODEL: &str = "mistral-ocr-latest";

/// Configuration for a conversion run.
///
/// # Example
/// ```rust
/// use edgequake_doc2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .model("ollama/llava")
///     .max_image_size(1536)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert!(config.hosted_ocr_api_key.is_none());
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// VLM model identifier, e.g. `hosted_vllm/nanonets/Nanonets-OCR-s`,
    /// `ollama/llava`, `openai/gpt-4.1-mini`.
    ///
    /// The part before the first `/` selects the provider family; see
    /// [`crate::pipeline::vlm::ModelSpec`].
    pub model: String,

    /// Longest edge, in pixels, of a rasterised PDF page. Default: 1024.
    pub max_image_size: u32,

    /// Maximum number of pages transcribed concurrently by the VLM. Default: 1.
    ///
    /// Pages are always emitted in page order whatever this value is.
    pub concurrency: usize,

    /// Maximum tokens the VLM may generate per page. Default: 10000.
    pub max_tokens: usize,

    /// Sampling temperature for the VLM. Default: 0.0.
    pub temperature: f32,

    /// Per-page VLM call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Base URL of a self-hosted VLM server (`hosted_vllm/` or `ollama/`
    /// models). `None` uses [`DEFAULT_VLM_BASE_URL`] for vLLM and the
    /// provider's own default for Ollama.
    pub vlm_base_url: Option<String>,

    /// API key sent to a self-hosted VLM server. `None` sends `EMPTY`.
    pub vlm_api_key: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `model` routing.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Custom transcription prompt. If None, uses [`crate::prompts::DEFAULT_PAGE_PROMPT`].
    pub prompt: Option<String>,

    /// Hosted OCR API key. `None` disables the hosted backend entirely.
    pub hosted_ocr_api_key: Option<String>,

    /// Hosted OCR endpoint URL. Default: [`DEFAULT_HOSTED_OCR_ENDPOINT`].
    pub hosted_ocr_endpoint: String,

    /// Hosted OCR model. Default: [`DEFAULT_HOSTED_OCR_MODEL`].
    pub hosted_ocr_model: String,

    /// Hosted OCR request timeout in seconds. Default: 300.
    pub hosted_ocr_timeout_secs: u64,

    /// Pause after each content fragment, in milliseconds. Default: 10. 0 disables.
    pub fragment_delay_ms: u64,

    /// Explicit libpdfium to bind. `None` uses the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_image_size: 1024,
            concurrency: 1,
            max_tokens: 10_000,
            temperature: 0.0,
            api_timeout_secs: 120,
            vlm_base_url: None,
            vlm_api_key: None,
            provider: None,
            prompt: None,
            hosted_ocr_api_key: None,
            hosted_ocr_endpoint: DEFAULT_HOSTED_OCR_ENDPOINT.to_string(),
            hosted_ocr_model: DEFAULT_HOSTED_OCR_MODEL.to_string(),
            hosted_ocr_timeout_secs: 300,
            fragment_delay_ms: 10,
            pdfium_library_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("max_image_size", &self.max_image_size)
            .field("concurrency", &self.concurrency)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("vlm_base_url", &self.vlm_base_url)
            .field("vlm_api_key", &self.vlm_api_key.as_ref().map(|_| "<redacted>"))
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("hosted_ocr_api_key", &self.hosted_ocr_api_key.as_ref().map(|_| "<redacted>"))
            .field("hosted_ocr_endpoint", &self.hosted_ocr_endpoint)
            .field("hosted_ocr_model", &self.hosted_ocr_model)
            .field("fragment_delay_ms", &self.fragment_delay_ms)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// Reads `MISTRAL_API_KEY`, `MISTRAL_OCR_ENDPOINT`, `DOC2MD_MODEL`,
    /// `VLM_MODEL_URL`, `API_KEY` and `PDFIUM_LIB_PATH`.
    /// Call this once at start-up; the result is then passed explicitly.
    pub fn from_env() -> Result<Self, Doc2MdError> {
        let mut builder = Self::builder();
        if let Ok(key) = std::env::var("MISTRAL_API_KEY") {
            builder = builder.hosted_ocr_api_key(key);
        }
        if let Ok(endpoint) = std::env::var("MISTRAL_OCR_ENDPOINT") {
            if !endpoint.is_empty() {
                builder = builder.hosted_ocr_endpoint(endpoint);
            }
        }
        if let Ok(model) = std::env::var("DOC2MD_MODEL") {
            if !model.is_empty() {
                builder = builder.model(model);
            }
        }
        if let Ok(url) = std::env::var("VLM_MODEL_URL") {
            if !url.is_empty() {
                builder = builder.vlm_base_url(url);
            }
        }
        if let Ok(key) = std::env::var("API_KEY") {
            builder = builder.vlm_api_key(key);
        }
        if let Some(lib) = std::env::var_os("PDFIUM_LIB_PATH") {
            if !lib.is_empty() {
                builder = builder.pdfium_library_path(lib);
            }
        }
        builder.build()
    }

    /// True when a non-empty hosted OCR credential is configured.
    pub fn hosted_ocr_enabled(&self) -> bool {
        self.hosted_ocr_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_image_size(mut self, px: u32) -> Self {
        self.config.max_image_size = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn vlm_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.vlm_base_url = Some(url.into());
        self
    }

    /// Set the self-hosted VLM key. Blank keys fall back to `EMPTY`.
    pub fn vlm_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.vlm_api_key = if key.trim().is_empty() {
            None
        } else {
            Some(key)
        };
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    /// Set the hosted OCR key. Blank keys leave the hosted backend disabled.
    pub fn hosted_ocr_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.hosted_ocr_api_key = if key.trim().is_empty() {
            None
        } else {
            Some(key)
        };
        self
    }

    pub fn hosted_ocr_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.hosted_ocr_endpoint = url.into();
        self
    }

    pub fn hosted_ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.hosted_ocr_model = model.into();
        self
    }

    pub fn hosted_ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.hosted_ocr_timeout_secs = secs;
        self
    }

    pub fn fragment_delay_ms(mut self, ms: u64) -> Self {
        self.config.fragment_delay_ms = ms;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(Doc2MdError::InvalidConfig("Model must not be empty".into()));
        }
        if c.concurrency == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Max tokens must be ≥ 1".into(),
            ));
        }
        if !c.hosted_ocr_endpoint.starts_with("http://")
            && !c.hosted_ocr_endpoint.starts_with("https://")
        {
            return Err(Doc2MdError::InvalidConfig(format!(
                "Hosted OCR endpoint must be an HTTP(S) URL, got '{}'",
                c.hosted_ocr_endpoint
            )));
        }
        if let Some(ref url) = c.vlm_base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Doc2MdError::InvalidConfig(format!(
                    "VLM base URL must be an HTTP(S) URL, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}
