//! Hosted OCR backend: one HTTP call per file to the Mistral OCR API.
//!
//! The whole document is sent inline as a base64 `data:` URI, and the
//! response carries one Markdown string per page. The call is atomic: if the
//! request fails for any reason the file has no hosted output at all, even
//! if the service processed some pages.
//!
//! ## Wire format
//!
//! ```json
//! {
//!   "model": "mistral-ocr-latest",
//!   "document": { "type": "document_url", "document_url": "data:application/pdf;base64,…" },
//!   "include_image_base64": false
//! }
//! ```
//!
//! Images use `"type": "image_url"` with an `image_url` field instead. The
//! field name is dictated by the API, not chosen here.

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::output::PAGE_SEPARATOR;
use crate::pipeline::encode::data_url;
use crate::pipeline::input::{classify, ensure_exists, MediaKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A backend that turns a whole file into Markdown in one call.
///
/// Implementations return every page joined with [`PAGE_SEPARATOR`].
#[async_trait]
pub trait HostedOcr: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, Doc2MdError>;
}

/// Builds the hosted OCR client for a run. Called at most once per run.
pub type HostedOcrConnector =
    Arc<dyn Fn(&ConversionConfig) -> Result<Arc<dyn HostedOcr>, Doc2MdError> + Send + Sync>;

/// The default connector: a [`MistralOcrClient`] built from the config.
pub fn mistral_connector() -> HostedOcrConnector {
    Arc::new(|config: &ConversionConfig| -> Result<Arc<dyn HostedOcr>, Doc2MdError> {
        let client = MistralOcrClient::from_config(config)?;
        Ok(Arc::new(client) as Arc<dyn HostedOcr>)
    })
}

// ── Request / response bodies ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: OcrDocument,
    include_image_base64: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OcrDocument {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

impl OcrDocument {
    fn for_media(kind: &MediaKind, bytes: &[u8]) -> Self {
        let url = data_url(kind.mime_type(), bytes);
        match kind {
            MediaKind::Pdf => OcrDocument::DocumentUrl { document_url: url },
            MediaKind::Image(_) => OcrDocument::ImageUrl { image_url: url },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    markdown: String,
}

impl OcrResponse {
    fn into_markdown(self) -> String {
        self.pages
            .into_iter()
            .map(|p| p.markdown)
            .collect::<Vec<_>>()
            .join(PAGE_SEPARATOR)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// HTTP client for the Mistral OCR endpoint.
pub struct MistralOcrClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl MistralOcrClient {
    /// Build a client from the hosted OCR fields of `config`.
    ///
    /// # Errors
    /// * [`Doc2MdError::CredentialMissing`] — no (or a blank) API key.
    /// * [`Doc2MdError::BackendRequestFailed`] — the HTTP client could not be built.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Doc2MdError> {
        let api_key = config
            .hosted_ocr_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(Doc2MdError::CredentialMissing)?
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.hosted_ocr_timeout_secs))
            .build()
            .map_err(|e| Doc2MdError::BackendRequestFailed {
                message: format!("could not build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_key,
            endpoint: config.hosted_ocr_endpoint.clone(),
            model: config.hosted_ocr_model.clone(),
        })
    }

    async fn read_document(path: &Path) -> Result<OcrDocument, Doc2MdError> {
        ensure_exists(path)?;
        let kind = classify(path)?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Doc2MdError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Doc2MdError::Internal(format!("Failed to read {}: {e}", path.display()))
            }
        })?;
        debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), kind.mime_type());
        Ok(OcrDocument::for_media(&kind, &bytes))
    }
}

#[async_trait]
impl HostedOcr for MistralOcrClient {
    async fn extract(&self, path: &Path) -> Result<String, Doc2MdError> {
        let document = Self::read_document(path).await?;
        let body = OcrRequest {
            model: &self.model,
            document,
            include_image_base64: false,
        };

        info!("Sending {} to hosted OCR ({})", path.display(), self.model);
        let failed = |message: String| Doc2MdError::BackendRequestFailed { message };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {}", detail.trim())));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid response body: {e}")))?;
        info!("Hosted OCR returned {} pages for {}", parsed.pages.len(), path.display());

        Ok(parsed.into_markdown())
    }
}
