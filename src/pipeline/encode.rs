//! Encoding: file bytes → base64 payloads for the backends.
//!
//! The hosted OCR API takes the whole document as a `data:` URI; the VLM
//! takes each page image as base64 `ImageData`. Both read the file here so
//! the handle is closed before the network call starts.

use crate::error::Doc2MdError;
use crate::pipeline::input::guess_mime;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
}

/// Read a page image from disk and wrap it for the VLM request.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; fine
/// print is lost at the low-detail setting.
pub async fn encode_page_file(path: &Path) -> Result<ImageData, Doc2MdError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Doc2MdError::Internal(format!("Failed to read page image {}: {e}", path.display())))?;
    let mime = guess_mime(path).unwrap_or_else(|| "image/png".to_string());
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());

    Ok(ImageData::new(b64, &mime).with_detail("high"))
}
