//! Input classification: decide what kind of document a path refers to.
//!
//! Both backends care about the media type. The hosted OCR API needs the
//! MIME type inside the data URI and picks a different request field for
//! PDFs and images; the rasteriser renders PDFs but passes images through.
//! Detection is extension-based, mirroring what upload widgets hand us.

use crate::error::Doc2MdError;
use std::path::Path;
use tracing::debug;

/// Media category of an input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// `application/pdf`
    Pdf,
    /// Any `image/*` type; carries the full MIME string.
    Image(String),
}

impl MediaKind {
    /// The MIME string for this media kind.
    pub fn mime_type(&self) -> &str {
        match self {
            MediaKind::Pdf => "application/pdf",
            MediaKind::Image(mime) => mime,
        }
    }
}

/// Extensions accepted when `mime_guess` has no opinion.
const FALLBACK_IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "avif", "webp"];

/// Guess the MIME type of `path` from its extension.
///
/// Returns `None` when neither `mime_guess` nor the built-in fallback table
/// recognises the extension.
pub fn guess_mime(path: &Path) -> Option<String> {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return Some(mime.essence_str().to_string());
    }
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if ext == "pdf" {
        Some("application/pdf".to_string())
    } else if FALLBACK_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(format!("image/{ext}"))
    } else {
        None
    }
}

/// Classify `path` as PDF or image.
///
/// # Errors
/// [`Doc2MdError::UnsupportedMediaType`] when the type cannot be determined
/// or is neither PDF nor image.
pub fn classify(path: &Path) -> Result<MediaKind, Doc2MdError> {
    let mime = guess_mime(path).ok_or_else(|| Doc2MdError::UnsupportedMediaType {
        path: path.to_path_buf(),
        detail: "could not determine MIME type".to_string(),
    })?;

    let kind = if mime == "application/pdf" {
        MediaKind::Pdf
    } else if mime.starts_with("image/") {
        MediaKind::Image(mime)
    } else {
        return Err(Doc2MdError::UnsupportedMediaType {
            path: path.to_path_buf(),
            detail: format!("unsupported MIME type {mime}"),
        });
    };
    debug!("Classified {} as {}", path.display(), kind.mime_type());
    Ok(kind)
}

/// Verify that `path` exists and is a regular file.
pub fn ensure_exists(path: &Path) -> Result<(), Doc2MdError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Doc2MdError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// The display name used in fragment text: the file name without directories.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
