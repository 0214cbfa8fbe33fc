//! Prompts for VLM page transcription.
//!
//! The default prompt targets OCR-tuned models (Nanonets-OCR-s and similar)
//! that answer with semantic tags for figures, watermarks, page numbers and
//! signatures. Those tags are escaped before display by
//! [`crate::pipeline::sanitize`].
//!
//! Callers can override it via [`crate::config::ConversionConfig::prompt`].

/// Default instruction sent alongside each page image.
pub const DEFAULT_PAGE_PROMPT: &str = "Extract the text from the above document as if you were reading it naturally. \
Return the tables in html format. \
Return the equations in LaTeX representation. \
If there is an image in the document and image caption is not present, add a small description of the image inside the <img></img> tag; otherwise, add the image caption inside <img></img>. \
Watermarks should be wrapped in brackets. Ex: <watermark>OFFICIAL COPY</watermark>. \
Page numbers should be wrapped in brackets. Ex: <page_number>14</page_number> or <page_number>9/22</page_number>. \
Signatures should be wrapped in brackets. Ex: <signature>signature</signature>. \
Prefer using ☐ and ☑ for check boxes.";
