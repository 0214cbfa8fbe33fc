//! Escape the semantic tags OCR models emit so they render as text.
//!
//! OCR-tuned models wrap figure descriptions, watermarks, page numbers and
//! signatures in pseudo-HTML tags (`<img>…</img>`, `<watermark>…</watermark>`,
//! …). A Markdown renderer would swallow these as unknown HTML elements and
//! hide their content, so each tag is rewritten to its entity form.
//!
//! Escaped forms never contain a raw tag, which makes [`sanitize`]
//! idempotent.

/// The paired tags that are escaped, in replacement order.
pub const ESCAPED_TAGS: [(&str, &str); 8] = [
    ("<img>", "&lt;img&gt;"),
    ("</img>", "&lt;/img&gt;"),
    ("<watermark>", "&lt;watermark&gt;"),
    ("</watermark>", "&lt;/watermark&gt;"),
    ("<page_number>", "&lt;page_number&gt;"),
    ("</page_number>", "&lt;/page_number&gt;"),
    ("<signature>", "&lt;signature&gt;"),
    ("</signature>", "&lt;/signature&gt;"),
];

/// Replace every raw tag in [`ESCAPED_TAGS`] with its entity form.
pub fn sanitize(text: &str) -> String {
    if !text.contains('<') {
        return text.to_string();
    }
    ESCAPED_TAGS
        .iter()
        .fold(text.to_string(), |acc, (raw, escaped)| acc.replace(raw, escaped))
}
