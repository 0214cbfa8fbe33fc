//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements one step; the orchestrator in
//! [`crate::orchestrator`] wires them together and decides the route.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ hosted ───────────────────────────────┐
//! input ─────┤   (Mistral OCR, whole file)              ├──▶ sanitize
//! (classify) └──▶ rasterize ──▶ encode ──▶ vlm ──▶ postprocess ┘
//!                 (pdfium)     (base64)   (LLM)    (cleanup)
//! ```
//!
//! 1. [`input`]     — classify a path as PDF or image
//! 2. [`hosted`]    — send the whole file to the hosted OCR API
//! 3. [`rasterize`] — render PDF pages to PNG (images pass through)
//! 4. [`encode`]    — base64 payloads for both backends
//! 5. [`vlm`]       — per-page VLM transcription, streamed in page order
//! 6. [`postprocess`] — tidy raw VLM output
//! 7. [`sanitize`]  — escape semantic tags before display

pub mod encode;
pub mod hosted;
pub mod input;
pub mod postprocess;
pub mod rasterize;
pub mod sanitize;
pub mod vlm;
