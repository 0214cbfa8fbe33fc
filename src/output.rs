//! Output types: the fragment stream's unit and the eager-API result.
//!
//! A conversion run produces an ordered, append-only sequence of
//! [`MarkdownFragment`]s. Concatenating their `text` in order yields the
//! Markdown document a consumer renders; the structured fields (`kind`,
//! `file_index`, `backend`, `page`, `failure`) let programmatic consumers
//! react without parsing the text.

use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Separator between pages, both in hosted OCR output and in the rendered
/// document.
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Separator written after each file's completion marker.
pub const FILE_SEPARATOR: &str = "\n\n*****\n\n";

/// Status tag of a fragment.
///
/// The six-way distinction is the contract consumers render against; the
/// emoji in the text are presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentKind {
    /// A backend is about to be tried for a file (`⏳`).
    Attempt,
    /// One page of a multi-page result, carrying a `k of n` header (`📄`).
    PageProgress,
    /// The full content of a single-page result.
    Success,
    /// A recoverable problem; processing continues (`⚠️`).
    Warning,
    /// A terminal problem for the current file (`❌`).
    Error,
    /// The file is done (`✅`). Exactly one per input file.
    FileComplete,
}

/// Which backend a fragment concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// The hosted OCR API.
    HostedOcr,
    /// The vision-language-model path (rasterise, then transcribe).
    Vlm,
}

impl BackendKind {
    /// Human-readable backend name used in fragment text.
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::HostedOcr => "Mistral OCR",
            BackendKind::Vlm => "VLM",
        }
    }
}

/// Position of a page within its file (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageProgress {
    pub page: usize,
    pub total: usize,
}

/// A unit of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownFragment {
    pub kind: FragmentKind,
    /// Markdown text to append to the document.
    pub text: String,
    /// 0-based index of the file this fragment belongs to; `None` for
    /// run-level fragments.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub page: Option<PageProgress>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure: Option<FailureKind>,
}

impl MarkdownFragment {
    pub fn new(kind: FragmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            file_index: None,
            backend: None,
            page: None,
            failure: None,
        }
    }

    /// A run-level warning.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(FragmentKind::Warning, text)
    }

    pub fn for_file(mut self, index: usize) -> Self {
        self.file_index = Some(index);
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_page(mut self, page: usize, total: usize) -> Self {
        self.page = Some(PageProgress { page, total });
        self
    }

    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = Some(failure);
        self
    }

    /// True for fragments that carry converted document content.
    pub fn is_content(&self) -> bool {
        matches!(self.kind, FragmentKind::PageProgress | FragmentKind::Success)
    }
}

/// Summary statistics for a run, derived from its fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Number of files that reached `file-complete`.
    pub total_files: usize,
    /// Files whose content came from the hosted OCR backend.
    pub hosted_files: usize,
    /// Files whose content came from the VLM backend.
    pub vlm_files: usize,
    /// Files for which an error fragment was emitted in place of (or after
    /// part of) the content.
    pub failed_files: usize,
    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// Derive the statistics from a complete fragment sequence.
    pub fn from_fragments(fragments: &[MarkdownFragment], total_duration_ms: u64) -> Self {
        let mut hosted = BTreeSet::new();
        let mut vlm = BTreeSet::new();
        let mut failed = BTreeSet::new();

        for f in fragments {
            let Some(idx) = f.file_index else { continue };
            if f.is_content() {
                match f.backend {
                    Some(BackendKind::HostedOcr) => {
                        hosted.insert(idx);
                    }
                    Some(BackendKind::Vlm) => {
                        vlm.insert(idx);
                    }
                    None => {}
                }
            }
            if f.kind == FragmentKind::Error {
                failed.insert(idx);
            }
        }

        Self {
            total_files: fragments
                .iter()
                .filter(|f| f.kind == FragmentKind::FileComplete)
                .count(),
            hosted_files: hosted.len(),
            vlm_files: vlm.len(),
            failed_files: failed.len(),
            total_duration_ms,
        }
    }
}

/// The result of an eager conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The accumulated Markdown document.
    pub markdown: String,
    /// Every fragment, in emission order.
    pub fragments: Vec<MarkdownFragment>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    pub fn from_fragments(fragments: Vec<MarkdownFragment>, total_duration_ms: u64) -> Self {
        let markdown = assemble(&fragments);
        let stats = ConversionStats::from_fragments(&fragments, total_duration_ms);
        Self {
            markdown,
            fragments,
            stats,
        }
    }
}

/// Concatenate fragment texts into the rendered document.
pub fn assemble(fragments: &[MarkdownFragment]) -> String {
    let len = fragments.iter().map(|f| f.text.len()).sum();
    let mut doc = String::with_capacity(len);
    for f in fragments {
        doc.push_str(&f.text);
    }
    doc
}
