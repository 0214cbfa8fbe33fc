//! Post-processing: deterministic cleanup of VLM page output.
//!
//! Even with a strict prompt, models occasionally wrap the whole page in a
//! ` ```markdown ` fence, emit Windows line endings or pad the output with
//! runs of blank lines. These passes fix those quirks without touching the
//! content. Tag escaping is not done here; see [`super::sanitize`].
//!
//! Passes run in order: fences are stripped before line endings are
//! normalised so the fence regex sees the raw output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup pass to one page of raw model output.
///
/// 1. Strip an outer markdown fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM)
/// 6. Trim leading/trailing blank lines
pub fn tidy_page(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = s
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s = RE_BLANK_RUN.replace_all(&s, "\n\n\n");
    let s: String = s.chars().filter(|c| !INVISIBLE.contains(c)).collect();
    s.trim_matches('\n').to_string()
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

const INVISIBLE: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}
