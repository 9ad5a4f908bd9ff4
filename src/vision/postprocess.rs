//! Text cleanup applied to engine output

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::PostprocessingConfig;

static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Apply the enabled cleanup steps
pub fn apply(text: &str, settings: &PostprocessingConfig) -> String {
    let mut out = if settings.normalize_whitespace {
        normalize_whitespace(text)
    } else {
        text.trim().to_string()
    };

    if settings.spell_check {
        out = spell_check(out);
    }

    out
}

/// Collapse runs of spaces/tabs, trim every line, keep at most one blank
/// line between paragraphs and trim the whole text
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<String> = text
        .lines()
        .map(|line| INLINE_WHITESPACE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    EXTRA_BLANK_LINES.replace_all(&joined, "\n\n").trim().to_string()
}

/// Hook for dictionary correction; returns the text unchanged
pub fn spell_check(text: String) -> String {
    debug!("Spell check requested but no dictionary is configured");
    text
}
