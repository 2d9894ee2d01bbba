//! Citation Marker Stripping
//!
//! Assistant runs that use file search annotate their text with citation
//! markers. Two shapes are removed before text reaches a client:
//!
//! - numeric: `[4:0†resume.pdf]`, `[12†source]` (digits, optional `:digits`
//!   groups, a dagger, a label)
//! - footnote: `【4:0†source】` (anything between Unicode corner brackets)
//!
//! Ordinary bracketed text such as `[1]` or `arr[0]` is left alone.
//!
//! Because markers can straddle delta boundaries, [`CitationFilter`] holds
//! back a trailing fragment that could still turn into a marker and releases
//! it once the next delta settles the question.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static NUMERIC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+(?::\d+)*†[^\]\n]*\]").expect("valid citation regex"));

static FOOTNOTE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【[^】]*】").expect("valid footnote regex"));

static PARTIAL_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?:\d+(?::\d*)*(?:†[^\]\n]*)?)?$").expect("valid partial citation regex")
});

static PARTIAL_FOOTNOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^【[^】]*$").expect("valid partial footnote regex"));

/// Longest fragment held back while waiting for a marker to close
const MAX_HELD_CHARS: usize = 256;

/// Remove every complete citation marker from `text`
#[must_use]
pub fn strip_citations(text: &str) -> Cow<'_, str> {
    match NUMERIC_MARKER.replace_all(text, "") {
        Cow::Borrowed(unchanged) => FOOTNOTE_MARKER.replace_all(unchanged, ""),
        Cow::Owned(stripped) => match FOOTNOTE_MARKER.replace_all(&stripped, "") {
            Cow::Borrowed(_) => Cow::Owned(stripped),
            Cow::Owned(both) => Cow::Owned(both),
        },
    }
}

/// Byte offset where a possibly-unfinished marker begins, or `text.len()`
///
/// Only the last `MAX_HELD_CHARS` characters can start a held fragment.
fn holdback_start(text: &str) -> usize {
    let window = text
        .char_indices()
        .rev()
        .nth(MAX_HELD_CHARS - 1)
        .map_or(0, |(idx, _)| idx);
    for (offset, ch) in text[window..].char_indices() {
        if ch != '[' && ch != '【' {
            continue;
        }
        let idx = window + offset;
        let tail = &text[idx..];
        if PARTIAL_NUMERIC.is_match(tail) || PARTIAL_FOOTNOTE.is_match(tail) {
            return idx;
        }
    }
    text.len()
}

/// Streaming citation stripper for a sequence of deltas
#[derive(Debug, Default)]
pub struct CitationFilter {
    held: String,
}

impl CitationFilter {
    /// Create an empty filter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta, returning the text that is safe to emit now
    ///
    /// The result may be empty when the whole delta is part of a pending marker.
    pub fn push(&mut self, delta: &str) -> String {
        self.held.push_str(delta);
        let stripped = strip_citations(&self.held).into_owned();
        let split = holdback_start(&stripped);
        self.held = stripped[split..].to_string();
        let mut ready = stripped;
        ready.truncate(split);
        ready
    }

    /// Flush whatever is still held at end of stream (it never became a marker)
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.held)
    }

    /// Whether a fragment is currently held back
    #[must_use]
    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }
}
