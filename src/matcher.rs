//! Mark comment grammar.
//!
//! A line carries a mark when it contains `CodeMarks` (any case), optionally
//! followed by a `[tag]` of ASCII letters, digits or `_`, then `:` and the label up to the
//! end of the line:
//!
//! ```text
//! // CodeMarks: Entry point
//! # codemarks[perf]: hot loop
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static MARK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Whitespace after the colon must not cross into the next line.
    Regex::new(r"(?i:CodeMarks)(?:\[([A-Za-z0-9_]+)\])?:[^\S\r\n]*(.*)").expect("mark pattern is valid")
});

/// One mark occurrence within a text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkMatch {
    /// Zero-based line of the occurrence.
    pub line: usize,
    pub tag: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher;

impl PatternMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Every mark in `text`, in text order.
    pub fn extract(&self, text: &str) -> Vec<MarkMatch> {
        let mut marks = Vec::new();
        let mut line = 0usize;
        let mut counted_to = 0usize;

        for captures in MARK_PATTERN.captures_iter(text) {
            let Some(whole) = captures.get(0) else { continue };
            line += count_newlines(&text[counted_to..whole.start()]);
            counted_to = whole.start();

            marks.push(MarkMatch {
                line,
                tag: captures.get(1).map(|m| m.as_str().to_string()),
                label: captures
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        }

        marks
    }

    /// The mark on a single line, if any. Used to re-validate tracked markers.
    pub fn match_line(&self, line_text: &str) -> Option<MarkMatch> {
        let first_line = line_text.lines().next().unwrap_or("");
        self.extract(first_line).into_iter().next()
    }
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}
