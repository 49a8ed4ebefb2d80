//! Inline math location
//!
//! Inline math is found with a dedicated scanner rather than the display
//! locator: it looks for runs of adjacent `$...$` pairs bounded on both sides
//! by a non-dollar character, then splits every run into its pairs.

use std::ops::Range;

use super::locate::{MathKind, RawEquation, Span};

/// Locate inline equations in comment-stripped text, in document order.
pub fn locate_inline(text: &str) -> Vec<RawEquation<'_>> {
    find_runs(text.as_bytes())
        .into_iter()
        .flatten()
        .map(|span| RawEquation {
            text: &text[span.clone()],
            span,
            kind: MathKind::Inline,
        })
        .collect()
}

/// Non-split mode: the literal `$...$` text of every inline equation.
pub fn grab_inline_math(text: &str) -> Vec<String> {
    locate_inline(text)
        .into_iter()
        .map(|eq| eq.text.to_string())
        .collect()
}

/// Split mode: literal text between runs, and one math span per pair inside
/// a run. Pairs of one run follow each other with no text span in between.
pub fn split_inline(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut last = 0usize;
    for eq in locate_inline(text) {
        if eq.span.start > last {
            spans.push(Span::Text(&text[last..eq.span.start]));
        }
        last = eq.span.end;
        spans.push(Span::Math(eq));
    }
    if last < text.len() || spans.is_empty() {
        spans.push(Span::Text(&text[last..]));
    }
    spans
}

/// A `$` that is not part of a `\$` escape.
fn is_delim(bytes: &[u8], at: usize) -> bool {
    if bytes[at] != b'$' {
        return false;
    }
    let backslashes = bytes[..at].iter().rev().take_while(|&&b| b == b'\\').count();
    backslashes % 2 == 0
}

/// Runs of adjacent pairs, each run given as the byte ranges of its pairs.
fn find_runs(bytes: &[u8]) -> Vec<Vec<Range<usize>>> {
    let mut runs = Vec::new();
    let mut i = 1usize;
    while i < bytes.len() {
        if is_delim(bytes, i) && !is_delim(bytes, i - 1) {
            if let Some(run) = run_at(bytes, i) {
                i = run.last().map_or(i + 1, |pair| pair.end);
                runs.push(run);
                continue;
            }
        }
        i += 1;
    }
    runs
}

/// Try to read a run starting at the opening delimiter `open`. The run ends
/// at the first closing delimiter followed by a non-dollar character; a run
/// reaching the end of text, or containing an empty pair, is rejected.
fn run_at(bytes: &[u8], mut open: usize) -> Option<Vec<Range<usize>>> {
    let mut pairs = Vec::new();
    loop {
        let close = (open + 1..bytes.len()).find(|&j| is_delim(bytes, j))?;
        if close == open + 1 {
            return None;
        }
        pairs.push(open..close + 1);

        let after = close + 1;
        if after >= bytes.len() {
            return None;
        }
        if !is_delim(bytes, after) {
            return Some(pairs);
        }
        open = after;
    }
}

/// Byte ranges of the pairs of every run, grouped by run.
pub fn inline_runs(text: &str) -> Vec<Vec<Range<usize>>> {
    find_runs(text.as_bytes())
}
