//! Splitting grouped equations into rows
//!
//! `align`, `gather`, `flalign` and `multline` bodies hold several rows
//! separated by `\\`. The separator also appears inside braces and nested
//! environments (`cases`, `matrix`, `aligned`, ...), where it must not split,
//! so rows are cut by a depth-tracking scanner.

use super::canonical::{sanitize, strip_wrapper};

/// Raw row slices of an equation body, split on `\\` at brace depth 0 and
/// outside nested environments. Optional `*` and `[<skip>]` after a separator
/// belong to the separator.
pub fn split_rows(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut rows = Vec::new();
    let mut depth = 0usize;
    let mut env_depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let rest = &bytes[i + 1..];
                if rest.first() == Some(&b'\\') {
                    if depth == 0 && env_depth == 0 {
                        rows.push(&body[start..i]);
                        i = skip_separator_args(bytes, i + 2);
                        start = i;
                    } else {
                        i += 2;
                    }
                    continue;
                }
                if rest.starts_with(b"begin{") {
                    env_depth += 1;
                    i += "\\begin".len();
                    continue;
                }
                if rest.starts_with(b"end{") {
                    env_depth = env_depth.saturating_sub(1);
                    i += "\\end".len();
                    continue;
                }
                // Escaped character such as \{ or \&: never a delimiter.
                i += 2;
                continue;
            }
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }

    rows.push(&body[start.min(body.len())..]);
    rows
}

fn skip_separator_args(bytes: &[u8], mut i: usize) -> usize {
    if bytes.get(i) == Some(&b'*') {
        i += 1;
    }
    if bytes.get(i) == Some(&b'[') {
        if let Some(close) = bytes[i..].iter().position(|&b| b == b']') {
            i += close + 1;
        }
    }
    i
}

/// Split a grouped equation into its rows, each sanitized to stand alone.
/// Empty rows (a trailing `\\` before `\end{..}`) are dropped.
pub fn split_multiline(raw: &str) -> Vec<String> {
    split_rows(strip_wrapper(raw))
        .into_iter()
        .map(|row| sanitize(row, true))
        .filter(|row| !row.is_empty())
        .collect()
}
