//! LaTeX comment stripping
//!
//! Runs before any math detection so that commented-out equations are never
//! located, registered or substituted.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COMMENT_ENV: Regex =
        Regex::new(r"(?s)\\begin\{comment\}.*?\\end\{comment\}").expect("valid regex literal");
}

/// Strip LaTeX comments from a document.
///
/// - lines starting with `%` are emptied (their newline is kept),
/// - an unescaped `%` and the rest of its line are dropped,
/// - `comment` environments are removed including their delimiters.
///
/// `\%` is a literal percent sign and is left alone.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        if !body.starts_with('%') {
            out.push_str(&body[..comment_start(body).unwrap_or(body.len())]);
        }
        out.push_str(newline);
    }

    if out.contains("\\begin{comment}") {
        COMMENT_ENV.replace_all(&out, "").into_owned()
    } else {
        out
    }
}

/// Byte offset of the first unescaped `%` in a line.
fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut backslashes = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'%' if backslashes % 2 == 0 => return Some(i),
            b'\\' => {
                backslashes += 1;
                continue;
            }
            _ => {}
        }
        backslashes = 0;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_line_comments_are_emptied() {
        let input = "a\n%% note\nb\n";
        assert_eq!(strip_comments(input), "a\n\nb\n");
    }

    #[test]
    fn test_trailing_comment_keeps_prefix() {
        let input = "x = 1 % set x\ny\n";
        assert_eq!(strip_comments(input), "x = 1 \ny\n");
    }

    #[test]
    fn test_escaped_percent_is_kept() {
        let input = "50\\% of cases % trailing\n";
        assert_eq!(strip_comments(input), "50\\% of cases \n");
    }

    #[test]
    fn test_escaped_backslash_before_percent_starts_comment() {
        let input = "line break\\\\% comment\n";
        assert_eq!(strip_comments(input), "line break\\\\\n");
    }

    #[test]
    fn test_comment_environment_removed() {
        let input = "before\n\\begin{comment}\n\\begin{equation}x\\end{equation}\n\\end{comment}\nafter";
        assert_eq!(strip_comments(input), "before\n\nafter");
    }

    #[test]
    fn test_no_comments_unchanged() {
        let input = "plain text with $x$\nand more";
        assert_eq!(strip_comments(input), input);
    }
}
