//! Equation canonicalization
//!
//! Three forms are derived from one located equation:
//! - `standardized`: re-wrapped in a plain `equation` environment, numbering
//!   markup dropped. This is the text stored for single equations.
//! - `sanitized`: the wrapper tags peeled off, content otherwise untouched.
//! - `flattened`: the deduplication key. Wrapper, numbering markup and all
//!   whitespace removed.

use lazy_static::lazy_static;
use regex::Regex;

use super::locate::DisplayEnv;

lazy_static! {
    static ref ENV_OPEN: Regex =
        Regex::new(r"^\\begin\{(equation|multline|gather|align|flalign|math)(\*?)\}")
            .expect("valid regex literal");
    static ref NUMBERING: Regex =
        Regex::new(r"\\label\{[^{}]*\}|\\tag\*?\{[^{}]*\}|\\nonumber|\\notag")
            .expect("valid regex literal");
}

const STD_BEGIN: &str = "\\begin{equation}";
const STD_END: &str = "\\end{equation}";

/// The three derived forms of one equation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForms {
    pub standardized: String,
    pub sanitized: String,
    pub flattened: String,
}

impl CanonicalForms {
    pub fn of(raw: &str) -> Self {
        Self {
            standardized: standardize(raw),
            sanitized: sanitize(raw, false),
            flattened: flatten(raw),
        }
    }
}

/// Peel one wrapper pair (`\begin{env}..\end{env}`, `\[..\]`, `$$..$$`) off
/// the trimmed text. Text without a recognised wrapper is returned trimmed.
pub fn strip_wrapper(text: &str) -> &str {
    let text = text.trim();

    if let Some(caps) = ENV_OPEN.captures(text) {
        let opener_len = caps.get(0).map_or(0, |m| m.end());
        if let Some(env) = caps.get(1).and_then(|m| DisplayEnv::from_name(m.as_str())) {
            let rest = &text[opener_len..];
            for closer in [
                format!("\\end{{{}}}", env.name()),
                format!("\\end{{{}*}}", env.name()),
            ] {
                if let Some(inner) = rest.strip_suffix(closer.as_str()) {
                    return inner;
                }
            }
        }
        return text;
    }

    for (open, close) in [("\\[", "\\]"), ("$$", "$$")] {
        if text.len() >= open.len() + close.len() {
            if let Some(inner) = text
                .strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
            {
                return inner;
            }
        }
    }

    text
}

/// Remove `\label{..}`, `\tag{..}`, `\tag*{..}`, `\nonumber` and `\notag`.
pub fn strip_numbering(text: &str) -> String {
    NUMBERING.replace_all(text, "").into_owned()
}

/// Remove every whitespace character.
pub fn remove_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Bare math content of an equation.
///
/// With `complete`, the content is also made fit to stand on its own outside
/// its group: numbering markup, alignment markers (`&`) and a trailing row
/// separator are removed and the result trimmed.
pub fn sanitize(raw: &str, complete: bool) -> String {
    let inner = strip_wrapper(raw);
    if !complete {
        return inner.to_string();
    }

    let numbered = strip_numbering(inner);
    let mut out = String::with_capacity(numbered.len());
    let mut backslashes = 0usize;
    for ch in numbered.chars() {
        if ch == '&' && backslashes % 2 == 0 {
            backslashes = 0;
            continue;
        }
        backslashes = if ch == '\\' { backslashes + 1 } else { 0 };
        out.push(ch);
    }

    let mut trimmed = out.trim();
    while let Some(rest) = trimmed.strip_suffix("\\\\") {
        trimmed = rest.trim_end();
    }
    trimmed.to_string()
}

/// Re-wrap an equation in a plain `equation` environment, dropping the
/// original environment and its numbering markup.
pub fn standardize(raw: &str) -> String {
    wrap_standard(&strip_numbering(strip_wrapper(raw)))
}

/// Wrap already-sanitized content in the standard environment.
pub fn wrap_standard(body: &str) -> String {
    format!("{}\n{}\n{}", STD_BEGIN, body.trim(), STD_END)
}

/// Deduplication key: equal for equations that differ only in whitespace,
/// wrapper environment or numbering markup.
///
/// Computed to a fixpoint, so flattening a flattened key is a no-op.
pub fn flatten(raw: &str) -> String {
    let mut current = flatten_step(raw);
    loop {
        let next = flatten_step(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn flatten_step(text: &str) -> String {
    let compact = remove_whitespace(text);
    strip_numbering(strip_wrapper(&compact))
}
