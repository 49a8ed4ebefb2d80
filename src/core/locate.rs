//! Display math location
//!
//! Finds display-math constructs in comment-stripped LaTeX and hands them out
//! either as a flat list of raw equations or, in split mode, as an ordered
//! sequence of text and math spans that concatenates back to the input.

use std::fmt;
use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Every opening marker the locator understands. Closers are searched for
    /// separately since each opener has its own matching closer.
    static ref OPENER: Regex = Regex::new(
        r"\\begin\{(equation|multline|gather|align|flalign|math)(\*?)\}|\\\[|\$\$"
    )
    .expect("valid regex literal");
}

/// Display environments recognised as math, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayEnv {
    Equation,
    Multline,
    Gather,
    Align,
    Flalign,
    Math,
}

impl DisplayEnv {
    pub const ALL: [DisplayEnv; 6] = [
        DisplayEnv::Equation,
        DisplayEnv::Multline,
        DisplayEnv::Gather,
        DisplayEnv::Align,
        DisplayEnv::Flalign,
        DisplayEnv::Math,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DisplayEnv::Equation => "equation",
            DisplayEnv::Multline => "multline",
            DisplayEnv::Gather => "gather",
            DisplayEnv::Align => "align",
            DisplayEnv::Flalign => "flalign",
            DisplayEnv::Math => "math",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|env| env.name() == name)
    }

    /// Environments that bundle several rows separated by `\\`.
    pub fn is_grouped(self) -> bool {
        matches!(
            self,
            DisplayEnv::Multline | DisplayEnv::Gather | DisplayEnv::Align | DisplayEnv::Flalign
        )
    }
}

/// Construct that enclosed a located equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathKind {
    /// `\begin{env}...\end{env}`, optionally starred
    Environment { env: DisplayEnv, starred: bool },
    /// `\[...\]`
    Bracket,
    /// `$$...$$`
    DoubleDollar,
    /// `$...$`
    Inline,
}

impl MathKind {
    pub fn is_grouped(self) -> bool {
        match self {
            MathKind::Environment { env, .. } => env.is_grouped(),
            _ => false,
        }
    }

    pub fn is_display(self) -> bool {
        !matches!(self, MathKind::Inline)
    }
}

impl fmt::Display for MathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathKind::Environment { env, starred } => {
                write!(f, "{}{}", env.name(), if *starred { "*" } else { "" })
            }
            MathKind::Bracket => write!(f, "\\[...\\]"),
            MathKind::DoubleDollar => write!(f, "$$...$$"),
            MathKind::Inline => write!(f, "$...$"),
        }
    }
}

/// A contiguous substring of a document classified as math.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEquation<'a> {
    /// The matched text, wrapper included
    pub text: &'a str,
    /// Byte range of `text` within the scanned document
    pub span: Range<usize>,
    pub kind: MathKind,
}

impl RawEquation<'_> {
    pub fn is_grouped(&self) -> bool {
        self.kind.is_grouped()
    }
}

/// One piece of a split document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span<'a> {
    Text(&'a str),
    Math(RawEquation<'a>),
}

impl<'a> Span<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Span::Text(text) => text,
            Span::Math(eq) => eq.text,
        }
    }

    pub fn is_math(&self) -> bool {
        matches!(self, Span::Math(_))
    }
}

/// Concatenate spans back into a document.
pub fn reassemble(spans: &[Span<'_>]) -> String {
    spans.iter().map(Span::as_str).collect()
}

/// Locate display math in comment-stripped text.
///
/// Matches are non-overlapping and run from an opener to its nearest closer.
/// Environment closers ignore the star, so `\begin{align*}` may close with
/// `\end{align}`.
pub fn locate_display(text: &str) -> Vec<RawEquation<'_>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut parity = DollarParity::new();
    let mut pos = 0usize;

    while let Some(caps) = OPENER.captures_at(text, pos) {
        let Some(open) = caps.get(0) else {
            break;
        };
        let start = open.start();

        let located = if let Some(name) = caps.get(1) {
            DisplayEnv::from_name(name.as_str()).and_then(|env| {
                let starred = caps.get(2).is_some_and(|s| !s.as_str().is_empty());
                find_env_close(text, open.end(), env)
                    .map(|end| (end, MathKind::Environment { env, starred }))
            })
        } else if open.as_str() == "\\[" {
            if backslashes_before(bytes, start) % 2 == 0 {
                find_after(text, open.end(), "\\]").map(|end| (end, MathKind::Bracket))
            } else {
                None
            }
        } else if opens_double_dollar(bytes, start, &mut parity) {
            // At least one body character before the closer.
            let body = start + 2 + text[start + 2..].chars().next().map_or(0, char::len_utf8);
            find_after(text, body, "$$").map(|end| (end, MathKind::DoubleDollar))
        } else {
            None
        };

        match located {
            Some((end, kind)) => {
                found.push(RawEquation {
                    text: &text[start..end],
                    span: start..end,
                    kind,
                });
                parity.skip_span(bytes, start, end);
                pos = end;
            }
            None => pos = start + 1,
        }
    }

    found
}

/// Non-split mode: the located equations, each ending in a single newline.
pub fn grab_math(text: &str) -> Vec<String> {
    locate_display(text)
        .into_iter()
        .map(|eq| format!("{}\n", eq.text.trim_end()))
        .collect()
}

/// Split mode: alternating text and math spans, starting and ending with a
/// (possibly empty) text span. A document without math yields one text span.
pub fn split_display(text: &str) -> Vec<Span<'_>> {
    split_with(text, locate_display(text))
}

pub(crate) fn split_with<'a>(text: &'a str, equations: Vec<RawEquation<'a>>) -> Vec<Span<'a>> {
    let mut spans = Vec::with_capacity(equations.len() * 2 + 1);
    let mut last = 0usize;
    for eq in equations {
        spans.push(Span::Text(&text[last..eq.span.start]));
        last = eq.span.end;
        spans.push(Span::Math(eq));
    }
    spans.push(Span::Text(&text[last..]));
    spans
}

/// Number of display equations in a document, comments excluded.
pub fn count_display_math(text: &str) -> usize {
    locate_display(&super::comments::strip_comments(text)).len()
}

fn find_env_close(text: &str, from: usize, env: DisplayEnv) -> Option<usize> {
    let rest = &text[from..];
    [
        format!("\\end{{{}}}", env.name()),
        format!("\\end{{{}*}}", env.name()),
    ]
    .iter()
    .filter_map(|closer| rest.find(closer.as_str()).map(|i| (i, closer.len())))
    .min_by_key(|&(i, _)| i)
    .map(|(i, len)| from + i + len)
}

fn find_after(text: &str, from: usize, closer: &str) -> Option<usize> {
    text.get(from..)?
        .find(closer)
        .map(|i| from + i + closer.len())
}

fn backslashes_before(bytes: &[u8], at: usize) -> usize {
    bytes[..at].iter().rev().take_while(|&&b| b == b'\\').count()
}

fn is_unescaped_dollar(bytes: &[u8], at: usize) -> bool {
    bytes[at] == b'$' && backslashes_before(bytes, at) % 2 == 0
}

/// Running parity of unescaped `$` seen so far. An odd count means the scan
/// is inside an inline pair, so a `$$` there is the seam of `$a$$b$`.
/// Located spans and `\verb` arguments do not count.
struct DollarParity {
    scanned: usize,
    odd: bool,
}

impl DollarParity {
    fn new() -> Self {
        Self {
            scanned: 0,
            odd: false,
        }
    }

    fn inside_inline(&mut self, bytes: &[u8], at: usize) -> bool {
        self.advance(bytes, at);
        // `at` sits inside a verbatim argument
        if self.scanned > at {
            return true;
        }
        self.odd
    }

    /// Count up to `start`, then step over a located span untouched.
    fn skip_span(&mut self, bytes: &[u8], start: usize, end: usize) {
        self.advance(bytes, start);
        self.scanned = self.scanned.max(end);
    }

    fn advance(&mut self, bytes: &[u8], to: usize) {
        let mut i = self.scanned;
        while i < to {
            if let Some(after) = verb_end(bytes, i) {
                i = after;
                continue;
            }
            if is_unescaped_dollar(bytes, i) {
                self.odd = !self.odd;
            }
            i += 1;
        }
        self.scanned = self.scanned.max(i);
    }
}

/// End of a `\verb<d>...<d>` (or `\verb*`) argument starting at `at`.
fn verb_end(bytes: &[u8], at: usize) -> Option<usize> {
    let rest = bytes.get(at..)?;
    if !rest.starts_with(b"\\verb") || backslashes_before(bytes, at) % 2 == 1 {
        return None;
    }
    let mut open = at + 5;
    if bytes.get(open) == Some(&b'*') {
        open += 1;
    }
    let delim = *bytes.get(open)?;
    if delim.is_ascii_alphabetic() || delim.is_ascii_whitespace() {
        return None;
    }
    let close = bytes[open + 1..].iter().position(|&b| b == delim)?;
    Some(open + 1 + close + 1)
}

/// `$$` at `at` opens display math only outside inline math, when its first
/// dollar is unescaped and a body character follows.
fn opens_double_dollar(bytes: &[u8], at: usize, parity: &mut DollarParity) -> bool {
    if !is_unescaped_dollar(bytes, at) || parity.inside_inline(bytes, at) {
        return false;
    }
    match bytes.get(at + 2) {
        Some(b'$') | Some(b'^') | None => false,
        Some(_) => true,
    }
}
