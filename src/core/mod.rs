//! Equation scanning and canonicalization
//!
//! - `comments`: comment stripping, always run first
//! - `locate`: display math, split mode and reassembly
//! - `inline`: `$...$` runs
//! - `canonical`: standardized / sanitized / flattened forms
//! - `multiline`: row splitting for grouped environments

pub mod canonical;
pub mod comments;
pub mod inline;
pub mod locate;
pub mod multiline;

pub use canonical::{flatten, sanitize, standardize, CanonicalForms};
pub use comments::strip_comments;
pub use inline::{grab_inline_math, locate_inline, split_inline};
pub use locate::{
    count_display_math, grab_math, locate_display, reassemble, split_display, DisplayEnv,
    MathKind, RawEquation, Span,
};
pub use multiline::split_multiline;
