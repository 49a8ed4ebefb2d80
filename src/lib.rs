//! # texeq
//!
//! Equation extraction, deduplication and identifier substitution for LaTeX
//! corpora.
//!
//! A corpus is processed in two passes. The first locates every equation
//! (after comment stripping), canonicalizes it and folds it into a
//! corpus-wide table that assigns each distinct equation a stable identifier
//! such as `EQDS12Q`. The second rewrites the documents, replacing each
//! equation with its identifier and leaving all other text untouched.
//!
//! ## Example
//!
//! ```rust
//! use texeq::{substitute_inline, InlineEquationSet};
//!
//! let mut set = InlineEquationSet::new();
//! set.register("$x^2$");
//! let out = substitute_inline("Hello $x^2$ world.", &set);
//! assert_eq!(out.text, "Hello EQI0Q world.");
//! ```

pub mod core;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod substitute;
pub mod utils;

pub use crate::core::{
    flatten, sanitize, split_display, split_inline, standardize, strip_comments, CanonicalForms,
    DisplayEnv, MathKind, RawEquation, Span,
};
pub use pipeline::{
    collect_documents, enumerate, extract_document, render_corpus, substitute_corpus, Layout,
    MathMode, NoMathPolicy, OutputTarget, PipelineConfig, RunLog,
};
pub use registry::{EquationId, EquationRegistry, ExtractedEquation, InlineEquationSet, Namespace};
pub use render::{build_render_request, render_document, RenderConfig, StageCommand};
pub use substitute::{substitute_display, substitute_inline, EquationTable, Substitution};
pub use utils::error::{FileFailure, RenderFailure, RenderStage, TexeqError, TexeqResult};

/// Build a display-math registry from in-memory documents, in the given order.
pub fn build_registry<'a, I>(documents: I) -> EquationRegistry
where
    I: IntoIterator<Item = &'a str>,
{
    let mut registry = EquationRegistry::new();
    for text in documents {
        registry.fold_document(&extract_document(text, MathMode::Display));
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_dedups_across_documents() {
        let registry = build_registry([
            "one \\begin{equation}a+b\\end{equation}",
            "two \\begin{equation}a+b\\end{equation} and \\[c\\]",
        ]);
        assert_eq!(registry.single_count(), 2);
        let out = substitute_display("x \\begin{equation} a + b \\end{equation}", &registry);
        assert_eq!(out.text, "x EQDS0Q");
    }
}
