//! Identifier substitution
//!
//! Rewrites a document by replacing every located equation with the
//! identifier it was registered under. The same split-mode locator that fed
//! the registry is re-run here, so lookups see exactly the spans that were
//! registered. Text spans pass through untouched; an equation missing from
//! the table is kept in its original (trimmed) form.

use std::path::Path;

use crate::core::comments::strip_comments;
use crate::core::inline::split_inline;
use crate::core::locate::{split_display, RawEquation, Span};
use crate::pipeline::MathMode;
use crate::registry::{EquationRegistry, ExtractedEquation, InlineEquationSet};
use crate::utils::error::TexeqResult;

/// A rewritten document and what happened to its equations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub text: String,
    /// Equations replaced by an identifier
    pub replaced: usize,
    /// Equations left in place because the table had no entry for them
    pub missed: usize,
}

impl Substitution {
    pub fn found_math(&self) -> bool {
        self.replaced + self.missed > 0
    }
}

/// Replace display equations with their registry identifiers.
pub fn substitute_display(document: &str, registry: &EquationRegistry) -> Substitution {
    let stripped = strip_comments(document);
    rewrite(&split_display(&stripped), |eq| {
        registry.lookup(eq.text, eq.kind).map(|id| id.to_string())
    })
}

/// Replace inline equations with their identifiers, keyed on literal text.
pub fn substitute_inline(document: &str, set: &InlineEquationSet) -> Substitution {
    let stripped = strip_comments(document);
    rewrite(&split_inline(&stripped), |eq| {
        set.lookup(eq.text).map(|id| id.to_string())
    })
}

fn rewrite<F>(spans: &[Span<'_>], mut lookup: F) -> Substitution
where
    F: FnMut(&RawEquation<'_>) -> Option<String>,
{
    let mut text = String::new();
    let mut replaced = 0;
    let mut missed = 0;

    for span in spans {
        match span {
            Span::Text(literal) => text.push_str(literal),
            Span::Math(eq) => match lookup(eq) {
                Some(id) => {
                    text.push_str(&id);
                    replaced += 1;
                }
                None => {
                    text.push_str(eq.text.trim());
                    missed += 1;
                }
            },
        }
    }

    Substitution {
        text,
        replaced,
        missed,
    }
}

/// A loaded or freshly built table for one math mode.
#[derive(Debug, Clone)]
pub enum EquationTable {
    Display(EquationRegistry),
    Inline(InlineEquationSet),
}

impl EquationTable {
    pub fn empty(mode: MathMode) -> Self {
        match mode {
            MathMode::Display => EquationTable::Display(EquationRegistry::new()),
            MathMode::Inline => EquationTable::Inline(InlineEquationSet::new()),
        }
    }

    pub fn load(path: &Path, mode: MathMode) -> TexeqResult<Self> {
        Ok(match mode {
            MathMode::Display => EquationTable::Display(EquationRegistry::load(path)?),
            MathMode::Inline => EquationTable::Inline(InlineEquationSet::load(path)?),
        })
    }

    pub fn save(&self, path: &Path) -> TexeqResult<()> {
        match self {
            EquationTable::Display(registry) => registry.save(path),
            EquationTable::Inline(set) => set.save(path),
        }
    }

    pub fn mode(&self) -> MathMode {
        match self {
            EquationTable::Display(_) => MathMode::Display,
            EquationTable::Inline(_) => MathMode::Inline,
        }
    }

    pub fn fold_document(&mut self, equations: &[ExtractedEquation]) {
        match self {
            EquationTable::Display(registry) => registry.fold_document(equations),
            EquationTable::Inline(set) => set.fold_document(equations),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EquationTable::Display(registry) => registry.len(),
            EquationTable::Inline(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn substitute(&self, document: &str) -> Substitution {
        match self {
            EquationTable::Display(registry) => substitute_display(document, registry),
            EquationTable::Inline(set) => substitute_inline(document, set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::locate::{DisplayEnv, MathKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_inline_hello_world() {
        let mut set = InlineEquationSet::new();
        set.register("$x^2$");
        let out = substitute_inline("Hello $x^2$ world.", &set);
        assert_eq!(out.text, "Hello EQI0Q world.");
        assert_eq!(out.replaced, 1);
    }

    #[test]
    fn test_display_substitution_keeps_surrounding_text() {
        let mut registry = EquationRegistry::new();
        registry.register_single("\\begin{equation}a+b\\end{equation}");
        let doc = "Before.\n\\begin{equation}\n  a + b\n\\end{equation}\nAfter, {braces} & 50\\%.";
        let out = substitute_display(doc, &registry);
        assert_eq!(out.text, "Before.\nEQDS0Q\nAfter, {braces} & 50\\%.");
    }

    #[test]
    fn test_missing_equation_is_kept_trimmed() {
        let registry = EquationRegistry::new();
        let out = substitute_display("x $$ y=1 $$ z", &registry);
        assert_eq!(out.text, "x $$ y=1 $$ z");
        assert_eq!(out.missed, 1);
        assert!(out.found_math());
    }

    #[test]
    fn test_no_math_found() {
        let registry = EquationRegistry::new();
        let out = substitute_display("just words\n", &registry);
        assert!(!out.found_math());
        assert_eq!(out.text, "just words\n");
    }

    #[test]
    fn test_grouped_equation_gets_group_id() {
        let mut registry = EquationRegistry::new();
        let align = "\\begin{align}a &= b \\\\ c &= d\\end{align}";
        registry.register(
            align,
            MathKind::Environment {
                env: DisplayEnv::Align,
                starred: false,
            },
        );
        let out = substitute_display(&format!("see {} end", align), &registry);
        assert_eq!(out.text, "see EQDM0Q end");
    }

    #[test]
    fn test_commented_math_is_not_substituted() {
        let mut set = InlineEquationSet::new();
        set.register("$y$");
        let out = substitute_inline("keep $y$ here % and $y$ there\n", &set);
        assert_eq!(out.text, "keep EQI0Q here \n");
        assert_eq!(out.replaced, 1);
    }

    #[test]
    fn test_table_dispatches_on_mode() {
        let mut table = EquationTable::empty(MathMode::Inline);
        table.fold_document(&[ExtractedEquation {
            text: "$q$".to_string(),
            kind: MathKind::Inline,
        }]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.mode(), MathMode::Inline);
        assert_eq!(table.substitute("a $q$ b").text, "a EQI0Q b");
    }
}
