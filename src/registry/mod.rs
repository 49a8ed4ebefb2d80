//! Corpus-wide equation registries
//!
//! `EquationRegistry` maps the flattened key of every display equation to a
//! stable identifier; grouped equations also list the identifiers of their
//! rows. `InlineEquationSet` does the same for inline math, keyed by literal
//! text with escaped dollars removed. Identifiers are handed out in
//! first-encounter order by a single caller; workers never allocate them.

mod escape;
mod table;

use std::fmt;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use serde::Serialize;

use crate::core::canonical::{flatten, standardize, wrap_standard};
use crate::core::locate::{MathKind, RawEquation};
use crate::core::multiline::split_multiline;
use crate::utils::error::TexeqError;

pub use escape::{escape_field, unescape_field};

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Disjoint identifier ranges, told apart by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    /// Single display equations, including rows of grouped ones
    Single,
    /// Grouped (multi-row) display equations
    Grouped,
    /// Inline `$...$` equations
    Inline,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Single => "EQDS",
            Namespace::Grouped => "EQDM",
            Namespace::Inline => "EQI",
        }
    }
}

/// Identifier of a registered equation, rendered as `<prefix><index>Q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EquationId {
    pub namespace: Namespace,
    pub index: usize,
}

impl EquationId {
    pub fn new(namespace: Namespace, index: usize) -> Self {
        Self { namespace, index }
    }
}

impl fmt::Display for EquationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}Q", self.namespace.prefix(), self.index)
    }
}

impl FromStr for EquationId {
    type Err = TexeqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TexeqError::InvalidIdentifier(s.to_string());
        let body = s.trim().strip_suffix('Q').ok_or_else(invalid)?;
        for namespace in [Namespace::Single, Namespace::Grouped, Namespace::Inline] {
            if let Some(digits) = body.strip_prefix(namespace.prefix()) {
                let index = digits.parse().map_err(|_| invalid())?;
                return Ok(EquationId::new(namespace, index));
            }
        }
        Err(invalid())
    }
}

impl Serialize for EquationId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An equation detached from the document it was located in, as returned by
/// extraction workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEquation {
    pub text: String,
    pub kind: MathKind,
}

impl From<RawEquation<'_>> for ExtractedEquation {
    fn from(eq: RawEquation<'_>) -> Self {
        Self {
            text: eq.text.to_string(),
            kind: eq.kind,
        }
    }
}

/// One registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub id: EquationId,
    /// Stored text: standardized for single equations, the raw group otherwise
    pub text: String,
    /// Row identifiers, in row order. Empty for single equations.
    pub members: Vec<EquationId>,
}

/// Display-math deduplication table.
#[derive(Debug, Clone, Default)]
pub struct EquationRegistry {
    singles: FxIndexMap<String, RegistryEntry>,
    groups: FxIndexMap<String, RegistryEntry>,
    next_single: usize,
    next_group: usize,
}

impl EquationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one located equation, dispatching on its kind.
    pub fn register(&mut self, text: &str, kind: MathKind) -> EquationId {
        if kind.is_grouped() {
            self.register_grouped(text)
        } else {
            self.register_single(text)
        }
    }

    /// Register a single display equation. A key seen before keeps its id.
    pub fn register_single(&mut self, raw: &str) -> EquationId {
        self.insert_single(flatten(raw), || standardize(raw))
    }

    /// Register a grouped equation: every row first, as a single equation,
    /// then the group itself referencing the rows in order.
    pub fn register_grouped(&mut self, raw: &str) -> EquationId {
        let key = flatten(raw);
        if let Some(entry) = self.groups.get(&key) {
            return entry.id;
        }

        let members: Vec<EquationId> = split_multiline(raw)
            .iter()
            .map(|row| self.insert_single(flatten(row), || wrap_standard(row)))
            .collect();

        let id = EquationId::new(Namespace::Grouped, self.next_group);
        self.next_group += 1;
        self.groups.insert(
            key,
            RegistryEntry {
                id,
                text: raw.trim().to_string(),
                members,
            },
        );
        id
    }

    fn insert_single(&mut self, key: String, text: impl FnOnce() -> String) -> EquationId {
        if let Some(entry) = self.singles.get(&key) {
            return entry.id;
        }
        let id = EquationId::new(Namespace::Single, self.next_single);
        self.next_single += 1;
        self.singles.insert(
            key,
            RegistryEntry {
                id,
                text: text(),
                members: Vec::new(),
            },
        );
        id
    }

    /// Fold one document's equations in document order.
    pub fn fold_document(&mut self, equations: &[ExtractedEquation]) {
        for eq in equations {
            self.register(&eq.text, eq.kind);
        }
    }

    /// Identifier for an equation as it appears in a document.
    pub fn lookup(&self, text: &str, kind: MathKind) -> Option<EquationId> {
        let key = flatten(text);
        let (first, second) = if kind.is_grouped() {
            (&self.groups, &self.singles)
        } else {
            (&self.singles, &self.groups)
        };
        first.get(&key).or_else(|| second.get(&key)).map(|e| e.id)
    }

    /// Identifier for an already flattened key.
    pub fn lookup_key(&self, key: &str) -> Option<EquationId> {
        self.singles
            .get(key)
            .or_else(|| self.groups.get(key))
            .map(|e| e.id)
    }

    pub fn single_count(&self) -> usize {
        self.singles.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn len(&self) -> usize {
        self.singles.len() + self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in table order: single equations, then groups, each in
    /// assignment order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.singles.values().chain(self.groups.values())
    }
}

/// Inline-math deduplication table keyed by the literal `$...$` text with
/// escaped dollars removed. The first text seen for a key is the one stored.
#[derive(Debug, Clone, Default)]
pub struct InlineEquationSet {
    equations: FxIndexMap<String, (String, EquationId)>,
    next: usize,
}

/// Lookup key of an inline equation: `\$` is dropped, everything else kept.
pub fn inline_key(raw: &str) -> String {
    raw.replace("\\$", "")
}

impl InlineEquationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, raw: &str) -> EquationId {
        let key = inline_key(raw);
        if let Some((_, id)) = self.equations.get(&key) {
            return *id;
        }
        let id = EquationId::new(Namespace::Inline, self.next);
        self.next += 1;
        self.equations.insert(key, (raw.to_string(), id));
        id
    }

    pub fn fold_document(&mut self, equations: &[ExtractedEquation]) {
        for eq in equations {
            self.register(&eq.text);
        }
    }

    pub fn lookup(&self, raw: &str) -> Option<EquationId> {
        self.equations.get(&inline_key(raw)).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.equations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equations.is_empty()
    }

    /// Stored texts with their ids, in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, EquationId)> {
        self.equations.values().map(|(text, id)| (text.as_str(), *id))
    }
}
