//! Tab-delimited persistence of the registries.
//!
//! Record layouts, one per line:
//! - single:  `id \t text`
//! - grouped: `id \t id,id,... \t text`
//! - inline:  `id \t text`
//!
//! Text fields go through [`escape_field`] so records never span lines.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::{
    escape_field, inline_key, unescape_field, EquationId, EquationRegistry, InlineEquationSet,
    Namespace, RegistryEntry,
};
use crate::core::canonical::flatten;
use crate::utils::error::{TexeqError, TexeqResult};

impl EquationRegistry {
    /// Write every entry, single equations first, then groups.
    pub fn write_table<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for entry in self.singles.values() {
            writeln!(out, "{}\t{}", entry.id, escape_field(&entry.text))?;
        }
        for entry in self.groups.values() {
            let members = entry
                .members
                .iter()
                .map(EquationId::to_string)
                .collect::<Vec<_>>()
                .join(",");
            writeln!(out, "{}\t{}\t{}", entry.id, members, escape_field(&entry.text))?;
        }
        Ok(())
    }

    /// Rebuild a registry from a table. Keys are re-derived by flattening the
    /// stored text; the first record for a key wins. Numbering continues after
    /// the highest index seen in each namespace.
    pub fn read_table<R: BufRead>(input: R) -> TexeqResult<Self> {
        let mut registry = EquationRegistry::new();
        for (idx, line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| TexeqError::malformed(line_no, e.to_string()))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            let (id, members, text) = match fields.as_slice() {
                [id, text] => (parse_id(id, line_no)?, Vec::new(), unescape_field(text)),
                [id, members, text] => {
                    let members = members
                        .split(',')
                        .filter(|m| !m.is_empty())
                        .map(|m| parse_id(m, line_no))
                        .collect::<TexeqResult<Vec<_>>>()?;
                    (parse_id(id, line_no)?, members, unescape_field(text))
                }
                _ => {
                    return Err(TexeqError::malformed(
                        line_no,
                        format!("expected 2 or 3 columns, found {}", fields.len()),
                    ))
                }
            };

            let key = flatten(&text);
            let entry = RegistryEntry { id, text, members };
            match id.namespace {
                Namespace::Single => {
                    registry.next_single = registry.next_single.max(id.index + 1);
                    registry.singles.entry(key).or_insert(entry);
                }
                Namespace::Grouped => {
                    registry.next_group = registry.next_group.max(id.index + 1);
                    registry.groups.entry(key).or_insert(entry);
                }
                Namespace::Inline => {
                    return Err(TexeqError::malformed(
                        line_no,
                        format!("inline identifier {} in a display table", id),
                    ))
                }
            }
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> TexeqResult<()> {
        let file = File::create(path).map_err(|e| TexeqError::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_table(&mut out)
            .and_then(|_| out.flush())
            .map_err(|e| TexeqError::io(path, e))
    }

    pub fn load(path: &Path) -> TexeqResult<Self> {
        let file = File::open(path).map_err(|e| TexeqError::io(path, e))?;
        Self::read_table(BufReader::new(file))
    }
}

impl InlineEquationSet {
    pub fn write_table<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        for (raw, id) in self.iter() {
            writeln!(out, "{}\t{}", id, escape_field(raw))?;
        }
        Ok(())
    }

    pub fn read_table<R: BufRead>(input: R) -> TexeqResult<Self> {
        let mut set = InlineEquationSet::new();
        for (idx, line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| TexeqError::malformed(line_no, e.to_string()))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let Some((id, text)) = line.split_once('\t') else {
                return Err(TexeqError::malformed(line_no, "expected 2 columns"));
            };
            let id = parse_id(id, line_no)?;
            if id.namespace != Namespace::Inline {
                return Err(TexeqError::malformed(
                    line_no,
                    format!("display identifier {} in an inline table", id),
                ));
            }
            set.next = set.next.max(id.index + 1);
            let text = unescape_field(text).trim().to_string();
            set.equations.entry(inline_key(&text)).or_insert((text, id));
        }
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> TexeqResult<()> {
        let file = File::create(path).map_err(|e| TexeqError::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_table(&mut out)
            .and_then(|_| out.flush())
            .map_err(|e| TexeqError::io(path, e))
    }

    pub fn load(path: &Path) -> TexeqResult<Self> {
        let file = File::open(path).map_err(|e| TexeqError::io(path, e))?;
        Self::read_table(BufReader::new(file))
    }
}

fn parse_id(field: &str, line_no: usize) -> TexeqResult<EquationId> {
    field
        .parse()
        .map_err(|_| TexeqError::malformed(line_no, format!("bad identifier '{}'", field)))
}
