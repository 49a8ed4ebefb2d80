//! Document file access
//!
//! Corpus documents come in mixed encodings. They are read as UTF-8 when
//! valid and decoded as Latin-1 otherwise; everything written is UTF-8.

use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::error::{TexeqError, TexeqResult};

/// Read a document, falling back to Latin-1 for non-UTF-8 bytes.
pub fn read_document(path: &Path) -> TexeqResult<String> {
    let bytes = fs::read(path).map_err(|e| TexeqError::io(path, e))?;
    Ok(decode_document(bytes))
}

/// Decode document bytes: UTF-8 if valid, Latin-1 otherwise.
pub fn decode_document(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

/// Write a document as UTF-8, creating missing parent directories.
pub fn write_document(path: &Path, text: &str) -> TexeqResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| TexeqError::io(parent, e))?;
        }
    }
    fs::write(path, text).map_err(|e| TexeqError::io(path, e))
}

/// `<dir>.log` next to a directory, e.g. `out/astro_converted.log`.
pub fn sibling_log_path(dir: &Path) -> PathBuf {
    let normalized: PathBuf = dir.components().collect();
    let mut name = normalized.into_os_string();
    name.push(".log");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_kept() {
        let text = "α + β = γ";
        assert_eq!(decode_document(text.as_bytes().to_vec()), text);
    }

    #[test]
    fn test_latin1_fallback() {
        // "café" in Latin-1
        let bytes = vec![b'c', b'a', b'f', 0xE9];
        assert_eq!(decode_document(bytes), "café");
    }

    #[test]
    fn test_sibling_log_path() {
        assert_eq!(
            sibling_log_path(Path::new("out/astro_converted/")),
            PathBuf::from("out/astro_converted.log")
        );
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a/b/doc.tex");
        write_document(&target, "x").expect("write");
        assert_eq!(fs::read_to_string(&target).expect("read back"), "x");
    }
}
