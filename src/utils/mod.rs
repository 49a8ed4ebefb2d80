//! Utility modules
//!
//! This module contains utilities and helpers:
//! - Error types and result types
//! - Encoding-tolerant document reading and UTF-8 writing

pub mod error;
pub mod files;

// Re-export commonly used items
pub use error::{FileFailure, RenderFailure, RenderStage, TexeqError, TexeqResult};
pub use files::{read_document, sibling_log_path, write_document};
