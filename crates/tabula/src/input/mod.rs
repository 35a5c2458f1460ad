//! Uploaded file parsing.

mod parser;
mod source;

pub use parser::{Parser, ParserConfig};
pub use source::{DataTable, FileFormat, SourceMetadata};
