//! Uploaded file metadata and the parsed in-memory table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::table::{write_delimited, Row};

/// On-disk layout of a file source, kept so the file can be regenerated in
/// the same shape it arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileFormat {
    /// Delimited text with a header row.
    Delimited { delimiter: u8 },
    /// A single JSON array of objects.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl FileFormat {
    /// Short format name.
    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::Delimited { delimiter: b'\t' } => "tsv",
            FileFormat::Delimited { delimiter: b',' } => "csv",
            FileFormat::Delimited { delimiter: b';' } => "csv-semicolon",
            FileFormat::Delimited { delimiter: b'|' } => "psv",
            FileFormat::Delimited { .. } => "delimited",
            FileFormat::Json => "json",
            FileFormat::JsonLines => "ndjson",
        }
    }

    /// MIME type used when the file is downloaded.
    pub fn content_type(&self) -> &'static str {
        match self {
            FileFormat::Delimited { delimiter: b'\t' } => "text/tab-separated-values",
            FileFormat::Delimited { .. } => "text/csv",
            FileFormat::Json => "application/json",
            FileFormat::JsonLines => "application/x-ndjson",
        }
    }
}

/// Metadata about an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name as uploaded.
    pub file: String,
    /// SHA-256 hash of the file contents.
    pub hash: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Detected format.
    pub format: FileFormat,
    /// Number of data rows (excluding header).
    pub row_count: usize,
    /// Number of columns.
    pub column_count: usize,
    /// When the file was loaded.
    pub loaded_at: DateTime<Utc>,
}

/// A fully parsed file: every row, not just a preview sample.
#[derive(Debug, Clone)]
pub struct DataTable {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// All data rows.
    pub rows: Vec<Row>,
    /// Layout to regenerate.
    pub format: FileFormat,
}

impl DataTable {
    /// Create a new data table.
    pub fn new(columns: Vec<String>, rows: Vec<Row>, format: FileFormat) -> Self {
        Self {
            columns,
            rows,
            format,
        }
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows (excluding header).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check whether the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Regenerate the file content in its original format.
    pub fn render(&self) -> Result<Vec<u8>> {
        match self.format {
            FileFormat::Delimited { delimiter } => {
                write_delimited(&self.columns, &self.rows, delimiter)
            }
            FileFormat::Json => {
                let records: Vec<serde_json::Map<String, serde_json::Value>> =
                    self.rows.iter().map(|row| self.json_record(row)).collect();
                Ok(serde_json::to_vec_pretty(&records)?)
            }
            FileFormat::JsonLines => {
                let mut out = Vec::new();
                for row in &self.rows {
                    serde_json::to_writer(&mut out, &self.json_record(row))?;
                    out.push(b'\n');
                }
                Ok(out)
            }
        }
    }

    fn json_record(&self, row: &Row) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .map(|c| {
                let value = row.get(c).map(|v| v.to_json()).unwrap_or_default();
                (c.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;

    #[test]
    fn test_render_json_keeps_types() {
        let table = DataTable::new(
            vec!["id".into(), "name".into()],
            vec![Row::from([("id", 1i64.into()), ("name", "alice".into())])],
            FileFormat::Json,
        );
        let text = String::from_utf8(table.render().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[0]["id"], 1);
        assert_eq!(parsed[0]["name"], "alice");
    }

    #[test]
    fn test_render_json_lines() {
        let table = DataTable::new(
            vec!["a".into()],
            vec![
                Row::from([("a", CellValue::Null)]),
                Row::from([("a", true.into())]),
            ],
            FileFormat::JsonLines,
        );
        let text = String::from_utf8(table.render().unwrap()).unwrap();
        assert_eq!(text, "{\"a\":null}\n{\"a\":true}\n");
    }

    #[test]
    fn test_format_names() {
        assert_eq!(FileFormat::Delimited { delimiter: b'\t' }.name(), "tsv");
        assert_eq!(FileFormat::Delimited { delimiter: b',' }.name(), "csv");
        assert_eq!(FileFormat::JsonLines.name(), "ndjson");
    }
}
