//! Uploaded file source.

use tracing::debug;

use crate::error::{Result, TabulaError};
use crate::input::{DataTable, Parser, SourceMetadata};
use crate::transform::CellTransform;

use super::{Preview, SourceDescriptor, WriteReport};

/// Regenerated file content ready for download.
#[derive(Debug, Clone)]
pub struct FileArtifact {
    pub name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// A parsed upload held entirely in memory.
pub struct FileSource {
    metadata: SourceMetadata,
    table: DataTable,
    regenerated: Option<Vec<u8>>,
}

impl FileSource {
    /// Parse an upload. There is nothing to connect to; a parse failure is
    /// the only way this fails.
    pub fn connect(name: &str, contents: &[u8], parser: &Parser) -> Result<Self> {
        let (table, metadata) = parser.parse(name, contents)?;
        debug!(
            file = %metadata.file,
            format = metadata.format.name(),
            rows = metadata.row_count,
            columns = metadata.column_count,
            "Parsed file source"
        );
        Ok(Self {
            metadata,
            table,
            regenerated: None,
        })
    }

    pub fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor::File {
            name: self.metadata.file.clone(),
            size_bytes: self.metadata.size_bytes,
        }
    }

    pub fn fetch_preview(&self, limit: usize) -> Preview {
        Preview {
            columns: self.table.columns.clone(),
            rows: self.table.rows.iter().take(limit).cloned().collect(),
        }
    }

    /// Transform the column in every row of the file, then regenerate the
    /// file content. Rows whose transform faults keep their old values.
    pub fn write_column(&mut self, column: &str, transform: &dyn CellTransform) -> Result<WriteReport> {
        if !self.table.has_column(column) {
            return Err(TabulaError::NotFound(format!(
                "Column '{}' not found in '{}'",
                column, self.metadata.file
            )));
        }

        // Work on a copy; the source only changes once the file renders
        // and at least one row was written.
        let mut table = self.table.clone();
        let mut report = WriteReport::new(table.row_count());
        for (index, row) in table.rows.iter_mut().enumerate() {
            let Some(value) = row.get(column) else {
                report.fail(index, format!("row {}", index), "missing cell");
                continue;
            };

            let updates = match transform.apply(value) {
                Ok(output) => output.into_updates(column),
                Err(fault) => {
                    report.fail(index, format!("row {}", index), fault.to_string());
                    continue;
                }
            };

            if let Some(unknown) = updates.keys().find(|k| !table.columns.contains(*k)) {
                report.fail(
                    index,
                    format!("row {}", index),
                    format!("transform produced unknown column '{}'", unknown),
                );
                continue;
            }

            for (name, value) in updates {
                row.set(name, value);
            }
            report.succeeded += 1;
        }

        let report = report.into_result()?;
        let rendered = table.render()?;
        self.metadata.row_count = table.row_count();
        self.table = table;
        self.regenerated = Some(rendered);
        Ok(report)
    }

    /// The regenerated file, if a commit has happened.
    pub fn download(&self) -> Option<FileArtifact> {
        self.regenerated.as_ref().map(|bytes| FileArtifact {
            name: self.metadata.file.clone(),
            content_type: self.metadata.format.content_type(),
            bytes: bytes.clone(),
        })
    }
}
