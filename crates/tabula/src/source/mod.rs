//! Source descriptors and the adapter over the three kinds of backing store.
//!
//! A session talks to exactly one [`SourceAdapter`]. The variants share one
//! contract (connect, list sub-containers, fetch a preview, write a column)
//! but differ in identity model and commit mechanics:
//!
//! - **File**: no sub-containers; a commit regenerates the whole file in
//!   memory for download.
//! - **Relational**: database then table; a commit is a read-modify-write
//!   per row keyed by the table's primary key or native row identity.
//! - **Document**: database then collection; the `_id` identity field is
//!   hidden from the column set and a commit is a bulk update keyed by it.

mod document;
mod file;
mod jsondir;
mod relational;
mod sqlite;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TabulaError};
use crate::table::Row;
use crate::transform::CellTransform;

pub use document::{
    BulkWriteFailure, BulkWriteResult, Document, DocumentConnector, DocumentDriver,
    DocumentRouter, DocumentSource, FieldUpdate, MemoryDocumentStore, ID_FIELD,
};
pub use file::{FileArtifact, FileSource};
pub use jsondir::JsonDirConnector;
pub use relational::{
    MemoryRelationalStore, MemoryTable, RelationalConnector, RelationalCredentials,
    RelationalDriver, RelationalSource, RowIdentity, RowKey, TableDescription,
};
pub use sqlite::SqliteConnector;

/// Where the session's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    File {
        name: String,
        size_bytes: u64,
    },
    RelationalTable {
        host: String,
        port: u16,
        user: String,
        /// Opaque reference to the in-memory credential; never the secret.
        credential_ref: String,
        database: Option<String>,
        table: Option<String>,
    },
    DocumentCollection {
        connection_uri: String,
        database: Option<String>,
        collection: Option<String>,
    },
}

impl SourceDescriptor {
    /// Short variant name for logs and the API.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceDescriptor::File { .. } => "file",
            SourceDescriptor::RelationalTable { .. } => "relational_table",
            SourceDescriptor::DocumentCollection { .. } => "document_collection",
        }
    }
}

/// Columns and a bounded sample of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// One row the store refused, or whose transform faulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFailure {
    /// Position of the row in the full scan.
    pub row: usize,
    /// Identity of the row in the store (key, `_id`, or file row number).
    pub key: String,
    pub cause: String,
}

/// Outcome of writing a column across a whole container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RowFailure>,
}

impl WriteReport {
    pub fn new(attempted: usize) -> Self {
        Self {
            attempted,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    /// Record a row that could not be written.
    pub fn fail(&mut self, row: usize, key: impl Into<String>, cause: impl Into<String>) {
        self.failures.push(RowFailure {
            row,
            key: key.into(),
            cause: cause.into(),
        });
    }

    /// Whether fewer rows were written than attempted.
    pub fn is_partial(&self) -> bool {
        self.succeeded < self.attempted
    }

    /// Turn a report with rows attempted but none written into an error.
    pub fn into_result(self) -> Result<Self> {
        if self.attempted > 0 && self.succeeded == 0 {
            let cause = self
                .failures
                .first()
                .map(|f| format!("{}: {}", f.key, f.cause))
                .unwrap_or_else(|| "no rows were written".to_string());
            return Err(TabulaError::Write(format!(
                "0 of {} rows written (first failure at {})",
                self.attempted, cause
            )));
        }
        Ok(self)
    }
}

/// The closed set of source variants.
pub enum SourceAdapter {
    File(FileSource),
    Relational(RelationalSource),
    Document(DocumentSource),
}

impl SourceAdapter {
    /// Descriptor of the source, with the selected container filled in when
    /// one is given.
    pub fn descriptor(&self, container: Option<&str>, sub_container: Option<&str>) -> SourceDescriptor {
        match self {
            SourceAdapter::File(source) => source.descriptor(),
            SourceAdapter::Relational(source) => source.descriptor(container, sub_container),
            SourceAdapter::Document(source) => source.descriptor(container, sub_container),
        }
    }

    /// Top-level containers discovered at connect time. Empty for files.
    pub fn containers(&self) -> &[String] {
        match self {
            SourceAdapter::File(_) => &[],
            SourceAdapter::Relational(source) => source.databases(),
            SourceAdapter::Document(source) => source.databases(),
        }
    }

    /// Whether rows live two levels down (database, then table/collection).
    pub fn is_hierarchical(&self) -> bool {
        !matches!(self, SourceAdapter::File(_))
    }

    /// Tables or collections within a container. Files have none.
    pub async fn list_sub_containers(&self, container: &str) -> Result<Vec<String>> {
        match self {
            SourceAdapter::File(_) => Ok(Vec::new()),
            SourceAdapter::Relational(source) => source.list_tables(container).await,
            SourceAdapter::Document(source) => source.list_collections(container).await,
        }
    }

    /// Fetch the column set and up to `limit` rows.
    pub async fn fetch_preview(
        &self,
        container: Option<&str>,
        sub_container: Option<&str>,
        limit: usize,
    ) -> Result<Preview> {
        match self {
            SourceAdapter::File(source) => Ok(source.fetch_preview(limit)),
            SourceAdapter::Relational(source) => {
                let (database, table) = require_pair(container, sub_container)?;
                source.fetch_preview(database, table, limit).await
            }
            SourceAdapter::Document(source) => {
                let (database, collection) = require_pair(container, sub_container)?;
                source.fetch_preview(database, collection, limit).await
            }
        }
    }

    /// Replace `column` in every row of the container with its transformed
    /// value. Best-effort per row.
    pub async fn write_column(
        &mut self,
        container: Option<&str>,
        sub_container: Option<&str>,
        column: &str,
        transform: &dyn CellTransform,
    ) -> Result<WriteReport> {
        let report = match self {
            SourceAdapter::File(source) => source.write_column(column, transform)?,
            SourceAdapter::Relational(source) => {
                let (database, table) = require_pair(container, sub_container)?;
                source.write_column(database, table, column, transform).await?
            }
            SourceAdapter::Document(source) => {
                let (database, collection) = require_pair(container, sub_container)?;
                source
                    .write_column(database, collection, column, transform)
                    .await?
            }
        };
        report.into_result()
    }

    /// The regenerated file, once a file source has been committed.
    pub fn download(&self) -> Option<FileArtifact> {
        match self {
            SourceAdapter::File(source) => source.download(),
            _ => None,
        }
    }
}

fn require_pair<'a>(
    container: Option<&'a str>,
    sub_container: Option<&'a str>,
) -> Result<(&'a str, &'a str)> {
    match (container, sub_container) {
        (Some(c), Some(s)) => Ok((c, s)),
        _ => Err(TabulaError::Precondition(
            "a database and a table or collection must be selected".to_string(),
        )),
    }
}
