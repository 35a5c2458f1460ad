//! Document store on disk: `jsondir://<root>` where each database is a
//! directory and each collection a newline-delimited JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, TabulaError};

use super::document::{
    apply_updates, redact_uri, split_uri, BulkWriteResult, Document, DocumentConnector,
    DocumentDriver, FieldUpdate,
};

const SCHEME: &str = "jsondir";
const COLLECTION_EXTENSIONS: &[&str] = &["ndjson", "jsonl"];

/// Connects `jsondir://` URIs. Relative roots resolve against `base`.
#[derive(Debug, Clone, Default)]
pub struct JsonDirConnector {
    base: Option<PathBuf>,
}

impl JsonDirConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, rest: &str) -> PathBuf {
        let path = PathBuf::from(rest);
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

#[async_trait]
impl DocumentConnector for JsonDirConnector {
    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn connect(&self, uri: &str) -> Result<Box<dyn DocumentDriver>> {
        let (scheme, rest) = split_uri(uri)?;
        if scheme != SCHEME || rest.is_empty() {
            return Err(TabulaError::Connection(format!(
                "Expected jsondir://<directory>, got '{}'",
                redact_uri(uri)
            )));
        }

        let root = self.resolve(rest);
        let metadata = tokio::fs::metadata(&root).await.map_err(|e| {
            TabulaError::Connection(format!("Cannot open '{}': {}", root.display(), e))
        })?;
        if !metadata.is_dir() {
            return Err(TabulaError::Connection(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        Ok(Box::new(JsonDirDriver { root }))
    }
}

struct JsonDirDriver {
    root: PathBuf,
}

impl JsonDirDriver {
    fn database_dir(&self, database: &str) -> Result<PathBuf> {
        let dir = self.root.join(checked_name(database)?);
        if !dir.is_dir() {
            return Err(TabulaError::NotFound(format!("Database '{}' not found", database)));
        }
        Ok(dir)
    }

    fn collection_path(&self, database: &str, collection: &str) -> Result<PathBuf> {
        let dir = self.database_dir(database)?;
        let name = checked_name(collection)?;
        COLLECTION_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                TabulaError::NotFound(format!("Collection '{}.{}' not found", database, collection))
            })
    }

    async fn read_collection(&self, path: &Path) -> Result<Vec<Document>> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| TabulaError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut documents = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line)? {
                Value::Object(map) => documents.push(map),
                _ => {
                    return Err(TabulaError::Schema(format!(
                        "{} line {}: document is not a JSON object",
                        path.display(),
                        number + 1
                    )));
                }
            }
        }
        Ok(documents)
    }

    /// Replace the collection file by writing a sibling and renaming it over.
    async fn write_collection(&self, path: &Path, documents: &[Document]) -> Result<()> {
        let mut out = Vec::new();
        for document in documents {
            serde_json::to_writer(&mut out, document)?;
            out.push(b'\n');
        }

        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, &out).await.map_err(|e| TabulaError::Write(format!(
            "{}: {}",
            staging.display(),
            e
        )))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| TabulaError::Write(format!("{}: {}", path.display(), e)))
    }
}

fn checked_name(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(TabulaError::NotFound(format!("Invalid name '{}'", name)));
    }
    Ok(name)
}

async fn list_entries(dir: &Path, want_dirs: bool) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| TabulaError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| TabulaError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let path = entry.path();
        if path.is_dir() == want_dirs {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[async_trait]
impl DocumentDriver for JsonDirDriver {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(list_entries(&self.root, true)
            .await?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| !n.starts_with('.'))
            .collect())
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        let dir = self.database_dir(database)?;
        let mut names: Vec<String> = list_entries(&dir, false)
            .await?
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| COLLECTION_EXTENSIONS.contains(&e))
            })
            .filter_map(|p| p.file_stem().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.dedup();
        Ok(names)
    }

    async fn find(&self, database: &str, collection: &str, limit: Option<usize>) -> Result<Vec<Document>> {
        let path = self.collection_path(database, collection)?;
        let mut documents = self.read_collection(&path).await?;
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    async fn bulk_update(
        &self,
        database: &str,
        collection: &str,
        updates: Vec<FieldUpdate>,
    ) -> Result<BulkWriteResult> {
        let path = self.collection_path(database, collection)?;
        let mut documents = self.read_collection(&path).await?;
        let result = apply_updates(&mut documents, updates);
        if result.matched > 0 {
            self.write_collection(&path, &documents).await?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DocumentSource;
    use crate::table::CellValue;
    use crate::transform::{TransformFault, TransformOutput};

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("crm");
        std::fs::create_dir(&db).unwrap();
        std::fs::write(
            db.join("people.ndjson"),
            "{\"_id\": \"a1\", \"name\": \"alice\"}\n{\"_id\": \"b2\", \"name\": \"bob\"}\n",
        )
        .unwrap();
        dir
    }

    fn upper(v: &CellValue) -> std::result::Result<TransformOutput, TransformFault> {
        Ok(TransformOutput::Value(v.to_string().to_uppercase().into()))
    }

    #[tokio::test]
    async fn test_lists_databases_and_collections() {
        let dir = fixture();
        let uri = format!("jsondir://{}", dir.path().display());
        let driver = JsonDirConnector::new().connect(&uri).await.unwrap();

        assert_eq!(driver.list_databases().await.unwrap(), vec!["crm"]);
        assert_eq!(driver.list_collections("crm").await.unwrap(), vec!["people"]);
        assert_eq!(driver.find("crm", "people", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_column_rewrites_file() {
        let dir = fixture();
        let uri = format!("jsondir://{}", dir.path().display());
        let source = DocumentSource::connect(&JsonDirConnector::new(), &uri).await.unwrap();

        let report = source.write_column("crm", "people", "name", &upper).await.unwrap();
        assert_eq!(report.succeeded, 2);

        let content = std::fs::read_to_string(dir.path().join("crm/people.ndjson")).unwrap();
        assert!(content.contains("\"ALICE\""));
        assert!(content.contains("\"_id\":\"b2\""));
    }

    #[tokio::test]
    async fn test_relative_root_uses_base() {
        let dir = fixture();
        let connector = JsonDirConnector::with_base(dir.path());
        let driver = connector.connect("jsondir://crm").await.unwrap();
        // The root is the database directory itself here, so it holds no databases
        assert!(driver.list_databases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_is_connection_error() {
        let err = JsonDirConnector::new()
            .connect("jsondir:///no/such/dir")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TabulaError::Connection(_)));
    }
}
