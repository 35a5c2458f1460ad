//! SQLite driver: one database file per database inside a directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use indexmap::IndexMap;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};

use crate::error::{Result, TabulaError};
use crate::table::{CellValue, Row};

use super::relational::{
    RelationalConnector, RelationalCredentials, RelationalDriver, RowIdentity, RowKey,
    TableDescription,
};

const EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Serves the SQLite files in a directory as databases.
///
/// Host, port and user are recorded by the session but SQLite has no use
/// for them.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    dir: PathBuf,
}

impl SqliteConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RelationalConnector for SqliteConnector {
    async fn connect(&self, _credentials: &RelationalCredentials) -> Result<Box<dyn RelationalDriver>> {
        if !self.dir.is_dir() {
            return Err(TabulaError::Connection(format!(
                "SQLite directory '{}' does not exist",
                self.dir.display()
            )));
        }
        Ok(Box::new(SqliteDriver::new(self.dir.clone())))
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Connection to one database file, opened on first use and reused by
/// every later call, so a column write runs all its updates on it.
type ConnectionSlot = Arc<Mutex<Option<Connection>>>;

struct SqliteDriver {
    dir: PathBuf,
    connections: Mutex<HashMap<String, (PathBuf, ConnectionSlot)>>,
}

impl SqliteDriver {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn database_path(&self, database: &str) -> Result<PathBuf> {
        if database.contains(['/', '\\']) || database.starts_with('.') {
            return Err(TabulaError::NotFound(format!("Database '{}' not found", database)));
        }
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", database, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| TabulaError::NotFound(format!("Database '{}' not found", database)))
    }

    fn slot(&self, database: &str) -> Result<(PathBuf, ConnectionSlot)> {
        let mut connections = self
            .connections
            .lock()
            .map_err(|_| TabulaError::Connection("SQLite connection table poisoned".to_string()))?;
        if let Some((path, slot)) = connections.get(database) {
            return Ok((path.clone(), slot.clone()));
        }
        let entry = (self.database_path(database)?, ConnectionSlot::default());
        connections.insert(database.to_string(), entry.clone());
        Ok(entry)
    }

    /// Run blocking SQLite work on the blocking pool.
    async fn with_database<T, F>(&self, database: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (path, slot) = self.slot(database)?;
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| TabulaError::Connection(format!("{}: connection poisoned", path.display())))?;
            let conn = match &mut *guard {
                Some(conn) => conn,
                empty @ None => empty.insert(
                    Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_WRITE)
                        .map_err(|e| TabulaError::Connection(format!("{}: {}", path.display(), e)))?,
                ),
            };
            f(conn)
        })
        .await
        .map_err(|e| TabulaError::Connection(format!("SQLite task failed: {}", e)))?
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn describe(conn: &Connection, table: &str) -> Result<TableDescription> {
    if !table_exists(conn, table)? {
        return Err(TabulaError::NotFound(format!("Table '{}' not found", table)));
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    // (name, position in primary key; 0 when not part of it)
    let info: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
        .collect::<std::result::Result<_, _>>()?;

    let columns = info.iter().map(|(name, _)| name.clone()).collect();
    let mut key: Vec<(i64, String)> = info
        .into_iter()
        .filter(|(_, pk)| *pk > 0)
        .map(|(name, pk)| (pk, name))
        .collect();
    key.sort();

    let identity = if !key.is_empty() {
        RowIdentity::PrimaryKey(key.into_iter().map(|(_, name)| name).collect())
    } else if conn
        .prepare(&format!("SELECT rowid FROM {} LIMIT 0", quote(table)))
        .is_ok()
    {
        RowIdentity::RowId
    } else {
        RowIdentity::None
    };

    Ok(TableDescription { columns, identity })
}

fn to_cell(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            CellValue::Json(serde_json::Value::Array(bytes.iter().map(|b| (*b).into()).collect()))
        }
    }
}

fn to_sql(value: &CellValue) -> SqlValue {
    match value {
        CellValue::Null => SqlValue::Null,
        CellValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        CellValue::Integer(i) => SqlValue::Integer(*i),
        CellValue::Float(f) if f.is_nan() => SqlValue::Null,
        CellValue::Float(f) => SqlValue::Real(*f),
        CellValue::Text(s) => SqlValue::Text(s.clone()),
        CellValue::Json(v) => SqlValue::Text(v.to_string()),
    }
}

fn key_columns(identity: &RowIdentity) -> Result<Vec<String>> {
    match identity {
        RowIdentity::PrimaryKey(columns) => Ok(columns.iter().map(|c| quote(c)).collect()),
        RowIdentity::RowId => Ok(vec!["rowid".to_string()]),
        RowIdentity::None => Err(TabulaError::Write(
            "table has no row identity".to_string(),
        )),
    }
}

#[async_trait]
impl RelationalDriver for SqliteDriver {
    async fn list_databases(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| TabulaError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| has_database_extension(path))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.with_database(database, |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn describe_table(&self, database: &str, table: &str) -> Result<TableDescription> {
        let table = table.to_string();
        self.with_database(database, move |conn| describe(conn, &table))
            .await
    }

    async fn select_rows(&self, database: &str, table: &str, limit: Option<usize>) -> Result<Vec<Row>> {
        let table = table.to_string();
        self.with_database(database, move |conn| {
            let description = describe(conn, &table)?;
            let limit = limit.map(|l| l as i64).unwrap_or(-1);
            let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT ?1", quote(&table)))?;
            let rows = stmt
                .query_map([limit], |row| {
                    let mut out = Row::new();
                    for (i, column) in description.columns.iter().enumerate() {
                        out.set(column.clone(), to_cell(row.get_ref(i)?));
                    }
                    Ok(out)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn scan_column(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        column: &str,
    ) -> Result<Vec<(RowKey, CellValue)>> {
        let keys = key_columns(identity)?;
        let sql = format!(
            "SELECT {}, {} FROM {}",
            keys.join(", "),
            quote(column),
            quote(table)
        );
        let width = keys.len();
        self.with_database(database, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let cells = stmt
                .query_map([], |row| {
                    let key = (0..width)
                        .map(|i| row.get_ref(i).map(to_cell))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    Ok((RowKey(key), to_cell(row.get_ref(width)?)))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(cells)
        })
        .await
    }

    async fn update_row(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        key: &RowKey,
        updates: &IndexMap<String, CellValue>,
    ) -> Result<()> {
        let keys = key_columns(identity)?;
        if updates.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = updates
            .keys()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote(c), i + 1))
            .collect();
        let conditions: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} IS ?{}", c, updates.len() + i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote(table),
            assignments.join(", "),
            conditions.join(" AND ")
        );

        let mut values: Vec<SqlValue> = updates.values().map(to_sql).collect();
        values.extend(key.0.iter().map(to_sql));
        let key_text = key.to_string();

        self.with_database(database, move |conn| {
            let changed = conn
                .execute(&sql, params_from_iter(values))
                .map_err(|e| TabulaError::Write(e.to_string()))?;
            if changed == 0 {
                return Err(TabulaError::Write(format!("Row {} no longer exists", key_text)));
            }
            Ok(())
        })
        .await
    }
}

fn has_database_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.contains(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RelationalSource;
    use crate::transform::{TransformFault, TransformOutput};

    fn credentials() -> RelationalCredentials {
        RelationalCredentials {
            host: "localhost".into(),
            port: 0,
            user: "local".into(),
            password: String::new(),
        }
    }

    fn fixture(dir: &Path) {
        let conn = Connection::open(dir.join("shop.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL);
             INSERT INTO users (id, name, score) VALUES (1, 'alice', 1.5), (2, 'bob', NULL);
             CREATE TABLE notes (body TEXT);
             INSERT INTO notes (body) VALUES ('a'), ('b');",
        )
        .unwrap();
    }

    fn upper(v: &CellValue) -> std::result::Result<TransformOutput, TransformFault> {
        Ok(TransformOutput::Value(v.to_string().to_uppercase().into()))
    }

    #[tokio::test]
    async fn test_lists_and_describes() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let connector = SqliteConnector::new(dir.path());
        let driver = connector.connect(&credentials()).await.unwrap();

        assert_eq!(driver.list_databases().await.unwrap(), vec!["shop"]);
        assert_eq!(driver.list_tables("shop").await.unwrap(), vec!["notes", "users"]);

        let users = driver.describe_table("shop", "users").await.unwrap();
        assert_eq!(users.columns, vec!["id", "name", "score"]);
        assert_eq!(users.identity, RowIdentity::PrimaryKey(vec!["id".into()]));

        let notes = driver.describe_table("shop", "notes").await.unwrap();
        assert_eq!(notes.identity, RowIdentity::RowId);
    }

    #[tokio::test]
    async fn test_select_maps_types() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let driver = SqliteConnector::new(dir.path())
            .connect(&credentials())
            .await
            .unwrap();

        let rows = driver.select_rows("shop", "users", Some(10)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&CellValue::Integer(1)));
        assert_eq!(rows[0].get("score"), Some(&CellValue::Float(1.5)));
        assert_eq!(rows[1].get("score"), Some(&CellValue::Null));
    }

    #[tokio::test]
    async fn test_write_column_by_key_and_rowid() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let connector = SqliteConnector::new(dir.path());
        let source = RelationalSource::connect(&connector, &credentials()).await.unwrap();

        let report = source.write_column("shop", "users", "name", &upper).await.unwrap();
        assert_eq!((report.attempted, report.succeeded), (2, 2));

        let report = source.write_column("shop", "notes", "body", &upper).await.unwrap();
        assert_eq!(report.succeeded, 2);

        let preview = source.fetch_preview("shop", "notes", 10).await.unwrap();
        assert_eq!(preview.rows[1].get("body"), Some(&CellValue::from("B")));
    }

    #[tokio::test]
    async fn test_updates_reuse_one_connection() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let driver = SqliteDriver::new(dir.path().to_path_buf());

        // TEMP tables live only as long as the connection that made them.
        driver
            .with_database("shop", |conn| Ok(conn.execute_batch("CREATE TEMP TABLE marker (x)")?))
            .await
            .unwrap();
        let identity = RowIdentity::PrimaryKey(vec!["id".into()]);
        for id in [1, 2] {
            let updates = IndexMap::from([("name".to_string(), CellValue::from("x"))]);
            driver
                .update_row("shop", "users", &identity, &RowKey(vec![CellValue::Integer(id)]), &updates)
                .await
                .unwrap();
        }
        let marker = driver
            .with_database("shop", |conn| table_exists_in_temp(conn))
            .await
            .unwrap();
        assert!(marker);
        assert_eq!(driver.connections.lock().unwrap().len(), 1);
    }

    fn table_exists_in_temp(conn: &Connection) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'marker'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[tokio::test]
    async fn test_shifting_integer_primary_key() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let connector = SqliteConnector::new(dir.path());
        let source = RelationalSource::connect(&connector, &credentials()).await.unwrap();

        let bump = |v: &CellValue| -> std::result::Result<TransformOutput, TransformFault> {
            match v {
                CellValue::Integer(i) => Ok(TransformOutput::Value(CellValue::Integer(i + 1))),
                other => Err(TransformFault::new(format!("not an integer: {}", other))),
            }
        };
        let report = source.write_column("shop", "users", "id", &bump).await.unwrap();
        assert_eq!((report.attempted, report.succeeded), (2, 2));

        let rows = source.fetch_preview("shop", "users", 10).await.unwrap().rows;
        let pairs: Vec<String> = rows
            .iter()
            .map(|r| format!("{}={}", r.get("name").unwrap(), r.get("id").unwrap()))
            .collect();
        assert_eq!(pairs, vec!["alice=2", "bob=3"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_connection_error() {
        let connector = SqliteConnector::new("/definitely/not/here");
        let err = connector.connect(&credentials()).await.err().unwrap();
        assert!(matches!(err, TabulaError::Connection(_)));
    }

    #[tokio::test]
    async fn test_unknown_database_and_table() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let driver = SqliteConnector::new(dir.path())
            .connect(&credentials())
            .await
            .unwrap();

        assert!(matches!(
            driver.list_tables("other").await.unwrap_err(),
            TabulaError::NotFound(_)
        ));
        assert!(matches!(
            driver.describe_table("shop", "orders").await.unwrap_err(),
            TabulaError::NotFound(_)
        ));
    }
}
