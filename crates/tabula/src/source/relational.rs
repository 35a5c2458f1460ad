//! Relational sources: driver traits, the session-facing source, and an
//! in-process store.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, TabulaError};
use crate::table::{CellValue, Row};
use crate::transform::CellTransform;

use super::{Preview, SourceDescriptor, WriteReport};

/// Credentials for a relational server. Held in memory for the session only.
#[derive(Clone, Deserialize)]
pub struct RelationalCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl RelationalCredentials {
    /// Reference that identifies the credential without revealing it.
    pub fn reference(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}@{}:{}", self.user, self.host, self.port));
        let digest = format!("{:x}", hasher.finalize());
        format!("cred-{}", &digest[..12])
    }
}

impl fmt::Debug for RelationalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How rows of a table are addressed for updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "columns", rename_all = "snake_case")]
pub enum RowIdentity {
    /// Declared primary key columns.
    PrimaryKey(Vec<String>),
    /// A row identity native to the store (e.g. SQLite `rowid`).
    RowId,
    /// No way to address a single row.
    None,
}

/// Identity values of one row, in identity column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey(pub Vec<CellValue>);

impl RowKey {
    /// Hashable form that keeps value types apart (`1` is not `"1"`).
    fn fingerprint(&self) -> String {
        format!("{:?}", self.0)
    }

    /// The key this row has after `updates`, when they change it.
    fn after(&self, identity: &RowIdentity, updates: &IndexMap<String, CellValue>) -> Option<RowKey> {
        let RowIdentity::PrimaryKey(columns) = identity else {
            return None;
        };
        let next = RowKey(
            columns
                .iter()
                .zip(&self.0)
                .map(|(column, old)| updates.get(column).unwrap_or(old).clone())
                .collect(),
        );
        (next != *self).then_some(next)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Column list and row identity of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub columns: Vec<String>,
    pub identity: RowIdentity,
}

/// Opens driver sessions against a relational server.
#[async_trait]
pub trait RelationalConnector: Send + Sync {
    /// Connect and authenticate. Unreachable hosts and rejected credentials
    /// are connection errors.
    async fn connect(&self, credentials: &RelationalCredentials) -> Result<Box<dyn RelationalDriver>>;

    /// Name of the backend (for logging).
    fn name(&self) -> &str;
}

/// Raw operations on a connected relational server.
#[async_trait]
pub trait RelationalDriver: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    async fn describe_table(&self, database: &str, table: &str) -> Result<TableDescription>;

    /// Rows in storage order; `None` reads the whole table.
    async fn select_rows(&self, database: &str, table: &str, limit: Option<usize>) -> Result<Vec<Row>>;

    /// Every row's identity paired with its value in `column`.
    async fn scan_column(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        column: &str,
    ) -> Result<Vec<(RowKey, CellValue)>>;

    /// Update the cells of the row identified by `key`.
    async fn update_row(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        key: &RowKey,
        updates: &IndexMap<String, CellValue>,
    ) -> Result<()>;
}

/// A connected relational source.
pub struct RelationalSource {
    driver: Box<dyn RelationalDriver>,
    host: String,
    port: u16,
    user: String,
    credential_ref: String,
    databases: Vec<String>,
}

impl RelationalSource {
    /// Connect and list the databases.
    pub async fn connect(
        connector: &dyn RelationalConnector,
        credentials: &RelationalCredentials,
    ) -> Result<Self> {
        let driver = connector.connect(credentials).await?;
        let databases = driver.list_databases().await?;
        debug!(
            backend = connector.name(),
            host = %credentials.host,
            databases = databases.len(),
            "Connected relational source"
        );
        Ok(Self {
            driver,
            host: credentials.host.clone(),
            port: credentials.port,
            user: credentials.user.clone(),
            credential_ref: credentials.reference(),
            databases,
        })
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn descriptor(&self, database: Option<&str>, table: Option<&str>) -> SourceDescriptor {
        SourceDescriptor::RelationalTable {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            credential_ref: self.credential_ref.clone(),
            database: database.map(str::to_string),
            table: table.map(str::to_string),
        }
    }

    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.driver.list_tables(database).await
    }

    pub async fn fetch_preview(&self, database: &str, table: &str, limit: usize) -> Result<Preview> {
        let description = self.driver.describe_table(database, table).await?;
        let rows = self
            .driver
            .select_rows(database, table, Some(limit))
            .await?
            .into_iter()
            .map(|row| Row::aligned(&description.columns, row.into_inner()))
            .collect();
        Ok(Preview {
            columns: description.columns,
            rows,
        })
    }

    /// Read-modify-write of `column` for every row of the table.
    pub async fn write_column(
        &self,
        database: &str,
        table: &str,
        column: &str,
        transform: &dyn CellTransform,
    ) -> Result<WriteReport> {
        let description = self.driver.describe_table(database, table).await?;
        if !description.columns.iter().any(|c| c == column) {
            return Err(TabulaError::NotFound(format!(
                "Column '{}' not found in {}.{}",
                column, database, table
            )));
        }
        if description.identity == RowIdentity::None {
            return Err(TabulaError::Write(format!(
                "{}.{} has no primary key or row identity; refusing to update rows by position",
                database, table
            )));
        }

        let identity = &description.identity;
        let cells = self.driver.scan_column(database, table, identity, column).await?;
        let mut report = WriteReport::new(cells.len());
        let mut held: HashSet<String> = cells.iter().map(|(key, _)| key.fingerprint()).collect();

        // Transform every row before touching the store.
        let mut in_place = Vec::new();
        let mut moves = Vec::new();
        for (index, (key, value)) in cells.into_iter().enumerate() {
            let updates = match transform.apply(&value) {
                Ok(output) => output.into_updates(column),
                Err(fault) => {
                    report.fail(index, key.to_string(), fault.to_string());
                    continue;
                }
            };
            if let Some(unknown) = updates.keys().find(|k| !description.columns.contains(*k)) {
                report.fail(
                    index,
                    key.to_string(),
                    format!("transform produced unknown column '{}'", unknown),
                );
                continue;
            }
            let planned = PlannedUpdate {
                next_key: key.after(identity, &updates),
                index,
                key,
                updates,
            };
            if planned.next_key.is_some() {
                moves.push(planned);
            } else {
                in_place.push(planned);
            }
        }

        for planned in &in_place {
            self.apply_planned(database, table, identity, planned, &mut report).await;
        }

        // A row may take a new key only once no other row holds it, so a
        // lookup by the old key never lands on a row that was already moved.
        let mut pending = moves;
        loop {
            let mut blocked = Vec::new();
            let mut progressed = false;
            for planned in pending {
                let target = planned.next_key.as_ref().map(RowKey::fingerprint).unwrap_or_default();
                if held.contains(&target) {
                    blocked.push(planned);
                    continue;
                }
                progressed = true;
                if self.apply_planned(database, table, identity, &planned, &mut report).await {
                    held.remove(&planned.key.fingerprint());
                    held.insert(target);
                }
            }
            pending = blocked;
            if !progressed || pending.is_empty() {
                break;
            }
        }
        for planned in pending {
            report.fail(
                planned.index,
                planned.key.to_string(),
                "new key collides with the key of another row",
            );
        }

        report.failures.sort_by_key(|f| f.row);
        Ok(report)
    }

    async fn apply_planned(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        planned: &PlannedUpdate,
        report: &mut WriteReport,
    ) -> bool {
        match self
            .driver
            .update_row(database, table, identity, &planned.key, &planned.updates)
            .await
        {
            Ok(()) => {
                report.succeeded += 1;
                true
            }
            Err(e) => {
                warn!(row = planned.index, key = %planned.key, error = %e, "Row update rejected");
                report.fail(planned.index, planned.key.to_string(), e.to_string());
                false
            }
        }
    }
}

/// One row's updates, resolved before any write.
struct PlannedUpdate {
    index: usize,
    key: RowKey,
    /// Set when the updates change the row's primary key.
    next_key: Option<RowKey>,
    updates: IndexMap<String, CellValue>,
}

/// A table held by [`MemoryRelationalStore`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    columns: Vec<String>,
    primary_key: Vec<String>,
    row_ids: bool,
    rows: Vec<Row>,
    locked: HashSet<usize>,
}

impl MemoryTable {
    /// A table with native row ids and no primary key.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            primary_key: Vec::new(),
            row_ids: true,
            rows: Vec::new(),
            locked: HashSet::new(),
        }
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Drop the native row id, leaving only the primary key (if any).
    pub fn without_row_ids(mut self) -> Self {
        self.row_ids = false;
        self
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        let columns = self.columns.clone();
        self.rows
            .extend(rows.into_iter().map(|r| Row::aligned(&columns, r.into_inner())));
        self
    }

    /// Refuse updates to the rows at these storage positions, as a
    /// constraint or permission failure would.
    pub fn lock_rows(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.locked.extend(positions);
        self
    }

    fn identity(&self) -> RowIdentity {
        if !self.primary_key.is_empty() {
            RowIdentity::PrimaryKey(self.primary_key.clone())
        } else if self.row_ids {
            RowIdentity::RowId
        } else {
            RowIdentity::None
        }
    }

    fn key_of(&self, position: usize, identity: &RowIdentity) -> RowKey {
        match identity {
            RowIdentity::PrimaryKey(columns) => RowKey(
                columns
                    .iter()
                    .map(|c| self.rows[position].get(c).cloned().unwrap_or(CellValue::Null))
                    .collect(),
            ),
            _ => RowKey(vec![CellValue::Integer(position as i64 + 1)]),
        }
    }

    fn position_of(&self, identity: &RowIdentity, key: &RowKey) -> Option<usize> {
        match identity {
            RowIdentity::PrimaryKey(_) => {
                (0..self.rows.len()).find(|&i| &self.key_of(i, identity) == key)
            }
            RowIdentity::RowId => match key.0.as_slice() {
                [CellValue::Integer(id)] if *id >= 1 && (*id as usize) <= self.rows.len() => {
                    Some(*id as usize - 1)
                }
                _ => None,
            },
            RowIdentity::None => None,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    databases: BTreeMap<String, BTreeMap<String, MemoryTable>>,
}

/// In-process relational store. Cloning shares the data.
#[derive(Clone, Default)]
pub struct MemoryRelationalStore {
    state: Arc<Mutex<MemoryState>>,
    login: Option<(String, String)>,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only this user and password.
    pub fn with_login(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = Some((user.into(), password.into()));
        self
    }

    /// Create or replace a table, creating the database if needed.
    pub fn create_table(&self, database: &str, table: &str, data: MemoryTable) -> Result<()> {
        self.state()?
            .databases
            .entry(database.to_string())
            .or_default()
            .insert(table.to_string(), data);
        Ok(())
    }

    pub fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        if let Some(tables) = self.state()?.databases.get_mut(database) {
            tables.remove(table);
        }
        Ok(())
    }

    /// Every row of a table, for inspection.
    pub fn rows(&self, database: &str, table: &str) -> Result<Vec<Row>> {
        let state = self.state()?;
        Ok(lookup(&state, database, table)?.rows.clone())
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| TabulaError::Connection("memory store lock poisoned".to_string()))
    }
}

fn lookup<'a>(state: &'a MemoryState, database: &str, table: &str) -> Result<&'a MemoryTable> {
    state
        .databases
        .get(database)
        .ok_or_else(|| TabulaError::NotFound(format!("Database '{}' not found", database)))?
        .get(table)
        .ok_or_else(|| TabulaError::NotFound(format!("Table '{}.{}' not found", database, table)))
}

#[async_trait]
impl RelationalConnector for MemoryRelationalStore {
    async fn connect(&self, credentials: &RelationalCredentials) -> Result<Box<dyn RelationalDriver>> {
        if let Some((user, password)) = &self.login {
            if &credentials.user != user || &credentials.password != password {
                return Err(TabulaError::Connection(format!(
                    "Access denied for user '{}'",
                    credentials.user
                )));
            }
        }
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl RelationalDriver for MemoryRelationalStore {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.state()?.databases.keys().cloned().collect())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let state = self.state()?;
        let tables = state
            .databases
            .get(database)
            .ok_or_else(|| TabulaError::NotFound(format!("Database '{}' not found", database)))?;
        Ok(tables.keys().cloned().collect())
    }

    async fn describe_table(&self, database: &str, table: &str) -> Result<TableDescription> {
        let state = self.state()?;
        let data = lookup(&state, database, table)?;
        Ok(TableDescription {
            columns: data.columns.clone(),
            identity: data.identity(),
        })
    }

    async fn select_rows(&self, database: &str, table: &str, limit: Option<usize>) -> Result<Vec<Row>> {
        let state = self.state()?;
        let data = lookup(&state, database, table)?;
        let limit = limit.unwrap_or(usize::MAX);
        Ok(data.rows.iter().take(limit).cloned().collect())
    }

    async fn scan_column(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        column: &str,
    ) -> Result<Vec<(RowKey, CellValue)>> {
        let state = self.state()?;
        let data = lookup(&state, database, table)?;
        Ok((0..data.rows.len())
            .map(|i| {
                let value = data.rows[i].get(column).cloned().unwrap_or(CellValue::Null);
                (data.key_of(i, identity), value)
            })
            .collect())
    }

    async fn update_row(
        &self,
        database: &str,
        table: &str,
        identity: &RowIdentity,
        key: &RowKey,
        updates: &IndexMap<String, CellValue>,
    ) -> Result<()> {
        let mut state = self.state()?;
        let data = state
            .databases
            .get_mut(database)
            .and_then(|tables| tables.get_mut(table))
            .ok_or_else(|| TabulaError::NotFound(format!("Table '{}.{}' not found", database, table)))?;

        let position = data
            .position_of(identity, key)
            .ok_or_else(|| TabulaError::Write(format!("Row {} no longer exists", key)))?;
        if data.locked.contains(&position) {
            return Err(TabulaError::Write(format!("Row {} is locked", key)));
        }
        if let Some(unknown) = updates.keys().find(|c| !data.columns.contains(*c)) {
            return Err(TabulaError::Write(format!("Unknown column '{}'", unknown)));
        }
        if let Some(next) = key.after(identity, updates) {
            if data.position_of(identity, &next).is_some() {
                return Err(TabulaError::Write(format!("Duplicate primary key {}", next)));
            }
        }

        for (column, value) in updates {
            data.rows[position].set(column.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformFault, TransformOutput};

    fn credentials() -> RelationalCredentials {
        RelationalCredentials {
            host: "localhost".into(),
            port: 3306,
            user: "app".into(),
            password: "secret".into(),
        }
    }

    fn users() -> MemoryTable {
        MemoryTable::new(["id", "name"])
            .with_primary_key(["id"])
            .with_rows((1..=3).map(|i| {
                Row::from([("id", CellValue::Integer(i)), ("name", format!("user{}", i).into())])
            }))
    }

    fn upper(v: &CellValue) -> std::result::Result<TransformOutput, TransformFault> {
        Ok(TransformOutput::Value(v.to_string().to_uppercase().into()))
    }

    fn bump(v: &CellValue) -> std::result::Result<TransformOutput, TransformFault> {
        match v {
            CellValue::Integer(i) => Ok(TransformOutput::Value(CellValue::Integer(i + 1))),
            other => Err(TransformFault::new(format!("not an integer: {}", other))),
        }
    }

    fn id_name_pairs(store: &MemoryRelationalStore) -> Vec<String> {
        store
            .rows("shop", "users")
            .unwrap()
            .iter()
            .map(|r| format!("{}={}", r.get("name").unwrap(), r.get("id").unwrap()))
            .collect()
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let text = format!("{:?}", credentials());
        assert!(!text.contains("secret"));
        assert!(credentials().reference().starts_with("cred-"));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_login() {
        let store = MemoryRelationalStore::new().with_login("app", "other");
        let err = RelationalSource::connect(&store, &credentials())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TabulaError::Connection(_)));
    }

    #[tokio::test]
    async fn test_preview_and_write_by_primary_key() {
        let store = MemoryRelationalStore::new();
        store.create_table("shop", "users", users()).unwrap();

        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();
        assert_eq!(source.databases(), &["shop".to_string()]);
        assert_eq!(source.list_tables("shop").await.unwrap(), vec!["users"]);

        let preview = source.fetch_preview("shop", "users", 2).await.unwrap();
        assert_eq!(preview.columns, vec!["id", "name"]);
        assert_eq!(preview.rows.len(), 2);

        let report = source.write_column("shop", "users", "name", &upper).await.unwrap();
        assert_eq!((report.attempted, report.succeeded), (3, 3));
        let rows = store.rows("shop", "users").unwrap();
        assert_eq!(rows[2].get("name"), Some(&CellValue::from("USER3")));
    }

    #[tokio::test]
    async fn test_locked_rows_are_reported() {
        let store = MemoryRelationalStore::new();
        store
            .create_table("shop", "users", users().lock_rows([1]))
            .unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        let report = source.write_column("shop", "users", "name", &upper).await.unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "[2]");
    }

    #[tokio::test]
    async fn test_shifting_the_primary_key_updates_each_row_once() {
        let store = MemoryRelationalStore::new();
        store.create_table("shop", "users", users()).unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        let report = source.write_column("shop", "users", "id", &bump).await.unwrap();
        assert_eq!((report.attempted, report.succeeded), (3, 3));
        assert_eq!(id_name_pairs(&store), vec!["user1=2", "user2=3", "user3=4"]);
    }

    #[tokio::test]
    async fn test_primary_key_collisions_are_failed_rows() {
        let store = MemoryRelationalStore::new();
        store.create_table("shop", "users", users()).unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        // Every id maps to 7: the first row takes it, the others cannot.
        let seven = |_: &CellValue| -> std::result::Result<TransformOutput, TransformFault> {
            Ok(TransformOutput::Value(CellValue::Integer(7)))
        };
        let report = source.write_column("shop", "users", "id", &seven).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(id_name_pairs(&store), vec!["user1=7", "user2=2", "user3=3"]);
    }

    #[tokio::test]
    async fn test_swapped_keys_are_not_written() {
        let store = MemoryRelationalStore::new();
        store.create_table("shop", "users", users()).unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        let swap = |v: &CellValue| -> std::result::Result<TransformOutput, TransformFault> {
            Ok(TransformOutput::Value(match v {
                CellValue::Integer(1) => CellValue::Integer(2),
                CellValue::Integer(2) => CellValue::Integer(1),
                other => other.clone(),
            }))
        };
        let report = source.write_column("shop", "users", "id", &swap).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.iter().map(|f| f.row).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(id_name_pairs(&store), vec!["user1=1", "user2=2", "user3=3"]);
    }

    #[tokio::test]
    async fn test_table_without_identity_is_refused() {
        let store = MemoryRelationalStore::new();
        store
            .create_table(
                "shop",
                "log",
                MemoryTable::new(["line"])
                    .without_row_ids()
                    .with_rows([Row::from([("line", "a".into())])]),
            )
            .unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        let err = source.write_column("shop", "log", "line", &upper).await.unwrap_err();
        assert!(matches!(err, TabulaError::Write(_)));
        assert_eq!(
            store.rows("shop", "log").unwrap()[0].get("line"),
            Some(&CellValue::from("a"))
        );
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let store = MemoryRelationalStore::new();
        store.create_table("shop", "users", users()).unwrap();
        let source = RelationalSource::connect(&store, &credentials()).await.unwrap();

        let err = source.fetch_preview("shop", "orders", 10).await.unwrap_err();
        assert!(matches!(err, TabulaError::NotFound(_)));
    }
}
