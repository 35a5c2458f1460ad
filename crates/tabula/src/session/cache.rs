//! Pristine and working snapshots of the active container.

use crate::error::{Result, TabulaError};
use crate::source::Preview;
use crate::table::Row;

/// Column list plus two copies of the sampled rows.
///
/// The pristine copy is written only by [`SnapshotCache::load`]; every
/// other operation works on the working copy, which always has the same
/// length and column set.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache {
    columns: Vec<String>,
    pristine: Option<Vec<Row>>,
    working: Vec<Row>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a freshly fetched preview. The working copy
    /// is a separate clone of the rows.
    pub fn load(&mut self, preview: Preview) {
        self.working = preview.rows.clone();
        self.pristine = Some(preview.rows);
        self.columns = preview.columns;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn has_snapshot(&self) -> bool {
        self.pristine.is_some()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// The untouched rows.
    pub fn pristine(&self) -> Result<&[Row]> {
        self.pristine.as_deref().ok_or(TabulaError::NoSnapshot)
    }

    /// An owned copy of the untouched rows.
    pub fn snapshot_pristine(&self) -> Result<Vec<Row>> {
        self.pristine().map(<[Row]>::to_vec)
    }

    pub fn working(&self) -> &[Row] {
        &self.working
    }

    /// Install rows produced from the pristine copy.
    pub fn set_working(&mut self, rows: Vec<Row>) {
        debug_assert_eq!(
            rows.len(),
            self.working.len(),
            "working rows must keep the snapshot length"
        );
        self.working = rows;
    }

    /// Restore the working copy from the pristine one.
    pub fn revert(&mut self) -> Result<()> {
        self.working = self.snapshot_pristine()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;

    fn preview() -> Preview {
        Preview {
            columns: vec!["name".to_string()],
            rows: vec![
                Row::from([("name", "alice".into())]),
                Row::from([("name", "bob".into())]),
            ],
        }
    }

    #[test]
    fn test_revert_without_snapshot() {
        let mut cache = SnapshotCache::new();
        assert!(matches!(cache.revert(), Err(TabulaError::NoSnapshot)));
        assert!(matches!(cache.pristine(), Err(TabulaError::NoSnapshot)));
    }

    #[test]
    fn test_working_does_not_alias_pristine() {
        let mut cache = SnapshotCache::new();
        cache.load(preview());

        let mut rows = cache.working().to_vec();
        rows[0].set("name", CellValue::from("ALICE"));
        cache.set_working(rows);

        assert_eq!(cache.pristine().unwrap()[0].get("name"), Some(&CellValue::from("alice")));
        cache.revert().unwrap();
        assert_eq!(cache.working()[0].get("name"), Some(&CellValue::from("alice")));
    }

    #[test]
    fn test_load_replaces_columns() {
        let mut cache = SnapshotCache::new();
        cache.load(preview());
        assert!(cache.has_column("name"));
        cache.load(Preview {
            columns: vec!["id".to_string()],
            rows: vec![],
        });
        assert!(!cache.has_column("name"));
        assert!(cache.working().is_empty());
    }
}
