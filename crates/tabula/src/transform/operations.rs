//! Per-cell transform contract and the audit of an applied preview.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::table::{CellValue, Row};

/// What a transform produced for one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutput {
    /// Replacement value for the transformed column.
    Value(CellValue),
    /// A derived row fragment: column name to new value. Every key must be
    /// an existing column.
    Fields(IndexMap<String, CellValue>),
}

impl TransformOutput {
    /// The cell updates this output implies for a row whose `column` was
    /// transformed.
    pub fn into_updates(self, column: &str) -> IndexMap<String, CellValue> {
        match self {
            TransformOutput::Value(value) => {
                let mut updates = IndexMap::with_capacity(1);
                updates.insert(column.to_string(), value);
                updates
            }
            TransformOutput::Fields(fields) => fields,
        }
    }
}

/// A transform raised an error or returned something unusable for one cell.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransformFault(pub String);

impl TransformFault {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// A pure `(value) -> value` function applied to every cell of a column.
///
/// Implementations must be shareable across the writes of a commit, which
/// may await between cells.
pub trait CellTransform: Send + Sync {
    fn apply(&self, value: &CellValue) -> Result<TransformOutput, TransformFault>;
}

impl<F> CellTransform for F
where
    F: Fn(&CellValue) -> Result<TransformOutput, TransformFault> + Send + Sync,
{
    fn apply(&self, value: &CellValue) -> Result<TransformOutput, TransformFault> {
        self(value)
    }
}

/// Result of applying a transform to the preview.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformResult {
    /// Number of rows with at least one changed cell.
    pub rows_modified: usize,

    /// Changes per column, in column order.
    pub changes: Vec<TransformChange>,
}

/// All changes made to one column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformChange {
    /// Column affected.
    pub column: String,

    /// Number of values changed.
    pub values_changed: usize,

    /// Per-row audit information.
    pub row_audits: Vec<RowAudit>,
}

/// Audit information for a single cell change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowAudit {
    /// Row index (0-based).
    pub row: usize,

    /// Original value before transformation.
    pub original_value: String,

    /// New value after transformation.
    pub new_value: String,
}

impl TransformResult {
    /// Compare two equally long row sets cell by cell.
    pub fn diff(columns: &[String], before: &[Row], after: &[Row]) -> Self {
        let mut changes: Vec<TransformChange> = columns
            .iter()
            .map(|c| TransformChange {
                column: c.clone(),
                values_changed: 0,
                row_audits: Vec::new(),
            })
            .collect();
        let mut rows_modified = 0;

        for (index, (old, new)) in before.iter().zip(after).enumerate() {
            let mut row_changed = false;
            for change in changes.iter_mut() {
                let original = old.get(&change.column);
                let updated = new.get(&change.column);
                if original != updated {
                    row_changed = true;
                    change.values_changed += 1;
                    change.row_audits.push(RowAudit {
                        row: index,
                        original_value: original.map(|v| v.to_string()).unwrap_or_default(),
                        new_value: updated.map(|v| v.to_string()).unwrap_or_default(),
                    });
                }
            }
            if row_changed {
                rows_modified += 1;
            }
        }

        changes.retain(|c| c.values_changed > 0);
        Self {
            rows_modified,
            changes,
        }
    }

    /// Total number of changed cells.
    pub fn values_changed(&self) -> usize {
        self.changes.iter().map(|c| c.values_changed).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_output_targets_column() {
        let updates = TransformOutput::Value("X".into()).into_updates("name");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates.get("name"), Some(&CellValue::from("X")));
    }

    #[test]
    fn test_closure_is_a_cell_transform() {
        let upper = |v: &CellValue| -> Result<TransformOutput, TransformFault> {
            Ok(TransformOutput::Value(v.to_string().to_uppercase().into()))
        };
        let out = upper.apply(&"abc".into()).unwrap();
        assert_eq!(out, TransformOutput::Value("ABC".into()));
    }

    #[test]
    fn test_diff_reports_changed_cells() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let before = vec![
            Row::from([("id", 1i64.into()), ("name", "alice".into())]),
            Row::from([("id", 2i64.into()), ("name", "BOB".into())]),
        ];
        let after = vec![
            Row::from([("id", 1i64.into()), ("name", "ALICE".into())]),
            Row::from([("id", 2i64.into()), ("name", "BOB".into())]),
        ];

        let result = TransformResult::diff(&columns, &before, &after);
        assert_eq!(result.rows_modified, 1);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].column, "name");
        assert_eq!(result.changes[0].row_audits[0].original_value, "alice");
        assert_eq!(result.changes[0].row_audits[0].new_value, "ALICE");
        assert_eq!(result.values_changed(), 1);
    }
}
