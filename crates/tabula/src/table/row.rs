//! Rows and row-set helpers.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::value::CellValue;

/// A single data row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, CellValue>);

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Build a row that has exactly `columns`, filling gaps with `Null`.
    pub fn aligned(columns: &[String], mut values: IndexMap<String, CellValue>) -> Self {
        let mut row = IndexMap::with_capacity(columns.len());
        for column in columns {
            let value = values.swap_remove(column).unwrap_or(CellValue::Null);
            row.insert(column.clone(), value);
        }
        Self(row)
    }

    /// Get a cell by column name.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.0.get(column)
    }

    /// Set a cell, appending the column if it is new.
    pub fn set(&mut self, column: impl Into<String>, value: CellValue) {
        self.0.insert(column.into(), value);
    }

    /// Whether the row has the column.
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Iterate over (column, value) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the row into its underlying map.
    pub fn into_inner(self) -> IndexMap<String, CellValue> {
        self.0
    }
}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, CellValue); N]> for Row {
    fn from(cells: [(&str, CellValue); N]) -> Self {
        cells
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// Columns whose values differ between two equally long row sets.
///
/// A column counts as changed when it is missing on one side or any row
/// holds a different value.
pub fn changed_columns(pristine: &[Row], working: &[Row]) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (before, after) in pristine.iter().zip(working) {
        for (column, value) in after.iter() {
            if before.get(column) != Some(value) {
                changed.insert(column.to_string());
            }
        }
        for column in before.columns() {
            if !after.contains(column) {
                changed.insert(column.to_string());
            }
        }
    }
    changed
}

/// Render rows as delimited text with a header row.
///
/// Column order follows `columns`; every value is stringified.
pub fn write_delimited(columns: &[String], rows: &[Row], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(columns)?;
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::error::TabulaError::Write(format!("Failed to flush export: {}", e)))
}
