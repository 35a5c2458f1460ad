//! Tabular data model shared by every source.

mod row;
mod value;

pub use row::{changed_columns, write_delimited, Row};
pub use value::CellValue;
