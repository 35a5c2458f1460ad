//! Preview engine: runs a spec's code over the preview rows.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Result, TabulaError};
use crate::table::{changed_columns, CellValue, Row};

use super::operations::{CellTransform, TransformResult};
use super::sandbox::{LuaTransform, SandboxLimits};
use super::spec::TransformSpec;

/// Rows produced by an apply, with what changed relative to the input.
#[derive(Debug, Clone)]
pub struct PreviewOutcome {
    pub rows: Vec<Row>,
    pub changed_columns: BTreeSet<String>,
    pub result: TransformResult,
}

/// Engine for applying generated code to in-memory rows.
#[derive(Debug, Clone, Default)]
pub struct PreviewEngine {
    limits: SandboxLimits,
}

impl PreviewEngine {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Compile the code of an executable spec.
    pub fn compile(&self, spec: &TransformSpec) -> Result<LuaTransform> {
        let code = match (&spec.classification, &spec.code) {
            (Some(_), Some(code)) => code,
            _ => {
                return Err(TabulaError::Precondition(format!(
                    "the transform for '{}' needs a classification and generated code",
                    spec.column
                )));
            }
        };
        LuaTransform::compile(code, self.limits)
    }

    /// Apply a spec to `base`, which must be the pristine rows.
    ///
    /// Returns fresh rows; `base` is never modified, so a failure on any
    /// row leaves the caller's snapshot untouched.
    pub fn apply(&self, spec: &TransformSpec, columns: &[String], base: &[Row]) -> Result<PreviewOutcome> {
        let transform = self.compile(spec)?;
        self.apply_with(&transform, &spec.column, columns, base)
    }

    /// Apply an already compiled transform to `column` of every row.
    pub fn apply_with(
        &self,
        transform: &dyn CellTransform,
        column: &str,
        columns: &[String],
        base: &[Row],
    ) -> Result<PreviewOutcome> {
        if !columns.iter().any(|c| c == column) {
            return Err(TabulaError::NotFound(format!("Column '{}' not found", column)));
        }

        let mut rows = Vec::with_capacity(base.len());
        for (index, row) in base.iter().enumerate() {
            let value = row.get(column).cloned().unwrap_or(CellValue::Null);
            let updates = transform
                .apply(&value)
                .map_err(|fault| TabulaError::at_row(index, fault.0))?
                .into_updates(column);

            let mut next = row.clone();
            for (name, value) in updates {
                if !columns.contains(&name) {
                    return Err(TabulaError::at_row(
                        index,
                        format!("transform produced unknown column '{}'", name),
                    ));
                }
                next.set(name, value);
            }
            rows.push(next);
        }

        let changed = changed_columns(base, &rows);
        let result = TransformResult::diff(columns, base, &rows);
        debug!(
            column,
            rows = rows.len(),
            changed_values = result.values_changed(),
            "Applied transform to preview"
        );

        Ok(PreviewOutcome {
            rows,
            changed_columns: changed,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Classification, Example};

    fn spec(code: &str) -> TransformSpec {
        let mut spec = TransformSpec::new("name", vec![Example::new("alice", "ALICE")]);
        spec.classification = Some(Classification::new("uppercase"));
        spec.code = Some(code.to_string());
        spec
    }

    fn rows() -> (Vec<String>, Vec<Row>) {
        (
            vec!["name".to_string(), "city".to_string()],
            vec![
                Row::from([("name", "alice".into()), ("city", "nyc".into())]),
                Row::from([("name", "bob".into()), ("city", "la".into())]),
            ],
        )
    }

    #[test]
    fn test_apply_uppercase() {
        let (columns, base) = rows();
        let outcome = PreviewEngine::default()
            .apply(&spec("function transform(x) return x:upper() end"), &columns, &base)
            .unwrap();

        assert_eq!(outcome.rows[0].get("name"), Some(&CellValue::from("ALICE")));
        assert_eq!(outcome.rows[1].get("name"), Some(&CellValue::from("BOB")));
        assert_eq!(outcome.changed_columns.into_iter().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(outcome.result.rows_modified, 2);
    }

    #[test]
    fn test_derived_fields_show_in_changed_columns() {
        let (columns, base) = rows();
        let outcome = PreviewEngine::default()
            .apply(
                &spec("function transform(x) return { name = x:upper(), city = 'moved' } end"),
                &columns,
                &base,
            )
            .unwrap();
        assert_eq!(
            outcome.changed_columns.into_iter().collect::<Vec<_>>(),
            vec!["city", "name"]
        );
    }

    #[test]
    fn test_unknown_derived_column_aborts() {
        let (columns, base) = rows();
        let err = PreviewEngine::default()
            .apply(&spec("function transform(x) return { extra = 1 } end"), &columns, &base)
            .unwrap_err();
        assert!(matches!(err, TabulaError::TransformExecution { .. }));
    }

    #[test]
    fn test_failure_reports_row_index() {
        let (columns, base) = rows();
        let code = "function transform(x) if x == 'bob' then error('boom') end return x end";
        let err = PreviewEngine::default()
            .apply(&spec(code), &columns, &base)
            .unwrap_err();
        match err {
            TabulaError::TransformExecution { row, cause } => {
                assert_eq!(row.0, Some(1));
                assert!(cause.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_spec_without_code_is_rejected() {
        let (columns, base) = rows();
        let mut s = spec("");
        s.code = None;
        let err = PreviewEngine::default().apply(&s, &columns, &base).unwrap_err();
        assert!(matches!(err, TabulaError::Precondition(_)));
    }
}
