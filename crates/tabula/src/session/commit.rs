//! Writing the active transformation back to the backing store.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TabulaError};
use crate::source::RowFailure;
use crate::transform::PreviewEngine;

use super::state::{Session, SessionPhase};

/// Non-fatal condition reported with a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitWarning {
    /// Some rows were not written; the commit still counts as done.
    PartialCommit { attempted: usize, succeeded: usize },
}

/// What a commit did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub affected_row_count: usize,
    pub warnings: Vec<CommitWarning>,
    /// Rows that were not written, for a targeted retry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RowFailure>,
}

impl CommitOutcome {
    pub fn is_partial(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, CommitWarning::PartialCommit { .. }))
    }
}

/// Applies a finalized spec to the full container and reconciles the
/// session with the store afterwards.
#[derive(Debug, Clone)]
pub struct CommitCoordinator {
    engine: PreviewEngine,
    preview_limit: usize,
}

impl CommitCoordinator {
    pub fn new(engine: PreviewEngine, preview_limit: usize) -> Self {
        Self {
            engine,
            preview_limit,
        }
    }

    fn check_ready(session: &Session) -> Result<()> {
        if session.committed {
            return Err(TabulaError::Precondition(
                "this transformation has already been committed".to_string(),
            ));
        }
        match &session.spec {
            Some(spec) if spec.is_executable() => {}
            _ => {
                return Err(TabulaError::Precondition(
                    "generate code for the column before committing".to_string(),
                ));
            }
        }
        if session.applied_columns.is_empty() {
            return Err(TabulaError::Precondition(
                "apply the transformation to the preview before committing".to_string(),
            ));
        }
        Ok(())
    }

    /// Write the transformed column across the whole container.
    ///
    /// On a write error nothing in the session changes. Once the write has
    /// happened the session is committed, even if the follow-up refresh
    /// fails; that error is still returned.
    pub async fn commit(&self, session: &mut Session) -> Result<CommitOutcome> {
        Self::check_ready(session)?;
        let Some(spec) = session.spec.clone() else {
            return Err(TabulaError::Precondition("no transformation to commit".to_string()));
        };
        let transform = self.engine.compile(&spec)?;

        let container = session.container.clone();
        let sub_container = session.sub_container.clone();
        let report = session
            .source_mut()?
            .write_column(
                container.as_deref(),
                sub_container.as_deref(),
                &spec.column,
                &transform,
            )
            .await?;

        let mut warnings = Vec::new();
        if report.is_partial() {
            warn!(
                user = %session.user,
                column = %spec.column,
                attempted = report.attempted,
                succeeded = report.succeeded,
                "Partial commit"
            );
            for failure in report.failures.iter().take(10) {
                warn!(key = %failure.key, cause = %failure.cause, "Row not written");
            }
            warnings.push(CommitWarning::PartialCommit {
                attempted: report.attempted,
                succeeded: report.succeeded,
            });
        }
        let outcome = CommitOutcome {
            affected_row_count: report.succeeded,
            warnings,
            failures: report.failures,
        };

        session.committed = true;
        session.phase = SessionPhase::Committed;
        session.last_commit = Some(outcome.clone());
        info!(
            user = %session.user,
            column = %spec.column,
            rows = outcome.affected_row_count,
            "Committed transformation"
        );

        let preview = session
            .require_source()?
            .fetch_preview(container.as_deref(), sub_container.as_deref(), self.preview_limit)
            .await?;
        session.cache.load(preview);
        session.applied_columns.clear();

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_flag() {
        let outcome = CommitOutcome {
            affected_row_count: 97,
            warnings: vec![CommitWarning::PartialCommit {
                attempted: 100,
                succeeded: 97,
            }],
            failures: Vec::new(),
        };
        assert!(outcome.is_partial());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["warnings"][0]["kind"], "partial_commit");
        assert!(json.get("failures").is_none());
    }

    #[tokio::test]
    async fn test_commit_requires_source_and_spec() {
        let coordinator = CommitCoordinator::new(PreviewEngine::default(), 10);
        let mut session = Session::new("u");
        let err = coordinator.commit(&mut session).await.unwrap_err();
        assert!(matches!(err, TabulaError::Precondition(_)));
        assert!(!session.committed());
    }
}
