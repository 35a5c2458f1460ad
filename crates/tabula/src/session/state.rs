//! The per-user session aggregate and its lifecycle phases.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{Result, TabulaError};
use crate::source::{SourceAdapter, SourceDescriptor};
use crate::table::Row;
use crate::transform::{Example, TransformSpec};

use super::cache::SnapshotCache;
use super::commit::CommitOutcome;

/// Where a session is in the column-transform lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoSource,
    SourceConnected,
    ContainerSelected,
    ColumnSelected,
    ExamplesProvided,
    Classified,
    CodeGenerated,
    PreviewApplied,
    Reverted,
    Committed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::NoSource => "no source",
            SessionPhase::SourceConnected => "source connected",
            SessionPhase::ContainerSelected => "container selected",
            SessionPhase::ColumnSelected => "column selected",
            SessionPhase::ExamplesProvided => "examples provided",
            SessionPhase::Classified => "classified",
            SessionPhase::CodeGenerated => "code generated",
            SessionPhase::PreviewApplied => "preview applied",
            SessionPhase::Reverted => "reverted",
            SessionPhase::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// One user's workflow state.
///
/// Fields are only changed through [`crate::session::Workflow`], which keeps
/// the snapshot and spec invariants.
pub struct Session {
    pub(crate) user: String,
    pub(crate) source: Option<SourceAdapter>,
    pub(crate) container: Option<String>,
    pub(crate) sub_container: Option<String>,
    pub(crate) cache: SnapshotCache,
    pub(crate) selected_column: Option<String>,
    pub(crate) examples: Vec<Example>,
    pub(crate) spec: Option<TransformSpec>,
    pub(crate) applied_columns: BTreeSet<String>,
    pub(crate) committed: bool,
    pub(crate) phase: SessionPhase,
    pub(crate) last_commit: Option<CommitOutcome>,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            source: None,
            container: None,
            sub_container: None,
            cache: SnapshotCache::new(),
            selected_column: None,
            examples: Vec::new(),
            spec: None,
            applied_columns: BTreeSet::new(),
            committed: false,
            phase: SessionPhase::NoSource,
            last_commit: None,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn source(&self) -> Option<&SourceAdapter> {
        self.source.as_ref()
    }

    /// Descriptor of the connected source with the current selection.
    pub fn descriptor(&self) -> Option<SourceDescriptor> {
        self.source
            .as_ref()
            .map(|s| s.descriptor(self.container.as_deref(), self.sub_container.as_deref()))
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn sub_container(&self) -> Option<&str> {
        self.sub_container.as_deref()
    }

    pub fn columns(&self) -> &[String] {
        self.cache.columns()
    }

    pub fn pristine_rows(&self) -> Result<&[Row]> {
        self.cache.pristine()
    }

    pub fn working_rows(&self) -> &[Row] {
        self.cache.working()
    }

    pub fn selected_column(&self) -> Option<&str> {
        self.selected_column.as_deref()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn spec(&self) -> Option<&TransformSpec> {
        self.spec.as_ref()
    }

    pub fn applied_columns(&self) -> &BTreeSet<String> {
        &self.applied_columns
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    pub fn last_commit(&self) -> Option<&CommitOutcome> {
        self.last_commit.as_ref()
    }

    /// Serializable summary of the session.
    pub fn view(&self) -> SessionView {
        SessionView {
            user: self.user.clone(),
            phase: self.phase,
            source: self.descriptor(),
            columns: self.cache.columns().to_vec(),
            rows: self.cache.working().to_vec(),
            selected_column: self.selected_column.clone(),
            examples: self.examples.clone(),
            spec: self.spec.clone(),
            applied_columns: self.applied_columns.clone(),
            committed: self.committed,
            last_commit: self.last_commit.clone(),
        }
    }

    pub(crate) fn source_mut(&mut self) -> Result<&mut SourceAdapter> {
        self.source
            .as_mut()
            .ok_or_else(|| TabulaError::Precondition("connect a source first".to_string()))
    }

    pub(crate) fn require_source(&self) -> Result<&SourceAdapter> {
        self.source
            .as_ref()
            .ok_or_else(|| TabulaError::Precondition("connect a source first".to_string()))
    }

    pub(crate) fn require_column(&self) -> Result<&str> {
        self.selected_column
            .as_deref()
            .ok_or_else(|| TabulaError::Precondition("select a column first".to_string()))
    }

    /// Drop the transform spec and any preview built from it.
    pub(crate) fn discard_spec(&mut self) {
        self.spec = None;
        self.discard_preview();
    }

    /// Put the working rows back to pristine and forget the applied state.
    pub(crate) fn discard_preview(&mut self) {
        if self.cache.has_snapshot() {
            // Cannot fail once a snapshot exists
            let _ = self.cache.revert();
        }
        self.applied_columns.clear();
        self.committed = false;
    }

    /// Forget everything tied to the current container.
    pub(crate) fn reset_selection(&mut self) {
        self.cache.clear();
        self.selected_column = None;
        self.examples.clear();
        self.spec = None;
        self.applied_columns.clear();
        self.committed = false;
        self.last_commit = None;
    }
}

/// Snapshot of a session for callers outside the library.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub user: String,
    pub phase: SessionPhase,
    pub source: Option<SourceDescriptor>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub selected_column: Option<String>,
    pub examples: Vec<Example>,
    pub spec: Option<TransformSpec>,
    pub applied_columns: BTreeSet<String>,
    pub committed: bool,
    pub last_commit: Option<CommitOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("alice");
        assert_eq!(session.phase(), SessionPhase::NoSource);
        assert!(session.descriptor().is_none());
        assert!(session.columns().is_empty());
        assert!(matches!(session.pristine_rows(), Err(TabulaError::NoSnapshot)));
        assert!(matches!(session.require_source(), Err(TabulaError::Precondition(_))));
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionPhase::PreviewApplied).unwrap(),
            "\"preview_applied\""
        );
        assert_eq!(SessionPhase::Committed.to_string(), "committed");
    }
}
