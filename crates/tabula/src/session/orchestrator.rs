//! The transformation workflow: every operation a user can perform on a
//! session, with the state rules between them.
//!
//! A [`Workflow`] holds the shared services (synthesizer, preview engine,
//! drivers) and no per-user state; each call takes the [`Session`] it acts
//! on. Operations validate their preconditions and do all fallible work
//! before touching the session, so a failed call leaves it as it was.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::TabulaConfig;
use crate::error::{Result, TabulaError};
use crate::input::Parser;
use crate::llm::provider_from_settings;
use crate::source::{
    DocumentConnector, DocumentRouter, DocumentSource, FileArtifact, FileSource, JsonDirConnector,
    MemoryDocumentStore, MemoryRelationalStore, Preview, RelationalConnector,
    RelationalCredentials, RelationalSource, SourceAdapter, SourceDescriptor, SqliteConnector,
};
use crate::synthesis::{Synthesizer, TransformSynthesizer};
use crate::table::write_delimited;
use crate::transform::{Classification, Example, PreviewEngine, TransformResult, TransformSpec};

use super::commit::{CommitCoordinator, CommitOutcome};
use super::state::{Session, SessionPhase};

/// Result of applying the active transformation to the preview.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPreview {
    pub changed_columns: BTreeSet<String>,
    pub result: TransformResult,
}

/// Shared services behind every session.
pub struct Workflow {
    synthesizer: Arc<dyn TransformSynthesizer>,
    engine: PreviewEngine,
    parser: Parser,
    relational: Arc<dyn RelationalConnector>,
    documents: Arc<dyn DocumentConnector>,
    preview_limit: usize,
}

impl Workflow {
    /// Workflow with in-memory drivers and default limits.
    pub fn new(synthesizer: Arc<dyn TransformSynthesizer>) -> Self {
        Self {
            synthesizer,
            engine: PreviewEngine::default(),
            parser: Parser::new(),
            relational: Arc::new(MemoryRelationalStore::new()),
            documents: Arc::new(DocumentRouter::new().with(MemoryDocumentStore::new())),
            preview_limit: crate::config::PreviewSettings::default().limit,
        }
    }

    /// Build every service from configuration.
    ///
    /// Relational sources use SQLite files when `sources.sqlite_dir` is set
    /// and an in-memory store otherwise. Document URIs may use `memory://`
    /// or `jsondir://`.
    pub fn from_config(config: &TabulaConfig) -> Result<Self> {
        let engine = PreviewEngine::new(config.sandbox.clone().into());
        let provider = provider_from_settings(&config.llm)?;
        let synthesizer = Arc::new(Synthesizer::new(provider, engine.limits()));

        let relational: Arc<dyn RelationalConnector> = match &config.sources.sqlite_dir {
            Some(dir) => Arc::new(SqliteConnector::new(dir)),
            None => Arc::new(MemoryRelationalStore::new()),
        };
        let jsondir = match &config.sources.document_dir {
            Some(dir) => JsonDirConnector::with_base(dir),
            None => JsonDirConnector::new(),
        };
        let documents = DocumentRouter::new()
            .with(MemoryDocumentStore::new())
            .with(jsondir);

        Ok(Self::new(synthesizer)
            .with_engine(engine)
            .with_relational(relational)
            .with_documents(Arc::new(documents))
            .with_preview_limit(config.preview.limit))
    }

    pub fn with_engine(mut self, engine: PreviewEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_relational(mut self, connector: Arc<dyn RelationalConnector>) -> Self {
        self.relational = connector;
        self
    }

    pub fn with_documents(mut self, connector: Arc<dyn DocumentConnector>) -> Self {
        self.documents = connector;
        self
    }

    pub fn with_preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit;
        self
    }

    pub fn preview_limit(&self) -> usize {
        self.preview_limit
    }

    pub fn synthesizer(&self) -> &dyn TransformSynthesizer {
        self.synthesizer.as_ref()
    }

    // =========================================================================
    // Sources and containers
    // =========================================================================

    /// Parse an uploaded file. A file is its own container, so its preview
    /// is loaded straight away.
    pub async fn connect_file(&self, session: &mut Session, name: &str, contents: &[u8]) -> Result<SourceDescriptor> {
        let source = FileSource::connect(name, contents, &self.parser)?;
        let preview = source.fetch_preview(self.preview_limit);
        let descriptor = source.descriptor();

        session.reset_selection();
        session.source = Some(SourceAdapter::File(source));
        session.container = None;
        session.sub_container = None;
        session.cache.load(preview);
        session.phase = SessionPhase::ContainerSelected;
        info!(user = %session.user, file = name, rows = session.cache.working().len(), "Connected file source");
        Ok(descriptor)
    }

    /// Connect to a relational server and list its databases.
    pub async fn connect_relational(
        &self,
        session: &mut Session,
        credentials: &RelationalCredentials,
    ) -> Result<Vec<String>> {
        let source = RelationalSource::connect(self.relational.as_ref(), credentials).await?;
        let databases = source.databases().to_vec();
        self.install(session, SourceAdapter::Relational(source));
        info!(user = %session.user, host = %credentials.host, databases = databases.len(), "Connected relational source");
        Ok(databases)
    }

    /// Connect to a document store and list its databases.
    pub async fn connect_document(&self, session: &mut Session, uri: &str) -> Result<Vec<String>> {
        let source = DocumentSource::connect(self.documents.as_ref(), uri).await?;
        let databases = source.databases().to_vec();
        self.install(session, SourceAdapter::Document(source));
        info!(user = %session.user, databases = databases.len(), "Connected document source");
        Ok(databases)
    }

    fn install(&self, session: &mut Session, source: SourceAdapter) {
        session.reset_selection();
        session.source = Some(source);
        session.container = None;
        session.sub_container = None;
        session.phase = SessionPhase::SourceConnected;
    }

    /// Tables or collections of a database. Empty for files.
    pub async fn list_sub_containers(&self, session: &Session, container: &str) -> Result<Vec<String>> {
        session.require_source()?.list_sub_containers(container).await
    }

    /// Select a table or collection (ignored for files, which reload) and
    /// fetch its preview. All transformation state is reset.
    pub async fn select_container(
        &self,
        session: &mut Session,
        container: Option<&str>,
        sub_container: Option<&str>,
    ) -> Result<Preview> {
        let source = session.require_source()?;
        let (container, sub_container) = if source.is_hierarchical() {
            match (container, sub_container) {
                (Some(c), Some(s)) => (Some(c.to_string()), Some(s.to_string())),
                _ => {
                    return Err(TabulaError::Precondition(
                        "a database and a table or collection must be selected".to_string(),
                    ));
                }
            }
        } else {
            (None, None)
        };

        let preview = source
            .fetch_preview(container.as_deref(), sub_container.as_deref(), self.preview_limit)
            .await?;

        session.reset_selection();
        session.container = container;
        session.sub_container = sub_container;
        session.cache.load(preview.clone());
        session.phase = SessionPhase::ContainerSelected;
        info!(
            user = %session.user,
            container = session.container.as_deref().unwrap_or("-"),
            sub_container = session.sub_container.as_deref().unwrap_or("-"),
            rows = preview.rows.len(),
            "Selected container"
        );
        Ok(preview)
    }

    // =========================================================================
    // Spec building
    // =========================================================================

    /// Choose the column to transform. Discards the current spec.
    pub fn select_column(&self, session: &mut Session, column: &str) -> Result<()> {
        if !session.cache.has_snapshot() {
            return Err(TabulaError::Precondition("select a container first".to_string()));
        }
        if !session.cache.has_column(column) {
            return Err(TabulaError::NotFound(format!("Column '{}' not found", column)));
        }

        session.discard_spec();
        session.selected_column = Some(column.to_string());
        session.examples.clear();
        session.phase = SessionPhase::ColumnSelected;
        debug!(user = %session.user, column, "Selected column");
        Ok(())
    }

    /// Replace the example pairs. Discards the current spec.
    pub fn set_examples(&self, session: &mut Session, examples: Vec<Example>) -> Result<()> {
        session.require_column()?;
        session.discard_spec();
        session.phase = if examples.is_empty() {
            SessionPhase::ColumnSelected
        } else {
            SessionPhase::ExamplesProvided
        };
        debug!(user = %session.user, examples = examples.len(), "Set examples");
        session.examples = examples;
        Ok(())
    }

    /// Infer a classification for the current examples and start a new spec.
    pub async fn classify(&self, session: &mut Session) -> Result<Classification> {
        let column = session.require_column()?.to_string();
        if session.examples.is_empty() {
            return Err(TabulaError::InsufficientData(format!(
                "provide at least one example for '{}'",
                column
            )));
        }

        let classification = self.synthesizer.classify(&column, &session.examples).await?;

        session.discard_spec();
        let mut spec = TransformSpec::new(column.clone(), session.examples.clone());
        spec.classification = Some(classification.clone());
        session.spec = Some(spec);
        session.phase = SessionPhase::Classified;
        info!(user = %session.user, column = %column, classification = %classification, "Classified transformation");
        Ok(classification)
    }

    /// Generate code for the classified spec.
    pub async fn generate(&self, session: &mut Session) -> Result<String> {
        let (column, examples, classification) = match &session.spec {
            Some(TransformSpec {
                column,
                examples,
                classification: Some(classification),
                ..
            }) => (column.clone(), examples.clone(), classification.clone()),
            _ => {
                return Err(TabulaError::Precondition(
                    "classify the examples before generating code".to_string(),
                ));
            }
        };

        let code = self
            .synthesizer
            .generate(&column, &examples, &classification)
            .await?;

        session.discard_preview();
        if let Some(spec) = session.spec.as_mut() {
            spec.code = Some(code.clone());
        }
        session.phase = SessionPhase::CodeGenerated;
        info!(user = %session.user, column = %column, synthesizer = self.synthesizer.name(), "Generated transform code");
        Ok(code)
    }

    // =========================================================================
    // Preview, revert and commit
    // =========================================================================

    /// Run the active transformation over the pristine rows and install the result as the
    /// working rows. On failure the working rows are left untouched.
    pub fn apply_preview(&self, session: &mut Session) -> Result<AppliedPreview> {
        if session.committed {
            return Err(TabulaError::Precondition(
                "the transformation is already committed; select a column or edit the examples to start a new one"
                    .to_string(),
            ));
        }
        let spec = session.spec.as_ref().ok_or_else(|| {
            TabulaError::Precondition("generate code before applying".to_string())
        })?;

        let outcome = self
            .engine
            .apply(spec, session.cache.columns(), session.cache.pristine()?)?;

        session.cache.set_working(outcome.rows);
        session.applied_columns = outcome.changed_columns.clone();
        session.phase = SessionPhase::PreviewApplied;
        info!(
            user = %session.user,
            rows_modified = outcome.result.rows_modified,
            changed = ?session.applied_columns,
            "Applied transformation to preview"
        );
        Ok(AppliedPreview {
            changed_columns: outcome.changed_columns,
            result: outcome.result,
        })
    }

    /// Restore the working rows from the pristine snapshot.
    pub fn revert(&self, session: &mut Session) -> Result<()> {
        session.cache.revert()?;
        session.applied_columns.clear();
        if session.phase == SessionPhase::PreviewApplied {
            session.phase = SessionPhase::Reverted;
        }
        debug!(user = %session.user, "Reverted preview");
        Ok(())
    }

    /// Write the applied spec to the backing store.
    pub async fn commit(&self, session: &mut Session) -> Result<CommitOutcome> {
        CommitCoordinator::new(self.engine.clone(), self.preview_limit)
            .commit(session)
            .await
    }

    // =========================================================================
    // Exports
    // =========================================================================

    /// CSV of the working rows, values stringified.
    pub fn export_csv(&self, session: &Session) -> Result<Vec<u8>> {
        if !session.cache.has_snapshot() {
            return Err(TabulaError::NoSnapshot);
        }
        write_delimited(session.cache.columns(), session.cache.working(), b',')
    }

    /// The regenerated file of a committed file source.
    pub fn download(&self, session: &Session) -> Result<FileArtifact> {
        match session.require_source()? {
            SourceAdapter::File(source) => source.download().ok_or_else(|| {
                TabulaError::Precondition("commit a transformation before downloading".to_string())
            }),
            _ => Err(TabulaError::Precondition(
                "only file sources can be downloaded; use the CSV export".to_string(),
            )),
        }
    }
}
