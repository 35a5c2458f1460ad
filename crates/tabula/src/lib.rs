//! Tabula: example-driven column transformation for tabular data.
//!
//! A user connects a source (an uploaded file, a relational table, or a
//! document collection), picks a column, and gives a few input/output
//! example pairs. Tabula classifies the transformation, synthesizes Lua
//! code for it, previews the result on a sample of rows, and writes it
//! back to the whole container on commit.
//!
//! # Core Principles
//!
//! - **Preview first**: a pristine snapshot is kept beside the working
//!   rows, so a preview can always be reverted
//! - **Sandboxed code**: generated transforms run in a restricted Lua
//!   interpreter with memory and instruction limits
//! - **Best-effort commits**: rows the store rejects are reported, not
//!   allowed to sink the rest
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tabula::llm::MockProvider;
//! use tabula::session::{Session, Workflow};
//! use tabula::synthesis::Synthesizer;
//! use tabula::transform::{Example, SandboxLimits};
//!
//! # async fn run() -> tabula::Result<()> {
//! let synthesizer = Synthesizer::new(Arc::new(MockProvider::new()), SandboxLimits::default());
//! let workflow = Workflow::new(Arc::new(synthesizer));
//! let mut session = Session::new("alice");
//!
//! workflow.connect_file(&mut session, "people.csv", b"name\nalice\nbob\n").await?;
//! workflow.select_column(&mut session, "name")?;
//! workflow.set_examples(&mut session, vec![Example::new("alice", "ALICE")])?;
//! workflow.classify(&mut session).await?;
//! workflow.generate(&mut session).await?;
//! workflow.apply_preview(&mut session)?;
//! workflow.commit(&mut session).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod llm;
pub mod session;
pub mod source;
pub mod synthesis;
pub mod table;
pub mod transform;

pub use config::TabulaConfig;
pub use error::{Result, TabulaError};
pub use session::{Session, SessionPhase, SessionRegistry, Workflow};
pub use source::{Preview, SourceAdapter, SourceDescriptor};
pub use table::{CellValue, Row};
pub use transform::{Classification, Example, TransformSpec};
