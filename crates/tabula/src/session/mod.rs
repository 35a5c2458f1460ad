//! Per-user workflow state and the operations that drive it.

mod cache;
mod commit;
mod orchestrator;
mod registry;
mod state;

pub use cache::SnapshotCache;
pub use commit::{CommitCoordinator, CommitOutcome, CommitWarning};
pub use orchestrator::{AppliedPreview, Workflow};
pub use registry::{SessionHandle, SessionRegistry};
pub use state::{Session, SessionPhase, SessionView};
