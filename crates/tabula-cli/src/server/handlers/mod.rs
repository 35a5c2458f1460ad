//! API request handlers.

mod export;
mod sources;
mod workflow;

pub use export::*;
pub use sources::*;
pub use workflow::*;
