//! HTTP API over the transformation workflow.

pub mod app;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use app::{create_router, run_server};
pub use state::AppState;
