//! Application state for the web server.

use std::sync::Arc;

use tabula::session::{SessionHandle, SessionRegistry, Workflow};
use tabula::{TabulaConfig, TabulaError};

use super::auth::TokenAuthenticator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Services shared by every session.
    pub workflow: Arc<Workflow>,
    /// One session per authenticated user.
    pub sessions: SessionRegistry,
    pub auth: Arc<TokenAuthenticator>,
}

impl AppState {
    pub fn new(workflow: Workflow, auth: TokenAuthenticator) -> Self {
        Self {
            workflow: Arc::new(workflow),
            sessions: SessionRegistry::new(),
            auth: Arc::new(auth),
        }
    }

    /// Build the workflow and authenticator from configuration.
    pub fn from_config(config: &TabulaConfig) -> tabula::Result<Self> {
        let workflow = Workflow::from_config(config)?;
        let auth = TokenAuthenticator::new(config.auth.tokens.clone());
        Ok(Self::new(workflow, auth))
    }

    /// The user's session. Only connecting a source creates one.
    pub async fn session(&self, user: &str) -> tabula::Result<SessionHandle> {
        self.sessions
            .get(user)
            .await
            .ok_or_else(|| TabulaError::Precondition("connect a source first".to_string()))
    }
}
