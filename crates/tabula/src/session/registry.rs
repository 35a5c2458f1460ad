//! Per-user sessions with single-operation admission.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::error::{Result, TabulaError};

use super::state::Session;

/// Shared handle to one user's session.
///
/// At most one operation runs against a session at a time; a second caller
/// is turned away instead of queued.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Claim the session for one operation.
    pub fn try_begin(&self) -> Result<OwnedMutexGuard<Session>> {
        self.0
            .clone()
            .try_lock_owned()
            .map_err(|_| TabulaError::ConcurrentOperation)
    }

    /// Wait for the session to be free. For read-only callers that can
    /// afford to queue.
    pub async fn lock(&self) -> OwnedMutexGuard<Session> {
        self.0.clone().lock_owned().await
    }
}

/// All live sessions, keyed by user.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's session, created empty on first use.
    pub async fn get_or_create(&self, user: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(user) {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user.to_string())
            .or_insert_with(|| {
                debug!(user, "Created session");
                SessionHandle::new(Session::new(user))
            })
            .clone()
    }

    pub async fn get(&self, user: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(user).cloned()
    }

    /// Drop the user's session. Returns whether one existed.
    pub async fn remove(&self, user: &str) -> bool {
        self.sessions.write().await.remove(user).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = SessionRegistry::new();
        let alice = registry.get_or_create("alice").await;
        let bob = registry.get_or_create("bob").await;
        assert_eq!(alice.lock().await.user(), "alice");
        assert_eq!(bob.lock().await.user(), "bob");
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_same_user_shares_session() {
        let registry = SessionRegistry::new();
        let first = registry.get_or_create("alice").await;
        let _guard = first.try_begin().unwrap();

        let second = registry.get_or_create("alice").await;
        assert!(matches!(second.try_begin(), Err(TabulaError::ConcurrentOperation)));
    }

    #[tokio::test]
    async fn test_guard_release_admits_next_operation() {
        let handle = SessionHandle::new(Session::new("alice"));
        {
            let _guard = handle.try_begin().unwrap();
        }
        assert!(handle.try_begin().is_ok());
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = SessionRegistry::new();
        registry.get_or_create("alice").await;
        assert!(registry.remove("alice").await);
        assert!(!registry.remove("alice").await);
        assert!(registry.get("alice").await.is_none());
    }
}
