//! Bearer token authentication.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

use super::error::ApiError;
use super::state::AppState;

/// User name given to every request when no tokens are configured.
pub const LOCAL_USER: &str = "local";

/// Maps bearer tokens to user names.
///
/// With an empty token table the server runs in single-user mode and every
/// request acts as [`LOCAL_USER`].
#[derive(Debug, Clone, Default)]
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn is_open(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Resolve the user behind the request's `Authorization` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        if self.is_open() {
            return Ok(LOCAL_USER.to_string());
        }

        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("unknown token".to_string()))
    }
}

/// The authenticated user of a request.
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.auth.authenticate(&parts.headers).map(AuthUser)
    }
}
