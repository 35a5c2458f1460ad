//! Spec building, preview and commit handlers.

use std::collections::BTreeSet;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use tabula::session::{CommitOutcome, Session, SessionView};
use tabula::transform::TransformResult;
use tabula::{Example, Row, SessionPhase};

use crate::server::auth::AuthUser;
use crate::server::error::ApiError;
use crate::server::state::AppState;

#[derive(Deserialize)]
pub struct ColumnRequest {
    pub column: String,
}

pub async fn select_column(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<ColumnRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    state.workflow.select_column(&mut session, &request.column)?;
    Ok(Json(session.view()))
}

#[derive(Deserialize)]
pub struct ExamplesRequest {
    pub examples: Vec<Example>,
}

pub async fn set_examples(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<ExamplesRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    state.workflow.set_examples(&mut session, request.examples)?;
    Ok(Json(session.view()))
}

#[derive(Serialize)]
pub struct Classified {
    pub classification: String,
    pub phase: SessionPhase,
}

pub async fn classify(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Classified>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    let classification = state.workflow.classify(&mut session).await?;
    Ok(Json(Classified {
        classification: classification.to_string(),
        phase: session.phase(),
    }))
}

#[derive(Serialize)]
pub struct Generated {
    pub code: String,
    pub phase: SessionPhase,
}

pub async fn generate(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Generated>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    let code = state.workflow.generate(&mut session).await?;
    Ok(Json(Generated {
        code,
        phase: session.phase(),
    }))
}

#[derive(Serialize)]
pub struct Applied {
    pub changed_columns: BTreeSet<String>,
    pub result: TransformResult,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

pub async fn apply(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Applied>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    let applied = state.workflow.apply_preview(&mut session)?;
    Ok(Json(Applied {
        changed_columns: applied.changed_columns,
        result: applied.result,
        columns: session.columns().to_vec(),
        rows: session.working_rows().to_vec(),
    }))
}

pub async fn revert(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SessionView>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    state.workflow.revert(&mut session)?;
    Ok(Json(session.view()))
}

pub async fn commit(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<CommitOutcome>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    let outcome = state.workflow.commit(&mut session).await?;
    Ok(Json(outcome))
}

/// Current session state; an empty view when the user has none yet.
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<SessionView>, ApiError> {
    match state.sessions.get(&user).await {
        Some(handle) => Ok(Json(handle.try_begin()?.view())),
        None => Ok(Json(Session::new(user).view())),
    }
}

/// Forget the user's session and everything held in it.
pub async fn delete_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, ApiError> {
    if let Some(handle) = state.sessions.get(&user).await {
        // Refuse while an operation is still running on it
        drop(handle.try_begin()?);
    }
    state.sessions.remove(&user).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub synthesizer: String,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        synthesizer: state.workflow.synthesizer().name().to_string(),
    })
}
