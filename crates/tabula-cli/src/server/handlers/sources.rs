//! Source connection and container selection handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use tabula::source::{Preview, RelationalCredentials, SourceDescriptor};
use tabula::SessionPhase;

use crate::server::auth::AuthUser;
use crate::server::error::ApiError;
use crate::server::state::AppState;

#[derive(Deserialize)]
pub struct FileQuery {
    pub name: String,
}

#[derive(Serialize)]
pub struct FileConnected {
    pub source: SourceDescriptor,
    pub phase: SessionPhase,
    #[serde(flatten)]
    pub preview: Preview,
}

/// Upload a file as the raw request body; `?name=` carries the file name
/// used for format detection.
pub async fn connect_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<FileConnected>, ApiError> {
    if query.name.trim().is_empty() {
        return Err(ApiError::BadRequest("file name must not be empty".to_string()));
    }
    let handle = state.sessions.get_or_create(&user).await;
    let mut session = handle.try_begin()?;

    let source = state.workflow.connect_file(&mut session, &query.name, &body).await?;
    Ok(Json(FileConnected {
        source,
        phase: session.phase(),
        preview: Preview {
            columns: session.columns().to_vec(),
            rows: session.working_rows().to_vec(),
        },
    }))
}

#[derive(Serialize)]
pub struct Databases {
    pub databases: Vec<String>,
}

pub async fn connect_relational(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(credentials): Json<RelationalCredentials>,
) -> Result<Json<Databases>, ApiError> {
    let handle = state.sessions.get_or_create(&user).await;
    let mut session = handle.try_begin()?;
    let databases = state
        .workflow
        .connect_relational(&mut session, &credentials)
        .await?;
    Ok(Json(Databases { databases }))
}

#[derive(Deserialize)]
pub struct DocumentRequest {
    pub uri: String,
}

pub async fn connect_document(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<Databases>, ApiError> {
    let handle = state.sessions.get_or_create(&user).await;
    let mut session = handle.try_begin()?;
    let databases = state
        .workflow
        .connect_document(&mut session, &request.uri)
        .await?;
    Ok(Json(Databases { databases }))
}

#[derive(Serialize)]
pub struct SubContainers {
    pub container: String,
    pub sub_containers: Vec<String>,
}

pub async fn list_sub_containers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(container): Path<String>,
) -> Result<Json<SubContainers>, ApiError> {
    let handle = state.session(&user).await?;
    let session = handle.try_begin()?;
    let sub_containers = state
        .workflow
        .list_sub_containers(&session, &container)
        .await?;
    Ok(Json(SubContainers {
        container,
        sub_containers,
    }))
}

#[derive(Deserialize)]
pub struct SelectRequest {
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub sub_container: Option<String>,
}

pub async fn select_container(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<SelectRequest>,
) -> Result<Json<Preview>, ApiError> {
    let handle = state.session(&user).await?;
    let mut session = handle.try_begin()?;
    let preview = state
        .workflow
        .select_container(
            &mut session,
            request.container.as_deref(),
            request.sub_container.as_deref(),
        )
        .await?;
    Ok(Json(preview))
}
