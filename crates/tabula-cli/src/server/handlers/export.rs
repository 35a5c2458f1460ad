//! CSV export and regenerated file download.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::server::auth::AuthUser;
use crate::server::error::ApiError;
use crate::server::state::AppState;

fn attachment(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file_name.replace('"', ""));
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

/// The working rows as CSV.
pub async fn export_csv(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let handle = state.session(&user).await?;
    let session = handle.try_begin()?;
    let bytes = state.workflow.export_csv(&session)?;
    let name = session
        .sub_container()
        .map(|s| format!("{}.csv", s))
        .unwrap_or_else(|| "export.csv".to_string());
    Ok(attachment("text/csv", &name, bytes))
}

/// The regenerated file of a committed file source.
pub async fn download(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let handle = state.session(&user).await?;
    let session = handle.try_begin()?;
    let artifact = state.workflow.download(&session)?;
    Ok(attachment(artifact.content_type, &artifact.name, artifact.bytes))
}
