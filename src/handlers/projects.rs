use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::handlers::{find_project, normalize_sha};
use crate::models::deployment::CreateCommitRequest;
use crate::models::project::{AddMemberRequest, CreateProjectRequest, CreateUserRequest};

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .db
        .create_user(&req.username, req.admin)
        .map_err(ApiError::from_anyhow)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state
        .db
        .create_project(&req.name, req.visibility)
        .map_err(ApiError::from_anyhow)?;
    tracing::info!(project_id = id, visibility = req.visibility.as_str(), "project created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    find_project(&state, project_id)?;
    state
        .db
        .upsert_member(project_id, req.user_id, req.access_level)
        .map_err(ApiError::from_anyhow)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_commit(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateCommitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    find_project(&state, project_id)?;
    let sha = normalize_sha(&req.sha)?;
    let parents = req
        .parents
        .iter()
        .map(|parent| normalize_sha(parent))
        .collect::<Result<Vec<_>, _>>()?;
    state
        .db
        .record_commit(project_id, &sha, &parents)
        .map_err(ApiError::from_anyhow)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "sha": sha }))))
}
