use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::finder::EnvironmentsByDeploymentsFinder;
use crate::handlers::{current_actor, find_project, normalize_sha};
use crate::models::environment::CreateEnvironmentRequest;
use crate::models::query::{ByDeploymentsParams, EnvironmentQuery};
use crate::policy::{Ability, Authorizer};

/// Environments of a project that a ref or commit was deployed to.
pub async fn environments_by_deployments(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
    Query(mut params): Query<ByDeploymentsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let project = find_project(&state, project_id)?;
    let actor = current_actor(&state, &headers)?;
    params.sha = params
        .sha
        .take()
        .filter(|s| !s.is_empty())
        .map(|s| normalize_sha(&s))
        .transpose()?;

    let query = EnvironmentQuery::from(params);
    let environments = EnvironmentsByDeploymentsFinder::new(&project, actor.as_ref(), query)
        .execute(state.db.as_ref(), state.policy.as_ref(), state.history.as_ref())
        .map_err(ApiError::from_anyhow)?;

    Ok(Json(serde_json::json!({ "environments": environments })))
}

pub async fn list_environments(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    find_project(&state, project_id)?;
    let actor = current_actor(&state, &headers)?;
    let candidates = state
        .db
        .list_available_environments(project_id)
        .map_err(ApiError::from_anyhow)?;

    let mut environments = Vec::with_capacity(candidates.len());
    for env in candidates {
        let readable = state
            .policy
            .allowed(actor.as_ref(), Ability::ReadEnvironment, &env)
            .map_err(ApiError::from_anyhow)?;
        if readable {
            environments.push(env);
        }
    }
    Ok(Json(serde_json::json!({ "environments": environments })))
}

pub async fn create_environment(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateEnvironmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    find_project(&state, project_id)?;
    let id = state
        .db
        .create_environment(project_id, &req.name, req.external_url.as_deref())
        .map_err(ApiError::from_anyhow)?;
    tracing::info!(project_id, environment_id = id, name = %req.name, "environment created");
    let environment = state
        .db
        .get_environment(id)
        .map_err(ApiError::from_anyhow)?
        .ok_or(ApiError::NotFound("environment"))?;
    Ok((StatusCode::CREATED, Json(environment)))
}

pub async fn stop_environment(
    State(state): State<AppState>,
    Path((project_id, environment_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let stopped = state
        .db
        .stop_environment(project_id, environment_id)
        .map_err(ApiError::from_anyhow)?;
    if !stopped {
        return Err(ApiError::NotFound("environment"));
    }
    tracing::info!(project_id, environment_id, "environment stopped");
    Ok(StatusCode::NO_CONTENT)
}
