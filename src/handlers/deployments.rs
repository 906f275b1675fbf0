use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::handlers::{find_project, normalize_sha};
use crate::models::deployment::{CreateDeploymentRequest, UpdateDeploymentRequest};

pub async fn create_deployment(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateDeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    find_project(&state, project_id)?;
    let sha = normalize_sha(&req.sha)?;
    let id = state
        .db
        .create_deployment(
            project_id,
            req.environment_id,
            &req.ref_name,
            req.tag,
            &sha,
            req.status,
        )
        .map_err(ApiError::from_anyhow)?;
    tracing::info!(
        project_id,
        environment_id = req.environment_id,
        deployment_id = id,
        ref_name = %req.ref_name,
        sha = %sha,
        "deployment recorded"
    );
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

pub async fn update_deployment(
    State(state): State<AppState>,
    Path((project_id, deployment_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateDeploymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .db
        .update_deployment_status(project_id, deployment_id, req.status)
        .map_err(ApiError::from_anyhow)?;
    if !updated {
        return Err(ApiError::NotFound("deployment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::deploy_db::DeployDb;
    use crate::models::deployment::DeploymentStatus;
    use crate::models::project::Visibility;
    use std::sync::Arc;

    fn state_with_env() -> (AppState, i64, i64) {
        let db = Arc::new(DeployDb::open_in_memory().unwrap());
        let project = db.create_project("web", Visibility::Public).unwrap();
        let env = db.create_environment(project, "staging", None).unwrap();
        (AppState::new(db, PolicyConfig::default()), project, env)
    }

    fn request(environment_id: i64, sha: &str) -> CreateDeploymentRequest {
        CreateDeploymentRequest {
            environment_id,
            ref_name: "main".into(),
            tag: false,
            sha: sha.into(),
            status: DeploymentStatus::Running,
        }
    }

    #[tokio::test]
    async fn deployment_lifecycle() {
        let (state, project, env) = state_with_env();
        let req = Json(request(env, "abc1234"));
        let resp = create_deployment(State(state.clone()), Path(project), req)
            .await
            .unwrap()
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(state.db.last_successful_deployment(env).unwrap().is_none());

        let environment = state.db.get_environment(env).unwrap().unwrap();
        let deployment_id = environment.last_deployment_id.unwrap();
        let resp = update_deployment(
            State(state.clone()),
            Path((project, deployment_id)),
            Json(UpdateDeploymentRequest {
                status: DeploymentStatus::Success,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            state.db.last_successful_deployment(env).unwrap().unwrap().id,
            deployment_id
        );
    }

    #[tokio::test]
    async fn deployment_to_unknown_environment_is_not_found() {
        let (state, project, _env) = state_with_env();
        let req = Json(request(999, "abc1234"));
        let result = create_deployment(State(state), Path(project), req).await;
        match result {
            Ok(_) => panic!("expected an error"),
            Err(e) => assert_eq!(e.status(), StatusCode::NOT_FOUND),
        }
    }

    #[tokio::test]
    async fn deployment_needs_a_valid_sha() {
        let (state, project, env) = state_with_env();
        let req = Json(request(env, "main"));
        let result = create_deployment(State(state), Path(project), req).await;
        match result {
            Ok(_) => panic!("expected an error"),
            Err(e) => assert_eq!(e.status(), StatusCode::BAD_REQUEST),
        }
    }

    #[tokio::test]
    async fn deployment_sha_is_stored_lowercase() {
        let (state, project, env) = state_with_env();
        create_deployment(State(state.clone()), Path(project), Json(request(env, "DEADBEEF")))
            .await
            .unwrap();
        let environment = state.db.get_environment(env).unwrap().unwrap();
        let deployment_id = environment.last_deployment_id.unwrap();
        state
            .db
            .update_deployment_status(project, deployment_id, DeploymentStatus::Success)
            .unwrap();
        let last = state.db.last_successful_deployment(env).unwrap().unwrap();
        assert_eq!(last.sha, "deadbeef");
    }
}
