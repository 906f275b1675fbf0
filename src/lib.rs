pub mod config;
pub mod deploy_db;
pub mod error;
pub mod finder;
pub mod handlers;
pub mod history;
pub mod models;
pub mod policy;

use std::sync::Arc;

use axum::{Router, routing::get, routing::post, routing::put};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::PolicyConfig;
use deploy_db::DeployDb;
use history::DeploymentHistory;
use policy::ProjectPolicy;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DeployDb>,
    pub policy: Arc<ProjectPolicy>,
    pub history: Arc<DeploymentHistory>,
}

impl AppState {
    pub fn new(db: Arc<DeployDb>, policy_config: PolicyConfig) -> Self {
        Self {
            policy: Arc::new(ProjectPolicy::new(db.clone(), policy_config)),
            history: Arc::new(DeploymentHistory::new(db.clone())),
            db,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/users", post(handlers::projects::create_user))
        .route("/api/v1/projects", post(handlers::projects::create_project))
        .route(
            "/api/v1/projects/{id}/members",
            post(handlers::projects::add_member),
        )
        .route(
            "/api/v1/projects/{id}/commits",
            post(handlers::projects::create_commit),
        )
        // Environments
        .route(
            "/api/v1/projects/{id}/environments",
            get(handlers::environments::list_environments)
                .post(handlers::environments::create_environment),
        )
        .route(
            "/api/v1/projects/{id}/environments/by_deployments",
            get(handlers::environments::environments_by_deployments),
        )
        .route(
            "/api/v1/projects/{id}/environments/{env_id}/stop",
            post(handlers::environments::stop_environment),
        )
        // Deployments
        .route(
            "/api/v1/projects/{id}/deployments",
            post(handlers::deployments::create_deployment),
        )
        .route(
            "/api/v1/projects/{id}/deployments/{deployment_id}",
            put(handlers::deployments::update_deployment),
        )
        // Health
        .route("/healthz", get(handlers::health::healthz))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
