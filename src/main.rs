use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use environment_resolver::config::ResolverConfig;
use environment_resolver::deploy_db::DeployDb;
use environment_resolver::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("environment_resolver=debug,tower_http=debug")
        }))
        .init();

    let config_path = std::env::var("ENVRES_CONFIG")
        .unwrap_or_else(|_| "./environment-resolver.toml".to_string());
    let mut config = ResolverConfig::load(&config_path)?;
    config.apply_env_overrides();

    let db = Arc::new(DeployDb::open(&config.database.path)?);
    tracing::info!("deploy db opened at {}", config.database.path);

    let app = router(AppState::new(db, config.policy.clone()));

    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("environment-resolver listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
