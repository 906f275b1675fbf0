use serde::Deserialize;
use std::path::Path;

use crate::models::project::AccessLevel;

/// Top-level config loaded from `environment-resolver.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResolverConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "./environment_resolver.db".to_string()
}

/// Who may read environments of non-public projects.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Anonymous actors may read environments of public projects.
    #[serde(default = "default_true")]
    pub allow_anonymous_public: bool,
    /// Lowest membership role that can read environments of private projects.
    #[serde(default = "default_min_read_access_level")]
    pub min_read_access_level: AccessLevel,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allow_anonymous_public: true,
            min_read_access_level: default_min_read_access_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_min_read_access_level() -> AccessLevel {
    AccessLevel::Reporter
}

impl ResolverConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: ResolverConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// `ENVRES_BIND` and `ENVRES_DB` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("ENVRES_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("ENVRES_DB") {
            self.database.path = path;
        }
    }
}
