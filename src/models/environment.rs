use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Available,
    Stopped,
}

impl EnvironmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentState::Available => "available",
            EnvironmentState::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(EnvironmentState::Available),
            "stopped" => Some(EnvironmentState::Stopped),
            _ => None,
        }
    }
}

/// A named deployment target within a project.
///
/// `last_deployment_id` and `last_deployed_at` are derived from the
/// environment's most recent deployment, whatever its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub state: EnvironmentState,
    pub external_url: Option<String>,
    pub last_deployment_id: Option<i64>,
    pub last_deployed_at: Option<String>,
    pub created_at: String,
}

impl Environment {
    pub fn is_available(&self) -> bool {
        self.state == EnvironmentState::Available
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    #[serde(default)]
    pub external_url: Option<String>,
}
