use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Created,
    Running,
    #[default]
    Success,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Created => "created",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(DeploymentStatus::Created),
            "running" => Some(DeploymentStatus::Running),
            "success" => Some(DeploymentStatus::Success),
            "failed" => Some(DeploymentStatus::Failed),
            "canceled" => Some(DeploymentStatus::Canceled),
            _ => None,
        }
    }
}

/// A record of a commit on a ref having been deployed to an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub project_id: i64,
    pub environment_id: i64,
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub tag: bool,
    pub sha: String,
    pub status: DeploymentStatus,
    pub created_at: String,
}

/// A commit handed to the resolver by its caller. Shas are kept lowercase
/// so they compare equal to stored deployments and commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
}

impl Commit {
    pub fn new(sha: impl Into<String>) -> Self {
        let mut sha = sha.into();
        sha.make_ascii_lowercase();
        Self { sha }
    }
}


#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub environment_id: i64,
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(default)]
    pub tag: bool,
    pub sha: String,
    #[serde(default)]
    pub status: DeploymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeploymentRequest {
    pub status: DeploymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommitRequest {
    pub sha: String,
    #[serde(default)]
    pub parents: Vec<String>,
}
