use std::sync::Arc;

use crate::deploy_db::DeployDb;
use crate::models::deployment::Commit;
use crate::models::environment::Environment;

/// Version-control questions asked about an environment. Answering them
/// may cost a round trip per environment, so callers ask them last.
pub trait RepositoryHistory {
    /// Whether the environment's last successful deployment came from `reference`.
    fn recently_updated_on_branch(
        &self,
        environment: &Environment,
        reference: &str,
    ) -> anyhow::Result<bool>;

    /// Whether `commit` is contained in what the environment last deployed.
    fn includes_commit(&self, environment: &Environment, commit: &Commit) -> anyhow::Result<bool>;
}

/// Answers history questions from recorded deployments and the stored
/// commit graph.
pub struct DeploymentHistory {
    db: Arc<DeployDb>,
}

impl DeploymentHistory {
    pub fn new(db: Arc<DeployDb>) -> Self {
        Self { db }
    }
}

impl RepositoryHistory for DeploymentHistory {
    fn recently_updated_on_branch(
        &self,
        environment: &Environment,
        reference: &str,
    ) -> anyhow::Result<bool> {
        let last = self.db.last_successful_deployment(environment.id)?;
        Ok(last.is_some_and(|d| d.ref_name == reference))
    }

    fn includes_commit(&self, environment: &Environment, commit: &Commit) -> anyhow::Result<bool> {
        let Some(last) = self.db.last_successful_deployment(environment.id)? else {
            return Ok(false);
        };
        self.db
            .is_ancestor(environment.project_id, &commit.sha, &last.sha)
    }
}
