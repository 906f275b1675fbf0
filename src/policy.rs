use std::sync::Arc;

use crate::config::PolicyConfig;
use crate::deploy_db::DeployDb;
use crate::models::environment::Environment;
use crate::models::project::{User, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    ReadEnvironment,
}

/// Answers whether an actor may perform an ability on an environment.
/// `None` is an anonymous actor.
pub trait Authorizer {
    fn allowed(
        &self,
        actor: Option<&User>,
        ability: Ability,
        environment: &Environment,
    ) -> anyhow::Result<bool>;
}

/// Project visibility and membership rules, read from the deploy db.
pub struct ProjectPolicy {
    db: Arc<DeployDb>,
    config: PolicyConfig,
}

impl ProjectPolicy {
    pub fn new(db: Arc<DeployDb>, config: PolicyConfig) -> Self {
        Self { db, config }
    }

    fn can_read_environment(
        &self,
        actor: Option<&User>,
        environment: &Environment,
    ) -> anyhow::Result<bool> {
        if actor.is_some_and(|u| u.admin) {
            return Ok(true);
        }

        let Some(project) = self.db.get_project(environment.project_id)? else {
            return Ok(false);
        };

        let allowed = match (project.visibility, actor) {
            (Visibility::Public, None) => self.config.allow_anonymous_public,
            (Visibility::Public | Visibility::Internal, Some(_)) => true,
            (Visibility::Internal | Visibility::Private, None) => false,
            (Visibility::Private, Some(user)) => self
                .db
                .member_access_level(project.id, user.id)?
                .is_some_and(|level| level >= self.config.min_read_access_level),
        };
        Ok(allowed)
    }
}

impl Authorizer for ProjectPolicy {
    fn allowed(
        &self,
        actor: Option<&User>,
        ability: Ability,
        environment: &Environment,
    ) -> anyhow::Result<bool> {
        match ability {
            Ability::ReadEnvironment => self.can_read_environment(actor, environment),
        }
    }
}

/// Lets everyone read everything.
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allowed(&self, _: Option<&User>, _: Ability, _: &Environment) -> anyhow::Result<bool> {
        Ok(true)
    }
}
