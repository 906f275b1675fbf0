use crate::deploy_db::{DeployDb, DeploymentMatcher, LastDeployedOrder};
use crate::history::RepositoryHistory;
use crate::models::deployment::Commit;
use crate::models::environment::Environment;
use crate::models::project::{Project, User};
use crate::models::query::EnvironmentQuery;
use crate::policy::{Ability, Authorizer};

/// Source of candidate environments: the available environments of a
/// project with at least one deployment accepted by the matcher.
pub trait EnvironmentStore {
    fn environments_with_deployments(
        &self,
        project_id: i64,
        matcher: &DeploymentMatcher,
        order: LastDeployedOrder,
    ) -> anyhow::Result<Vec<Environment>>;
}

impl EnvironmentStore for DeployDb {
    fn environments_with_deployments(
        &self,
        project_id: i64,
        matcher: &DeploymentMatcher,
        order: LastDeployedOrder,
    ) -> anyhow::Result<Vec<Environment>> {
        DeployDb::environments_with_deployments(self, project_id, matcher, order)
    }
}

/// One per-environment check. Variants are listed cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check<'q> {
    Scoped,
    Authorized,
    RecentlyUpdatedOn(&'q str),
    IncludesCommit(&'q Commit),
}

/// Resolves the environments a ref or commit was deployed to.
pub struct EnvironmentsByDeploymentsFinder<'a> {
    project: &'a Project,
    actor: Option<&'a User>,
    query: EnvironmentQuery,
}

impl<'a> EnvironmentsByDeploymentsFinder<'a> {
    pub fn new(project: &'a Project, actor: Option<&'a User>, query: EnvironmentQuery) -> Self {
        Self {
            project,
            actor,
            query,
        }
    }

    /// With `find_latest` the result holds at most the most recently
    /// deployed environment that passes every check, and checking stops
    /// there. Otherwise every passing environment is returned, least
    /// recently deployed first. Collaborator errors are returned as-is.
    pub fn execute<S, A, H>(
        &self,
        store: &S,
        authorizer: &A,
        history: &H,
    ) -> anyhow::Result<Vec<Environment>>
    where
        S: EnvironmentStore + ?Sized,
        A: Authorizer + ?Sized,
        H: RepositoryHistory + ?Sized,
    {
        let matcher = DeploymentMatcher::from_query(&self.query);
        if matcher == DeploymentMatcher::Nothing {
            tracing::debug!(project_id = self.project.id, "no ref or commit given");
            return Ok(Vec::new());
        }

        let order = if self.query.find_latest {
            LastDeployedOrder::Desc
        } else {
            LastDeployedOrder::Asc
        };
        let candidates = store.environments_with_deployments(self.project.id, &matcher, order)?;
        let candidate_count = candidates.len();

        let checks = self.checks();
        let mut survivors = candidates.into_iter().filter_map(|env| {
            match self.passes(&env, &checks, authorizer, history) {
                Ok(true) => Some(Ok(env)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        });

        let environments = if self.query.find_latest {
            survivors.next().transpose()?.into_iter().collect()
        } else {
            survivors.collect::<anyhow::Result<Vec<_>>>()?
        };

        tracing::debug!(
            project_id = self.project.id,
            ?matcher,
            candidates = candidate_count,
            resolved = environments.len(),
            "resolved environments by deployments"
        );
        Ok(environments)
    }

    fn checks(&self) -> Vec<Check<'_>> {
        let mut checks = vec![Check::Scoped, Check::Authorized];
        if let Some(reference) = self.query.reference.as_deref() {
            if self.query.recently_updated {
                checks.push(Check::RecentlyUpdatedOn(reference));
            }
            if let Some(commit) = &self.query.commit {
                checks.push(Check::IncludesCommit(commit));
            }
        }
        checks
    }

    fn passes<A, H>(
        &self,
        env: &Environment,
        checks: &[Check<'_>],
        authorizer: &A,
        history: &H,
    ) -> anyhow::Result<bool>
    where
        A: Authorizer + ?Sized,
        H: RepositoryHistory + ?Sized,
    {
        for check in checks {
            let ok = match *check {
                Check::Scoped => env.project_id == self.project.id && env.is_available(),
                Check::Authorized => authorizer.allowed(self.actor, Ability::ReadEnvironment, env)?,
                Check::RecentlyUpdatedOn(reference) => {
                    history.recently_updated_on_branch(env, reference)?
                }
                Check::IncludesCommit(commit) => history.includes_commit(env, commit)?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
