use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::models::deployment::{Deployment, DeploymentStatus};
use crate::models::environment::{Environment, EnvironmentState};
use crate::models::project::{AccessLevel, Project, User, Visibility};
use crate::models::query::EnvironmentQuery;

/// Which deployments make an environment a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentMatcher {
    /// Deployments of the ref; with `include_tags`, every tag deployment too.
    Ref { name: String, include_tags: bool },
    /// Deployments of exactly this commit.
    Sha(String),
    /// Matches no deployment at all.
    Nothing,
}

impl DeploymentMatcher {
    /// A reference takes precedence over a commit. `with_tags` only applies
    /// to reference matching.
    pub fn from_query(query: &EnvironmentQuery) -> Self {
        if let Some(reference) = &query.reference {
            DeploymentMatcher::Ref {
                name: reference.clone(),
                include_tags: query.with_tags,
            }
        } else if let Some(commit) = &query.commit {
            DeploymentMatcher::Sha(commit.sha.clone())
        } else {
            DeploymentMatcher::Nothing
        }
    }
}

/// Sort direction over the environment's most recent deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastDeployedOrder {
    /// Never-deployed first, then oldest to newest.
    Asc,
    /// Newest first, never-deployed last.
    Desc,
}

impl LastDeployedOrder {
    fn sql(self) -> &'static str {
        match self {
            LastDeployedOrder::Asc => "last_deployment_id ASC NULLS FIRST, e.id ASC",
            LastDeployedOrder::Desc => "last_deployment_id DESC NULLS LAST, e.id DESC",
        }
    }
}

const ENVIRONMENT_COLUMNS: &str = "e.id, e.project_id, e.name, e.state, e.external_url, \
     (SELECT MAX(d.id) FROM deployments d WHERE d.environment_id = e.id) AS last_deployment_id, \
     (SELECT d.created_at FROM deployments d WHERE d.environment_id = e.id \
      ORDER BY d.id DESC LIMIT 1), \
     e.created_at";

const DEPLOYMENT_COLUMNS: &str =
    "id, project_id, environment_id, ref, tag, sha, status, created_at";

fn environment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Environment> {
    let state: String = row.get(3)?;
    Ok(Environment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        state: EnvironmentState::parse(&state).unwrap_or(EnvironmentState::Stopped),
        external_url: row.get(4)?,
        last_deployment_id: row.get(5)?,
        last_deployed_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn deployment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deployment> {
    let status: String = row.get(6)?;
    Ok(Deployment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        environment_id: row.get(2)?,
        ref_name: row.get(3)?,
        tag: row.get(4)?,
        sha: row.get(5)?,
        status: DeploymentStatus::parse(&status).unwrap_or(DeploymentStatus::Failed),
        created_at: row.get(7)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _)
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

pub struct DeployDb {
    conn: Mutex<Connection>,
}

impl DeployDb {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::open(":memory:")
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("deploy db connection mutex poisoned"))
    }

    pub fn ping(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                username   TEXT NOT NULL UNIQUE,
                admin      INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS projects (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                visibility TEXT NOT NULL DEFAULT 'private'
                           CHECK(visibility IN ('public','internal','private')),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
            );

            CREATE TABLE IF NOT EXISTS project_members (
                project_id   INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                access_level INTEGER NOT NULL,
                PRIMARY KEY (project_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS environments (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id   INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name         TEXT NOT NULL,
                state        TEXT NOT NULL DEFAULT 'available'
                             CHECK(state IN ('available','stopped')),
                external_url TEXT,
                created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                UNIQUE (project_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_environments_project ON environments(project_id, state);

            CREATE TABLE IF NOT EXISTS deployments (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id     INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                environment_id INTEGER NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
                ref            TEXT NOT NULL,
                tag            INTEGER NOT NULL DEFAULT 0,
                sha            TEXT NOT NULL,
                status         TEXT NOT NULL DEFAULT 'success'
                               CHECK(status IN ('created','running','success','failed','canceled')),
                created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            );
            CREATE INDEX IF NOT EXISTS idx_deployments_environment
                ON deployments(environment_id, id DESC);
            CREATE INDEX IF NOT EXISTS idx_deployments_environment_ref
                ON deployments(environment_id, ref);
            CREATE INDEX IF NOT EXISTS idx_deployments_environment_sha
                ON deployments(environment_id, sha);

            CREATE TABLE IF NOT EXISTS commits (
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                sha        TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                PRIMARY KEY (project_id, sha)
            );

            CREATE TABLE IF NOT EXISTS commit_parents (
                project_id INTEGER NOT NULL,
                sha        TEXT NOT NULL,
                parent_sha TEXT NOT NULL,
                PRIMARY KEY (project_id, sha, parent_sha),
                FOREIGN KEY (project_id, sha) REFERENCES commits(project_id, sha) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    // ── Users ──

    pub fn create_user(&self, username: &str, admin: bool) -> anyhow::Result<i64> {
        if username.trim().is_empty() {
            return Err(StoreError::Invalid("username must not be empty".into()).into());
        }
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO users (username, admin) VALUES (?1, ?2)",
            params![username, admin],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StoreError::Conflict(format!("username {username} is taken")).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: i64) -> anyhow::Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, admin FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        admin: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // ── Projects and membership ──

    pub fn create_project(&self, name: &str, visibility: Visibility) -> anyhow::Result<i64> {
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("project name must not be empty".into()).into());
        }
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (name, visibility) VALUES (?1, ?2)",
            params![name, visibility.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: i64) -> anyhow::Result<Option<Project>> {
        let conn = self.conn()?;
        let project = conn
            .query_row(
                "SELECT id, name, visibility, created_at FROM projects WHERE id = ?1",
                params![id],
                |row| {
                    let visibility: String = row.get(2)?;
                    Ok(Project {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        visibility: Visibility::parse(&visibility).unwrap_or_default(),
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    /// Add a member or change an existing member's access level.
    pub fn upsert_member(
        &self,
        project_id: i64,
        user_id: i64,
        access_level: AccessLevel,
    ) -> anyhow::Result<()> {
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO project_members (project_id, user_id, access_level) VALUES (?1, ?2, ?3) \
             ON CONFLICT(project_id, user_id) DO UPDATE SET access_level = excluded.access_level",
            params![project_id, user_id, access_level.value()],
        ) {
            Ok(_) => Ok(()),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(StoreError::NotFound("project or user").into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn member_access_level(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> anyhow::Result<Option<AccessLevel>> {
        let conn = self.conn()?;
        let level: Option<i64> = conn
            .query_row(
                "SELECT access_level FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(level.and_then(AccessLevel::from_value))
    }

    // ── Environments ──

    pub fn create_environment(
        &self,
        project_id: i64,
        name: &str,
        external_url: Option<&str>,
    ) -> anyhow::Result<i64> {
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("environment name must not be empty".into()).into());
        }
        let conn = self.conn()?;
        match conn.execute(
            "INSERT INTO environments (project_id, name, external_url) VALUES (?1, ?2, ?3)",
            params![project_id, name, external_url],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_foreign_key_violation(&e) => Err(StoreError::NotFound("project").into()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::Conflict(format!(
                "environment {name} already exists in project {project_id}"
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_environment(&self, id: i64) -> anyhow::Result<Option<Environment>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ENVIRONMENT_COLUMNS} FROM environments e WHERE e.id = ?1");
        let env = conn
            .query_row(&sql, params![id], environment_from_row)
            .optional()?;
        Ok(env)
    }

    /// Returns false when no environment with that id exists in the project.
    pub fn stop_environment(&self, project_id: i64, id: i64) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE environments SET state = ?3 WHERE id = ?1 AND project_id = ?2",
            params![id, project_id, EnvironmentState::Stopped.as_str()],
        )?;
        Ok(count > 0)
    }

    pub fn list_available_environments(&self, project_id: i64) -> anyhow::Result<Vec<Environment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {ENVIRONMENT_COLUMNS} FROM environments e \
             WHERE e.project_id = ?1 AND e.state = 'available' ORDER BY e.name ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_id], environment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Available environments of the project with at least one deployment
    /// accepted by `matcher`. Deployments are probed with an `EXISTS`
    /// sub-query and never loaded.
    pub fn environments_with_deployments(
        &self,
        project_id: i64,
        matcher: &DeploymentMatcher,
        order: LastDeployedOrder,
    ) -> anyhow::Result<Vec<Environment>> {
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(project_id)];
        let predicate = match matcher {
            DeploymentMatcher::Nothing => return Ok(Vec::new()),
            DeploymentMatcher::Ref { name, include_tags } => {
                param_values.push(Box::new(name.clone()));
                if *include_tags {
                    "(d.ref = ?2 OR d.tag = 1)"
                } else {
                    "d.ref = ?2"
                }
            }
            DeploymentMatcher::Sha(sha) => {
                param_values.push(Box::new(sha.clone()));
                "d.sha = ?2"
            }
        };

        let sql = format!(
            "SELECT {ENVIRONMENT_COLUMNS} FROM environments e \
             WHERE e.project_id = ?1 AND e.state = 'available' \
             AND EXISTS (SELECT 1 FROM deployments d \
                         WHERE d.environment_id = e.id AND {predicate}) \
             ORDER BY {}",
            order.sql()
        );

        let conn = self.conn()?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), environment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Deployments ──

    pub fn create_deployment(
        &self,
        project_id: i64,
        environment_id: i64,
        ref_name: &str,
        tag: bool,
        sha: &str,
        status: DeploymentStatus,
    ) -> anyhow::Result<i64> {
        if ref_name.is_empty() || sha.is_empty() {
            return Err(StoreError::Invalid("ref and sha are required".into()).into());
        }
        let conn = self.conn()?;
        let owned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM environments WHERE id = ?1 AND project_id = ?2)",
            params![environment_id, project_id],
            |row| row.get(0),
        )?;
        if !owned {
            return Err(StoreError::NotFound("environment").into());
        }
        conn.execute(
            "INSERT INTO deployments (project_id, environment_id, ref, tag, sha, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![project_id, environment_id, ref_name, tag, sha, status.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_deployment_status(
        &self,
        project_id: i64,
        id: i64,
        status: DeploymentStatus,
    ) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            "UPDATE deployments SET status = ?3 WHERE id = ?1 AND project_id = ?2",
            params![id, project_id, status.as_str()],
        )?;
        Ok(count > 0)
    }

    pub fn last_successful_deployment(
        &self,
        environment_id: i64,
    ) -> anyhow::Result<Option<Deployment>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments \
             WHERE environment_id = ?1 AND status = 'success' ORDER BY id DESC LIMIT 1"
        );
        let deployment = conn
            .query_row(&sql, params![environment_id], deployment_from_row)
            .optional()?;
        Ok(deployment)
    }

    // ── Commit graph ──

    /// Record a commit and its parents. Recording the same commit twice
    /// merges the parent lists.
    pub fn record_commit(
        &self,
        project_id: i64,
        sha: &str,
        parents: &[String],
    ) -> anyhow::Result<()> {
        if sha.is_empty() {
            return Err(StoreError::Invalid("sha is required".into()).into());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match tx.execute(
            "INSERT OR IGNORE INTO commits (project_id, sha) VALUES (?1, ?2)",
            params![project_id, sha],
        ) {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(StoreError::NotFound("project").into());
            }
            Err(e) => return Err(e.into()),
        }
        for parent in parents {
            tx.execute(
                "INSERT OR IGNORE INTO commit_parents (project_id, sha, parent_sha) \
                 VALUES (?1, ?2, ?3)",
                params![project_id, sha, parent],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn commit_exists(&self, project_id: i64, sha: &str) -> anyhow::Result<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM commits WHERE project_id = ?1 AND sha = ?2)",
            params![project_id, sha],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Whether `ancestor` is reachable from `descendant` through parent
    /// links. A commit is its own ancestor. Unknown descendants have no
    /// ancestors.
    pub fn is_ancestor(
        &self,
        project_id: i64,
        ancestor: &str,
        descendant: &str,
    ) -> anyhow::Result<bool> {
        if !self.commit_exists(project_id, descendant)? {
            return Ok(false);
        }
        let conn = self.conn()?;
        let found = conn.query_row(
            "WITH RECURSIVE reachable(sha) AS ( \
                 SELECT ?2 \
                 UNION \
                 SELECT cp.parent_sha FROM commit_parents cp \
                 JOIN reachable r ON cp.sha = r.sha \
                 WHERE cp.project_id = ?1 \
             ) \
             SELECT EXISTS(SELECT 1 FROM reachable WHERE sha = ?3)",
            params![project_id, descendant, ancestor],
            |row| row.get(0),
        )?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::Commit;

    fn seeded() -> (DeployDb, i64) {
        let db = DeployDb::open_in_memory().unwrap();
        let project = db.create_project("web", Visibility::Private).unwrap();
        (db, project)
    }

    fn names(envs: &[Environment]) -> Vec<&str> {
        envs.iter().map(|e| e.name.as_str()).collect()
    }

    fn by_ref(name: &str) -> DeploymentMatcher {
        DeploymentMatcher::Ref {
            name: name.to_string(),
            include_tags: false,
        }
    }

    #[test]
    fn matcher_prefers_reference_over_commit() {
        let mut query = EnvironmentQuery::for_ref("main");
        query.commit = Some(Commit::new("abc123"));
        query.with_tags = true;
        assert_eq!(
            DeploymentMatcher::from_query(&query),
            DeploymentMatcher::Ref {
                name: "main".into(),
                include_tags: true
            }
        );
    }

    #[test]
    fn matcher_ignores_tags_for_commits() {
        let mut query = EnvironmentQuery::for_commit(Commit::new("abc123"));
        query.with_tags = true;
        assert_eq!(
            DeploymentMatcher::from_query(&query),
            DeploymentMatcher::Sha("abc123".into())
        );
        assert_eq!(
            DeploymentMatcher::from_query(&EnvironmentQuery::default()),
            DeploymentMatcher::Nothing
        );
    }

    #[test]
    fn environments_are_matched_by_ref() {
        let (db, project) = seeded();
        let staging = db.create_environment(project, "staging", None).unwrap();
        let review = db.create_environment(project, "review", None).unwrap();
        db.create_deployment(project, staging, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        db.create_deployment(
            project,
            review,
            "feature",
            false,
            "bbb2222",
            DeploymentStatus::Success,
        )
        .unwrap();

        let found = db
            .environments_with_deployments(project, &by_ref("main"), LastDeployedOrder::Asc)
            .unwrap();
        assert_eq!(names(&found), vec!["staging"]);
    }

    #[test]
    fn tag_deployments_match_when_tags_are_included() {
        let (db, project) = seeded();
        let staging = db.create_environment(project, "staging", None).unwrap();
        let production = db.create_environment(project, "production", None).unwrap();
        db.create_deployment(project, staging, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        db.create_deployment(
            project,
            production,
            "v1.0.0",
            true,
            "aaa1111",
            DeploymentStatus::Success,
        )
        .unwrap();

        let matcher = DeploymentMatcher::Ref {
            name: "main".into(),
            include_tags: true,
        };
        let found = db
            .environments_with_deployments(project, &matcher, LastDeployedOrder::Asc)
            .unwrap();
        assert_eq!(names(&found), vec!["staging", "production"]);

        let found = db
            .environments_with_deployments(project, &by_ref("main"), LastDeployedOrder::Asc)
            .unwrap();
        assert_eq!(names(&found), vec!["staging"]);
    }

    #[test]
    fn environments_are_matched_by_sha() {
        let (db, project) = seeded();
        let staging = db.create_environment(project, "staging", None).unwrap();
        db.create_deployment(project, staging, "main", false, "abc1234", DeploymentStatus::Success)
            .unwrap();

        let hit = db
            .environments_with_deployments(
                project,
                &DeploymentMatcher::Sha("abc1234".into()),
                LastDeployedOrder::Asc,
            )
            .unwrap();
        assert_eq!(names(&hit), vec!["staging"]);

        let miss = db
            .environments_with_deployments(
                project,
                &DeploymentMatcher::Sha("abc123".into()),
                LastDeployedOrder::Asc,
            )
            .unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn stopped_environments_and_other_projects_are_excluded() {
        let (db, project) = seeded();
        let other = db.create_project("api", Visibility::Public).unwrap();
        let stopped = db.create_environment(project, "old", None).unwrap();
        let foreign = db.create_environment(other, "staging", None).unwrap();
        db.create_deployment(project, stopped, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        db.create_deployment(other, foreign, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        assert!(db.stop_environment(project, stopped).unwrap());
        let env = db.get_environment(stopped).unwrap().unwrap();
        assert_eq!(env.state, EnvironmentState::Stopped);
        assert!(!db.stop_environment(other, stopped).unwrap());

        let found = db
            .environments_with_deployments(project, &by_ref("main"), LastDeployedOrder::Desc)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn ordering_follows_most_recent_deployment() {
        let (db, project) = seeded();
        let a = db.create_environment(project, "a", None).unwrap();
        let b = db.create_environment(project, "b", None).unwrap();
        db.create_deployment(project, a, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        db.create_deployment(project, b, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        // `a` is redeployed last, from another ref.
        let last = db
            .create_deployment(project, a, "hotfix", false, "ccc3333", DeploymentStatus::Failed)
            .unwrap();

        let asc = db
            .environments_with_deployments(project, &by_ref("main"), LastDeployedOrder::Asc)
            .unwrap();
        assert_eq!(names(&asc), vec!["b", "a"]);
        assert_eq!(asc[1].last_deployment_id, Some(last));
        assert!(asc[1].last_deployed_at.is_some());

        let desc = db
            .environments_with_deployments(project, &by_ref("main"), LastDeployedOrder::Desc)
            .unwrap();
        assert_eq!(names(&desc), vec!["a", "b"]);
    }

    #[test]
    fn nothing_matcher_returns_empty() {
        let (db, project) = seeded();
        let env = db.create_environment(project, "staging", None).unwrap();
        db.create_deployment(project, env, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        let matcher = DeploymentMatcher::Nothing;
        let found = db
            .environments_with_deployments(project, &matcher, LastDeployedOrder::Asc)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn duplicate_environment_names_conflict() {
        let (db, project) = seeded();
        db.create_environment(project, "staging", None).unwrap();
        let err = db.create_environment(project, "staging", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn environments_need_an_existing_project() {
        let db = DeployDb::open_in_memory().unwrap();
        let err = db.create_environment(42, "staging", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound("project"))
        ));
    }

    #[test]
    fn deployments_require_an_environment_of_the_project() {
        let (db, project) = seeded();
        let other = db.create_project("api", Visibility::Private).unwrap();
        let foreign = db.create_environment(other, "staging", None).unwrap();
        let err = db
            .create_deployment(
                project,
                foreign,
                "main",
                false,
                "aaa1111",
                DeploymentStatus::Success,
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound("environment"))
        ));
    }

    #[test]
    fn last_successful_deployment_skips_unfinished_ones() {
        let (db, project) = seeded();
        let env = db.create_environment(project, "staging", None).unwrap();
        let ok = db
            .create_deployment(project, env, "main", false, "aaa1111", DeploymentStatus::Success)
            .unwrap();
        let running = db
            .create_deployment(project, env, "feature", false, "bbb2222", DeploymentStatus::Running)
            .unwrap();
        assert_eq!(db.last_successful_deployment(env).unwrap().unwrap().id, ok);

        assert!(db
            .update_deployment_status(project, running, DeploymentStatus::Success)
            .unwrap());
        let last = db.last_successful_deployment(env).unwrap().unwrap();
        assert_eq!(last.id, running);
        assert_eq!(last.ref_name, "feature");
    }

    #[test]
    fn ancestry_walks_parent_links() {
        let (db, project) = seeded();
        db.record_commit(project, "c1", &[]).unwrap();
        db.record_commit(project, "c2", &["c1".into()]).unwrap();
        db.record_commit(project, "side", &[]).unwrap();
        db.record_commit(project, "m3", &["c2".into(), "side".into()]).unwrap();

        assert!(db.is_ancestor(project, "c1", "m3").unwrap());
        assert!(db.is_ancestor(project, "side", "m3").unwrap());
        assert!(db.is_ancestor(project, "m3", "m3").unwrap());
        assert!(!db.is_ancestor(project, "m3", "c1").unwrap());
        assert!(!db.is_ancestor(project, "c1", "unknown").unwrap());
    }

    #[test]
    fn membership_is_upserted() {
        let (db, project) = seeded();
        let user = db.create_user("alice", false).unwrap();
        assert_eq!(db.member_access_level(project, user).unwrap(), None);
        db.upsert_member(project, user, AccessLevel::Guest).unwrap();
        db.upsert_member(project, user, AccessLevel::Developer).unwrap();
        assert_eq!(
            db.member_access_level(project, user).unwrap(),
            Some(AccessLevel::Developer)
        );
    }
}
