pub mod deployments;
pub mod environments;
pub mod health;
pub mod projects;

use std::sync::LazyLock;

use axum::http::HeaderMap;
use regex::Regex;

use crate::AppState;
use crate::error::ApiError;
use crate::models::project::{Project, User};

pub const USER_ID_HEADER: &str = "x-user-id";

static SHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").expect("static regex"));

/// The acting user named by `X-User-Id`. No header, or an id with no
/// user behind it, is an anonymous actor.
pub fn current_actor(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let id: i64 = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("{USER_ID_HEADER} must be a user id")))?;
    state.db.get_user(id).map_err(ApiError::from_anyhow)
}

pub fn find_project(state: &AppState, id: i64) -> Result<Project, ApiError> {
    state
        .db
        .get_project(id)
        .map_err(ApiError::from_anyhow)?
        .ok_or(ApiError::NotFound("project"))
}

/// Commit ids are 4 to 64 hex characters, git's shortest abbreviation up to
/// a full SHA-256. Returns the id lowercased, the form every sha is stored in.
pub fn normalize_sha(sha: &str) -> Result<String, ApiError> {
    if SHA_RE.is_match(sha) {
        Ok(sha.to_ascii_lowercase())
    } else {
        Err(ApiError::BadRequest(format!("invalid commit sha: {sha:?}")))
    }
}
