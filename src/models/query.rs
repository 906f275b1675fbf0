use serde::Deserialize;

use crate::models::deployment::Commit;

/// Parameters of an environments-by-deployments lookup.
///
/// One of `reference` or `commit` drives deployment matching; with neither
/// the lookup resolves to nothing.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentQuery {
    pub reference: Option<String>,
    pub commit: Option<Commit>,
    pub find_latest: bool,
    pub with_tags: bool,
    pub recently_updated: bool,
}

impl EnvironmentQuery {
    pub fn for_ref(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::default()
        }
    }

    pub fn for_commit(commit: Commit) -> Self {
        Self {
            commit: Some(commit),
            ..Self::default()
        }
    }
}

/// Query string accepted by the by-deployments endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ByDeploymentsParams {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub sha: Option<String>,
    #[serde(default)]
    pub find_latest: bool,
    #[serde(default)]
    pub with_tags: bool,
    #[serde(default)]
    pub recently_updated: bool,
}

impl From<ByDeploymentsParams> for EnvironmentQuery {
    fn from(p: ByDeploymentsParams) -> Self {
        Self {
            reference: p.ref_name.filter(|r| !r.is_empty()),
            commit: p.sha.filter(|s| !s.is_empty()).map(Commit::new),
            find_latest: p.find_latest,
            with_tags: p.with_tags,
            recently_updated: p.recently_updated,
        }
    }
}
