//! GitHub push webhook payload.

use serde::Deserialize;

use super::types::{branch_from_ref, CommitInfo, PushNotification};

#[derive(Debug, Deserialize)]
pub struct GitHubPushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub compare: String,
    #[serde(default)]
    pub commits: Vec<GitHubCommit>,
    #[serde(default)]
    pub repository: GitHubRepository,
    #[serde(default)]
    pub pusher: GitHubPusher,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitHubCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub committer: GitHubCommitUser,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitHubCommitUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitHubRepository {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitHubPusher {
    #[serde(default)]
    pub name: String,
}

/// Parse a GitHub push body into the provider-neutral shape.
pub fn parse(body: &[u8]) -> Result<PushNotification, serde_json::Error> {
    let payload: GitHubPushPayload = serde_json::from_slice(body)?;

    // Prefer the committer of the first commit; pusher as fallback.
    let pusher = payload
        .commits
        .first()
        .map(|c| c.committer.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| payload.pusher.name.clone());

    Ok(PushNotification {
        repository: payload.repository.full_name,
        pusher,
        branch: branch_from_ref(&payload.git_ref),
        commits: payload
            .commits
            .into_iter()
            .map(|c| CommitInfo {
                id: c.id,
                message: c.message,
                url: c.url,
                added: c.added,
                modified: c.modified,
                removed: c.removed,
            })
            .collect(),
        compare_url: payload.compare,
    })
}
