//! Gitea push webhook payload.

use serde::Deserialize;

use super::types::{branch_from_ref, CommitInfo, PushNotification};

#[derive(Debug, Deserialize)]
pub struct GiteaPushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub compare_url: String,
    #[serde(default)]
    pub commits: Vec<GiteaCommit>,
    #[serde(default)]
    pub repository: GiteaRepository,
    #[serde(default)]
    pub pusher: GiteaUser,
}

#[derive(Debug, Default, Deserialize)]
pub struct GiteaCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub committer: GiteaCommitUser,
}

#[derive(Debug, Default, Deserialize)]
pub struct GiteaCommitUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GiteaRepository {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GiteaUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

/// Parse a Gitea push body into the provider-neutral shape.
///
/// Gitea commits carry no per-file change lists, so the neutral commits
/// keep their file vectors empty and no file summary is rendered.
pub fn parse(body: &[u8]) -> Result<PushNotification, serde_json::Error> {
    let payload: GiteaPushPayload = serde_json::from_slice(body)?;

    let pusher = payload
        .commits
        .first()
        .map(|c| c.committer.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| payload.pusher.username.clone());

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
                ..CommitInfo::default()
            })
            .collect(),
        compare_url: payload.compare_url,
    })
}
