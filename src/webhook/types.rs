//! Provider-neutral webhook types.

/// Supported webhook providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    GitHub,
    Gitea,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Gitea => "gitea",
        }
    }

    /// Whether this provider ships per-commit file lists worth summarizing.
    pub const fn has_file_lists(self) -> bool {
        matches!(self, Self::GitHub)
    }
}

/// Per-provider webhook settings, built once at startup.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub provider: Provider,
    pub signature_header: &'static str,
    /// Required prefix on the signature value (GitHub's `sha256=`), if any.
    pub signature_prefix: Option<&'static str>,
    /// Shared HMAC secret. Empty disables verification (logged).
    pub secret: String,
    /// Chat JID that receives notifications for this provider.
    pub recipient: String,
}

impl WebhookConfig {
    pub const fn github(secret: String, recipient: String) -> Self {
        Self {
            provider: Provider::GitHub,
            signature_header: "X-Hub-Signature-256",
            signature_prefix: Some("sha256="),
            secret,
            recipient,
        }
    }

    pub const fn gitea(secret: String, recipient: String) -> Self {
        Self {
            provider: Provider::Gitea,
            signature_header: "X-Gitea-Signature",
            signature_prefix: None,
            secret,
            recipient,
        }
    }
}

/// One commit from a push event.
#[derive(Debug, Clone, Default)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub url: String,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

/// Provider-independent projection of a push webhook body.
#[derive(Debug, Clone, Default)]
pub struct PushNotification {
    pub repository: String,
    pub pusher: String,
    pub branch: String,
    pub commits: Vec<CommitInfo>,
    pub compare_url: String,
}

/// File-level change totals across all commits of a push.
#[derive(Debug, Clone, Default)]
pub struct FileChangeSummary {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl PushNotification {
    pub fn file_change_summary(&self) -> FileChangeSummary {
        let mut summary = FileChangeSummary::default();
        for commit in &self.commits {
            summary.added.extend(commit.added.iter().cloned());
            summary.modified.extend(commit.modified.iter().cloned());
            summary.removed.extend(commit.removed.iter().cloned());
        }
        summary
    }
}

/// Strip a `refs/heads/` prefix down to the bare branch name.
pub fn branch_from_ref(git_ref: &str) -> String {
    git_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(git_ref)
        .to_string()
}
