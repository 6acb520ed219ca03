//! Notification message formatting.

use super::types::{Provider, PushNotification};

const MAX_COMMITS_LISTED: usize = 5;
const MAX_FILES_LISTED: usize = 20;
const MAX_SUBJECT_LEN: usize = 60;

/// Format a push notification for delivery.
///
/// Returns `None` for a payload with zero commits; an empty notification is
/// never sent. File change sections render only for providers that supply
/// per-commit file lists.
pub fn format_push_message(push: &PushNotification, provider: Provider) -> Option<String> {
    if push.commits.is_empty() {
        return None;
    }

    let mut out = String::new();
    out.push_str(&format!("🔔 New Push to *{}*\n\n", push.repository));
    out.push_str(&format!("👤 Pusher : {}\n", push.pusher));
    out.push_str(&format!("🌿 Branch : {}\n", push.branch));
    out.push_str(&format!("📊 Commits: {}\n\n", push.commits.len()));

    out.push_str("*Commits:*\n");
    for (i, commit) in push.commits.iter().enumerate() {
        if i >= MAX_COMMITS_LISTED {
            out.push_str(&format!(
                "\n_...and {} more commit(s)_\n",
                push.commits.len() - MAX_COMMITS_LISTED
            ));
            break;
        }
        out.push_str(&format!(
            "• {} - {}\n",
            short_hash(&commit.id),
            subject(&commit.message)
        ));
    }

    if !push.compare_url.is_empty() {
        out.push_str(&format!("\n🔗 View changes: {}\n", push.compare_url));
    }

    if provider.has_file_lists() {
        append_file_summary(&mut out, push);
    }

    Some(out)
}

fn append_file_summary(out: &mut String, push: &PushNotification) {
    let summary = push.file_change_summary();
    if summary.added.is_empty() && summary.modified.is_empty() && summary.removed.is_empty() {
        return;
    }

    out.push_str("\n*File Changes:*\n");
    append_file_section(out, "✅ Added", &summary.added);
    append_file_section(out, "📝 Modified", &summary.modified);
    append_file_section(out, "❌ Removed", &summary.removed);
}

fn append_file_section(out: &mut String, heading: &str, files: &[String]) {
    if files.is_empty() {
        return;
    }
    out.push_str(&format!("\n{heading}: {}\n", files.len()));
    for (i, file) in files.iter().enumerate() {
        if i >= MAX_FILES_LISTED {
            out.push_str(&format!(
                "   _...and {} more_\n",
                files.len() - MAX_FILES_LISTED
            ));
            break;
        }
        out.push_str(&format!("   • {file}\n"));
    }
}

/// First 7 characters of a commit hash.
fn short_hash(id: &str) -> &str {
    id.get(..7).unwrap_or(id)
}

/// First line of the commit message, truncated to fit one notification row.
fn subject(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("");
    if first_line.chars().count() > MAX_SUBJECT_LEN {
        let truncated: String = first_line.chars().take(MAX_SUBJECT_LEN - 3).collect();
        format!("{truncated}...")
    } else {
        first_line.to_string()
    }
}
