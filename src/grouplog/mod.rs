//! Group Chat Log (spec.md §4.8 C8): append-only per-day-per-chat markdown
//! transcript, used as monitored-group evidence independent of reply policy.

use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::core::constants::GROUP_LOG_TIMEZONE;

#[derive(Debug, Error)]
pub enum GroupLogError {
    #[error("group log i/o error: {0}")]
    Io(#[from] std::io::Error),
}

static UNSAFE_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Replace every character outside `[A-Za-z0-9_-]` with `_` (spec.md §3
/// invariant: disallows separators, dots, and path-traversal characters).
pub fn filename_sanitize(chat_id: &str) -> String {
    UNSAFE_CHAR.replace_all(chat_id, "_").into_owned()
}

pub struct GroupChatLog {
    workspace: PathBuf,
}

impl GroupChatLog {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    fn log_path(&self, chat_id: &str, date: chrono::NaiveDate) -> PathBuf {
        self.workspace
            .join("memory")
            .join("chats")
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{}.md", filename_sanitize(chat_id)))
    }

    /// Append one entry, creating the file (with header) on first write.
    pub async fn append(
        &self,
        chat_id: &str,
        chat_name: Option<&str>,
        sender_id: &str,
        message_text: &str,
    ) -> Result<(), GroupLogError> {
        let now = Utc::now().with_timezone(&GROUP_LOG_TIMEZONE);
        let path = self.log_path(chat_id, now.date_naive());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let is_new = !path.exists();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        if is_new {
            let label = chat_name.filter(|n| !n.is_empty()).unwrap_or(chat_id);
            file.write_all(format!("# {label} ({chat_id})\n\n").as_bytes()).await?;
        }

        let entry = format!(
            "## {} - {sender_id}\n{message_text}\n\n---\n\n",
            now.format("%H:%M")
        );
        file.write_all(entry.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_dots_and_separators() {
        assert_eq!(filename_sanitize("../../etc/passwd"), "______etc_passwd");
        assert_eq!(filename_sanitize("abc-123_DEF"), "abc-123_DEF");
        assert_eq!(filename_sanitize("chat:123"), "chat_123");
    }

    #[tokio::test]
    async fn append_creates_header_once_and_appends_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = GroupChatLog::new(dir.path().to_path_buf());
        log.append("chat-1", Some("Team Standup"), "user-1", "hello").await.unwrap();
        log.append("chat-1", Some("Team Standup"), "user-2", "world").await.unwrap();

        let now = Utc::now().with_timezone(&GROUP_LOG_TIMEZONE);
        let path = log.log_path("chat-1", now.date_naive());
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.matches("# Team Standup (chat-1)").count(), 1);
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }
}
