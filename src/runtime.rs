//! Agent runtime seam (SPEC_FULL.md §1 out-of-scope collaborators): session
//! keying, mention gating, command authorization, text chunking, the media
//! toolkit, and buffered-block reply dispatch all live on the host process
//! that embeds this crate. We model the boundary as a trait plus a test
//! double so the Inbound Pipeline and Outbound Delivery are exercisable
//! without a real runtime attached.

use async_trait::async_trait;

use crate::core::config::ChunkMode;
use crate::model::{Envelope, Mention, PeerKind, ReplyPayload};
use crate::platform::DownloadedContent;

/// Inputs to the mention-gating decision (spec.md §4.4 stage 14).
pub struct MentionGateContext {
    pub require_mention: bool,
    pub was_mentioned: bool,
    pub has_any_mention: bool,
    pub has_control_command: bool,
    pub command_authorized: bool,
}

/// A parsed slash/control command (spec.md §4.4 stage 13).
pub struct CommandInfo {
    pub body: String,
    pub is_control: bool,
}

/// Error surface for the media toolkit (save-to-disk side of attachment
/// intake) and for the runtime's own remote-media fetch.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("media toolkit i/o error: {0}")]
    Io(String),
    #[error("media fetch failed: {0}")]
    Fetch(String),
}

/// The seam between this crate's CORE and the host agent process.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Derive a stable session key for `channel="ringcentral"` + account + peer
    /// (spec.md §4.4 stage 9).
    fn session_key(&self, channel: &str, account_id: &str, peer_kind: PeerKind, peer_id: &str) -> String;

    /// Detect and split a leading command invocation, if any.
    fn parse_command(&self, text: &str) -> Option<CommandInfo>;

    /// Whether any mention in `mentions` identifies the bot (by
    /// `bot_extension_id` when known).
    fn has_any_mention(&self, mentions: &[Mention], bot_extension_id: Option<&str>) -> bool;

    /// The mention-gating decision: `true` admits the event to dispatch.
    fn mention_gate(&self, ctx: &MentionGateContext) -> bool;

    /// Split `text` into chunks no longer than `limit`, honoring `mode`.
    fn chunk_text(&self, text: &str, limit: usize, mode: ChunkMode) -> Vec<String>;

    /// Persist already-downloaded bytes and return `(media_path, media_type)`.
    async fn save_media(
        &self,
        account_id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(String, String), RuntimeError>;

    /// Re-fetch a reply's outbound media URL, honoring `max_bytes`. This is
    /// the runtime's own fetch, deliberately separate from the Platform
    /// Client: `media_urls` names a host the agent runtime chose, not
    /// RingCentral, so the platform bearer token must never be attached to
    /// this request (spec.md §4.5 step 2).
    async fn fetch_media(&self, url: &str, max_bytes: u64) -> Result<DownloadedContent, RuntimeError>;

    /// Hand the constructed envelope to the agent; returns the buffered
    /// block(s) of replies to deliver in order (spec.md §4.4 stage 19).
    async fn handle(&self, envelope: Envelope) -> Vec<ReplyPayload>;
}

/// Minimal in-process test double: chunks deterministically, never rejects a
/// mention, and echoes the envelope body back as a single reply. Lets the
/// Inbound Pipeline and Outbound Delivery be exercised end-to-end without a
/// real agent process.
pub struct NullAgentRuntime;

#[async_trait]
impl AgentRuntime for NullAgentRuntime {
    fn session_key(&self, channel: &str, account_id: &str, peer_kind: PeerKind, peer_id: &str) -> String {
        format!("{channel}:{account_id}:{}:{peer_id}", peer_kind.as_str())
    }

    fn parse_command(&self, text: &str) -> Option<CommandInfo> {
        let trimmed = text.trim();
        trimmed.strip_prefix('/').map(|rest| CommandInfo {
            body: rest.to_string(),
            is_control: rest.split_whitespace().next().unwrap_or_default() == "stop",
        })
    }

    fn has_any_mention(&self, mentions: &[Mention], bot_extension_id: Option<&str>) -> bool {
        match bot_extension_id {
            Some(id) => mentions.iter().any(|m| m.id == id),
            None => !mentions.is_empty(),
        }
    }

    fn mention_gate(&self, ctx: &MentionGateContext) -> bool {
        if !ctx.require_mention {
            return true;
        }
        if ctx.has_control_command && ctx.command_authorized {
            return true;
        }
        ctx.was_mentioned || ctx.has_any_mention
    }

    fn chunk_text(&self, text: &str, limit: usize, mode: ChunkMode) -> Vec<String> {
        if text.len() <= limit {
            return vec![text.to_string()];
        }
        match mode {
            ChunkMode::Length => text
                .as_bytes()
                .chunks(limit)
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect(),
            ChunkMode::Newline => {
                let mut chunks = Vec::new();
                let mut current = String::new();
                for line in text.split('\n') {
                    if !current.is_empty() && current.len() + line.len() + 1 > limit {
                        chunks.push(std::mem::take(&mut current));
                    }
                    if !current.is_empty() {
                        current.push('\n');
                    }
                    current.push_str(line);
                    while current.len() > limit {
                        let (head, tail) = current.split_at(limit);
                        chunks.push(head.to_string());
                        current = tail.to_string();
                    }
                }
                if !current.is_empty() {
                    chunks.push(current);
                }
                chunks
            }
        }
    }

    async fn save_media(
        &self,
        account_id: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(String, String), RuntimeError> {
        let dir = std::env::temp_dir().join("ringcentral-bridge").join(account_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RuntimeError::Io(e.to_string()))?;
        let path = dir.join(format!("{}.bin", uuid_like()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| RuntimeError::Io(e.to_string()))?;
        Ok((
            path.to_string_lossy().into_owned(),
            content_type.unwrap_or("application/octet-stream").to_string(),
        ))
    }

    async fn handle(&self, envelope: Envelope) -> Vec<ReplyPayload> {
        vec![ReplyPayload {
            text: Some(envelope.body),
            media_urls: Vec::new(),
        }]
    }

    async fn fetch_media(&self, url: &str, max_bytes: u64) -> Result<DownloadedContent, RuntimeError> {
        let client = reqwest::Client::new();
        crate::platform::download::download_limited(&client, url, max_bytes, None)
            .await
            .map_err(|e| RuntimeError::Fetch(e.to_string()))
    }
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_detects_stop_as_control() {
        let runtime = NullAgentRuntime;
        let cmd = runtime.parse_command("/stop now").unwrap();
        assert!(cmd.is_control);
        assert_eq!(cmd.body, "stop now");
    }

    #[test]
    fn non_command_text_has_no_command() {
        let runtime = NullAgentRuntime;
        assert!(runtime.parse_command("hello").is_none());
    }

    #[test]
    fn mention_gate_requires_mention_when_configured() {
        let runtime = NullAgentRuntime;
        let ctx = MentionGateContext {
            require_mention: true,
            was_mentioned: false,
            has_any_mention: false,
            has_control_command: false,
            command_authorized: false,
        };
        assert!(!runtime.mention_gate(&ctx));
    }

    #[test]
    fn mention_gate_admits_when_not_required() {
        let runtime = NullAgentRuntime;
        let ctx = MentionGateContext {
            require_mention: false,
            was_mentioned: false,
            has_any_mention: false,
            has_control_command: false,
            command_authorized: false,
        };
        assert!(runtime.mention_gate(&ctx));
    }

    #[test]
    fn chunk_text_by_length_respects_limit() {
        let runtime = NullAgentRuntime;
        let text = "a".repeat(10);
        let chunks = runtime.chunk_text(&text, 4, ChunkMode::Length);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 4));
    }

    #[test]
    fn chunk_text_under_limit_is_single_chunk() {
        let runtime = NullAgentRuntime;
        let chunks = runtime.chunk_text("short", 100, ChunkMode::Length);
        assert_eq!(chunks, vec!["short".to_string()]);
    }
}
