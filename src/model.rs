//! Shared domain types (spec.md §3 DATA MODEL).

use serde::{Deserialize, Serialize};

/// Platform chat type (spec.md GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ChatType {
    Personal,
    Direct,
    Group,
    Team,
    Everyone,
}

impl ChatType {
    pub fn is_dm(self) -> bool {
        matches!(self, ChatType::Personal | ChatType::Direct)
    }

    pub fn is_group(self) -> bool {
        !self.is_dm()
    }
}

/// `peerKind` used when deriving the routing peer (spec.md §4.4 stage 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerKind {
    Channel,
    Group,
    Dm,
}

impl PeerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PeerKind::Channel => "channel",
            PeerKind::Group => "group",
            PeerKind::Dm => "dm",
        }
    }

    pub fn from_chat_type(chat_type: ChatType) -> Self {
        match chat_type {
            ChatType::Team => PeerKind::Channel,
            t if t.is_group() => PeerKind::Group,
            _ => PeerKind::Dm,
        }
    }
}

/// A resolved chat as returned by `GET {TM}/chats/{chatId}` (spec.md §3 ChatRecord).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A chat cache entry (spec.md §3 CachedChat).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CachedChat {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Persisted cache file shape (spec.md §6 Persisted state).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCacheFile {
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub chats: Vec<CachedChat>,
}

/// An attachment on an inbound post (spec.md §3 Attachment).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub attachment_type: Option<String>,
    pub content_uri: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MentionType {
    Person,
    Other,
}

/// A structural @-mention on an inbound post (spec.md §3 Mention).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Mention {
    pub id: String,
    #[serde(rename = "type", default = "default_mention_type")]
    pub mention_type: MentionType,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_mention_type() -> MentionType {
    MentionType::Other
}

/// The body of an inbound post event (spec.md §3 InboundEvent).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostBody {
    pub id: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(rename = "creatorId")]
    pub creator_id: String,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub event_type: Option<String>,
}

/// The raw websocket notification envelope (spec.md §3 InboundEvent, §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub event: Option<String>,
    pub body: PostBody,
}

/// A normalized outbound-to-agent-runtime message (spec.md §3 Envelope).
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub body: String,
    pub raw_body: String,
    pub command_body: Option<String>,
    pub from: String,
    pub to: String,
    pub session_key: String,
    pub account_id: String,
    pub chat_type: EnvelopeChatType,
    pub conversation_label: String,
    pub sender_id: String,
    pub was_mentioned: Option<bool>,
    pub command_authorized: Option<bool>,
    pub provider: &'static str,
    pub message_sid: String,
    pub media_path: Option<String>,
    pub media_type: Option<String>,
    pub group_space: Option<String>,
    pub group_subject: Option<String>,
    pub group_system_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeChatType {
    Channel,
    Direct,
}

/// A reply emitted by the agent runtime for delivery (spec.md §3 ReplyPayload).
#[derive(Debug, Clone, Default)]
pub struct ReplyPayload {
    pub text: Option<String>,
    pub media_urls: Vec<String>,
}
