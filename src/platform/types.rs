//! Wire types for the Team Messaging / REST surface (spec.md §4.1, §6).

use serde::{Deserialize, Serialize};

use crate::model::{Attachment, ChatType, Mention};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Post {
    pub id: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostCreate<'a> {
    pub text: &'a str,
    #[serde(rename = "attachments", skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostUpdate<'a> {
    pub text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatsListResponse {
    #[serde(default)]
    pub records: Vec<ChatSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub members: Vec<MemberRef>,
}

/// Members come back as either a bare string id or `{"id": "..."}`
/// (spec.md §4.6 normalization).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MemberRef {
    Id(String),
    Object { id: String },
}

impl MemberRef {
    pub fn id(&self) -> &str {
        match self {
            MemberRef::Id(s) => s,
            MemberRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentExtension {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserDetails {
    pub id: String,
    #[serde(default, rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, rename = "lastName")]
    pub last_name: Option<String>,
}

impl UserDetails {
    pub fn display_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => Some(format!("{f} {l}")),
            (Some(f), None) => Some(f.clone()),
            (None, Some(l)) => Some(l.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub id: String,
}

/// Response to `POST /restapi/v1.0/subscription` creating a websocket push
/// subscription (spec.md §3 SubscriptionHandle, §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionCreateResponse {
    pub id: String,
    #[serde(rename = "deliveryMode")]
    pub delivery_mode: DeliveryMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryMode {
    #[serde(default)]
    pub address: Option<String>,
}
