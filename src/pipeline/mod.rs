//! Inbound Pipeline (spec.md §4.4 C4): the ordered 19-stage admission and
//! dispatch path for one received post notification. Unless stated
//! otherwise, a failed stage drops the event silently (logged at debug).

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::ChatCache;
use crate::core::config::{AccountConfig, DmPolicy, GroupPolicy};
use crate::grouplog::GroupChatLog;
use crate::model::{Envelope, EnvelopeChatType, InboundEvent, PeerKind};
use crate::outbound::{SentMessageLedger, deliver};
use crate::platform::PlatformClient;
use crate::policy::{detect_loop_guard_marker, is_pure_attachment_placeholder, is_sender_allowed};
use crate::runtime::{AgentRuntime, MentionGateContext};
use crate::status::StatusTracker;

/// Everything one account's pipeline invocation needs, shared across events.
#[derive(Clone)]
pub struct AccountPipeline {
    pub account_id: String,
    pub config: Arc<AccountConfig>,
    pub client: Arc<dyn PlatformClient>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub cache: Arc<ChatCache>,
    pub group_log: Arc<GroupChatLog>,
    pub ledger: Arc<SentMessageLedger>,
    pub status: StatusTracker,
    pub owner_id: Arc<RwLock<Option<String>>>,
}

/// Drive one inbound event through all 19 stages. Never panics or returns an
/// error: every rejection is a silent, logged drop (spec.md §4.4 preamble).
pub async fn handle_event(ctx: &AccountPipeline, event: InboundEvent) {
    let account_id = ctx.account_id.as_str();

    // Stage 1: event-type filter.
    if let Some(event_type) = &event.body.event_type {
        if event_type != "PostAdded" {
            tracing::debug!(account_id, event_type, "dropping non-PostAdded event");
            return;
        }
    }

    // Stage 2: presence check.
    let raw_body = match build_raw_body(&event) {
        Some(b) => b,
        None => {
            tracing::debug!(account_id, "dropping event with no chatId or body text");
            return;
        }
    };
    let chat_id = event.body.group_id.clone();
    let sender_id = event.body.creator_id.clone();
    let post_id = event.body.id.clone();

    // Stage 3: self-echo by id.
    if ctx.ledger.contains(&post_id) {
        tracing::debug!(account_id, chat_id, post_id, "dropping self-echo");
        return;
    }

    // Stage 4: loop-guard marker detection.
    if let Some(marker) = detect_loop_guard_marker(&raw_body) {
        tracing::debug!(account_id, chat_id, ?marker, "dropping loop-guard marker");
        return;
    }

    // Stage 5: pure attachment placeholder.
    if event.body.attachments.is_empty() && is_pure_attachment_placeholder(&raw_body) {
        tracing::debug!(account_id, chat_id, "dropping pure attachment placeholder");
        return;
    }

    // Stage 6: selfOnly gate.
    let self_only = ctx.config.self_only();
    let owner_id = ctx.owner_id.read().await.clone();
    if self_only {
        if let Some(owner) = &owner_id {
            if &sender_id != owner {
                tracing::debug!(account_id, chat_id, sender_id, "selfOnly: dropping non-owner sender");
                return;
            }
        }
    }

    // Stage 7: chat info lookup.
    let chat = match ctx.client.get_chat(&chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => {
            tracing::debug!(account_id, chat_id, "chat not found, dropping");
            return;
        }
        Err(e) => {
            tracing::debug!(account_id, chat_id, error = %e, "getChat failed, dropping");
            return;
        }
    };
    let is_group = chat.chat_type.is_group();
    let peer_kind = PeerKind::from_chat_type(chat.chat_type);
    let chat_name = chat.name.clone();

    // Stage 8: configured-group filter.
    if is_group && !ctx.config.groups.is_empty() {
        let in_set = ctx.config.find_group_override(&chat_id, chat_name.as_deref()).is_some()
            || ctx.config.has_group_wildcard()
            || ctx.config.group_allowed_by_list(&chat_id, chat_name.as_deref());
        if !in_set {
            tracing::debug!(account_id, chat_id, "configured groups set but this chat is absent, dropping");
            return;
        }
    }

    // Stage 9: routing / peer id derivation.
    let peer_id = if !is_group {
        chat.members
            .iter()
            .map(|m| m.id().to_string())
            .find(|m| owner_id.as_deref() != Some(m.as_str()))
            .or_else(|| (owner_id.as_deref() != Some(sender_id.as_str())).then(|| sender_id.clone()))
            .unwrap_or_else(|| chat_id.clone())
    } else {
        chat_id.clone()
    };
    let session_key = ctx.runtime.session_key("ringcentral", account_id, peer_kind, &peer_id);

    // Stage 10: selfOnly + non-Personal drop.
    if self_only && chat.chat_type != crate::model::ChatType::Personal {
        tracing::debug!(account_id, chat_id, "selfOnly: dropping non-Personal chat");
        return;
    }

    let group_override = ctx.config.find_group_override(&chat_id, chat_name.as_deref());

    if is_group {
        // Stage 11: group policy.
        match ctx.config.effective_group_policy() {
            GroupPolicy::Disabled => {
                tracing::debug!(account_id, chat_id, "groupPolicy=disabled, dropping");
                return;
            }
            GroupPolicy::Allowlist => {
                let admitted = group_override.is_some()
                    || ctx.config.has_group_wildcard()
                    || ctx.config.group_allowed_by_list(&chat_id, chat_name.as_deref());
                if !admitted {
                    tracing::debug!(account_id, chat_id, "group not in allowlist, dropping");
                    return;
                }
            }
            GroupPolicy::Open => {}
        }

        if let Some(ov) = group_override {
            if !ov.is_allowed() {
                tracing::debug!(account_id, chat_id, "group override disabled, dropping");
                return;
            }
            if !ov.users.is_empty() && !is_sender_allowed(&sender_id, &ov.users) {
                tracing::debug!(account_id, chat_id, sender_id, "sender not in group users list, dropping");
                return;
            }
        }

        // Admitted: append to the log before mention gating (spec.md §3 invariant).
        let label = group_label(&chat_name, &chat_id, &chat.members.iter().map(|m| m.id().to_string()).collect::<Vec<_>>());
        if let Err(e) = ctx.group_log.append(&chat_id, Some(&label), &sender_id, &raw_body).await {
            tracing::warn!(account_id, chat_id, error = %e, "group log append failed");
        }
    } else if !self_only {
        // Stage 12: DM policy.
        let mut effective_allow_from = ctx.config.configured_dm_allow_from();
        // pairingStoreAllowFrom is owned by the out-of-scope pairing store;
        // absent one, the configured list is the whole of effectiveAllowFrom.
        effective_allow_from.dedup();

        match ctx.config.effective_dm_policy() {
            DmPolicy::Disabled => {
                tracing::debug!(account_id, chat_id, "dmPolicy=disabled, dropping");
                return;
            }
            DmPolicy::Allowlist | DmPolicy::Pairing => {
                if !is_sender_allowed(&sender_id, &effective_allow_from) {
                    tracing::debug!(account_id, chat_id, sender_id, "sender not allowed for DM, dropping");
                    return;
                }
            }
            DmPolicy::Open => {}
        }
    }

    // Stage 13: command authorization.
    let command_info = ctx.runtime.parse_command(&raw_body);
    let allow_from_for_command: Vec<String> = if is_group {
        group_override.map(|o| o.users.clone()).unwrap_or_default()
    } else {
        ctx.config.configured_dm_allow_from()
    };
    let command_authorized = command_info
        .as_ref()
        .map(|c| !c.is_control || allow_from_for_command.is_empty() || is_sender_allowed(&sender_id, &allow_from_for_command))
        .unwrap_or(true);
    if let Some(cmd) = &command_info {
        if is_group && cmd.is_control && !command_authorized {
            tracing::debug!(account_id, chat_id, sender_id, "unauthorized control command in group, dropping");
            return;
        }
    }

    // Stage 14: mention gating (groups only).
    if is_group {
        let require_mention = group_override
            .and_then(|o| o.require_mention)
            .unwrap_or_else(|| ctx.config.effective_require_mention());
        let has_any_mention = ctx.runtime.has_any_mention(&event.body.mentions, ctx.config.bot_extension_id.as_deref());
        let gate_ctx = MentionGateContext {
            require_mention,
            was_mentioned: has_any_mention,
            has_any_mention,
            has_control_command: command_info.as_ref().is_some_and(|c| c.is_control),
            command_authorized,
        };
        if !ctx.runtime.mention_gate(&gate_ctx) {
            tracing::debug!(account_id, chat_id, "mention gate declined, dropping");
            return;
        }
    }

    // Stage 15: attachment intake (first attachment only).
    let mut media_path = None;
    let mut media_type = None;
    if let Some(attachment) = event.body.attachments.first() {
        let max_bytes = ctx.config.media_max_mb() * 1024 * 1024;
        match ctx.client.download_content(&attachment.content_uri, max_bytes).await {
            Ok(content) => match ctx
                .runtime
                .save_media(account_id, content.buffer, content.content_type.as_deref())
                .await
            {
                Ok((path, media_t)) => {
                    media_path = Some(path);
                    media_type = Some(media_t);
                }
                Err(e) => tracing::warn!(account_id, chat_id, error = %e, "media toolkit save failed"),
            },
            Err(e) => tracing::warn!(account_id, chat_id, error = %e, "attachment download failed"),
        }
    }

    // Stage 16: envelope construction.
    let envelope_chat_type = if peer_kind == PeerKind::Channel {
        EnvelopeChatType::Channel
    } else if is_group {
        EnvelopeChatType::Channel
    } else {
        EnvelopeChatType::Direct
    };
    let (from, to) = if is_group {
        let label = format!("ringcentral:{}:{}", peer_kind.as_str(), chat_id);
        (label.clone(), label)
    } else {
        (format!("ringcentral:{sender_id}"), format!("ringcentral:{chat_id}"))
    };
    let conversation_label = chat_name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("chat:{chat_id}"));

    let envelope = Envelope {
        body: raw_body.clone(),
        raw_body: raw_body.clone(),
        command_body: command_info.map(|c| c.body),
        from,
        to,
        session_key,
        account_id: account_id.to_string(),
        chat_type: envelope_chat_type,
        conversation_label,
        sender_id: sender_id.clone(),
        was_mentioned: is_group.then(|| !event.body.mentions.is_empty()),
        command_authorized: Some(command_authorized),
        provider: "ringcentral",
        message_sid: post_id.clone(),
        media_path,
        media_type,
        group_space: is_group.then(|| chat_id.clone()),
        group_subject: chat_name,
        group_system_prompt: group_override.and_then(|o| o.system_prompt.clone()),
    };

    // Stage 18: thinking post.
    let thinking_text = format!("> 🦞 {} is thinking...", ctx.config.bot_name());
    let typing_post_id = match ctx.client.create_post(&chat_id, &thinking_text, &[]).await {
        Ok(post) => {
            ctx.ledger.record(post.id.clone()).await;
            Some(post.id)
        }
        Err(e) => {
            tracing::debug!(account_id, chat_id, error = %e, "thinking post failed, continuing without one");
            None
        }
    };

    // Stage 19: dispatch.
    let replies = ctx.runtime.handle(envelope).await;
    for (index, reply) in replies.into_iter().enumerate() {
        let typing_id = if index == 0 { typing_post_id.clone() } else { None };
        deliver(&ctx.client, &ctx.runtime, &ctx.ledger, &ctx.status, &ctx.config, &chat_id, reply, typing_id).await;
    }
}

fn build_raw_body(event: &InboundEvent) -> Option<String> {
    if event.body.group_id.is_empty() {
        return None;
    }
    let text = event.body.text.clone().unwrap_or_default();
    let raw = if !text.is_empty() {
        text
    } else if !event.body.attachments.is_empty() {
        "<media:attachment>".to_string()
    } else {
        String::new()
    };
    if raw.is_empty() { None } else { Some(raw) }
}

/// Human label: chat name, else up to three member ids, else `chat:<id>`
/// (spec.md §4.4 stage 11).
fn group_label(chat_name: &Option<String>, chat_id: &str, members: &[String]) -> String {
    if let Some(name) = chat_name {
        if !name.is_empty() {
            return name.clone();
        }
    }
    if !members.is_empty() {
        return members.iter().take(3).cloned().collect::<Vec<_>>().join(", ");
    }
    format!("chat:{chat_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PostBody;

    fn sample_event(text: &str) -> InboundEvent {
        InboundEvent {
            event: Some("/restapi/v1.0/glip/posts".into()),
            body: PostBody {
                id: "post-1".into(),
                group_id: "chat-1".into(),
                creator_id: "user-1".into(),
                creation_time: None,
                text: Some(text.into()),
                attachments: Vec::new(),
                mentions: Vec::new(),
                event_type: Some("PostAdded".into()),
            },
        }
    }

    #[test]
    fn build_raw_body_rejects_missing_chat_id() {
        let mut event = sample_event("hi");
        event.body.group_id = String::new();
        assert!(build_raw_body(&event).is_none());
    }

    #[test]
    fn build_raw_body_uses_attachment_placeholder_when_text_absent() {
        let mut event = sample_event("");
        event.body.attachments.push(crate::model::Attachment {
            id: Some("a1".into()),
            attachment_type: None,
            content_uri: "https://example.com/x".into(),
            content_type: None,
            name: None,
        });
        assert_eq!(build_raw_body(&event).as_deref(), Some("<media:attachment>"));
    }

    #[test]
    fn group_label_prefers_chat_name() {
        assert_eq!(
            group_label(&Some("Standup".into()), "chat-1", &["u1".into()]),
            "Standup"
        );
    }

    #[test]
    fn group_label_falls_back_to_member_ids_then_chat_id() {
        assert_eq!(group_label(&None, "chat-1", &["u1".into(), "u2".into()]), "u1, u2");
        assert_eq!(group_label(&None, "chat-1", &[]), "chat:chat-1");
    }
}
