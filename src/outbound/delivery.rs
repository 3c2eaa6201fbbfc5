//! Outbound Delivery (spec.md §4.5 C5): deliver a `ReplyPayload` produced by
//! the agent runtime back to a chat, via the media or text branch.

use std::sync::Arc;

use crate::core::config::AccountConfig;
use crate::model::ReplyPayload;
use crate::platform::PlatformClient;
use crate::runtime::AgentRuntime;
use crate::status::StatusTracker;

use super::ledger::SentMessageLedger;

const ANSWER_WRAPPER_OPEN: &str = "> --------answer--------";
const ANSWER_WRAPPER_CLOSE: &str = "> ---------end----------";
const MEDIA_FALLBACK_CAPTION: &str = "Sent attachment(s).";

/// Deliver one buffered reply block. `typing_post_id` is consumed here: the
/// caller passes it only for the first block of a dispatch (spec.md §4.4
/// stage 19, §4.5).
pub async fn deliver(
    client: &Arc<dyn PlatformClient>,
    runtime: &Arc<dyn AgentRuntime>,
    ledger: &SentMessageLedger,
    status: &StatusTracker,
    account: &AccountConfig,
    chat_id: &str,
    payload: ReplyPayload,
    typing_post_id: Option<String>,
) {
    if !payload.media_urls.is_empty() {
        deliver_media(client, runtime, ledger, status, account, chat_id, payload, typing_post_id).await;
    } else if let Some(text) = payload.text.filter(|t| !t.is_empty()) {
        deliver_text(client, runtime, ledger, status, account, chat_id, &text, typing_post_id).await;
    }
}

async fn deliver_media(
    client: &Arc<dyn PlatformClient>,
    runtime: &Arc<dyn AgentRuntime>,
    ledger: &SentMessageLedger,
    status: &StatusTracker,
    account: &AccountConfig,
    chat_id: &str,
    payload: ReplyPayload,
    typing_post_id: Option<String>,
) {
    let mut caption_suppressed = false;

    if let Some(typing_id) = &typing_post_id {
        if client.delete_post(chat_id, typing_id).await.is_err() {
            let fallback = payload.text.as_deref().unwrap_or(MEDIA_FALLBACK_CAPTION);
            if client.update_post(chat_id, typing_id, fallback).await.is_ok() {
                caption_suppressed = true;
            }
        }
    }

    let max_bytes = account.media_max_mb() * 1024 * 1024;

    for (index, url) in payload.media_urls.iter().enumerate() {
        let downloaded = match runtime.fetch_media(url, max_bytes).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(chat_id, url, error = %e, "media re-fetch failed, skipping attachment");
                continue;
            }
        };

        let filename = url.rsplit('/').next().unwrap_or("attachment").to_string();
        let content_type = downloaded.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
        let uploaded = match client
            .upload_attachment(chat_id, downloaded.buffer, &filename, &content_type)
            .await
        {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(chat_id, url, error = %e, "attachment upload failed, skipping");
                continue;
            }
        };

        let caption = if index == 0 && !caption_suppressed {
            payload.text.as_deref().unwrap_or("")
        } else {
            ""
        };

        match client.create_post(chat_id, caption, &[uploaded.id]).await {
            Ok(post) => {
                ledger.record(post.id).await;
                status.record_outbound().await;
            }
            Err(e) => {
                tracing::warn!(chat_id, url, error = %e, "posting attachment failed");
            }
        }
    }
}

async fn deliver_text(
    client: &Arc<dyn PlatformClient>,
    runtime: &Arc<dyn AgentRuntime>,
    ledger: &SentMessageLedger,
    status: &StatusTracker,
    account: &AccountConfig,
    chat_id: &str,
    text: &str,
    typing_post_id: Option<String>,
) {
    let wrapped = format!("{ANSWER_WRAPPER_OPEN}\n{text}\n{ANSWER_WRAPPER_CLOSE}");
    let chunks = runtime.chunk_text(&wrapped, account.text_chunk_limit(), account.chunk_mode());

    for (index, chunk) in chunks.into_iter().enumerate() {
        let result = if index == 0 {
            if let Some(typing_id) = &typing_post_id {
                client.update_post(chat_id, typing_id, &chunk).await
            } else {
                client.create_post(chat_id, &chunk, &[]).await
            }
        } else {
            client.create_post(chat_id, &chunk, &[]).await
        };

        match result {
            Ok(post) => {
                ledger.record(post.id).await;
                status.record_outbound().await;
            }
            Err(e) => {
                tracing::warn!(chat_id, chunk_index = index, error = %e, "chunk delivery failed, continuing");
            }
        }
    }
}
