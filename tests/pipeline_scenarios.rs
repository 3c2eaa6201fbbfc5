//! End-to-end scenarios for the Inbound Pipeline and Outbound Delivery,
//! driven with a fake `PlatformClient` so no live account is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use ringcentral_bridge::cache::ChatCache;
use ringcentral_bridge::core::config::{AccountConfig, AccountCredentials, DmPolicy, GroupOverride, GroupPolicy};
use ringcentral_bridge::grouplog::GroupChatLog;
use ringcentral_bridge::model::{Attachment, ChatType, InboundEvent, PostBody};
use ringcentral_bridge::outbound::SentMessageLedger;
use ringcentral_bridge::pipeline::{self, AccountPipeline};
use ringcentral_bridge::platform::{DownloadedContent, PlatformClient, PlatformError};
use ringcentral_bridge::platform::types::{ChatSummary, CurrentExtension, MemberRef, Post, SubscriptionCreateResponse, UserDetails, UploadResponse};
use ringcentral_bridge::runtime::NullAgentRuntime;
use ringcentral_bridge::status::StatusTracker;

/// Records every post created/updated/deleted and answers `get_chat` /
/// `download_content` from fixed, test-configured state.
struct FakePlatformClient {
    chats: HashMap<String, ChatSummary>,
    created: Mutex<Vec<(String, String, Vec<String>)>>,
    updated: Mutex<Vec<(String, String, String)>>,
    deleted: Mutex<Vec<(String, String)>>,
    next_post_id: AtomicU64,
    deny_download: bool,
}

impl FakePlatformClient {
    fn new() -> Self {
        Self {
            chats: HashMap::new(),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next_post_id: AtomicU64::new(1),
            deny_download: false,
        }
    }

    fn with_chat(mut self, chat: ChatSummary) -> Self {
        self.chats.insert(chat.id.clone(), chat);
        self
    }

    fn next_id(&self) -> String {
        format!("post-{}", self.next_post_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn chat_summary(id: &str, chat_type: ChatType, name: Option<&str>, members: &[&str]) -> ChatSummary {
    ChatSummary {
        id: id.to_string(),
        name: name.map(str::to_string),
        chat_type,
        members: members.iter().map(|m| MemberRef::Id(m.to_string())).collect(),
    }
}

#[async_trait]
impl PlatformClient for FakePlatformClient {
    async fn current_extension(&self) -> Result<CurrentExtension, PlatformError> {
        Ok(CurrentExtension { id: "owner-1".into() })
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatSummary>, PlatformError> {
        Ok(self.chats.get(chat_id).cloned())
    }

    async fn list_chats(&self, _chat_type: ChatType, _limit: u32) -> Result<Vec<ChatSummary>, PlatformError> {
        Ok(self.chats.values().cloned().collect())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserDetails>, PlatformError> {
        Ok(Some(UserDetails {
            id: user_id.to_string(),
            first_name: Some("Test".into()),
            last_name: Some("User".into()),
        }))
    }

    async fn create_post(&self, chat_id: &str, text: &str, attachment_ids: &[String]) -> Result<Post, PlatformError> {
        let id = self.next_id();
        self.created
            .lock()
            .await
            .push((chat_id.to_string(), text.to_string(), attachment_ids.to_vec()));
        Ok(Post {
            id,
            group_id: chat_id.to_string(),
            text: Some(text.to_string()),
            attachments: Vec::new(),
            mentions: Vec::new(),
        })
    }

    async fn update_post(&self, chat_id: &str, post_id: &str, text: &str) -> Result<Post, PlatformError> {
        self.updated
            .lock()
            .await
            .push((chat_id.to_string(), post_id.to_string(), text.to_string()));
        Ok(Post {
            id: post_id.to_string(),
            group_id: chat_id.to_string(),
            text: Some(text.to_string()),
            attachments: Vec::new(),
            mentions: Vec::new(),
        })
    }

    async fn delete_post(&self, chat_id: &str, post_id: &str) -> Result<(), PlatformError> {
        self.deleted.lock().await.push((chat_id.to_string(), post_id.to_string()));
        Ok(())
    }

    async fn upload_attachment(
        &self,
        _chat_id: &str,
        _bytes: Vec<u8>,
        _filename: &str,
        _content_type: &str,
    ) -> Result<UploadResponse, PlatformError> {
        Ok(UploadResponse { id: "attachment-1".into() })
    }

    async fn download_content(&self, _content_uri: &str, max_bytes: u64) -> Result<DownloadedContent, PlatformError> {
        if self.deny_download {
            return Err(PlatformError::PayloadTooLarge);
        }
        let size = (max_bytes + 1) as usize;
        Ok(DownloadedContent {
            buffer: vec![0u8; size.min(4)],
            content_type: Some("application/octet-stream".into()),
        })
    }

    async fn crud(
        &self,
        _method: reqwest::Method,
        _team_messaging_path: &str,
        _body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, PlatformError> {
        Ok(serde_json::Value::Null)
    }

    async fn create_subscription(&self, _filters: &[&str]) -> Result<SubscriptionCreateResponse, PlatformError> {
        unimplemented!("not exercised by pipeline scenarios")
    }

    async fn revoke_subscription(&self, _subscription_id: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

fn base_account(account_id: &str, workspace: &std::path::Path) -> AccountConfig {
    AccountConfig {
        account_id: account_id.to_string(),
        enabled: true,
        credentials: AccountCredentials {
            client_id: "c".into(),
            client_secret: "s".into(),
            jwt: "j".into(),
            server: None,
        },
        dm_policy: Some(DmPolicy::Open),
        allow_from: vec!["*".into()],
        dm: None,
        group_policy: Some(GroupPolicy::Allowlist),
        group_allow_from: vec![],
        groups: HashMap::new(),
        require_mention: Some(false),
        media_max_mb: None,
        text_chunk_limit: Some(40),
        chunk_mode: None,
        self_only: Some(false),
        bot_extension_id: None,
        workspace: Some(workspace.to_string_lossy().into_owned()),
        name: None,
    }
}

fn sample_event(chat_id: &str, post_id: &str, sender_id: &str, text: &str) -> InboundEvent {
    InboundEvent {
        event: Some("/restapi/v1.0/glip/posts".into()),
        body: PostBody {
            id: post_id.into(),
            group_id: chat_id.into(),
            creator_id: sender_id.into(),
            creation_time: None,
            text: Some(text.into()),
            attachments: Vec::new(),
            mentions: Vec::new(),
            event_type: Some("PostAdded".into()),
        },
    }
}

async fn build_ctx(client: FakePlatformClient, account: AccountConfig, workspace: &std::path::Path) -> (AccountPipeline, Arc<FakePlatformClient>) {
    let client: Arc<FakePlatformClient> = Arc::new(client);
    let dyn_client: Arc<dyn PlatformClient> = client.clone();
    let cache = Arc::new(ChatCache::new(account.account_id.clone(), workspace.to_path_buf(), dyn_client.clone()));
    let group_log = Arc::new(GroupChatLog::new(workspace.to_path_buf()));
    let ledger = Arc::new(SentMessageLedger::new());
    let status = StatusTracker::new(account.account_id.clone(), None);
    let ctx = AccountPipeline {
        account_id: account.account_id.clone(),
        config: Arc::new(account),
        client: dyn_client,
        runtime: Arc::new(NullAgentRuntime),
        cache,
        group_log,
        ledger,
        status,
        owner_id: Arc::new(RwLock::new(Some("owner-1".to_string()))),
    };
    (ctx, client)
}

#[tokio::test]
async fn dm_message_is_admitted_and_answered() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-1", ChatType::Direct, None, &["owner-1", "user-2"]));
    let account = base_account("acct-1", dir.path());
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("chat-1", "post-1", "user-2", "hello there");
    pipeline::handle_event(&ctx, event).await;

    let created = client.created.lock().await;
    // One "thinking" post, then the text reply.
    assert_eq!(created.len(), 2);
    assert!(created[0].1.contains("thinking"));
    assert!(created[1].1.contains("hello there") || client.updated.lock().await.iter().any(|(_, _, t)| t.contains("hello there")));
}

#[tokio::test]
async fn self_only_personal_chat_is_admitted_and_answer_is_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-g", ChatType::Personal, None, &["owner-1"]));
    let mut account = base_account("acct-1", dir.path());
    account.self_only = Some(true);
    account.text_chunk_limit = Some(200);
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("chat-g", "post-1", "owner-1", "hi");
    pipeline::handle_event(&ctx, event).await;

    let created = client.created.lock().await;
    let updated = client.updated.lock().await;
    assert_eq!(created.len(), 1, "only the thinking post should be created");
    assert!(created[0].1.contains("thinking"));
    assert_eq!(updated.len(), 1, "the reply edits the thinking post in place");
    assert!(updated[0].2.starts_with("> --------answer--------"));
    assert!(updated[0].2.contains("hi"));
    assert!(updated[0].2.trim_end().ends_with("> ---------end----------"));
}

#[tokio::test]
async fn self_only_drops_events_from_non_owner_sender() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-g", ChatType::Personal, None, &["owner-1"]));
    let mut account = base_account("acct-1", dir.path());
    account.self_only = Some(true);
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("chat-g", "post-1", "someone-else", "hi");
    pipeline::handle_event(&ctx, event).await;

    assert!(client.created.lock().await.is_empty());
}

#[tokio::test]
async fn self_echo_by_post_id_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-1", ChatType::Direct, None, &["owner-1", "user-2"]));
    let account = base_account("acct-1", dir.path());
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    ctx.ledger.record("post-echo").await;
    let event = sample_event("chat-1", "post-echo", "user-2", "hello");
    pipeline::handle_event(&ctx, event).await;

    assert!(client.created.lock().await.is_empty());
}

#[tokio::test]
async fn loop_guard_thinking_marker_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-1", ChatType::Direct, None, &["owner-1", "user-2"]));
    let account = base_account("acct-1", dir.path());
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("chat-1", "post-9", "user-2", "> \u{1f99e} OpenClaw is thinking...");
    pipeline::handle_event(&ctx, event).await;

    assert!(client.created.lock().await.is_empty());
}

#[tokio::test]
async fn group_not_in_allowlist_is_dropped_and_no_log_written() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("group-1", ChatType::Group, Some("Random"), &["owner-1", "user-2"]));
    let mut account = base_account("acct-1", dir.path());
    account.groups.insert(
        "group-allowed".to_string(),
        GroupOverride {
            enabled: Some(true),
            allow: Some(true),
            require_mention: Some(false),
            users: vec![],
            system_prompt: None,
        },
    );
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("group-1", "post-1", "user-2", "hello group");
    pipeline::handle_event(&ctx, event).await;

    assert!(client.created.lock().await.is_empty());
    assert!(!dir.path().join("memory").join("chats").exists());
}

#[tokio::test]
async fn group_allowlist_hit_requires_mention_and_still_logs() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("group-1", ChatType::Group, Some("Standup"), &["owner-1", "user-2"]));
    let mut account = base_account("acct-1", dir.path());
    account.groups.insert(
        "group-1".to_string(),
        GroupOverride {
            enabled: Some(true),
            allow: Some(true),
            require_mention: Some(true),
            users: vec![],
            system_prompt: None,
        },
    );
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("group-1", "post-1", "user-2", "hello group, no mention here");
    pipeline::handle_event(&ctx, event).await;

    // Mention required but absent: no reply dispatched...
    assert!(client.created.lock().await.is_empty());
    // ...but the group log still recorded the message (logged before mention gating).
    let log_path = dir.path().join("memory").join("chats");
    assert!(log_path.exists());
    let mut entries = tokio::fs::read_dir(&log_path).await.unwrap();
    let day_dir = entries.next_entry().await.unwrap().unwrap().path();
    let log_file = day_dir.join("group-1.md");
    let contents = tokio::fs::read_to_string(&log_file).await.unwrap();
    assert!(contents.contains("hello group, no mention here"));
}

#[tokio::test]
async fn attachment_over_limit_is_skipped_but_text_still_flows() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = FakePlatformClient::new().with_chat(chat_summary("chat-1", ChatType::Direct, None, &["owner-1", "user-2"]));
    client.deny_download = true;
    let mut account = base_account("acct-1", dir.path());
    account.text_chunk_limit = Some(200);
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let mut event = sample_event("chat-1", "post-1", "user-2", "see attached");
    event.body.attachments.push(Attachment {
        id: Some("a1".into()),
        attachment_type: None,
        content_uri: "https://example.com/file.bin".into(),
        content_type: Some("application/octet-stream".into()),
        name: Some("file.bin".into()),
    });
    pipeline::handle_event(&ctx, event).await;

    // Download failure is logged and swallowed; the reply still flows as a
    // single chunk, editing the thinking post in place.
    assert_eq!(client.created.lock().await.len(), 1, "only the thinking post should be created");
    let updated = client.updated.lock().await;
    assert_eq!(updated.len(), 1);
    assert!(updated[0].2.contains("see attached"));
}

#[tokio::test]
async fn long_reply_is_chunked_across_multiple_posts() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("chat-1", ChatType::Direct, None, &["owner-1", "user-2"]));
    let account = base_account("acct-1", dir.path());
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let long_text = "word ".repeat(40);
    let event = sample_event("chat-1", "post-1", "user-2", long_text.trim());
    pipeline::handle_event(&ctx, event).await;

    let created = client.created.lock().await;
    let updated = client.updated.lock().await;
    // thinking post + at least one chunk edit/creation; limit is 40 bytes so the
    // wrapped echo text must split into more than one block.
    assert!(created.len() + updated.len() > 2);
}

#[tokio::test]
async fn mention_not_required_group_message_is_admitted() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new().with_chat(chat_summary("group-1", ChatType::Group, Some("Standup"), &["owner-1", "user-2"]));
    let mut account = base_account("acct-1", dir.path());
    account.groups.insert(
        "group-1".to_string(),
        GroupOverride {
            enabled: Some(true),
            allow: Some(true),
            require_mention: Some(false),
            users: vec![],
            system_prompt: None,
        },
    );
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("group-1", "post-1", "user-2", "no mention needed");
    pipeline::handle_event(&ctx, event).await;

    let created = client.created.lock().await;
    assert_eq!(created.len(), 2);
}

#[tokio::test]
async fn unknown_chat_is_dropped_silently() {
    let dir = tempfile::tempdir().unwrap();
    let client = FakePlatformClient::new();
    let account = base_account("acct-1", dir.path());
    let (ctx, client) = build_ctx(client, account, dir.path()).await;

    let event = sample_event("nonexistent", "post-1", "user-2", "hello");
    pipeline::handle_event(&ctx, event).await;

    assert!(client.created.lock().await.is_empty());
}
