//! Platform Client (spec.md §4.1 C1): a thin typed adapter over the Team
//! Messaging and base REST surfaces.

use async_trait::async_trait;
use serde_json::Value;

use super::download::{self, DownloadedContent};
use super::error::{PlatformError, PlatformErrorKind, classify, format_error};
use super::types::{
    ChatSummary, ChatsListResponse, CurrentExtension, Post, SubscriptionCreateResponse, UploadResponse, UserDetails,
};
use crate::auth::Session;
use crate::core::constants::{REST_BASE, TEAM_MESSAGING_BASE};
use crate::model::ChatType;

/// Everything the Inbound Pipeline, Outbound Delivery, and Chat Cache need
/// from the platform. Abstracted behind a trait so tests can substitute a
/// fake implementation without a live account.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn current_extension(&self) -> Result<CurrentExtension, PlatformError>;
    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatSummary>, PlatformError>;
    async fn list_chats(&self, chat_type: ChatType, limit: u32) -> Result<Vec<ChatSummary>, PlatformError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<UserDetails>, PlatformError>;

    async fn create_post(
        &self,
        chat_id: &str,
        text: &str,
        attachment_ids: &[String],
    ) -> Result<Post, PlatformError>;
    async fn update_post(&self, chat_id: &str, post_id: &str, text: &str) -> Result<Post, PlatformError>;
    async fn delete_post(&self, chat_id: &str, post_id: &str) -> Result<(), PlatformError>;

    async fn upload_attachment(
        &self,
        chat_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadResponse, PlatformError>;

    /// Streaming download honoring `max_bytes` (spec.md §4.1 critical contract).
    async fn download_content(
        &self,
        content_uri: &str,
        max_bytes: u64,
    ) -> Result<DownloadedContent, PlatformError>;

    /// Thin CRUD veneer for tasks/events/notes/adaptive cards (spec.md §4.1,
    /// §9 design notes: additional post types, not part of the core pipeline).
    async fn crud(
        &self,
        method: reqwest::Method,
        team_messaging_path: &str,
        body: Option<Value>,
    ) -> Result<Value, PlatformError>;

    /// Create the websocket push subscription for `filters` (spec.md §4.3, §6).
    async fn create_subscription(&self, filters: &[&str]) -> Result<SubscriptionCreateResponse, PlatformError>;
    /// Best-effort revoke on shutdown (spec.md §4.9).
    async fn revoke_subscription(&self, subscription_id: &str) -> Result<(), PlatformError>;
}

pub struct RestPlatformClient {
    http: reqwest::Client,
    session: Session,
    server: String,
    account_id: String,
}

impl RestPlatformClient {
    pub fn new(http: reqwest::Client, session: Session, server: String, account_id: String) -> Self {
        Self {
            http,
            session,
            server,
            account_id,
        }
    }

    async fn bearer(&self) -> Result<String, PlatformError> {
        self.session
            .bearer_token()
            .await
            .map_err(|e| PlatformError::Authentication(e.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    async fn handle_error(&self, response: reqwest::Response) -> PlatformError {
        let status = response.status().as_u16();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        let error_code = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("errorCode").and_then(|c| c.as_str()).map(str::to_string));
        let message = format_error(status, request_id.as_deref(), &self.account_id, &body);
        tracing::warn!(status, account_id = %self.account_id, "{}", message);

        match classify(status, error_code.as_deref()) {
            PlatformErrorKind::Authentication => PlatformError::Authentication(message),
            PlatformErrorKind::RateLimit => PlatformError::RateLimit { message, retry_after },
            PlatformErrorKind::NotFound => PlatformError::NotFound,
            PlatformErrorKind::PayloadTooLarge => PlatformError::PayloadTooLarge,
            PlatformErrorKind::Validation => PlatformError::Validation(message),
            PlatformErrorKind::Other => PlatformError::Other(message),
        }
    }
}

#[async_trait]
impl PlatformClient for RestPlatformClient {
    async fn current_extension(&self) -> Result<CurrentExtension, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{REST_BASE}/account/~/extension/~"));
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatSummary>, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats/{chat_id}"));
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(Some(response.json().await.map_err(PlatformError::from)?))
    }

    async fn list_chats(&self, chat_type: ChatType, limit: u32) -> Result<Vec<ChatSummary>, PlatformError> {
        let token = self.bearer().await?;
        let type_param = match chat_type {
            ChatType::Personal => "Personal",
            ChatType::Direct => "Direct",
            ChatType::Group => "Group",
            ChatType::Team => "Team",
            ChatType::Everyone => "Everyone",
        };
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats"));
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("type", type_param), ("recordCount", &limit.to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        let parsed: ChatsListResponse = response.json().await.map_err(PlatformError::from)?;
        Ok(parsed.records)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserDetails>, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/persons/{user_id}"));
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(Some(response.json().await.map_err(PlatformError::from)?))
    }

    async fn create_post(
        &self,
        chat_id: &str,
        text: &str,
        attachment_ids: &[String],
    ) -> Result<Post, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats/{chat_id}/posts"));
        let body = serde_json::json!({
            "text": text,
            "attachments": attachment_ids.iter().map(|id| serde_json::json!({"id": id})).collect::<Vec<_>>(),
        });
        let response = self.http.post(&url).bearer_auth(token).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn update_post(&self, chat_id: &str, post_id: &str, text: &str) -> Result<Post, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats/{chat_id}/posts/{post_id}"));
        let response = self
            .http
            .patch(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn delete_post(&self, chat_id: &str, post_id: &str) -> Result<(), PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats/{chat_id}/posts/{post_id}"));
        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(())
    }

    async fn upload_attachment(
        &self,
        chat_id: &str,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadResponse, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}/chats/{chat_id}/files"));
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)
            .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new()));
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self.http.post(&url).bearer_auth(token).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn download_content(
        &self,
        content_uri: &str,
        max_bytes: u64,
    ) -> Result<DownloadedContent, PlatformError> {
        let token = self.bearer().await?;
        download::download_limited(&self.http, content_uri, max_bytes, Some(&token))
            .await
            .map_err(|e| match e {
                download::DownloadError::PayloadTooLarge { .. } => PlatformError::PayloadTooLarge,
                download::DownloadError::Request(err) => PlatformError::from(err),
            })
    }

    async fn crud(
        &self,
        method: reqwest::Method,
        team_messaging_path: &str,
        body: Option<Value>,
    ) -> Result<Value, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{TEAM_MESSAGING_BASE}{team_messaging_path}"));
        let mut builder = self.http.request(method, &url).bearer_auth(token);
        if let Some(b) = body {
            builder = builder.json(&b);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.unwrap_or(Value::Null))
    }

    async fn create_subscription(&self, filters: &[&str]) -> Result<SubscriptionCreateResponse, PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{REST_BASE}/subscription"));
        let body = serde_json::json!({
            "eventFilters": filters,
            "deliveryMode": { "transportType": "WebSocket" },
        });
        let response = self.http.post(&url).bearer_auth(token).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(response.json().await.map_err(PlatformError::from)?)
    }

    async fn revoke_subscription(&self, subscription_id: &str) -> Result<(), PlatformError> {
        let token = self.bearer().await?;
        let url = self.url(&format!("{REST_BASE}/subscription/{subscription_id}"));
        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(self.handle_error(response).await);
        }
        Ok(())
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Other(e.to_string())
    }
}
