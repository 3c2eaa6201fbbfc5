//! Chat Cache (spec.md §4.6 C6): in-memory snapshot backed by a diffed
//! on-disk file, restored at start with no automatic network sync (the
//! platform's auth rate limit is low; a full chat listing costs several
//! calls, so it only happens on an explicit `refresh()`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::constants::{CHAT_CACHE_FILE_NAME, CHAT_LIST_PAGE_LIMIT, PEER_RESOLVE_BATCH_SIZE, PEER_RESOLVE_BATCH_SLEEP_MS};
use crate::model::{CachedChat, ChatCacheFile, ChatType};
use crate::platform::PlatformClient;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("chat cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chat cache serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct RefreshSummary {
    pub count: usize,
    pub persisted: bool,
}

pub struct ChatCache {
    account_id: String,
    workspace: PathBuf,
    client: Arc<dyn PlatformClient>,
    memory: RwLock<ChatCacheFile>,
}

fn cache_path(workspace: &Path) -> PathBuf {
    workspace.join("memory").join(CHAT_CACHE_FILE_NAME)
}

impl ChatCache {
    pub fn new(account_id: String, workspace: PathBuf, client: Arc<dyn PlatformClient>) -> Self {
        Self {
            account_id,
            workspace,
            client,
            memory: RwLock::new(ChatCacheFile {
                updated_at: chrono::Utc::now(),
                owner_id: None,
                chats: Vec::new(),
            }),
        }
    }

    /// Restore from disk, if present. Never touches the network.
    pub async fn restore(&self) -> Result<(), CacheError> {
        let path = cache_path(&self.workspace);
        if !path.exists() {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        let parsed: ChatCacheFile = serde_json::from_str(&raw)?;
        *self.memory.write().await = parsed;
        Ok(())
    }

    pub async fn snapshot(&self) -> Vec<CachedChat> {
        self.memory.read().await.chats.clone()
    }

    pub async fn find_direct_chat_by_member(&self, member_id: &str) -> Option<CachedChat> {
        let memory = self.memory.read().await;
        if let Some(owner_id) = &memory.owner_id {
            return memory
                .chats
                .iter()
                .find(|c| {
                    c.chat_type == ChatType::Direct
                        && c.members.len() == 2
                        && c.members.iter().any(|m| m == owner_id)
                        && c.members.iter().any(|m| m == member_id)
                })
                .cloned();
        }
        memory
            .chats
            .iter()
            .find(|c| c.chat_type == ChatType::Direct && c.members.iter().any(|m| m == member_id))
            .cloned()
    }

    /// Explicit refresh: fetch all chat types in parallel, resolve Direct
    /// peer names in rate-limited batches, and persist only if changed.
    pub async fn refresh(&self) -> Result<RefreshSummary, CacheError> {
        let chat_types = [
            ChatType::Personal,
            ChatType::Direct,
            ChatType::Group,
            ChatType::Team,
            ChatType::Everyone,
        ];

        let (owner, lists) = tokio::join!(
            self.client.current_extension(),
            futures::future::join_all(chat_types.iter().map(|t| self.client.list_chats(*t, CHAT_LIST_PAGE_LIMIT))),
        );
        let owner_id = owner.ok().map(|e| e.id);

        let mut chats = Vec::new();
        let mut needs_peer_resolution: Vec<usize> = Vec::new();

        for (chat_type, result) in chat_types.iter().zip(lists) {
            let records = match result {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(account_id = %self.account_id, chat_type = ?chat_type, error = %e, "listChats failed");
                    continue;
                }
            };
            for record in records {
                let members: Vec<String> = record.members.iter().map(|m| m.id().to_string()).collect();
                let mut name = record.name.unwrap_or_default();

                if *chat_type == ChatType::Personal && name.is_empty() {
                    name = "(Personal)".to_string();
                } else if *chat_type == ChatType::Direct && name.is_empty() {
                    needs_peer_resolution.push(chats.len());
                }

                chats.push(CachedChat {
                    id: record.id,
                    name,
                    chat_type: *chat_type,
                    members,
                });
            }
        }

        self.resolve_peer_names(&mut chats, &needs_peer_resolution, owner_id.as_deref())
            .await;

        let count = chats.len();
        let persisted = self.persist_if_changed(owner_id, chats).await?;
        Ok(RefreshSummary { count, persisted })
    }

    async fn resolve_peer_names(&self, chats: &mut [CachedChat], indices: &[usize], owner_id: Option<&str>) {
        for batch in indices.chunks(PEER_RESOLVE_BATCH_SIZE) {
            let futures = batch.iter().map(|&idx| {
                let peer_id = chats[idx]
                    .members
                    .iter()
                    .find(|m| Some(m.as_str()) != owner_id)
                    .cloned()
                    .unwrap_or_else(|| chats[idx].id.clone());
                async move { (peer_id.clone(), self.client.get_user(&peer_id).await) }
            });
            let results = futures::future::join_all(futures).await;
            for (&idx, (peer_id, result)) in batch.iter().zip(results) {
                chats[idx].name = match result {
                    Ok(Some(user)) => user.display_name().unwrap_or(peer_id),
                    _ => peer_id,
                };
            }
            if batch.len() == PEER_RESOLVE_BATCH_SIZE {
                tokio::time::sleep(Duration::from_millis(PEER_RESOLVE_BATCH_SLEEP_MS)).await;
            }
        }
    }

    async fn persist_if_changed(&self, owner_id: Option<String>, chats: Vec<CachedChat>) -> Result<bool, CacheError> {
        let changed = {
            let memory = self.memory.read().await;
            let old_ids: std::collections::HashSet<&str> = memory.chats.iter().map(|c| c.id.as_str()).collect();
            let new_ids: std::collections::HashSet<&str> = chats.iter().map(|c| c.id.as_str()).collect();
            old_ids != new_ids
                || chats.iter().any(|c| {
                    memory
                        .chats
                        .iter()
                        .find(|o| o.id == c.id)
                        .is_none_or(|o| o.name != c.name)
                })
        };

        if !changed {
            return Ok(false);
        }

        let file = ChatCacheFile {
            updated_at: chrono::Utc::now(),
            owner_id,
            chats,
        };

        let path = cache_path(&self.workspace);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(&path, serialized).await?;
        *self.memory.write().await = file;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_is_under_memory_dir() {
        let p = cache_path(Path::new("/tmp/ws"));
        assert_eq!(p, PathBuf::from("/tmp/ws/memory/ringcentral-chat-cache.json"));
    }
}
