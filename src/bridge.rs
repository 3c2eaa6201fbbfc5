//! Wires the per-account collaborators together (SPEC_FULL.md §9 design
//! notes: an explicit `Bridge` value owned by the entry point rather than
//! process-wide singletons).

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::ChatCache;
use crate::core::config::{AccountConfig, BridgeConfig};
use crate::core::shutdown::ShutdownService;
use crate::grouplog::GroupChatLog;
use crate::outbound::SentMessageLedger;
use crate::pipeline::{self, AccountPipeline};
use crate::platform::{PlatformClient, RestPlatformClient};
use crate::runtime::AgentRuntime;
use crate::status::StatusTracker;
use crate::subscription::{InboundDelivery, SubscriptionManager};

/// Owns every account's Subscription Manager and the shared inbound-event
/// dispatch loop. There is exactly one `Bridge` per process (spec.md §5
/// `wsManagers` map, keyed by `accountId`); each spawned task is registered
/// with the shared `ShutdownService` rather than tracked here, so a single
/// `shutdown.await_tasks()` call drains every account uniformly.
pub struct Bridge {
    config: BridgeConfig,
    shutdown: ShutdownService,
    runtime: Arc<dyn AgentRuntime>,
}

impl Bridge {
    pub fn new(config: BridgeConfig, shutdown: ShutdownService, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            config,
            shutdown,
            runtime,
        }
    }

    /// Start one Subscription Manager + dispatch loop per enabled account.
    pub async fn start(&mut self) {
        for account in self.config.accounts.clone() {
            if !account.enabled {
                tracing::info!(account_id = %account.account_id, "account disabled, skipping");
                continue;
            }
            self.start_account(account).await;
        }
    }

    async fn start_account(&mut self, account: AccountConfig) {
        let account_id = account.account_id.clone();
        let http = reqwest::Client::new();
        let session = crate::auth::Session::new(http.clone(), account.credentials.clone());
        let client: Arc<dyn PlatformClient> = Arc::new(RestPlatformClient::new(
            http,
            session,
            account.credentials.server().to_string(),
            account_id.clone(),
        ));

        let workspace = account.workspace_dir();
        let cache = Arc::new(ChatCache::new(account_id.clone(), workspace.clone(), client.clone()));
        if let Err(e) = cache.restore().await {
            tracing::warn!(account_id = %account_id, error = %e, "chat cache restore failed, starting empty");
        }
        let group_log = Arc::new(GroupChatLog::new(workspace));
        let ledger = Arc::new(SentMessageLedger::new());
        let status = StatusTracker::new(account_id.clone(), None);

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundDelivery>();

        let manager = SubscriptionManager::new(
            account_id.clone(),
            account.clone(),
            client.clone(),
            status.clone(),
            self.shutdown.clone(),
            inbound_tx,
        );
        let owner_id = manager.owner_id_handle();

        let pipeline_ctx = AccountPipeline {
            account_id: account_id.clone(),
            config: Arc::new(account),
            client,
            runtime: self.runtime.clone(),
            cache,
            group_log,
            ledger,
            status,
            owner_id,
        };

        let dispatcher = tokio::spawn(async move {
            while let Some(delivery) = inbound_rx.recv().await {
                let ctx = pipeline_ctx.clone();
                tokio::spawn(async move { pipeline::handle_event(&ctx, delivery.event).await });
            }
        });

        let subscription = manager.spawn();

        self.shutdown.register(subscription).await;
        self.shutdown.register(dispatcher).await;
    }
}
