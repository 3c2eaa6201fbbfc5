//! Subscription Manager (spec.md §4.3 C3): one websocket + one server-side
//! push subscription per account, with reconnect, backoff, and a health
//! watchdog. State machine: `Idle -> Connecting -> Subscribed ->
//! (Closed|Error|Stale) -> Backoff -> Connecting ...`, terminal only on
//! fatal auth error or cancel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;

use super::backoff::BackoffState;
use super::event::{WsFrame, parse_frame};
use crate::core::config::AccountConfig;
use crate::core::constants::{
    OWNER_ID_RETRY_BACKOFF_SECS, WATCHDOG_DRIFT_TOLERANCE_SECS, WATCHDOG_PERIOD_SECS, WATCHDOG_STALE_INBOUND_SECS,
    WS_SUBSCRIPTION_FILTERS,
};
use crate::core::shutdown::ShutdownService;
use crate::model::InboundEvent;
use crate::platform::{PlatformClient, PlatformError};
use crate::status::StatusTracker;

/// A single received post event handed off to the Inbound Pipeline.
pub struct InboundDelivery {
    pub account_id: String,
    pub event: InboundEvent,
}

enum ConnectOutcome {
    /// The socket closed or errored; reconnect with normal backoff.
    Disconnected,
    /// The health watchdog decided the connection is stale/drifted; reconnect.
    WatchdogTripped,
    /// 401 / invalid_grant — stop the manager entirely.
    Fatal(String),
    /// 429 / rate-limited; honor the server's retry-after.
    RateLimited { retry_after_secs: u64 },
}

/// Per-account singleton driving one websocket connection.
pub struct SubscriptionManager {
    account_id: String,
    account: AccountConfig,
    client: Arc<dyn PlatformClient>,
    status: StatusTracker,
    shutdown: ShutdownService,
    inbound_tx: mpsc::UnboundedSender<InboundDelivery>,
    owner_id: Arc<RwLock<Option<String>>>,
    owner_id_resolving: Arc<AtomicBool>,
}

impl SubscriptionManager {
    pub fn new(
        account_id: String,
        account: AccountConfig,
        client: Arc<dyn PlatformClient>,
        status: StatusTracker,
        shutdown: ShutdownService,
        inbound_tx: mpsc::UnboundedSender<InboundDelivery>,
    ) -> Self {
        Self {
            account_id,
            account,
            client,
            status,
            shutdown,
            inbound_tx,
            owner_id: Arc::new(RwLock::new(None)),
            owner_id_resolving: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn owner_id_handle(&self) -> Arc<RwLock<Option<String>>> {
        self.owner_id.clone()
    }

    /// Spawn the driving task; returns its handle for the shutdown registry.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        self.resolve_owner_id().await;

        let mut backoff = BackoffState::new();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            match self.connect_and_serve(&mut shutdown_rx, &mut backoff).await {
                Ok(()) => {
                    // Shutdown observed mid-connection; exit cleanly.
                    break;
                }
                Err(ConnectOutcome::Fatal(message)) => {
                    tracing::error!(account_id = %self.account_id, %message, "fatal authentication error, stopping subscription manager");
                    break;
                }
                Err(ConnectOutcome::RateLimited { retry_after_secs }) => {
                    self.status.record_reconnect().await;
                    let delay = backoff.next_delay(Some(retry_after_secs));
                    tracing::warn!(account_id = %self.account_id, delay_secs = delay.as_secs(), "rate limited, backing off");
                    if self.sleep_or_shutdown(delay, &mut shutdown_rx).await {
                        break;
                    }
                }
                Err(ConnectOutcome::Disconnected) | Err(ConnectOutcome::WatchdogTripped) => {
                    self.status.record_reconnect().await;
                    let delay = backoff.next_delay(None);
                    tracing::info!(account_id = %self.account_id, delay_secs = delay.as_secs(), "reconnecting");
                    if self.sleep_or_shutdown(delay, &mut shutdown_rx).await {
                        break;
                    }
                }
            }

            if self.owner_id.read().await.is_none() && !self.owner_id_resolving.load(Ordering::Relaxed) {
                self.resolve_owner_id().await;
            }
        }

        tracing::debug!(account_id = %self.account_id, "subscription manager stopped");
    }

    /// Returns `true` if shutdown fired during the sleep.
    async fn sleep_or_shutdown(&self, delay: Duration, shutdown_rx: &mut tokio::sync::watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown_rx.changed() => true,
        }
    }

    /// Prefer the first configured DM allow-list entry (spec.md §4.3); else
    /// resolve via the current-extension endpoint. Rate-limit failures are
    /// swallowed: the pipeline runs with a degraded self-echo filter and a
    /// retry is attempted no sooner than `OWNER_ID_RETRY_BACKOFF_SECS` later.
    async fn resolve_owner_id(&self) {
        if let Some(first) = self.account.configured_dm_allow_from().first() {
            *self.owner_id.write().await = Some(first.clone());
            return;
        }

        self.owner_id_resolving.store(true, Ordering::Relaxed);
        match self.client.current_extension().await {
            Ok(ext) => {
                *self.owner_id.write().await = Some(ext.id);
                self.owner_id_resolving.store(false, Ordering::Relaxed);
            }
            Err(PlatformError::RateLimit { .. }) => {
                tracing::warn!(account_id = %self.account_id, "ownerId resolution rate-limited, retrying later");
                let owner_id = self.owner_id.clone();
                let client = self.client.clone();
                let account_id = self.account_id.clone();
                let flag = self.owner_id_resolving.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(OWNER_ID_RETRY_BACKOFF_SECS)).await;
                    if let Ok(ext) = client.current_extension().await {
                        *owner_id.write().await = Some(ext.id);
                    } else {
                        tracing::warn!(account_id = %account_id, "ownerId retry failed, continuing without it");
                    }
                    flag.store(false, Ordering::Relaxed);
                });
            }
            Err(e) => {
                tracing::warn!(account_id = %self.account_id, error = %e, "could not resolve ownerId, continuing without it");
                self.owner_id_resolving.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Create the push subscription, open the websocket, and read frames
    /// until disconnect, watchdog trip, or shutdown. `Ok(())` means shutdown
    /// fired; `Err` carries the reconnect reason.
    async fn connect_and_serve(
        &mut self,
        shutdown_rx: &mut tokio::sync::watch::Receiver<bool>,
        backoff: &mut BackoffState,
    ) -> Result<(), ConnectOutcome> {
        let subscription = self
            .client
            .create_subscription(WS_SUBSCRIPTION_FILTERS)
            .await
            .map_err(|e| classify_connect_error(&e))?;

        let address = subscription
            .delivery_mode
            .address
            .ok_or_else(|| ConnectOutcome::Disconnected)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&address)
            .await
            .map_err(|_| ConnectOutcome::Disconnected)?;

        tracing::info!(account_id = %self.account_id, subscription_id = %subscription.id, "subscribed");
        // A successful subscribe+connect means the account is reachable again;
        // don't keep growing the delay from whatever attempt count got us here.
        backoff.reset();
        let (mut write, mut read) = ws_stream.split();

        let mut watchdog = tokio::time::interval(Duration::from_secs(WATCHDOG_PERIOD_SECS));
        watchdog.tick().await; // first tick fires immediately
        let mut last_tick = Instant::now();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    let _ = self.client.revoke_subscription(&subscription.id).await;
                    return Ok(());
                }
                _ = watchdog.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_tick);
                    last_tick = now;
                    if elapsed.as_secs() > WATCHDOG_PERIOD_SECS + WATCHDOG_DRIFT_TOLERANCE_SECS {
                        tracing::warn!(account_id = %self.account_id, elapsed_secs = elapsed.as_secs(), "watchdog: timer drift, forcing reconnect");
                        break ConnectOutcome::WatchdogTripped;
                    }
                    if let Some(last_inbound) = self.status.last_inbound_at().await {
                        let stale = chrono::Utc::now().signed_duration_since(last_inbound);
                        if stale.num_seconds() > WATCHDOG_STALE_INBOUND_SECS as i64 {
                            tracing::warn!(account_id = %self.account_id, "watchdog: inbound staleness, forcing reconnect");
                            break ConnectOutcome::WatchdogTripped;
                        }
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            break ConnectOutcome::Disconnected;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) => {
                            break ConnectOutcome::Disconnected;
                        }
                    }
                }
            }
        };

        let _ = self.client.revoke_subscription(&subscription.id).await;
        Err(outcome)
    }

    async fn handle_frame(&self, raw: &str) {
        match parse_frame(raw) {
            WsFrame::Post(event) => {
                self.status.record_inbound().await;
                let _ = self.inbound_tx.send(InboundDelivery {
                    account_id: self.account_id.clone(),
                    event,
                });
            }
            WsFrame::GroupEvent(_) => {
                tracing::debug!(account_id = %self.account_id, "group lifecycle event (not a post), ignoring");
            }
            WsFrame::SubscriptionControl(_) => {}
            WsFrame::Unrecognized(_) => {
                tracing::debug!(account_id = %self.account_id, "unrecognized websocket frame, dropping");
            }
        }
    }
}

fn classify_connect_error(error: &PlatformError) -> ConnectOutcome {
    match error {
        PlatformError::Authentication(message) => ConnectOutcome::Fatal(message.clone()),
        PlatformError::RateLimit { retry_after, .. } => ConnectOutcome::RateLimited {
            retry_after_secs: retry_after.unwrap_or(60),
        },
        _ => ConnectOutcome::Disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_error_classifies_with_retry_after() {
        let err = PlatformError::RateLimit {
            message: "x".into(),
            retry_after: Some(42),
        };
        match classify_connect_error(&err) {
            ConnectOutcome::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 42),
            _ => panic!("expected RateLimited"),
        }
    }

    #[test]
    fn authentication_error_is_fatal() {
        let err = PlatformError::Authentication("bad creds".into());
        assert!(matches!(classify_connect_error(&err), ConnectOutcome::Fatal(_)));
    }
}
