//! Observability/Cleanup (spec.md §4.9 C9): per-account counters forwarded
//! to an optional sink on every change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Point-in-time snapshot of one account's Subscription Manager health.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatusSnapshot {
    pub account_id: String,
    pub total_reconnects: u64,
    pub last_reconnect_at: Option<DateTime<Utc>>,
    pub last_inbound_at: Option<DateTime<Utc>>,
    pub last_outbound_at: Option<DateTime<Utc>>,
}

/// Anything that wants to observe status changes (a metrics exporter, a CLI
/// status command). The crate ships no concrete sink beyond logging.
pub trait StatusSink: Send + Sync {
    fn on_update(&self, snapshot: &StatusSnapshot);
}

/// A sink that only logs; always installed underneath any user-supplied sink.
pub struct LoggingStatusSink;

impl StatusSink for LoggingStatusSink {
    fn on_update(&self, snapshot: &StatusSnapshot) {
        tracing::debug!(
            account_id = %snapshot.account_id,
            total_reconnects = snapshot.total_reconnects,
            last_inbound_at = ?snapshot.last_inbound_at,
            last_outbound_at = ?snapshot.last_outbound_at,
            "status update"
        );
    }
}

/// Shared, mutable status state for one account plus the sinks to notify.
#[derive(Clone)]
pub struct StatusTracker {
    inner: Arc<RwLock<StatusSnapshot>>,
    sinks: Arc<Vec<Box<dyn StatusSink>>>,
}

impl StatusTracker {
    pub fn new(account_id: String, extra_sink: Option<Box<dyn StatusSink>>) -> Self {
        let mut sinks: Vec<Box<dyn StatusSink>> = vec![Box::new(LoggingStatusSink)];
        if let Some(sink) = extra_sink {
            sinks.push(sink);
        }
        Self {
            inner: Arc::new(RwLock::new(StatusSnapshot {
                account_id,
                ..Default::default()
            })),
            sinks: Arc::new(sinks),
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }

    async fn publish(&self) {
        let snapshot = self.inner.read().await.clone();
        for sink in self.sinks.iter() {
            sink.on_update(&snapshot);
        }
    }

    pub async fn record_reconnect(&self) {
        {
            let mut guard = self.inner.write().await;
            guard.total_reconnects += 1;
            guard.last_reconnect_at = Some(Utc::now());
        }
        self.publish().await;
    }

    pub async fn record_inbound(&self) {
        {
            let mut guard = self.inner.write().await;
            guard.last_inbound_at = Some(Utc::now());
        }
        self.publish().await;
    }

    pub async fn record_outbound(&self) {
        {
            let mut guard = self.inner.write().await;
            guard.last_outbound_at = Some(Utc::now());
        }
        self.publish().await;
    }

    pub async fn last_inbound_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_inbound_at
    }
}
