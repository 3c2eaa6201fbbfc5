//! `SentMessageLedger`: a 60s-TTL set of post ids produced by this bridge,
//! the sole mechanism that breaks the own-echo loop (spec.md §3, §5, §8).

use std::time::Duration;

use moka::future::Cache;

use crate::core::constants::SENT_LEDGER_TTL_SECS;

#[derive(Clone)]
pub struct SentMessageLedger {
    entries: Cache<String, ()>,
}

impl Default for SentMessageLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SentMessageLedger {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .time_to_live(Duration::from_secs(SENT_LEDGER_TTL_SECS))
                .build(),
        }
    }

    /// Record a produced post id. Must complete before the next inbound
    /// event for the same chat can be accepted (spec.md §3 invariant).
    pub async fn record(&self, post_id: impl Into<String>) {
        self.entries.insert(post_id.into(), ()).await;
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.entries.contains_key(post_id)
    }
}
