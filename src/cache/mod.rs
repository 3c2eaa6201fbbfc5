//! Chat Cache (spec.md §4.6 C6).

pub mod chat_cache;

pub use chat_cache::{CacheError, ChatCache, RefreshSummary};
