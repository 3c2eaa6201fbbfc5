//! Top-level error unification for status-sink reporting (SPEC_FULL.md §3).
//! Never constructed for expected control flow — pipeline stages drop
//! silently rather than propagate an `Err`.

use thiserror::Error;

use crate::auth::AuthError;
use crate::cache::CacheError;
use crate::grouplog::GroupLogError;
use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    GroupLog(#[from] GroupLogError),
}
