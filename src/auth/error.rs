use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// 401 / invalid_grant — fatal for the subscription loop (spec.md §4.2).
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token response malformed: {0}")]
    Malformed(String),
}

impl AuthError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuthError::Authentication(_))
    }
}
