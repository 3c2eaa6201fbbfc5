//! Normalized platform error extraction and formatting (spec.md §4.1, §7).

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    errors: Vec<SubError>,
}

#[derive(Debug, Deserialize)]
struct SubError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    /// 401 / invalid_grant — fatal for the subscription loop.
    #[error("{0}")]
    Authentication(String),
    /// 429 / "Request rate exceeded" — cooperative backoff, retry-after honored.
    #[error("{0}")]
    RateLimit { message: String, retry_after: Option<u64> },
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Other(String),
}

/// Build the normalized diagnostic string:
/// `HTTP {s} ErrorCode={c} RequestId={r} AccountId={a} Message="{m}" [sub-errors]`.
pub fn format_error(
    status: u16,
    request_id: Option<&str>,
    account_id: &str,
    body: &str,
) -> String {
    let parsed: ErrorBody = serde_json::from_str(body)
        .or_else(|_| serde_json::from_str::<String>(body).and_then(|s| serde_json::from_str(&s)))
        .unwrap_or_default();

    let mut sub = String::new();
    if !parsed.errors.is_empty() {
        let parts: Vec<String> = parsed
            .errors
            .iter()
            .map(|e| {
                format!(
                    "{{code={} message=\"{}\"}}",
                    e.error_code.as_deref().unwrap_or("-"),
                    e.message.as_deref().unwrap_or("-")
                )
            })
            .collect();
        sub = format!(" [{}]", parts.join(", "));
    }

    format!(
        "HTTP {} ErrorCode={} RequestId={} AccountId={} Message=\"{}\"{}",
        status,
        parsed.error_code.as_deref().unwrap_or("-"),
        request_id.unwrap_or("-"),
        account_id,
        parsed.message.as_deref().unwrap_or("-"),
        sub
    )
}

pub fn classify(status: u16, error_code: Option<&str>) -> PlatformErrorKind {
    if status == 401 || error_code == Some("invalid_grant") {
        return PlatformErrorKind::Authentication;
    }
    if status == 429 {
        return PlatformErrorKind::RateLimit;
    }
    if status == 404 {
        return PlatformErrorKind::NotFound;
    }
    if status == 413 {
        return PlatformErrorKind::PayloadTooLarge;
    }
    if (400..500).contains(&status) {
        return PlatformErrorKind::Validation;
    }
    PlatformErrorKind::Other
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    Authentication,
    RateLimit,
    NotFound,
    PayloadTooLarge,
    Validation,
    Other,
}
