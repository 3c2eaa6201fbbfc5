//! Streaming download with a hard byte ceiling (spec.md §4.1, §3 invariant,
//! §8 testable properties). Used both for inbound attachment intake (C4
//! stage 15) and for re-fetching remote media before upload (C5).
//!
//! The whole-body convenience read (`Response::bytes()`) is forbidden here:
//! chunks are accumulated one at a time so an over-limit body is detected
//! and the stream cancelled before the limit is meaningfully exceeded.

use futures_util::StreamExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("payload too large: exceeds {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },
    #[error("download request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub struct DownloadedContent {
    pub buffer: Vec<u8>,
    pub content_type: Option<String>,
}

/// Perform a streaming GET against `url`, enforcing `max_bytes`.
///
/// 1. If `Content-Length` is present and exceeds `max_bytes`, fail without
///    reading any of the body.
/// 2. Otherwise accumulate chunks; the moment `accumulated + chunk.len() >
///    max_bytes`, stop pulling further chunks and fail.
pub async fn download_limited(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
    bearer: Option<&str>,
) -> Result<DownloadedContent, DownloadError> {
    let mut req = client.get(url);
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }
    let response = req.send().await?;

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(DownloadError::PayloadTooLarge { max_bytes });
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut buffer: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if (buffer.len() as u64) + (chunk.len() as u64) > max_bytes {
            // Drop the stream handle now: no further chunks are pulled.
            drop(stream);
            return Err(DownloadError::PayloadTooLarge { max_bytes });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(DownloadedContent {
        buffer,
        content_type,
    })
}
