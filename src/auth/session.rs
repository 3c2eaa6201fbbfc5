//! Auth/Session (spec.md §4.2 C2): JWT-bearer grant, shared bearer
//! credential for C1 and C3.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

use super::error::AuthError;
use crate::core::config::AccountCredentials;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[cfg_attr(test, derive(serde::Serialize))]
struct JwtClaims {
    #[serde(default)]
    exp: Option<u64>,
}

struct Token {
    access_token: String,
    expires_at: Instant,
}

/// A shared, lazily-refreshed bearer credential for one account. Cloning is
/// cheap; clones share the same underlying token cache.
#[derive(Clone)]
pub struct Session {
    http: reqwest::Client,
    credentials: AccountCredentials,
    token: Arc<RwLock<Option<Token>>>,
}

/// Refresh this far ahead of expiry to avoid racing a request against an
/// access token that expires mid-flight.
const REFRESH_SKEW: Duration = Duration::from_secs(60);

impl Session {
    pub fn new(http: reqwest::Client, credentials: AccountCredentials) -> Self {
        Self {
            http,
            credentials,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Return a valid bearer token, refreshing via the JWT grant if absent
    /// or near expiry. A 401/invalid_grant response is fatal (spec.md §4.2).
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        {
            let guard = self.token.read().await;
            if let Some(tok) = guard.as_ref() {
                if Instant::now() + REFRESH_SKEW < tok.expires_at {
                    return Ok(tok.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        if let Some(tok) = guard.as_ref() {
            if Instant::now() + REFRESH_SKEW < tok.expires_at {
                return Ok(tok.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *guard = Some(fresh);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<Token, AuthError> {
        let url = format!("{}/restapi/oauth/token", self.credentials.server());
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", self.credentials.jwt.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Authentication(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("invalid_grant") {
                return Err(AuthError::Authentication(body));
            }
            return Err(AuthError::Malformed(format!("HTTP {status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))?;

        let ttl = parsed
            .expires_in
            .map(Duration::from_secs)
            .or_else(|| decode_jwt_ttl(&parsed.access_token))
            .unwrap_or(Duration::from_secs(3600));

        Ok(Token {
            access_token: parsed.access_token,
            expires_at: Instant::now() + ttl,
        })
    }
}

/// RingCentral access tokens are themselves JWTs; when the token response
/// omits `expires_in`, fall back to decoding the local `exp` claim. The
/// signature is not verified here — it is the `server` we just talked to
/// that vouches for it, not a third party, and verification is not needed
/// to learn the expiry.
fn decode_jwt_ttl(access_token: &str) -> Option<Duration> {
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};

    // The token issuer is the server we just authenticated against, so
    // signature verification adds nothing here; we only want the `exp`
    // claim to size the local refresh timer.
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<JwtClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)
        .ok()?;
    let exp = data.claims.exp?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some(Duration::from_secs(exp.saturating_sub(now)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_fatal_only_for_authentication() {
        assert!(AuthError::Authentication("x".into()).is_fatal());
        assert!(!AuthError::Malformed("x".into()).is_fatal());
    }

    #[test]
    fn decodes_jwt_exp_claim() {
        use jsonwebtoken::{EncodingKey, Header};

        let claims = JwtClaims { exp: Some(9_999_999_999) };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k"))
            .unwrap();
        let ttl = decode_jwt_ttl(&token);
        assert!(ttl.is_some());
        assert!(ttl.unwrap().as_secs() > 0);
    }
}
