//! OAuth2 client-credentials token acquisition and caching
//!
//! The registry hands out short-lived bearer tokens. The cache reuses a
//! token while more than [`REFRESH_MARGIN_SECONDS`] remain before expiry
//! and requests a fresh one otherwise, so concurrent callers never race a
//! token that is about to die mid-request.

use crate::config::RegistryConfig;
use crate::domain::GatewayError;
use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Seconds of remaining validity below which a token is refreshed
const REFRESH_MARGIN_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    expires_in: i64,
    #[allow(dead_code)]
    scope: Option<String>,
}

/// Process-wide OAuth2 token cache, scoped to one gateway client
pub struct TokenCache {
    auth_url: String,
    client_id: String,
    client_secret: crate::config::SecretString,
    scope: Option<String>,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Create a cache from registry configuration
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            cached: RwLock::new(None),
        }
    }

    /// Return a valid bearer token, refreshing when necessary
    ///
    /// # Errors
    ///
    /// Returns a `TokenRequest` error when the grant is rejected or the
    /// endpoint is unreachable.
    pub async fn bearer_token(&self, http: &reqwest::Client) -> Result<String, GatewayError> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if !needs_refresh(token.expires_at, Utc::now()) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if !needs_refresh(token.expires_at, Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.request_token(http).await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    /// Drop the cached token, forcing a refresh on the next call
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn request_token(&self, http: &reqwest::Client) -> Result<CachedToken, GatewayError> {
        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            (
                "client_secret",
                self.client_secret.expose_secret().as_ref().to_string(),
            ),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.clone()));
        }

        let response = http
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::TokenRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::TokenRequest(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::TokenRequest(format!("invalid token response: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in);

        tracing::debug!(
            client_id = %self.client_id,
            expires_in = token.expires_in,
            "Acquired registry access token"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

/// A token is refreshed once fewer than 60 seconds of validity remain
fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now <= Duration::seconds(REFRESH_MARGIN_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_not_refreshed() {
        let now = Utc::now();
        assert!(!needs_refresh(now + Duration::seconds(300), now));
    }

    #[test]
    fn test_token_inside_margin_refreshed() {
        let now = Utc::now();
        assert!(needs_refresh(now + Duration::seconds(59), now));
        assert!(needs_refresh(now + Duration::seconds(60), now));
    }

    #[test]
    fn test_expired_token_refreshed() {
        let now = Utc::now();
        assert!(needs_refresh(now - Duration::seconds(10), now));
    }

    #[test]
    fn test_token_response_parsing() {
        let json = r#"{
            "access_token": "abc",
            "token_type": "Bearer",
            "expires_in": 1800,
            "scope": "fhir"
        }"#;
        let parsed: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.expires_in, 1800);
    }
}
