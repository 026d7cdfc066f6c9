//! Registry gateway client
//!
//! One client instance serves all registry traffic. Every call runs inside
//! the circuit breaker and the retry executor: reads use the read preset,
//! writes use the write preset, and write idempotency keys are forwarded
//! in the `Idempotency-Key` header so a retried create cannot duplicate a
//! resource on the registry side.

use super::auth::TokenCache;
use super::tls::build_http_client;
use crate::config::RegistryConfig;
use crate::domain::{GatewayError, Result};
use crate::fhir::Bundle;
use crate::retry::{
    read_should_retry, retry_with_backoff, write_should_retry, CircuitBreaker, RetryPolicy,
};
use serde_json::Value;

const FHIR_CONTENT_TYPE: &str = "application/fhir+json";

/// Query parameters for a FHIR search
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one parameter, returning self for chaining
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn as_pairs(&self) -> &[(String, String)] {
        &self.params
    }
}

/// HTTP client for the national FHIR registry
pub struct RegistryClient {
    base_url: String,
    http: reqwest::Client,
    tokens: TokenCache,
    breaker: CircuitBreaker,
    read_policy: RetryPolicy,
    write_policy: RetryPolicy,
}

impl RegistryClient {
    /// Create a client from registry configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the underlying HTTP client
    /// cannot be built (for example, unparseable certificate material).
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let http = build_http_client(config)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            tokens: TokenCache::new(config),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
            read_policy: RetryPolicy::from_config(&config.read_retry, "registry_read"),
            write_policy: RetryPolicy::from_config(&config.write_retry, "registry_write"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the registry capability statement, used as a health check
    pub async fn get_metadata(&self) -> std::result::Result<Value, GatewayError> {
        let url = format!("{}/metadata", self.base_url);
        let query = SearchQuery::new();
        retry_with_backoff(&self.read_policy, read_should_retry, || {
            self.get_json(&url, &query)
        })
        .await
    }

    /// Search Patient resources
    pub async fn search_patients(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Bundle, GatewayError> {
        self.search("Patient", query).await
    }

    /// Search Condition resources
    pub async fn search_conditions(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Bundle, GatewayError> {
        self.search("Condition", query).await
    }

    /// Search Observation resources
    pub async fn search_observations(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<Bundle, GatewayError> {
        self.search("Observation", query).await
    }

    /// Search any resource type with the read retry preset
    pub async fn search(
        &self,
        resource_type: &str,
        query: &SearchQuery,
    ) -> std::result::Result<Bundle, GatewayError> {
        let url = format!("{}/{}", self.base_url, resource_type);
        let value = retry_with_backoff(&self.read_policy, read_should_retry, || {
            self.get_json(&url, query)
        })
        .await?;

        serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(format!("malformed search bundle: {e}")))
    }

    /// Create a single resource with the write retry preset
    ///
    /// The same idempotency key is sent on every attempt, so a retry after
    /// an ambiguous failure is deduplicated by the registry.
    pub async fn create_resource(
        &self,
        resource_type: &str,
        body: &Value,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Value, GatewayError> {
        let url = format!("{}/{}", self.base_url, resource_type);
        retry_with_backoff(&self.write_policy, write_should_retry, || {
            self.post_json(&url, body, idempotency_key)
        })
        .await
    }

    /// Post a transaction or batch bundle to the registry root
    pub async fn post_bundle(
        &self,
        bundle: &Value,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Bundle, GatewayError> {
        let value = retry_with_backoff(&self.write_policy, write_should_retry, || {
            self.post_json(&self.base_url, bundle, idempotency_key)
        })
        .await?;

        serde_json::from_value(value)
            .map_err(|e| GatewayError::InvalidResponse(format!("malformed response bundle: {e}")))
    }

    /// One GET attempt, guarded by the circuit breaker
    async fn get_json(
        &self,
        url: &str,
        query: &SearchQuery,
    ) -> std::result::Result<Value, GatewayError> {
        self.guard("GET", url)?;

        let token = match self.tokens.bearer_token(&self.http).await {
            Ok(token) => token,
            Err(err) => {
                self.breaker.record_failure();
                return Err(err);
            }
        };

        let mut request = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, FHIR_CONTENT_TYPE);
        if !query.is_empty() {
            request = request.query(query.as_pairs());
        }

        let outcome = self.execute(request).await;
        self.record(&outcome);
        outcome
    }

    /// One POST attempt, guarded by the circuit breaker
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        idempotency_key: Option<&str>,
    ) -> std::result::Result<Value, GatewayError> {
        self.guard("POST", url)?;

        let token = match self.tokens.bearer_token(&self.http).await {
            Ok(token) => token,
            Err(err) => {
                self.breaker.record_failure();
                return Err(err);
            }
        };

        let mut request = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, FHIR_CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, FHIR_CONTENT_TYPE)
            .json(body);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let outcome = self.execute(request).await;
        self.record(&outcome);
        outcome
    }

    fn guard(&self, method: &str, url: &str) -> std::result::Result<(), GatewayError> {
        if self.breaker.allow_call() {
            Ok(())
        } else {
            tracing::warn!(method = method, url = url, "Circuit breaker rejected call");
            Err(GatewayError::CircuitOpen {
                operation: format!("{method} {url}"),
            })
        }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<Value, GatewayError> {
        let response = request.send().await.map_err(GatewayError::from_transport)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(format!("invalid JSON body: {e}")));
        }

        if status.as_u16() == 401 {
            // Token may have been revoked server-side; force a refresh
            self.tokens.invalidate().await;
        }

        match status.as_u16() {
            401 | 403 => Err(GatewayError::AuthenticationFailed {
                status: status.as_u16(),
                body,
            }),
            code => Err(GatewayError::HttpStatus { status: code, body }),
        }
    }

    /// Feed one attempt's outcome to the circuit breaker
    ///
    /// Client-side statuses (4xx) do not trip the breaker; only transport
    /// failures and server errors count against it.
    fn record<T>(&self, outcome: &std::result::Result<T, GatewayError>) {
        match outcome {
            Ok(_) => self.breaker.record_success(),
            Err(err) => {
                let server_side = err.is_transport()
                    || matches!(err.status(), Some(status) if status >= 500 || status == 429);
                if server_side {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
            }
        }
    }
}
