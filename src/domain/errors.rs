//! Domain error types
//!
//! This module defines the error hierarchy for Ponte. All errors are
//! domain-specific and don't expose third-party types: the gateway maps
//! reqwest failures into [`GatewayError`] variants before they cross a
//! module boundary.

use crate::validator::ValidationFailure;
use thiserror::Error;

/// Main Ponte error type
///
/// This is the primary error type used throughout the application.
/// It wraps specific error types and provides context for error handling.
#[derive(Debug, Error)]
pub enum PonteError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Registry gateway errors (transport, HTTP status, auth)
    #[error("Registry gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Domain-to-wire (or inverse) mapping errors
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Local resource validation failed before transmission
    #[error("Validation failed: {0}")]
    ResourceInvalid(#[from] ValidationFailure),

    /// Sync/publish state management errors
    #[error("State management error: {0}")]
    State(String),

    /// Pull synchronization failures that are not gateway errors
    #[error("Sync error: {0}")]
    Sync(String),

    /// Publish engine errors that are not gateway or validation failures
    #[error("Publish error: {0}")]
    Publish(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Registry gateway errors
///
/// Errors that occur when talking to the national registry or its OAuth2
/// token endpoint. HTTP status codes are preserved so the retry executor
/// and the error taxonomy can classify them.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to reach the registry (connection refused, DNS failure)
    #[error("Failed to connect to registry: {0}")]
    ConnectionFailed(String),

    /// Request timed out at the HTTP client level
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Token endpoint rejected the client-credentials grant
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// Registry returned 401/403
    #[error("Authentication failed with status {status}: {body}")]
    AuthenticationFailed { status: u16, body: String },

    /// Registry returned a non-success HTTP status
    #[error("Registry returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response body could not be parsed
    #[error("Invalid response from registry: {0}")]
    InvalidResponse(String),

    /// Circuit breaker is open, call rejected without a network attempt
    #[error("Circuit breaker open for {operation}")]
    CircuitOpen { operation: String },
}

impl GatewayError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::AuthenticationFailed { status, .. }
            | GatewayError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body carried by this error, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            GatewayError::AuthenticationFailed { body, .. }
            | GatewayError::HttpStatus { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// True for transport-level failures (no HTTP response was received)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionFailed(_) | GatewayError::Timeout(_)
        )
    }

    /// Map a reqwest error to the matching gateway variant
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_connect() {
            GatewayError::ConnectionFailed(err.to_string())
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::ConnectionFailed(err.to_string())
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PonteError {
    fn from(err: std::io::Error) -> Self {
        PonteError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PonteError {
    fn from(err: serde_json::Error) -> Self {
        PonteError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PonteError {
    fn from(err: toml::de::Error) -> Self {
        PonteError::Configuration(format!("TOML parse error: {err}"))
    }
}
