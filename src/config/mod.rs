//! Configuration management for Ponte.
//!
//! Ponte loads a TOML configuration file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `PONTE_*` environment overrides
//! - Default values for optional settings
//! - Per-section validation at load time
//!
//! # Example configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [registry]
//! base_url = "https://ehr-services.saude.gov.br/api/fhir/r4"
//! auth_url = "https://ehr-auth.saude.gov.br/api/token"
//! client_id = "ponte"
//! client_secret = "${PONTE_CLIENT_SECRET}"
//! cert_dir = "/etc/ponte/certs"
//!
//! [sync]
//! interval_seconds = 300
//! subjects = ["12345678901"]
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, CircuitBreakerConfig, Environment, LoggingConfig, PonteConfig,
    RegistryConfig, RetryConfig, SyncConfig, WorkersConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
