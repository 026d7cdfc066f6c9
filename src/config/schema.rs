//! Configuration schema types
//!
//! This module defines the configuration structure for Ponte. The root
//! [`PonteConfig`] maps directly to the `ponte.toml` file; each section
//! validates itself so a broken deployment fails at startup, not mid-sweep.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    Production,
}

/// Main Ponte configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Serialize, Deserialize)]
pub struct PonteConfig {
    /// Application-level settings
    pub application: ApplicationConfig,

    /// National registry connection and credentials
    pub registry: RegistryConfig,

    /// Incremental sync settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Background worker intervals and retention
    #[serde(default)]
    pub workers: WorkersConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PonteConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value found
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.registry.validate(self.application.environment)?;
        self.sync.validate()?;
        self.workers.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// When true, publish operations are logged but not sent
    #[serde(default)]
    pub dry_run: bool,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("Invalid log_level '{other}'")),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
            environment: Environment::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// National registry connection configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// FHIR base URL of the registry
    pub base_url: String,

    /// OAuth2 token endpoint
    pub auth_url: String,

    /// OAuth2 client id (client-credentials grant)
    pub client_id: String,

    /// OAuth2 client secret, redacted in all output
    pub client_secret: SecretString,

    /// Optional scope requested with the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Directory holding client.crt, client.key and ca.crt for mTLS.
    /// Missing files disable mTLS with a warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_dir: Option<String>,

    /// Retry tuning for read (search) operations
    #[serde(default = "RetryConfig::read_default")]
    pub read_retry: RetryConfig,

    /// Retry tuning for write (create/bundle) operations
    #[serde(default = "RetryConfig::write_default")]
    pub write_retry: RetryConfig,

    /// Circuit breaker tuning
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl RegistryConfig {
    fn validate(&self, environment: Environment) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("registry.base_url must not be empty".to_string());
        }
        if self.auth_url.trim().is_empty() {
            return Err("registry.auth_url must not be empty".to_string());
        }
        if self.client_id.trim().is_empty() {
            return Err("registry.client_id must not be empty".to_string());
        }
        if environment == Environment::Production && !self.base_url.starts_with("https://") {
            return Err("registry.base_url must use https in production".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("registry.timeout_seconds must be greater than 0".to_string());
        }
        self.read_retry.validate("registry.read_retry")?;
        self.write_retry.validate("registry.write_retry")?;
        Ok(())
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Retry executor tuning for one operation class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// Multiplier applied per attempt
    pub backoff_multiplier: f64,

    /// Delay ceiling in milliseconds
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Defaults for read (search) operations
    pub fn read_default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }

    /// Defaults for write operations: a slower first retry, since a write
    /// that failed transiently deserves more breathing room
    pub fn write_default() -> Self {
        Self {
            base_delay_ms: 2_000,
            ..Self::read_default()
        }
    }

    fn validate(&self, section: &str) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err(format!("{section}.backoff_multiplier must be >= 1.0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!("{section}.max_delay_ms must be >= base_delay_ms"));
        }
        Ok(())
    }
}

/// Circuit breaker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before a half-open trial
    pub reset_timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 60,
        }
    }
}

/// Incremental sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between sync sweeps
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,

    /// CPFs of subjects the sweep keeps in sync
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl SyncConfig {
    fn validate(&self) -> Result<(), String> {
        if self.interval_seconds == 0 {
            return Err("sync.interval_seconds must be greater than 0".to_string());
        }
        for cpf in &self.subjects {
            if !cpf.chars().all(|c| c.is_ascii_digit()) || cpf.len() != 11 {
                return Err(format!("sync.subjects entry '{cpf}' is not an 11-digit CPF"));
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sync_interval(),
            subjects: Vec::new(),
        }
    }
}

fn default_sync_interval() -> u64 {
    300
}

/// Background worker intervals and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Seconds between retry sweeps
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,

    /// Maximum sync errors examined per retry sweep
    #[serde(default = "default_retry_batch")]
    pub retry_batch_size: usize,

    /// Seconds between cleanup sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,

    /// Days an exhausted sync error is kept before deletion
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl WorkersConfig {
    fn validate(&self) -> Result<(), String> {
        if self.retry_interval_seconds == 0 || self.cleanup_interval_seconds == 0 {
            return Err("worker intervals must be greater than 0".to_string());
        }
        if self.retention_days < 1 {
            return Err("workers.retention_days must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            retry_interval_seconds: default_retry_interval(),
            retry_batch_size: default_retry_batch(),
            cleanup_interval_seconds: default_cleanup_interval(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_retry_interval() -> u64 {
    60
}

fn default_retry_batch() -> usize {
    50
}

fn default_cleanup_interval() -> u64 {
    86_400
}

fn default_retention_days() -> i64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write JSON logs to rotating files
    #[serde(default)]
    pub file_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_log_path")]
    pub file_path: String,

    /// Rotation cadence: daily or hourly
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.file_enabled && self.file_path.trim().is_empty() {
            return Err("logging.file_path must be set when file_enabled = true".to_string());
        }
        match self.rotation.as_str() {
            "daily" | "hourly" => Ok(()),
            other => Err(format!("Invalid logging.rotation '{other}'")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_enabled: false,
            file_path: default_log_path(),
            rotation: default_rotation(),
        }
    }
}

fn default_log_path() -> String {
    "logs".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn base_config() -> PonteConfig {
        PonteConfig {
            application: ApplicationConfig::default(),
            registry: RegistryConfig {
                base_url: "https://registry.example.com/fhir".to_string(),
                auth_url: "https://auth.example.com/token".to_string(),
                client_id: "ponte-client".to_string(),
                client_secret: secret_string("secret".to_string()),
                scope: None,
                timeout_seconds: 30,
                cert_dir: None,
                read_retry: RetryConfig::read_default(),
                write_retry: RetryConfig::write_default(),
                circuit_breaker: CircuitBreakerConfig::default(),
            },
            sync: SyncConfig::default(),
            workers: WorkersConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let mut config = base_config();
        config.registry.base_url = "".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_production_requires_https() {
        let mut config = base_config();
        config.application.environment = Environment::Production;
        config.registry.base_url = "http://registry.example.com/fhir".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("https"));
    }

    #[test]
    fn test_invalid_subject_cpf_rejected() {
        let mut config = base_config();
        config.sync.subjects = vec!["123".to_string()];
        assert!(config.validate().is_err());

        config.sync.subjects = vec!["12345678901".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_defaults() {
        let read = RetryConfig::read_default();
        assert_eq!(read.base_delay_ms, 1_000);
        let write = RetryConfig::write_default();
        assert_eq!(write.base_delay_ms, 2_000);
        assert_eq!(write.max_retries, read.max_retries);
    }

    #[test]
    fn test_invalid_rotation_rejected() {
        let mut config = base_config();
        config.logging.rotation = "weekly".to_string();
        assert!(config.validate().is_err());
    }
}
