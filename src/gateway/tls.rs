//! HTTP client construction with optional mutual TLS
//!
//! Production registry endpoints require a client certificate. The
//! builder loads `client.crt`, `client.key` and `ca.crt` from the
//! configured certificate directory; when any of them is missing the
//! client degrades to plain TLS with a warning so local development
//! against a mock registry keeps working.

use crate::config::RegistryConfig;
use crate::domain::{PonteError, Result};
use std::path::Path;
use std::time::Duration;

const CLIENT_CERT_FILE: &str = "client.crt";
const CLIENT_KEY_FILE: &str = "client.key";
const CA_CERT_FILE: &str = "ca.crt";

/// Build the reqwest client used for all registry traffic
///
/// # Errors
///
/// Returns a configuration error when certificate material exists but
/// cannot be parsed, or when the client itself fails to build.
pub fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(10));

    if let Some(cert_dir) = &config.cert_dir {
        builder = apply_mutual_tls(builder, Path::new(cert_dir))?;
    }

    builder
        .build()
        .map_err(|e| PonteError::Configuration(format!("Failed to build HTTP client: {e}")))
}

fn apply_mutual_tls(
    builder: reqwest::ClientBuilder,
    cert_dir: &Path,
) -> Result<reqwest::ClientBuilder> {
    let cert_path = cert_dir.join(CLIENT_CERT_FILE);
    let key_path = cert_dir.join(CLIENT_KEY_FILE);
    let ca_path = cert_dir.join(CA_CERT_FILE);

    if !(cert_path.exists() && key_path.exists() && ca_path.exists()) {
        tracing::warn!(
            cert_dir = %cert_dir.display(),
            "Certificate directory is incomplete, continuing without mutual TLS"
        );
        return Ok(builder);
    }

    let mut identity_pem = std::fs::read(&cert_path)?;
    identity_pem.extend_from_slice(&std::fs::read(&key_path)?);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| PonteError::Configuration(format!("Invalid client certificate: {e}")))?;

    let ca_pem = std::fs::read(&ca_path)?;
    let ca_cert = reqwest::Certificate::from_pem(&ca_pem)
        .map_err(|e| PonteError::Configuration(format!("Invalid CA certificate: {e}")))?;

    tracing::info!(cert_dir = %cert_dir.display(), "Mutual TLS enabled for registry traffic");

    Ok(builder.identity(identity).add_root_certificate(ca_cert))
}
