//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::PonteConfig;
use crate::domain::errors::PonteError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into PonteConfig
/// 4. Applies environment variable overrides (PONTE_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if the file cannot be read, TOML parsing fails, a
/// referenced environment variable is missing, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use ponte::config::loader::load_config;
///
/// let config = load_config("ponte.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<PonteConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(PonteError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        PonteError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: PonteConfig = toml::from_str(&contents)
        .map_err(|e| PonteError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config);

    config
        .validate()
        .map_err(|e| PonteError::Configuration(format!("Configuration validation failed: {e}")))?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched so a commented-out `${EXAMPLE}` in the
/// sample config does not fail the load.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern");
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{var_name}}}");
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(PonteError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the PONTE_* prefix
///
/// Environment variables follow the pattern PONTE_<SECTION>_<KEY>,
/// for example PONTE_REGISTRY_BASE_URL or PONTE_SYNC_INTERVAL_SECONDS.
fn apply_env_overrides(config: &mut PonteConfig) {
    if let Ok(val) = std::env::var("PONTE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("PONTE_APPLICATION_DRY_RUN") {
        config.application.dry_run = val.parse().unwrap_or(false);
    }

    if let Ok(val) = std::env::var("PONTE_REGISTRY_BASE_URL") {
        config.registry.base_url = val;
    }
    if let Ok(val) = std::env::var("PONTE_REGISTRY_AUTH_URL") {
        config.registry.auth_url = val;
    }
    if let Ok(val) = std::env::var("PONTE_REGISTRY_CLIENT_ID") {
        config.registry.client_id = val;
    }
    if let Ok(val) = std::env::var("PONTE_REGISTRY_CLIENT_SECRET") {
        config.registry.client_secret = super::secret_string(val);
    }
    if let Ok(val) = std::env::var("PONTE_REGISTRY_CERT_DIR") {
        config.registry.cert_dir = Some(val);
    }
    if let Ok(val) = std::env::var("PONTE_REGISTRY_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.registry.timeout_seconds = timeout;
        }
    }

    if let Ok(val) = std::env::var("PONTE_SYNC_INTERVAL_SECONDS") {
        if let Ok(interval) = val.parse() {
            config.sync.interval_seconds = interval;
        }
    }

    if let Ok(val) = std::env::var("PONTE_WORKERS_RETRY_INTERVAL_SECONDS") {
        if let Ok(interval) = val.parse() {
            config.workers.retry_interval_seconds = interval;
        }
    }
    if let Ok(val) = std::env::var("PONTE_WORKERS_RETENTION_DAYS") {
        if let Ok(days) = val.parse() {
            config.workers.retention_days = days;
        }
    }

    if let Ok(val) = std::env::var("PONTE_LOGGING_FILE_ENABLED") {
        config.logging.file_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("PONTE_LOGGING_FILE_PATH") {
        config.logging.file_path = val;
    }
}
