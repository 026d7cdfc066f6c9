//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Ponte configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after parsing, so a successful load means
        // the file is both well-formed and semantically valid
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration file loaded successfully");
                c
            }
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.application.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Registry: {}", config.registry.base_url);
        println!("  Auth endpoint: {}", config.registry.auth_url);
        println!(
            "  Mutual TLS: {}",
            match &config.registry.cert_dir {
                Some(dir) => format!("enabled ({dir})"),
                None => "disabled".to_string(),
            }
        );
        println!("  Subjects: {}", config.sync.subjects.len());
        println!("  Sync interval: {}s", config.sync.interval_seconds);
        println!("  Retention: {} days", config.workers.retention_days);

        Ok(0)
    }
}
