//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "ponte.toml")]
    pub output: String,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing Ponte configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        match fs::write(&self.output, sample_config()) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your registry endpoints", self.output);
                println!("  2. Set PONTE_CLIENT_SECRET in the environment or a .env file");
                println!("  3. Place client.crt, client.key and ca.crt in cert_dir for mTLS");
                println!("  4. Add the CPFs to track under [sync] subjects");
                println!("  5. Validate configuration: ponte validate-config");
                println!("  6. Run a one-shot sync: ponte sync --cpf <CPF>");
                println!("  7. Start the service: ponte run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

/// Sample configuration, loadable once the secret is provided
fn sample_config() -> &'static str {
    r#"# Ponte Configuration File
# Clinical record bridge to the national FHIR registry

[application]
log_level = "info"
dry_run = false

# development, staging or production
environment = "development"

[registry]
base_url = "https://ehr-services.hmg.saude.gov.br/api/fhir/r4"
auth_url = "https://ehr-auth-hmg.saude.gov.br/api/token"
client_id = "ponte"
client_secret = "${PONTE_CLIENT_SECRET}"
timeout_seconds = 30
# Directory with client.crt, client.key and ca.crt; omit to disable mTLS
# cert_dir = "/etc/ponte/certs"

[registry.read_retry]
max_retries = 3
base_delay_ms = 1000
backoff_multiplier = 2.0
max_delay_ms = 30000

[registry.write_retry]
max_retries = 3
base_delay_ms = 2000
backoff_multiplier = 2.0
max_delay_ms = 30000

[registry.circuit_breaker]
failure_threshold = 5
reset_timeout_seconds = 60

[sync]
interval_seconds = 300
# CPFs of the citizens to synchronize
subjects = []

[workers]
retry_interval_seconds = 60
retry_batch_size = 50
cleanup_interval_seconds = 86400
retention_days = 30

[logging]
file_enabled = false
file_path = "logs"
rotation = "daily"
"#
}
