//! Status command implementation
//!
//! This module implements the `status` command: a registry health check
//! followed by a summary of local sync cursors.

use super::build_runtime;
use crate::config::load_config;
use crate::state::{CursorStatus, CursorStore};
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter cursors by resource type
    #[arg(long)]
    pub resource_type: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking registry status");

        println!("📊 Ponte Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let runtime = build_runtime(&config)?;

        print!("Registry {} ... ", config.registry.base_url);
        match runtime.gateway.get_metadata().await {
            Ok(metadata) => {
                let fhir_version = metadata
                    .get("fhirVersion")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                println!("✅ reachable (FHIR {fhir_version})");
            }
            Err(e) => {
                println!("❌ unreachable");
                println!("   Error: {e}");
                return Ok(4);
            }
        }

        let mut cursors = runtime.store.list().await?;
        if let Some(filter) = &self.resource_type {
            cursors.retain(|c| &c.resource_type == filter);
        }
        cursors.sort_by(|a, b| a.key().cmp(&b.key()));

        println!();
        if cursors.is_empty() {
            println!("No sync cursors yet.");
        } else {
            println!("Sync cursors:");
            for cursor in &cursors {
                let status = match cursor.status {
                    CursorStatus::Synced => "synced",
                    CursorStatus::Pending => "pending",
                    CursorStatus::Error => "error",
                    CursorStatus::Conflict => "conflict",
                };
                println!(
                    "  {:<40} {:<8} last_synced={} retries={}",
                    cursor.key(),
                    status,
                    cursor.last_synced_at.format("%Y-%m-%d %H:%M:%S"),
                    cursor.retry_count,
                );
            }
        }

        Ok(0)
    }
}
