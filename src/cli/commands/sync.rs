//! Sync command implementation
//!
//! This module implements the `sync` command: a one-shot pull for a
//! single citizen or for every configured subject.

use super::build_runtime;
use crate::config::load_config;
use crate::engine::mask_cpf;
use clap::Args;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// CPF of the citizen to synchronize; defaults to every configured subject
    #[arg(long)]
    pub cpf: Option<String>,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Starting one-shot sync");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let subjects = match &self.cpf {
            Some(cpf) => vec![cpf.clone()],
            None => config.sync.subjects.clone(),
        };
        if subjects.is_empty() {
            println!("❌ No subjects to sync: pass --cpf or configure [sync] subjects");
            return Ok(2);
        }

        let runtime = build_runtime(&config)?;

        println!("🔄 Synchronizing {} citizen(s)", subjects.len());
        println!();

        let mut failures = 0usize;
        for cpf in &subjects {
            match runtime.sync_engine.sync_patient_complete(cpf).await {
                Ok(report) => {
                    println!(
                        "✅ {}: patient={} pregnancies={} observations={}",
                        mask_cpf(cpf),
                        if report.citizen.is_some() { "found" } else { "none" },
                        report.pregnancies.len(),
                        report.observations.len(),
                    );
                }
                Err(e) => {
                    failures += 1;
                    println!("❌ {}: {e}", mask_cpf(cpf));
                }
            }
        }

        println!();
        if failures > 0 {
            println!("⚠️  {failures} of {} subject(s) failed", subjects.len());
            Ok(1)
        } else {
            println!("✅ Sync complete");
            Ok(0)
        }
    }
}
