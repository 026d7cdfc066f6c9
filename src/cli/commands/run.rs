//! Run command implementation
//!
//! This module implements the `run` command: the long-lived service mode
//! with the sync, retry and cleanup workers on their configured intervals.

use super::build_runtime;
use crate::config::load_config;
use crate::workers::{CleanupWorker, ConfigSubjects, RetryWorker, SyncWorker};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the sync interval in seconds
    #[arg(long)]
    pub sync_interval: Option<u64>,

    /// Validate payloads and log, but send nothing
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Execute the run command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting service mode");

        let mut config = load_config(config_path)?;

        if let Some(interval) = self.sync_interval {
            tracing::info!(interval_seconds = interval, "Overriding sync interval from CLI");
            config.sync.interval_seconds = interval;
        }
        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }

        let runtime = build_runtime(&config)?;
        let subjects = Arc::new(ConfigSubjects::new(config.sync.subjects.clone()));

        let sync_worker = Arc::new(SyncWorker::new(
            Arc::clone(&runtime.sync_engine),
            subjects,
            Duration::from_secs(config.sync.interval_seconds),
        ));
        let retry_worker = Arc::new(RetryWorker::new(
            runtime.store.clone(),
            Arc::clone(&runtime.sync_engine),
            Arc::clone(&runtime.publish_engine),
            Duration::from_secs(config.workers.retry_interval_seconds),
            config.workers.retry_batch_size,
        ));
        let cleanup_worker = Arc::new(CleanupWorker::new(
            runtime.store.clone(),
            runtime.store.clone(),
            Duration::from_secs(config.workers.cleanup_interval_seconds),
            config.workers.retention_days,
        ));

        println!("🌉 Ponte service mode");
        println!("   Registry: {}", config.registry.base_url);
        println!("   Subjects: {}", config.sync.subjects.len());
        println!("   Sync interval: {}s", config.sync.interval_seconds);
        println!();
        println!("Press Ctrl+C to stop.");

        let sync_handle = tokio::spawn(sync_worker.run(shutdown_signal.clone()));
        let retry_handle = tokio::spawn(retry_worker.run(shutdown_signal.clone()));
        let cleanup_handle = tokio::spawn(cleanup_worker.run(shutdown_signal.clone()));

        // Wait for all workers to observe the shutdown signal and stop
        let _ = tokio::join!(sync_handle, retry_handle, cleanup_handle);

        tracing::info!("All workers stopped");
        println!("✅ Shutdown complete");
        Ok(0)
    }
}
