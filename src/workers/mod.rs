//! Scheduled background workers
//!
//! Three workers run on independent intervals: [`SyncWorker`] pulls
//! registry changes for every configured subject, [`RetryWorker`] replays
//! durable sync errors, and [`CleanupWorker`] enforces retention on audit
//! state. Each worker guards itself with an atomic flag so a slow run is
//! skipped rather than overlapped, and all of them stop promptly on the
//! shared shutdown signal.

use crate::engine::{PublishEngine, SyncEngine};
use crate::state::{ErrorOperation, PublishLogStore, SyncError, SyncErrorStore};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Where the sync worker learns which citizens to track
pub trait SubjectSource: Send + Sync {
    /// CPFs of the citizens to synchronize
    fn subjects(&self) -> Vec<String>;
}

/// Subject list taken from the configuration file
pub struct ConfigSubjects {
    subjects: Vec<String>,
}

impl ConfigSubjects {
    pub fn new(subjects: Vec<String>) -> Self {
        Self { subjects }
    }
}

impl SubjectSource for ConfigSubjects {
    fn subjects(&self) -> Vec<String> {
        self.subjects.clone()
    }
}

/// Periodic pull synchronization for every tracked citizen
pub struct SyncWorker {
    engine: Arc<SyncEngine>,
    subjects: Arc<dyn SubjectSource>,
    interval: Duration,
    running: AtomicBool,
}

impl SyncWorker {
    pub fn new(
        engine: Arc<SyncEngine>,
        subjects: Arc<dyn SubjectSource>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            subjects,
            interval,
            running: AtomicBool::new(false),
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_seconds = self.interval.as_secs(), "Sync worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    tracing::info!("Sync worker stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous sync cycle still running, skipping this tick");
            return;
        }

        self.run_once().await;
        self.running.store(false, Ordering::SeqCst);
    }

    /// One full sync cycle over every subject
    pub async fn run_once(&self) {
        let subjects = self.subjects.subjects();
        tracing::debug!(subject_count = subjects.len(), "Sync cycle starting");

        let mut failures = 0usize;
        for cpf in &subjects {
            if let Err(err) = self.engine.sync_patient_complete(cpf).await {
                // The engine already recorded the durable error
                failures += 1;
                tracing::debug!(error = %err, "Subject sync failed");
            }
        }

        tracing::info!(
            subject_count = subjects.len(),
            failures = failures,
            "Sync cycle finished"
        );
    }
}

/// Replays durable sync errors that are due for another attempt
pub struct RetryWorker {
    errors: Arc<dyn SyncErrorStore>,
    sync_engine: Arc<SyncEngine>,
    publish_engine: Arc<PublishEngine>,
    interval: Duration,
    batch_size: usize,
    running: AtomicBool,
}

impl RetryWorker {
    pub fn new(
        errors: Arc<dyn SyncErrorStore>,
        sync_engine: Arc<SyncEngine>,
        publish_engine: Arc<PublishEngine>,
        interval: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            errors,
            sync_engine,
            publish_engine,
            interval,
            batch_size,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Retry worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    tracing::info!("Retry worker stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous retry cycle still running, skipping this tick");
            return;
        }

        self.run_once().await;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Replay one batch of due errors, oldest first
    pub async fn run_once(&self) {
        let due = match self.errors.list_due(Utc::now(), self.batch_size).await {
            Ok(due) => due,
            Err(err) => {
                tracing::error!(error = %err, "Failed to list due sync errors");
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        tracing::info!(due_count = due.len(), "Replaying due sync errors");

        for error in due {
            match self.replay(&error).await {
                Ok(()) => {
                    tracing::info!(
                        error_id = %error.id,
                        resource_type = %error.resource_type,
                        "Sync error resolved by retry"
                    );
                    if let Err(del_err) = self.errors.delete(error.id).await {
                        tracing::error!(error = %del_err, "Failed to delete resolved sync error");
                    }
                }
                Err(err) => {
                    // The failed replay was recorded as another occurrence of
                    // this same row; reschedule the stored version so the
                    // occurrence count survives and the budget stays on one row
                    let mut current = match self.errors.get(error.id).await {
                        Ok(Some(row)) => row,
                        _ => error,
                    };
                    current.schedule_retry();
                    tracing::warn!(
                        error_id = %current.id,
                        retry_count = current.retry_count,
                        status = ?current.status,
                        error = %err,
                        "Retry attempt failed"
                    );
                    if let Err(save_err) = self.errors.save(&current).await {
                        tracing::error!(error = %save_err, "Failed to persist retried sync error");
                    }
                }
            }
        }
    }

    /// Repeat the operation the error context describes
    async fn replay(&self, error: &SyncError) -> crate::domain::Result<()> {
        match error.operation {
            ErrorOperation::Pull | ErrorOperation::Network | ErrorOperation::Mapping => {
                self.sync_engine
                    .sync_patient_complete(subject_of(error))
                    .await?;
                Ok(())
            }
            ErrorOperation::Push | ErrorOperation::Auth => {
                let log_id = publish_log_id(error).ok_or_else(|| {
                    crate::domain::PonteError::State(format!(
                        "Sync error {} has no publish log to replay",
                        error.id
                    ))
                })?;
                self.publish_engine.retry_publish(log_id).await?;
                Ok(())
            }
            ErrorOperation::Validation => {
                // The payload itself is invalid; a replay cannot fix it
                Err(crate::domain::PonteError::Publish(
                    "Validation failures require a corrected payload".to_string(),
                ))
            }
        }
    }
}

/// The CPF a pull error concerns
///
/// Observation cursors key on `cpf:category`; everything else keys on the
/// bare CPF.
fn subject_of(error: &SyncError) -> &str {
    error
        .identifier
        .split(':')
        .next()
        .unwrap_or(&error.identifier)
}

fn publish_log_id(error: &SyncError) -> Option<Uuid> {
    error.publish_log_id.or_else(|| {
        error
            .context
            .get("publish_log_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    })
}

/// Retention sweep over audit state
pub struct CleanupWorker {
    logs: Arc<dyn PublishLogStore>,
    errors: Arc<dyn SyncErrorStore>,
    interval: Duration,
    retention_days: i64,
    running: AtomicBool,
}

impl CleanupWorker {
    pub fn new(
        logs: Arc<dyn PublishLogStore>,
        errors: Arc<dyn SyncErrorStore>,
        interval: Duration,
        retention_days: i64,
    ) -> Self {
        Self {
            logs,
            errors,
            interval,
            retention_days,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_seconds = self.interval.as_secs(),
            retention_days = self.retention_days,
            "Cleanup worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    tracing::info!("Cleanup worker stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous cleanup still running, skipping this tick");
            return;
        }

        self.run_once().await;
        self.running.store(false, Ordering::SeqCst);
    }

    /// One retention sweep
    pub async fn run_once(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(self.retention_days);

        let logs_removed = match self.logs.delete_older_than(cutoff).await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "Publish log sweep failed");
                0
            }
        };
        let errors_removed = match self.errors.delete_terminal_older_than(cutoff).await {
            Ok(count) => count,
            Err(err) => {
                tracing::error!(error = %err, "Sync error sweep failed");
                0
            }
        };

        if logs_removed > 0 || errors_removed > 0 {
            tracing::info!(
                logs_removed = logs_removed,
                errors_removed = errors_removed,
                "Retention sweep finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ErrorType;
    use serde_json::json;

    #[test]
    fn test_config_subjects_roundtrip() {
        let source = ConfigSubjects::new(vec!["12345678901".to_string()]);
        assert_eq!(source.subjects(), vec!["12345678901".to_string()]);
    }

    #[test]
    fn test_subject_extraction_strips_category() {
        let mut error = SyncError::new(
            ErrorOperation::Pull,
            ErrorType::Server,
            "Observation",
            "12345678901:vital-signs",
            "boom",
            json!({}),
        );
        assert_eq!(subject_of(&error), "12345678901");

        error.identifier = "12345678901".to_string();
        assert_eq!(subject_of(&error), "12345678901");
    }

    #[test]
    fn test_publish_log_id_from_context() {
        let id = Uuid::new_v4();
        let error = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "12345678901",
            "boom",
            json!({ "publish_log_id": id.to_string() }),
        );
        assert_eq!(publish_log_id(&error), Some(id));
    }
}
