//! Storage seams for synchronization state
//!
//! Engines and workers depend on these traits, not on a concrete store,
//! so the in-memory store used in development and tests can be swapped
//! for a durable backend without touching the engines.

use super::cursor::SyncCursor;
use super::publish_log::PublishLog;
use super::sync_error::{ErrorOperation, ErrorStatus, SyncError};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence for synchronization cursors, keyed by [`SyncCursor::key`]
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SyncCursor>>;
    async fn save(&self, cursor: &SyncCursor) -> Result<()>;
    async fn list(&self) -> Result<Vec<SyncCursor>>;
}

/// Persistence for publication audit logs
#[async_trait]
pub trait PublishLogStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<PublishLog>>;
    async fn save(&self, log: &PublishLog) -> Result<()>;
    /// Logs for one resource, newest first
    async fn list_for_resource(
        &self,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Vec<PublishLog>>;
    /// Remove logs created before `cutoff`; returns how many were removed
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Persistence for durable synchronization errors
#[async_trait]
pub trait SyncErrorStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<SyncError>>;
    async fn save(&self, error: &SyncError) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Errors due for a retry at `now`, oldest first, at most `limit`
    async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SyncError>>;
    /// The open or retrying error for one failing operation, if any
    async fn find_active(
        &self,
        operation: ErrorOperation,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Option<SyncError>>;
    /// Remove terminal errors created before `cutoff`
    async fn delete_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// Record a failure without multiplying error rows
///
/// A failure of an operation that already has an open or retrying
/// [`SyncError`] is noted as another occurrence of that row, keeping its
/// retry budget and schedule; only a first failure opens a new row. This
/// is what keeps escalation bounded when the retry worker replays an
/// operation that keeps failing.
pub async fn record_sync_failure(
    store: &dyn SyncErrorStore,
    record: SyncError,
) -> Result<SyncError> {
    if let Some(mut existing) = store
        .find_active(record.operation, &record.resource_type, &record.identifier)
        .await?
    {
        existing.record_occurrence();
        existing.message = record.message;
        existing.error_code = record.error_code;
        existing.context = record.context;
        existing.publish_log_id = record.publish_log_id.or(existing.publish_log_id);
        existing.external_id = record.external_id.or(existing.external_id);
        store.save(&existing).await?;
        return Ok(existing);
    }

    store.save(&record).await?;
    Ok(record)
}

/// In-memory store backing all three seams
///
/// Used in development, one-shot CLI runs and tests. State does not
/// survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    cursors: RwLock<HashMap<String, SyncCursor>>,
    logs: RwLock<HashMap<Uuid, PublishLog>>,
    errors: RwLock<HashMap<Uuid, SyncError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<SyncCursor>> {
        Ok(self.cursors.read().await.get(key).cloned())
    }

    async fn save(&self, cursor: &SyncCursor) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(cursor.key(), cursor.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncCursor>> {
        Ok(self.cursors.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl PublishLogStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<PublishLog>> {
        Ok(self.logs.read().await.get(&id).cloned())
    }

    async fn save(&self, log: &PublishLog) -> Result<()> {
        self.logs.write().await.insert(log.id, log.clone());
        Ok(())
    }

    async fn list_for_resource(
        &self,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Vec<PublishLog>> {
        let mut logs: Vec<PublishLog> = self
            .logs
            .read()
            .await
            .values()
            .filter(|log| {
                log.resource_type == resource_type
                    && log.resource_ids.iter().any(|id| id == identifier)
            })
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(logs)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut logs = self.logs.write().await;
        let before = logs.len();
        logs.retain(|_, log| log.created_at >= cutoff);
        Ok(before - logs.len())
    }
}

#[async_trait]
impl SyncErrorStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<SyncError>> {
        Ok(self.errors.read().await.get(&id).cloned())
    }

    async fn save(&self, error: &SyncError) -> Result<()> {
        self.errors.write().await.insert(error.id, error.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.errors.write().await.remove(&id);
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SyncError>> {
        let mut due: Vec<SyncError> = self
            .errors
            .read()
            .await
            .values()
            .filter(|error| error.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|error| error.created_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn find_active(
        &self,
        operation: ErrorOperation,
        resource_type: &str,
        identifier: &str,
    ) -> Result<Option<SyncError>> {
        Ok(self
            .errors
            .read()
            .await
            .values()
            .filter(|error| {
                matches!(error.status, ErrorStatus::Open | ErrorStatus::Retrying)
                    && error.operation == operation
                    && error.resource_type == resource_type
                    && error.identifier == identifier
            })
            .max_by_key(|error| error.created_at)
            .cloned())
    }

    async fn delete_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut errors = self.errors.write().await;
        let before = errors.len();
        errors.retain(|_, error| {
            !matches!(
                error.status,
                ErrorStatus::Resolved | ErrorStatus::Ignored | ErrorStatus::Escalated
            ) || error.created_at >= cutoff
        });
        Ok(before - errors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::cursor::SyncDirection;
    use crate::state::publish_log::PublishOperation;
    use crate::state::sync_error::{ErrorOperation, ErrorType};
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let store = MemoryStore::new();
        let cursor = SyncCursor::new("Patient", "12345678901", SyncDirection::Pull);

        CursorStore::save(&store, &cursor).await.unwrap();
        let loaded = CursorStore::get(&store, "Patient/12345678901")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(loaded.identifier, "12345678901");
        assert!(CursorStore::get(&store, "Patient/other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_log_listing_newest_first() {
        let store = MemoryStore::new();
        let mut first = PublishLog::new(
            PublishOperation::Create,
            "Patient",
            vec!["12345678901".to_string()],
        );
        first.created_at = Utc::now() - Duration::minutes(5);
        let second = PublishLog::new(
            PublishOperation::Update,
            "Patient",
            vec!["12345678901".to_string()],
        );

        PublishLogStore::save(&store, &first).await.unwrap();
        PublishLogStore::save(&store, &second).await.unwrap();

        let logs = store
            .list_for_resource("Patient", "12345678901")
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, second.id);
    }

    #[tokio::test]
    async fn test_log_retention_sweep() {
        let store = MemoryStore::new();
        let mut old = PublishLog::new(PublishOperation::Create, "Patient", vec!["a".to_string()]);
        old.created_at = Utc::now() - Duration::days(40);
        let fresh = PublishLog::new(PublishOperation::Create, "Patient", vec!["b".to_string()]);

        PublishLogStore::save(&store, &old).await.unwrap();
        PublishLogStore::save(&store, &fresh).await.unwrap();

        let removed = store
            .delete_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(PublishLogStore::get(&store, fresh.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_due_errors_oldest_first_with_limit() {
        let store = MemoryStore::new();
        let mut older = SyncError::new(
            ErrorOperation::Pull,
            ErrorType::Server,
            "Patient",
            "a",
            "boom",
            json!({}),
        );
        older.created_at = Utc::now() - Duration::minutes(10);
        let newer = SyncError::new(
            ErrorOperation::Pull,
            ErrorType::Server,
            "Patient",
            "b",
            "boom",
            json!({}),
        );

        SyncErrorStore::save(&store, &older).await.unwrap();
        SyncErrorStore::save(&store, &newer).await.unwrap();

        let due = store.list_due(Utc::now(), 1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, older.id);
    }

    #[tokio::test]
    async fn test_terminal_error_sweep_keeps_active() {
        let store = MemoryStore::new();
        let mut resolved = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "a",
            "boom",
            json!({}),
        );
        resolved.mark_resolved();
        resolved.created_at = Utc::now() - Duration::days(40);

        let mut active = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "b",
            "boom",
            json!({}),
        );
        active.created_at = Utc::now() - Duration::days(40);

        SyncErrorStore::save(&store, &resolved).await.unwrap();
        SyncErrorStore::save(&store, &active).await.unwrap();

        let removed = store
            .delete_terminal_older_than(Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(SyncErrorStore::get(&store, active.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_find_active_skips_terminal_rows() {
        let store = MemoryStore::new();
        let mut resolved = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "12345678901",
            "boom",
            json!({}),
        );
        resolved.mark_resolved();
        SyncErrorStore::save(&store, &resolved).await.unwrap();

        assert!(store
            .find_active(ErrorOperation::Push, "Patient", "12345678901")
            .await
            .unwrap()
            .is_none());

        let open = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "12345678901",
            "boom again",
            json!({}),
        );
        SyncErrorStore::save(&store, &open).await.unwrap();

        let found = store
            .find_active(ErrorOperation::Push, "Patient", "12345678901")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, open.id);

        // A different operation for the same resource is a different failure
        assert!(store
            .find_active(ErrorOperation::Pull, "Patient", "12345678901")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_record_sync_failure_bumps_existing_row() {
        let store = MemoryStore::new();
        let first = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "12345678901",
            "registry returned 502",
            json!({"attempt": 1}),
        );
        let recorded = record_sync_failure(&store, first).await.unwrap();
        assert_eq!(recorded.occurrence_count, 1);

        let repeat = SyncError::new(
            ErrorOperation::Push,
            ErrorType::Server,
            "Patient",
            "12345678901",
            "registry returned 503",
            json!({"attempt": 2}),
        );
        let bumped = record_sync_failure(&store, repeat).await.unwrap();

        assert_eq!(bumped.id, recorded.id);
        assert_eq!(bumped.occurrence_count, 2);
        assert!(bumped.is_recurring());
        assert_eq!(bumped.message, "registry returned 503");
        assert_eq!(bumped.context, json!({"attempt": 2}));

        let rows = store.list_due(Utc::now(), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
