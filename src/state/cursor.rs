//! Per-resource synchronization cursors
//!
//! A cursor records how far one local resource has been synchronized with
//! the registry. A fresh cursor starts at the Unix epoch, which makes the
//! first sync an explicit "everything since 1970" search rather than an
//! unfiltered one; the filter shape stays identical across first and
//! incremental syncs.

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Which way changes flow for this resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local changes are published to the registry
    Push,
    /// Registry changes are pulled into the local store
    Pull,
    /// Both directions
    Bidirectional,
}

/// Cursor lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStatus {
    /// Local and remote agree as of `last_synced_at`
    Synced,
    /// Never synced, or local changes await publication
    Pending,
    /// Last sync attempt failed; `next_retry_at` gates the next attempt
    Error,
    /// Local and remote diverged and need manual resolution
    Conflict,
}

/// Synchronization cursor for one resource instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    /// FHIR resource type ("Patient", "Condition", ...)
    pub resource_type: String,

    /// Local identifier (CPF for patients, local id otherwise)
    pub identifier: String,

    /// Id assigned by the registry, once known
    pub external_id: Option<String>,

    /// Instant of the last successful sync; epoch when never synced
    pub last_synced_at: DateTime<Utc>,

    /// `meta.lastUpdated` of the newest remote version seen
    pub last_updated_at: Option<DateTime<Utc>>,

    pub sync_direction: SyncDirection,
    pub status: CursorStatus,

    /// Hash of the last payload published, for change detection
    pub content_hash: Option<String>,

    /// Remote `meta.versionId`, once known
    pub version_id: Option<String>,

    /// Consecutive failed attempts since the last success
    pub retry_count: u32,

    /// Earliest instant the next attempt may run
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl SyncCursor {
    /// Create a pending cursor that has never synced
    pub fn new(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
        sync_direction: SyncDirection,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            external_id: None,
            last_synced_at: epoch(),
            last_updated_at: None,
            sync_direction,
            status: CursorStatus::Pending,
            content_hash: None,
            version_id: None,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    /// Storage key: `{resource_type}/{identifier}`
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type, self.identifier)
    }

    /// Record a successful sync
    ///
    /// Clears the error state and advances `last_synced_at` to now. The
    /// external id and version id are only overwritten when the sync
    /// learned new values.
    pub fn mark_synced(&mut self, external_id: Option<String>, version_id: Option<String>) {
        self.status = CursorStatus::Synced;
        self.last_synced_at = Utc::now();
        self.retry_count = 0;
        self.next_retry_at = None;
        if external_id.is_some() {
            self.external_id = external_id;
        }
        if version_id.is_some() {
            self.version_id = version_id;
        }
    }

    /// Record a failed sync attempt
    ///
    /// The retry gate backs off exponentially: `min(2^(n-1), 60)` minutes
    /// after the n-th consecutive failure.
    pub fn mark_error(&mut self) {
        self.status = CursorStatus::Error;
        self.retry_count += 1;
        self.next_retry_at = Some(Utc::now() + Duration::minutes(backoff_minutes(self.retry_count)));
    }

    /// Record a divergence that needs manual resolution
    pub fn mark_conflict(&mut self) {
        self.status = CursorStatus::Conflict;
        self.next_retry_at = None;
    }

    /// True when an errored cursor is due for another attempt
    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == CursorStatus::Error
            && self.next_retry_at.map(|at| at <= now).unwrap_or(true)
    }

    /// True when the cursor has never completed a sync
    pub fn is_initial(&self) -> bool {
        self.last_synced_at == epoch()
    }

    /// True when `payload` differs from the last published content
    pub fn content_changed(&self, payload: &Value) -> bool {
        match &self.content_hash {
            Some(hash) => *hash != content_hash(payload),
            None => true,
        }
    }

    /// Remember the payload that was just published
    pub fn record_content(&mut self, payload: &Value) {
        self.content_hash = Some(content_hash(payload));
    }
}

/// The Unix epoch as a UTC instant
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Backoff before attempt `retry_count + 1`, capped at one hour
fn backoff_minutes(retry_count: u32) -> i64 {
    let exp = retry_count.saturating_sub(1).min(6);
    (1i64 << exp).min(60)
}

/// SHA-256 of the serialized payload, base64-encoded
pub fn content_hash(payload: &Value) -> String {
    let serialized = payload.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_cursor_starts_at_epoch() {
        let cursor = SyncCursor::new("Patient", "12345678901", SyncDirection::Bidirectional);

        assert_eq!(cursor.status, CursorStatus::Pending);
        assert!(cursor.is_initial());
        assert_eq!(cursor.last_synced_at.timestamp(), 0);
        assert_eq!(cursor.key(), "Patient/12345678901");
    }

    #[test]
    fn test_mark_synced_clears_error_state() {
        let mut cursor = SyncCursor::new("Patient", "12345678901", SyncDirection::Pull);
        cursor.mark_error();
        cursor.mark_error();

        cursor.mark_synced(Some("remote-1".to_string()), Some("3".to_string()));

        assert_eq!(cursor.status, CursorStatus::Synced);
        assert_eq!(cursor.retry_count, 0);
        assert!(cursor.next_retry_at.is_none());
        assert_eq!(cursor.external_id.as_deref(), Some("remote-1"));
        assert_eq!(cursor.version_id.as_deref(), Some("3"));
        assert!(!cursor.is_initial());
    }

    #[test]
    fn test_mark_synced_keeps_known_ids() {
        let mut cursor = SyncCursor::new("Patient", "12345678901", SyncDirection::Pull);
        cursor.mark_synced(Some("remote-1".to_string()), None);
        cursor.mark_synced(None, None);

        assert_eq!(cursor.external_id.as_deref(), Some("remote-1"));
    }

    #[test]
    fn test_error_backoff_doubles_and_caps() {
        assert_eq!(backoff_minutes(1), 1);
        assert_eq!(backoff_minutes(2), 2);
        assert_eq!(backoff_minutes(3), 4);
        assert_eq!(backoff_minutes(7), 60);
        assert_eq!(backoff_minutes(20), 60);
    }

    #[test]
    fn test_errored_cursor_waits_for_gate() {
        let mut cursor = SyncCursor::new("Condition", "preg-1", SyncDirection::Push);
        cursor.mark_error();

        assert!(!cursor.can_retry(Utc::now()));
        assert!(cursor.can_retry(Utc::now() + Duration::minutes(2)));
    }

    #[test]
    fn test_content_change_detection() {
        let mut cursor = SyncCursor::new("Patient", "12345678901", SyncDirection::Push);
        let payload = json!({"resourceType": "Patient", "gender": "female"});

        assert!(cursor.content_changed(&payload));
        cursor.record_content(&payload);
        assert!(!cursor.content_changed(&payload));
        assert!(cursor.content_changed(&json!({"resourceType": "Patient", "gender": "male"})));
    }

    #[test]
    fn test_cursor_serde_roundtrip() {
        let mut cursor = SyncCursor::new("Observation", "obs-1", SyncDirection::Bidirectional);
        cursor.mark_error();

        let json = serde_json::to_string(&cursor).unwrap();
        let back: SyncCursor = serde_json::from_str(&json).unwrap();

        assert_eq!(back.key(), cursor.key());
        assert_eq!(back.status, CursorStatus::Error);
        assert_eq!(back.retry_count, 1);
    }
}
