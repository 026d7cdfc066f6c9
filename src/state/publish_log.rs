//! Publication audit log
//!
//! One [`PublishLog`] is written per publish attempt, before any network
//! traffic, and updated as the attempt progresses. A retried publication
//! gets a NEW log that references the original and reuses its idempotency
//! key, so the registry can deduplicate while the audit trail keeps every
//! attempt distinct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOperation {
    Create,
    Update,
    Delete,
    Transaction,
    Batch,
}

/// Outcome of a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Logged, nothing sent yet
    Pending,
    /// Request is on the wire
    Processing,
    /// Registry accepted everything
    Success,
    /// Batch where some entries succeeded and some failed
    Partial,
    /// Registry or transport error
    Failed,
    /// Failed local validation; never sent
    Rejected,
}

/// Audit record for one publish attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishLog {
    pub id: Uuid,

    /// Idempotency key sent with the request. Retries of this log reuse
    /// the same key.
    pub bundle_id: String,

    pub operation: PublishOperation,
    pub resource_type: String,
    pub resource_ids: Vec<String>,
    pub status: PublishStatus,

    /// Exact payload sent, for replay
    pub request_snapshot: Option<Value>,
    /// Registry response body
    pub response_snapshot: Option<Value>,
    /// Local validation issues when rejected
    pub validation_issues: Option<Value>,

    pub resource_count: usize,
    pub success_count: usize,
    pub failure_count: usize,

    pub error_message: Option<String>,
    pub error_code: Option<String>,

    /// True when this log is a retry of an earlier one
    pub is_retry: bool,
    pub original_log_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
}

impl PublishLog {
    /// Create a pending log with a fresh idempotency key
    pub fn new(
        operation: PublishOperation,
        resource_type: impl Into<String>,
        resource_ids: Vec<String>,
    ) -> Self {
        let resource_count = resource_ids.len().max(1);
        Self {
            id: Uuid::new_v4(),
            bundle_id: Uuid::new_v4().to_string(),
            operation,
            resource_type: resource_type.into(),
            resource_ids,
            status: PublishStatus::Pending,
            request_snapshot: None,
            response_snapshot: None,
            validation_issues: None,
            resource_count,
            success_count: 0,
            failure_count: 0,
            error_message: None,
            error_code: None,
            is_retry: false,
            original_log_id: None,
            created_at: Utc::now(),
            sent_at: None,
            received_at: None,
            response_time_ms: None,
        }
    }

    /// Create a retry log for an earlier attempt
    ///
    /// Copies the original request and REUSES its idempotency key, so the
    /// registry treats the retry as the same logical submission.
    pub fn retry_of(original: &PublishLog) -> Self {
        let mut log = Self::new(
            original.operation,
            original.resource_type.clone(),
            original.resource_ids.clone(),
        );
        log.bundle_id = original.bundle_id.clone();
        log.request_snapshot = original.request_snapshot.clone();
        log.resource_count = original.resource_count;
        log.is_retry = true;
        log.original_log_id = Some(original.id);
        log
    }

    /// The request left for the registry
    pub fn mark_sent(&mut self, request: Value) {
        self.status = PublishStatus::Processing;
        self.request_snapshot = Some(request);
        self.sent_at = Some(Utc::now());
    }

    /// Registry accepted everything
    pub fn mark_success(&mut self, response: Option<Value>, response_time_ms: u64) {
        self.status = PublishStatus::Success;
        self.success_count = self.resource_count;
        self.failure_count = 0;
        self.response_snapshot = response;
        self.received_at = Some(Utc::now());
        self.response_time_ms = Some(response_time_ms);
    }

    /// Batch outcome with mixed per-entry statuses
    pub fn mark_partial(
        &mut self,
        response: Option<Value>,
        success_count: usize,
        failure_count: usize,
        response_time_ms: u64,
    ) {
        self.status = PublishStatus::Partial;
        self.success_count = success_count;
        self.failure_count = failure_count;
        self.response_snapshot = response;
        self.received_at = Some(Utc::now());
        self.response_time_ms = Some(response_time_ms);
    }

    /// Registry or transport failure
    pub fn mark_failed(&mut self, error_code: Option<String>, error_message: impl Into<String>) {
        self.status = PublishStatus::Failed;
        self.failure_count = self.resource_count;
        self.error_code = error_code;
        self.error_message = Some(error_message.into());
        self.received_at = Some(Utc::now());
    }

    /// Local validation refused the payload; nothing was sent
    pub fn mark_rejected(&mut self, issues: Value, message: impl Into<String>) {
        self.status = PublishStatus::Rejected;
        self.failure_count = self.resource_count;
        self.validation_issues = Some(issues);
        self.error_message = Some(message.into());
    }

    /// True when retrying this log could change the outcome
    ///
    /// Successful logs and logs refused for reasons a resend cannot fix
    /// (bad request, authentication) are not retried.
    pub fn should_retry(&self) -> bool {
        if matches!(self.status, PublishStatus::Success) {
            return false;
        }
        !matches!(
            self.error_code.as_deref(),
            Some("400") | Some("401") | Some("403")
        )
    }
}
