//! Durable synchronization error records
//!
//! Every failed push or pull leaves a [`SyncError`] behind, with enough
//! replay context for the retry worker to repeat the operation without
//! re-deriving it. Retries follow a fixed delay ladder and escalate to a
//! human once the attempt budget is spent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Retry delay ladder in minutes, indexed by `retry_count - 1`
pub const RETRY_DELAYS_MINUTES: [i64; 7] = [1, 5, 15, 30, 60, 120, 240];

/// Default attempt budget before escalation
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOperation {
    Push,
    Pull,
    Validation,
    Mapping,
    Network,
    Auth,
}

/// Coarse classification used for triage and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// 4xx other than validation/timeout: the request itself is wrong
    Client,
    /// 5xx: the registry failed
    Server,
    /// 422 or local validation failure
    Validation,
    /// Business-rule rejection reported by the registry
    Business,
    /// 408/504 or transport timeout
    Timeout,
    Unknown,
}

impl ErrorType {
    /// Classify from an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            422 => ErrorType::Validation,
            408 | 504 => ErrorType::Timeout,
            400..=499 => ErrorType::Client,
            500..=599 => ErrorType::Server,
            _ => ErrorType::Unknown,
        }
    }
}

/// How urgently a human should look at this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Fatal,
    Error,
    Warning,
    Info,
}

/// Error record lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    /// Recorded, not yet scheduled
    Open,
    /// Scheduled for another attempt
    Retrying,
    /// A later attempt succeeded
    Resolved,
    /// Dismissed by an operator
    Ignored,
    /// Attempt budget spent; needs human attention
    Escalated,
}

/// One durable synchronization failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub id: Uuid,
    pub operation: ErrorOperation,
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub message: String,

    /// HTTP status code of the failing call, when one was made
    pub error_code: Option<String>,

    /// Resource the failure concerns
    pub resource_type: String,
    pub identifier: String,

    /// Remote id of the resource, when a sync has seen one
    pub external_id: Option<String>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,

    pub status: ErrorStatus,

    /// Times this same failure has been observed
    pub occurrence_count: u32,

    /// Replay payload: what the retry worker needs to repeat the operation
    pub context: Value,

    /// Links back to the publish attempt or cursor this arose from
    pub publish_log_id: Option<Uuid>,
    pub sync_cursor_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl SyncError {
    /// Record a new failure
    pub fn new(
        operation: ErrorOperation,
        error_type: ErrorType,
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
        message: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            error_type,
            severity: default_severity(error_type),
            message: message.into(),
            error_code: None,
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            external_id: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            last_attempt_at: Some(Utc::now()),
            status: ErrorStatus::Open,
            occurrence_count: 1,
            context,
            publish_log_id: None,
            sync_cursor_key: None,
            created_at: Utc::now(),
        }
    }

    /// True when the same failure keeps coming back
    pub fn is_recurring(&self) -> bool {
        self.occurrence_count > 1
    }

    /// Note another occurrence of the same failure
    pub fn record_occurrence(&mut self) {
        self.occurrence_count += 1;
        self.last_attempt_at = Some(Utc::now());
    }

    /// Schedule the next retry, or escalate when the budget is spent
    ///
    /// The delay ladder indexes on the retry count after increment, so the
    /// first reschedule waits 1 minute and later ones climb the ladder.
    pub fn schedule_retry(&mut self) {
        self.retry_count += 1;
        self.last_attempt_at = Some(Utc::now());

        if self.retry_count >= self.max_retries {
            self.status = ErrorStatus::Escalated;
            self.next_retry_at = None;
            tracing::warn!(
                error_id = %self.id,
                resource_type = %self.resource_type,
                identifier = %self.identifier,
                retry_count = self.retry_count,
                "Sync error escalated after exhausting retries"
            );
            return;
        }

        let index = (self.retry_count as usize - 1).min(RETRY_DELAYS_MINUTES.len() - 1);
        self.status = ErrorStatus::Retrying;
        self.next_retry_at = Some(Utc::now() + Duration::minutes(RETRY_DELAYS_MINUTES[index]));
    }

    /// A later attempt succeeded
    pub fn mark_resolved(&mut self) {
        self.status = ErrorStatus::Resolved;
        self.next_retry_at = None;
    }

    /// Operator dismissed the error
    pub fn ignore(&mut self) {
        self.status = ErrorStatus::Ignored;
        self.next_retry_at = None;
    }

    /// True when the retry worker should pick this error up
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ErrorStatus::Open => true,
            ErrorStatus::Retrying => self.next_retry_at.map(|at| at <= now).unwrap_or(true),
            _ => false,
        }
    }
}

fn default_severity(error_type: ErrorType) -> ErrorSeverity {
    match error_type {
        // Transient failures resolve themselves through the retry ladder
        ErrorType::Server | ErrorType::Timeout | ErrorType::Unknown => ErrorSeverity::Warning,
        // The payload or request is wrong; a retry alone cannot fix it
        ErrorType::Client | ErrorType::Validation | ErrorType::Business => ErrorSeverity::Error,
    }
}
