//! Synchronization state
//!
//! Three record types drive everything the engines and workers do:
//! [`SyncCursor`] tracks how far each resource has been synchronized,
//! [`PublishLog`] is the per-attempt publication audit trail, and
//! [`SyncError`] is the durable failure record the retry worker replays.
//! The [`store`] module defines the persistence seams.

pub mod cursor;
pub mod publish_log;
pub mod store;
pub mod sync_error;

pub use cursor::{content_hash, epoch, CursorStatus, SyncCursor, SyncDirection};
pub use publish_log::{PublishLog, PublishOperation, PublishStatus};
pub use store::{record_sync_failure, CursorStore, MemoryStore, PublishLogStore, SyncErrorStore};
pub use sync_error::{
    ErrorOperation, ErrorSeverity, ErrorStatus, ErrorType, SyncError, RETRY_DELAYS_MINUTES,
};
