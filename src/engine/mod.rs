//! Synchronization and publication engines
//!
//! [`sync::SyncEngine`] pulls registry changes behind per-resource
//! cursors; [`publish::PublishEngine`] pushes local records with audit
//! logging and idempotency keys. Both depend only on the gateway client
//! and the storage seams.

pub mod publish;
pub mod sync;

pub use publish::PublishEngine;
pub use sync::{mask_cpf, CompleteSyncReport, SyncEngine, SyncOutcome};
