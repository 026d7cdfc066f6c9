//! CLI command implementations
//!
//! This module contains all CLI command implementations plus the shared
//! wiring that turns a loaded configuration into engines and stores.

pub mod init;
pub mod run;
pub mod status;
pub mod sync;
pub mod validate;

use crate::config::PonteConfig;
use crate::engine::{PublishEngine, SyncEngine};
use crate::gateway::RegistryClient;
use crate::state::MemoryStore;
use std::sync::Arc;

/// Engines and stores wired from one configuration
pub struct Runtime {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<RegistryClient>,
    pub sync_engine: Arc<SyncEngine>,
    pub publish_engine: Arc<PublishEngine>,
}

/// Wire the gateway, stores and engines from configuration
pub fn build_runtime(config: &PonteConfig) -> crate::domain::Result<Runtime> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RegistryClient::new(&config.registry)?);

    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&gateway),
        store.clone(),
        store.clone(),
    ));
    let publish_engine = Arc::new(
        PublishEngine::new(Arc::clone(&gateway), store.clone(), store.clone())
            .with_dry_run(config.application.dry_run),
    );

    Ok(Runtime {
        store,
        gateway,
        sync_engine,
        publish_engine,
    })
}
