//! Integration tests for the background workers
//!
//! Covers retry replay of durable errors, retention sweeps and prompt
//! shutdown on the shared signal.

use chrono::{Duration as ChronoDuration, Utc};
use mockito::Matcher;
use ponte::config::{secret_string, CircuitBreakerConfig, RegistryConfig, RetryConfig};
use ponte::engine::{PublishEngine, SyncEngine};
use ponte::gateway::RegistryClient;
use ponte::state::{
    ErrorStatus, MemoryStore, PublishLog, PublishLogStore, PublishOperation, SyncErrorStore,
};
use ponte::workers::{CleanupWorker, ConfigSubjects, RetryWorker, SyncWorker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const CPF: &str = "12345678901";

fn registry_config(server_url: &str) -> RegistryConfig {
    let retry = RetryConfig {
        max_retries: 0,
        base_delay_ms: 1,
        backoff_multiplier: 2.0,
        max_delay_ms: 5,
    };
    RegistryConfig {
        base_url: server_url.to_string(),
        auth_url: format!("{server_url}/token"),
        client_id: "ponte-test".to_string(),
        client_secret: secret_string("test-secret".to_string()),
        scope: None,
        timeout_seconds: 5,
        cert_dir: None,
        read_retry: retry.clone(),
        write_retry: retry,
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 100,
            reset_timeout_seconds: 60,
        },
    }
}

async fn token_mock(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_body(r#"{"access_token":"test-token","token_type":"Bearer","expires_in":1800}"#)
        .create_async()
        .await;
}

struct Harness {
    store: Arc<MemoryStore>,
    sync_engine: Arc<SyncEngine>,
    publish_engine: Arc<PublishEngine>,
}

fn harness(server_url: &str) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RegistryClient::new(&registry_config(server_url)).unwrap());
    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&gateway),
        store.clone(),
        store.clone(),
    ));
    let publish_engine = Arc::new(PublishEngine::new(gateway, store.clone(), store.clone()));
    Harness {
        store,
        sync_engine,
        publish_engine,
    }
}

fn citizen() -> ponte::domain::Citizen {
    ponte::domain::Citizen {
        cpf: CPF.to_string(),
        cns: None,
        name: "Maria da Silva".to_string(),
        mother_name: None,
        birth_date: chrono::NaiveDate::from_ymd_opt(1994, 3, 12).unwrap(),
        gender: ponte::domain::Gender::Female,
        phone: None,
        email: None,
        address: None,
    }
}

#[tokio::test]
async fn test_retry_worker_replays_failed_publish() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("POST", "/Patient")
        .with_status(502)
        .with_body("bad gateway")
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    assert!(h.publish_engine.publish_citizen(&citizen()).await.is_err());

    let failed = h.store.list_for_resource("Patient", CPF).await.unwrap();
    let original = &failed[0];

    // Registry recovers: the worker's replay must reuse the original key
    let recovered = server
        .mock("POST", "/Patient")
        .match_header("idempotency-key", original.bundle_id.as_str())
        .with_status(201)
        .with_body(r#"{"resourceType":"Patient","id":"remote-1"}"#)
        .create_async()
        .await;

    let worker = RetryWorker::new(
        h.store.clone(),
        Arc::clone(&h.sync_engine),
        Arc::clone(&h.publish_engine),
        Duration::from_secs(60),
        10,
    );
    worker.run_once().await;

    recovered.assert_async().await;
    let due = h.store.list_due(Utc::now(), 10).await.unwrap();
    assert!(due.is_empty(), "resolved error must no longer be due");
}

#[tokio::test]
async fn test_retry_worker_reschedules_persistent_failure() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    // The registry keeps failing: first the publish, then the replay
    server
        .mock("POST", "/Patient")
        .with_status(502)
        .with_body("bad gateway")
        .expect(2)
        .create_async()
        .await;

    let h = harness(&server.url());
    assert!(h.publish_engine.publish_citizen(&citizen()).await.is_err());

    let worker = RetryWorker::new(
        h.store.clone(),
        Arc::clone(&h.sync_engine),
        Arc::clone(&h.publish_engine),
        Duration::from_secs(60),
        10,
    );
    worker.run_once().await;

    // The error is rescheduled with a future gate, so it is not due now
    let due_now = h.store.list_due(Utc::now(), 10).await.unwrap();
    assert!(due_now.is_empty());
    let due_later = h
        .store
        .list_due(Utc::now() + ChronoDuration::minutes(2), 10)
        .await
        .unwrap();
    assert_eq!(due_later.len(), 1);
    assert_eq!(due_later[0].status, ErrorStatus::Retrying);
    assert_eq!(due_later[0].retry_count, 1);
}

#[tokio::test]
async fn test_retry_worker_keeps_one_row_and_escalates() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    // A permanently broken registry: the original publish plus exactly
    // three replays before escalation stops the automatic attempts
    let attempts = server
        .mock("POST", "/Patient")
        .with_status(502)
        .with_body("bad gateway")
        .expect(4)
        .create_async()
        .await;

    let h = harness(&server.url());
    assert!(h.publish_engine.publish_citizen(&citizen()).await.is_err());

    let worker = RetryWorker::new(
        h.store.clone(),
        Arc::clone(&h.sync_engine),
        Arc::clone(&h.publish_engine),
        Duration::from_secs(60),
        10,
    );

    let far_future = Utc::now() + ChronoDuration::days(365);
    let id = h.store.list_due(far_future, 50).await.unwrap()[0].id;

    for _ in 0..2 {
        worker.run_once().await;
        // Failed replays reschedule the one existing row, never open another
        let rows = h.store.list_due(far_future, 50).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].status, ErrorStatus::Retrying);

        let mut row = rows.into_iter().next().unwrap();
        row.next_retry_at = Some(Utc::now() - ChronoDuration::minutes(1));
        SyncErrorStore::save(h.store.as_ref(), &row).await.unwrap();
    }

    worker.run_once().await;

    let escalated = SyncErrorStore::get(h.store.as_ref(), id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escalated.status, ErrorStatus::Escalated);
    assert_eq!(escalated.retry_count, 3);
    assert!(escalated.is_recurring());
    assert!(h.store.list_due(far_future, 50).await.unwrap().is_empty());

    // An escalated error is never picked up again
    worker.run_once().await;
    attempts.assert_async().await;
}

#[tokio::test]
async fn test_sync_worker_covers_all_subjects() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    let searches = server
        .mock("GET", "/Patient")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"resourceType":"Bundle","type":"searchset"}"#)
        .expect(2)
        .create_async()
        .await;

    let h = harness(&server.url());
    let worker = SyncWorker::new(
        Arc::clone(&h.sync_engine),
        Arc::new(ConfigSubjects::new(vec![
            "12345678901".to_string(),
            "98765432100".to_string(),
        ])),
        Duration::from_secs(300),
    );
    worker.run_once().await;

    searches.assert_async().await;
}

#[tokio::test]
async fn test_cleanup_worker_sweeps_old_logs() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());

    let mut old = PublishLog::new(PublishOperation::Create, "Patient", vec![CPF.to_string()]);
    old.created_at = Utc::now() - ChronoDuration::days(60);
    let fresh = PublishLog::new(PublishOperation::Create, "Patient", vec![CPF.to_string()]);
    PublishLogStore::save(h.store.as_ref(), &old).await.unwrap();
    PublishLogStore::save(h.store.as_ref(), &fresh).await.unwrap();

    let worker = CleanupWorker::new(
        h.store.clone(),
        h.store.clone(),
        Duration::from_secs(86400),
        30,
    );
    worker.run_once().await;

    let remaining = h.store.list_for_resource("Patient", CPF).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, fresh.id);
}

#[tokio::test]
async fn test_workers_stop_on_shutdown_signal() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());

    let worker = Arc::new(SyncWorker::new(
        Arc::clone(&h.sync_engine),
        Arc::new(ConfigSubjects::new(Vec::new())),
        Duration::from_secs(300),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker must stop promptly")
        .expect("worker task must not panic");
}
