//! Integration tests for the publish engine
//!
//! Asserts the audit-log lifecycle, local validation short-circuit,
//! partial bundle grading and idempotency-key reuse on retry.

use chrono::NaiveDate;
use mockito::Matcher;
use ponte::config::{secret_string, CircuitBreakerConfig, RegistryConfig, RetryConfig};
use ponte::domain::{Citizen, Gender, PonteError};
use ponte::engine::PublishEngine;
use ponte::gateway::RegistryClient;
use ponte::state::{MemoryStore, PublishLogStore, PublishStatus};
use serde_json::json;
use std::sync::Arc;

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

fn engine(server_url: &str) -> (PublishEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RegistryClient::new(&registry_config(server_url)).unwrap());
    let engine = PublishEngine::new(gateway, store.clone(), store.clone());
    (engine, store)
}

fn citizen() -> Citizen {
    Citizen {
        cpf: CPF.to_string(),
        cns: None,
        name: "Maria da Silva".to_string(),
        mother_name: None,
        birth_date: NaiveDate::from_ymd_opt(1994, 3, 12).unwrap(),
        gender: Gender::Female,
        phone: None,
        email: None,
        address: None,
    }
}

#[tokio::test]
async fn test_successful_publish_writes_audit_log() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    let create = server
        .mock("POST", "/Patient")
        .match_header("idempotency-key", Matcher::Regex(".+".to_string()))
        .with_status(201)
        .with_body(r#"{"resourceType":"Patient","id":"remote-1"}"#)
        .create_async()
        .await;

    let (engine, store) = engine(&server.url());
    let log = engine.publish_citizen(&citizen()).await.unwrap();

    assert_eq!(log.status, PublishStatus::Success);
    assert_eq!(log.success_count, 1);
    assert!(log.sent_at.is_some());
    assert!(log.response_time_ms.is_some());
    assert_eq!(
        log.response_snapshot.as_ref().unwrap()["id"],
        json!("remote-1")
    );
    create.assert_async().await;

    let stored = store.list_for_resource("Patient", CPF).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, log.id);
}

#[tokio::test]
async fn test_invalid_resource_is_rejected_without_network() {
    // No registry mocks at all: a single HTTP request would fail the test
    let server = mockito::Server::new_async().await;

    let (engine, store) = engine(&server.url());
    let mut invalid = citizen();
    invalid.cpf = "123".to_string();

    let err = engine.publish_citizen(&invalid).await.unwrap_err();
    assert!(matches!(err, PonteError::ResourceInvalid(_)));

    let stored = store.list_for_resource("Patient", "123").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, PublishStatus::Rejected);
    assert!(stored[0].sent_at.is_none());
    assert!(stored[0].validation_issues.is_some());
}

#[tokio::test]
async fn test_partial_batch_counts_entry_outcomes() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("POST", "/")
        .with_status(200)
        .with_body(
            json!({
                "resourceType": "Bundle",
                "type": "batch-response",
                "entry": [
                    {"response": {"status": "201 Created"}},
                    {"response": {"status": "422 Unprocessable Entity"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let (engine, _store) = engine(&server.url());
    let resources = vec![
        json!({
            "resourceType": "Patient",
            "identifier": [{"system": "http://rnds.saude.gov.br/fhir/r4/NamingSystem/cpf", "value": CPF}],
            "name": [{"text": "Maria da Silva"}],
            "gender": "female",
            "birthDate": "1994-03-12"
        }),
        json!({
            "resourceType": "Patient",
            "identifier": [{"system": "http://rnds.saude.gov.br/fhir/r4/NamingSystem/cpf", "value": "98765432100"}],
            "name": [{"text": "Ana Souza"}],
            "gender": "female",
            "birthDate": "1990-07-01"
        }),
    ];

    let log = engine.publish_bundle(resources, false).await.unwrap();

    assert_eq!(log.status, PublishStatus::Partial);
    assert_eq!(log.success_count, 1);
    assert_eq!(log.failure_count, 1);
}

#[tokio::test]
async fn test_retry_reuses_idempotency_key() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("POST", "/Patient")
        .with_status(502)
        .with_body("bad gateway")
        .expect(1)
        .create_async()
        .await;

    let (engine, store) = engine(&server.url());
    assert!(engine.publish_citizen(&citizen()).await.is_err());

    let failed = store.list_for_resource("Patient", CPF).await.unwrap();
    assert_eq!(failed.len(), 1);
    let original = &failed[0];
    assert_eq!(original.status, PublishStatus::Failed);
    assert_eq!(original.error_code.as_deref(), Some("502"));
    assert!(original.should_retry());

    // The retry must present the ORIGINAL idempotency key
    let retry_mock = server
        .mock("POST", "/Patient")
        .match_header("idempotency-key", original.bundle_id.as_str())
        .with_status(201)
        .with_body(r#"{"resourceType":"Patient","id":"remote-1"}"#)
        .create_async()
        .await;

    let retried = engine.retry_publish(original.id).await.unwrap();

    assert_ne!(retried.id, original.id);
    assert_eq!(retried.bundle_id, original.bundle_id);
    assert!(retried.is_retry);
    assert_eq!(retried.original_log_id, Some(original.id));
    assert_eq!(retried.status, PublishStatus::Success);
    retry_mock.assert_async().await;
}

#[tokio::test]
async fn test_retry_of_successful_log_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    let create = server
        .mock("POST", "/Patient")
        .with_status(201)
        .with_body(r#"{"resourceType":"Patient","id":"remote-1"}"#)
        .expect(1)
        .create_async()
        .await;

    let (engine, _store) = engine(&server.url());
    let log = engine.publish_citizen(&citizen()).await.unwrap();

    // Retrying a success returns the original log without another request
    let retried = engine.retry_publish(log.id).await.unwrap();
    assert_eq!(retried.id, log.id);
    create.assert_async().await;
}

#[tokio::test]
async fn test_permanent_failure_refuses_retry() {
    let mut server = mockito::Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("POST", "/Patient")
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let (engine, store) = engine(&server.url());
    assert!(engine.publish_citizen(&citizen()).await.is_err());

    let failed = store.list_for_resource("Patient", CPF).await.unwrap();
    assert!(!failed[0].should_retry());
    assert!(matches!(
        engine.retry_publish(failed[0].id).await,
        Err(PonteError::Publish(_))
    ));
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    // No registry mocks: dry-run must never touch the wire
    let server = mockito::Server::new_async().await;

    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(RegistryClient::new(&registry_config(&server.url())).unwrap());
    let engine =
        PublishEngine::new(gateway, store.clone(), store.clone()).with_dry_run(true);

    let log = engine.publish_citizen(&citizen()).await.unwrap();

    assert_eq!(log.status, PublishStatus::Success);
    assert!(log.sent_at.is_none());
    assert!(log.request_snapshot.is_some());
}
