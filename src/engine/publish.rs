//! Publication engine
//!
//! Publishes local clinical records to the registry with a full audit
//! trail. Every attempt gets a [`PublishLog`] before any network traffic;
//! validation runs on the exact serialized payload and a failing resource
//! is rejected locally with zero network calls. Retries are new logs that
//! reference the original and reuse its idempotency key.

use crate::domain::{
    Citizen, ClinicalObservation, GatewayError, PonteError, Pregnancy, Result,
};
use crate::fhir::{OperationOutcome, Reference};
use crate::gateway::RegistryClient;
use crate::mapper::{self, systems};
use crate::state::{
    record_sync_failure, ErrorOperation, ErrorType, PublishLog, PublishLogStore, PublishOperation,
    SyncError, SyncErrorStore,
};
use crate::validator::{self, issues_from_outcome, ValidationFailure};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Publication engine
pub struct PublishEngine {
    gateway: Arc<RegistryClient>,
    logs: Arc<dyn PublishLogStore>,
    errors: Arc<dyn SyncErrorStore>,
    dry_run: bool,
}

impl PublishEngine {
    pub fn new(
        gateway: Arc<RegistryClient>,
        logs: Arc<dyn PublishLogStore>,
        errors: Arc<dyn SyncErrorStore>,
    ) -> Self {
        Self {
            gateway,
            logs,
            errors,
            dry_run: false,
        }
    }

    /// In dry-run mode payloads are validated and logged but never sent
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish a citizen as a registry Patient
    ///
    /// # Errors
    ///
    /// Returns `ResourceInvalid` when local validation blocks the payload
    /// (nothing is sent), or a gateway error after the audit log and a
    /// durable [`SyncError`] have been written.
    pub async fn publish_citizen(&self, citizen: &Citizen) -> Result<PublishLog> {
        let patient = mapper::citizen_to_patient(citizen);
        let payload = to_value(&patient)?;
        self.publish_resource(
            PublishOperation::Create,
            "Patient",
            &citizen.cpf,
            Some(systems::PROFILE_BR_INDIVIDUO),
            payload,
        )
        .await
    }

    /// Publish a pregnancy as a registry Condition
    pub async fn publish_pregnancy(
        &self,
        pregnancy: &Pregnancy,
        patient_id: &str,
    ) -> Result<PublishLog> {
        let condition =
            mapper::pregnancy_to_condition(pregnancy, Reference::to_resource("Patient", patient_id));
        let payload = to_value(&condition)?;
        self.publish_resource(
            PublishOperation::Create,
            "Condition",
            &pregnancy.id,
            None,
            payload,
        )
        .await
    }

    /// Publish a clinical observation
    pub async fn publish_observation(
        &self,
        observation: &ClinicalObservation,
        patient_id: &str,
    ) -> Result<PublishLog> {
        let wire = mapper::observation_to_fhir(
            observation,
            Reference::to_resource("Patient", patient_id),
        );
        let payload = to_value(&wire)?;
        self.publish_resource(
            PublishOperation::Create,
            "Observation",
            &observation.id,
            None,
            payload,
        )
        .await
    }

    /// Publish several resources in one bundle
    ///
    /// `atomic` selects a transaction bundle (all-or-nothing) over a batch
    /// bundle. Batch responses are graded per entry; a mixed outcome is
    /// recorded as partial with both counts.
    pub async fn publish_bundle(&self, resources: Vec<Value>, atomic: bool) -> Result<PublishLog> {
        let resource_ids = resources
            .iter()
            .map(|r| {
                r.get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("(new)")
                    .to_string()
            })
            .collect();
        let (operation, bundle) = if atomic {
            (
                PublishOperation::Transaction,
                mapper::build_transaction_bundle(resources),
            )
        } else {
            (PublishOperation::Batch, mapper::build_batch_bundle(resources))
        };
        let payload = to_value(&bundle)?;

        if let Err(failure) = self.validate_payload(&payload, None) {
            return Err(self.reject(operation, "Bundle", resource_ids, failure).await);
        }

        let mut log = PublishLog::new(operation, "Bundle", resource_ids);
        if self.dry_run {
            return self.finish_dry_run(log, payload).await;
        }
        log.mark_sent(payload.clone());
        self.logs.save(&log).await?;

        let started = Instant::now();
        match self.gateway.post_bundle(&payload, Some(&log.bundle_id)).await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let (succeeded, failed) = grade_entries(&response);
                let response_value = to_value(&response)?;

                if failed == 0 {
                    log.mark_success(Some(response_value), elapsed);
                } else {
                    log.mark_partial(Some(response_value), succeeded, failed, elapsed);
                    tracing::warn!(
                        log_id = %log.id,
                        succeeded = succeeded,
                        failed = failed,
                        "Bundle partially accepted"
                    );
                }
                self.logs.save(&log).await?;
                Ok(log)
            }
            Err(err) => Err(self.fail(&mut log, &payload, err).await),
        }
    }

    /// Retry an earlier publish attempt
    ///
    /// A successful log is not resent; a log whose failure a resend cannot
    /// fix is refused. Otherwise a NEW log is written that reuses the
    /// original idempotency key and replays the original request.
    pub async fn retry_publish(&self, log_id: Uuid) -> Result<PublishLog> {
        let original = self
            .logs
            .get(log_id)
            .await?
            .ok_or_else(|| PonteError::State(format!("No publish log {log_id}")))?;

        if matches!(original.status, crate::state::PublishStatus::Success) {
            tracing::info!(log_id = %log_id, "Publish already succeeded, nothing to retry");
            return Ok(original);
        }
        if !original.should_retry() {
            return Err(PonteError::Publish(format!(
                "Publish log {log_id} is not retryable (error code {:?})",
                original.error_code
            )));
        }
        let payload = original.request_snapshot.clone().ok_or_else(|| {
            PonteError::State(format!("Publish log {log_id} has no request snapshot"))
        })?;

        let mut log = PublishLog::retry_of(&original);
        log.mark_sent(payload.clone());
        self.logs.save(&log).await?;

        let started = Instant::now();
        let outcome = match original.operation {
            PublishOperation::Transaction | PublishOperation::Batch => self
                .gateway
                .post_bundle(&payload, Some(&log.bundle_id))
                .await
                .and_then(|b| {
                    serde_json::to_value(&b).map_err(|e| {
                        GatewayError::InvalidResponse(format!("unserializable bundle: {e}"))
                    })
                }),
            _ => {
                self.gateway
                    .create_resource(&original.resource_type, &payload, Some(&log.bundle_id))
                    .await
            }
        };

        match outcome {
            Ok(response) => {
                log.mark_success(Some(response), started.elapsed().as_millis() as u64);
                self.logs.save(&log).await?;
                tracing::info!(
                    log_id = %log.id,
                    original_log_id = %original.id,
                    "Publish retry succeeded"
                );
                Ok(log)
            }
            Err(err) => Err(self.fail(&mut log, &payload, err).await),
        }
    }

    /// Validate, log, send and grade one resource
    async fn publish_resource(
        &self,
        operation: PublishOperation,
        resource_type: &str,
        identifier: &str,
        profile: Option<&str>,
        payload: Value,
    ) -> Result<PublishLog> {
        if let Err(failure) = self.validate_payload(&payload, profile) {
            return Err(self
                .reject(operation, resource_type, vec![identifier.to_string()], failure)
                .await);
        }

        let mut log = PublishLog::new(operation, resource_type, vec![identifier.to_string()]);
        if self.dry_run {
            return self.finish_dry_run(log, payload).await;
        }
        log.mark_sent(payload.clone());
        self.logs.save(&log).await?;

        let started = Instant::now();
        match self
            .gateway
            .create_resource(resource_type, &payload, Some(&log.bundle_id))
            .await
        {
            Ok(response) => {
                log.mark_success(Some(response), started.elapsed().as_millis() as u64);
                self.logs.save(&log).await?;
                tracing::info!(
                    log_id = %log.id,
                    resource_type = resource_type,
                    response_time_ms = log.response_time_ms,
                    "Publish succeeded"
                );
                Ok(log)
            }
            Err(err) => Err(self.fail(&mut log, &payload, err).await),
        }
    }

    /// Record a validated payload without sending it
    async fn finish_dry_run(&self, mut log: PublishLog, payload: Value) -> Result<PublishLog> {
        log.request_snapshot = Some(payload);
        log.mark_success(None, 0);
        self.logs.save(&log).await?;
        tracing::info!(
            log_id = %log.id,
            resource_type = %log.resource_type,
            "Dry run, payload validated but not sent"
        );
        Ok(log)
    }

    fn validate_payload(
        &self,
        payload: &Value,
        profile: Option<&str>,
    ) -> std::result::Result<(), ValidationFailure> {
        let outcome = validator::validate(payload, profile);
        if outcome.valid {
            return Ok(());
        }
        Err(ValidationFailure {
            resource_type: payload
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            issues: outcome.issues,
        })
    }

    /// Record a local validation rejection; nothing was sent
    async fn reject(
        &self,
        operation: PublishOperation,
        resource_type: &str,
        resource_ids: Vec<String>,
        failure: ValidationFailure,
    ) -> PonteError {
        let identifier = resource_ids.first().cloned().unwrap_or_default();
        let mut log = PublishLog::new(operation, resource_type, resource_ids);
        let issues = json!(failure
            .issues
            .iter()
            .map(|i| {
                json!({
                    "severity": i.severity.as_str(),
                    "code": i.code,
                    "details": i.details,
                    "location": i.location,
                })
            })
            .collect::<Vec<_>>());
        log.mark_rejected(issues, failure.to_string());
        if let Err(err) = self.logs.save(&log).await {
            tracing::error!(error = %err, "Failed to persist rejected publish log");
        }

        tracing::warn!(
            log_id = %log.id,
            resource_type = resource_type,
            issue_count = failure.issues.len(),
            "Publish rejected by local validation"
        );

        let mut record = SyncError::new(
            ErrorOperation::Validation,
            ErrorType::Validation,
            resource_type,
            identifier,
            failure.to_string(),
            json!({ "issues": log.validation_issues }),
        );
        record.publish_log_id = Some(log.id);
        if let Err(err) = record_sync_failure(self.errors.as_ref(), record).await {
            tracing::error!(error = %err, "Failed to persist validation error");
        }

        failure.into()
    }

    /// Record a gateway failure against the log and the error ledger
    async fn fail(&self, log: &mut PublishLog, payload: &Value, err: GatewayError) -> PonteError {
        let code = err.status().map(|s| s.to_string());
        let mut message = err.to_string();

        // A 422 usually carries an OperationOutcome worth keeping
        if err.status() == Some(422) {
            if let Some(issues) = registry_issues(&err) {
                log.validation_issues = Some(issues);
                message = format!("{message} (registry validation issues attached)");
            }
        }
        match err.status() {
            Some(409) | Some(412) => {
                tracing::warn!(log_id = %log.id, status = ?err.status(), "Registry reported a version conflict");
            }
            Some(401) | Some(403) => {
                tracing::error!(log_id = %log.id, "Registry rejected credentials");
            }
            _ => {}
        }

        log.mark_failed(code.clone(), &message);
        if let Err(save_err) = self.logs.save(log).await {
            tracing::error!(error = %save_err, "Failed to persist failed publish log");
        }

        let error_type = err
            .status()
            .map(ErrorType::from_status)
            .unwrap_or(ErrorType::Timeout);
        let mut record = SyncError::new(
            ErrorOperation::Push,
            error_type,
            log.resource_type.clone(),
            log.resource_ids.first().cloned().unwrap_or_default(),
            &message,
            json!({
                "publish_log_id": log.id,
                "payload": payload,
            }),
        );
        record.publish_log_id = Some(log.id);
        record.error_code = code.clone();
        if let Err(save_err) = record_sync_failure(self.errors.as_ref(), record).await {
            tracing::error!(error = %save_err, "Failed to persist push error");
        }

        tracing::error!(
            log_id = %log.id,
            error_code = ?code,
            error = %err,
            "Publish failed"
        );

        err.into()
    }
}

/// Count accepted and failed entries of a response bundle
fn grade_entries(bundle: &crate::fhir::Bundle) -> (usize, usize) {
    let mut succeeded = 0;
    let mut failed = 0;
    for entry in &bundle.entry {
        match entry.response_status_code() {
            Some(code) if (200..300).contains(&code) => succeeded += 1,
            _ => failed += 1,
        }
    }
    (succeeded, failed)
}

/// Parse registry validation issues out of a 422 body
fn registry_issues(err: &GatewayError) -> Option<Value> {
    let outcome: OperationOutcome = serde_json::from_str(err.body()?).ok()?;
    let issues = issues_from_outcome(&outcome);
    if issues.is_empty() {
        return None;
    }
    serde_json::to_value(
        issues
            .iter()
            .map(|i| {
                json!({
                    "severity": i.severity.as_str(),
                    "code": i.code,
                    "details": i.details,
                    "location": i.location,
                })
            })
            .collect::<Vec<_>>(),
    )
    .ok()
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| PonteError::Serialization(format!("payload serialization failed: {e}")))
}
