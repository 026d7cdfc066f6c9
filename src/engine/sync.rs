//! Cursor-driven pull synchronization
//!
//! Each sync advances a [`SyncCursor`] for one resource. Searches always
//! carry a `_lastUpdated=ge{cursor}` filter: a fresh cursor sits at the
//! Unix epoch, so the first sync asks for everything since 1970 with the
//! same filter shape an incremental sync uses. Only the first result page
//! is consumed; when the registry paginates, the `next` link is surfaced
//! so the caller can decide whether to continue.

use crate::domain::{Citizen, ClinicalObservation, ObservationCategory, Pregnancy, Result};
use crate::gateway::{RegistryClient, SearchQuery};
use crate::mapper;
use crate::state::{
    record_sync_failure, CursorStore, ErrorOperation, ErrorType, SyncCursor, SyncDirection,
    SyncError, SyncErrorStore,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

/// Result of one pull for one resource class
#[derive(Debug)]
pub struct SyncOutcome<T> {
    /// Mapped records from the first result page
    pub items: Vec<T>,
    /// Pagination link when the registry had more than one page
    pub next_link: Option<String>,
}

impl<T> SyncOutcome<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_link: None,
        }
    }
}

/// Everything known about one citizen after a complete sync
#[derive(Debug)]
pub struct CompleteSyncReport {
    pub citizen: Option<Citizen>,
    pub pregnancies: Vec<Pregnancy>,
    pub observations: Vec<ClinicalObservation>,
}

/// Pull synchronization engine
pub struct SyncEngine {
    gateway: Arc<RegistryClient>,
    cursors: Arc<dyn CursorStore>,
    errors: Arc<dyn SyncErrorStore>,
}

impl SyncEngine {
    pub fn new(
        gateway: Arc<RegistryClient>,
        cursors: Arc<dyn CursorStore>,
        errors: Arc<dyn SyncErrorStore>,
    ) -> Self {
        Self {
            gateway,
            cursors,
            errors,
        }
    }

    /// Pull the registry Patient for one CPF
    ///
    /// # Errors
    ///
    /// Gateway failures propagate after a [`SyncError`] has been recorded
    /// and the cursor marked errored.
    pub async fn sync_patient(&self, cpf: &str) -> Result<SyncOutcome<Citizen>> {
        let mut cursor = self.load_cursor("Patient", cpf).await?;
        let query = SearchQuery::new()
            .param("identifier", format!("{}|{}", mapper::systems::CPF, cpf))
            .param("_lastUpdated", since(cursor.last_synced_at));

        let bundle = match self.gateway.search_patients(&query).await {
            Ok(bundle) => bundle,
            Err(err) => {
                return Err(self
                    .record_pull_failure(&mut cursor, "Patient", cpf, &query, err)
                    .await);
            }
        };

        if bundle.entry.is_empty() {
            return self.finish_empty(&mut cursor).await;
        }

        let mut items = Vec::new();
        for resource in bundle.resources() {
            match deserialize::<crate::fhir::Patient>(resource)
                .and_then(|p| mapper::patient_to_citizen(&p))
            {
                Ok(citizen) => items.push(citizen),
                Err(err) => self.record_mapping_failure("Patient", cpf, resource, &err).await,
            }
        }

        self.advance_cursor(&mut cursor, &bundle).await?;

        tracing::info!(
            cpf = %mask_cpf(cpf),
            count = items.len(),
            paginated = bundle.next_link().is_some(),
            "Patient sync completed"
        );

        Ok(SyncOutcome {
            items,
            next_link: bundle.next_link().map(str::to_string),
        })
    }

    /// Pull pregnancy Conditions for one remote patient
    pub async fn sync_pregnancies(
        &self,
        cpf: &str,
        patient_id: &str,
    ) -> Result<SyncOutcome<Pregnancy>> {
        let mut cursor = self.load_cursor("Condition", cpf).await?;
        let query = SearchQuery::new()
            .param("subject", format!("Patient/{patient_id}"))
            .param(
                "code",
                format!(
                    "{}|{}",
                    mapper::systems::SNOMED,
                    mapper::systems::SNOMED_PREGNANCY
                ),
            )
            .param("_lastUpdated", since(cursor.last_synced_at));

        let bundle = match self.gateway.search_conditions(&query).await {
            Ok(bundle) => bundle,
            Err(err) => {
                return Err(self
                    .record_pull_failure(&mut cursor, "Condition", cpf, &query, err)
                    .await);
            }
        };

        if bundle.entry.is_empty() {
            return self.finish_empty(&mut cursor).await;
        }

        let mut items = Vec::new();
        for resource in bundle.resources() {
            match deserialize::<crate::fhir::Condition>(resource)
                .and_then(|c| mapper::condition_to_pregnancy(&c, cpf))
            {
                Ok(pregnancy) => items.push(pregnancy),
                Err(err) => {
                    self.record_mapping_failure("Condition", cpf, resource, &err)
                        .await
                }
            }
        }

        self.advance_cursor(&mut cursor, &bundle).await?;

        Ok(SyncOutcome {
            items,
            next_link: bundle.next_link().map(str::to_string),
        })
    }

    /// Pull Observations of one category for one remote patient
    pub async fn sync_observations(
        &self,
        cpf: &str,
        patient_id: &str,
        category: ObservationCategory,
    ) -> Result<SyncOutcome<ClinicalObservation>> {
        let cursor_key = format!("{cpf}:{}", category.as_fhir_code());
        let mut cursor = self.load_cursor("Observation", &cursor_key).await?;
        let query = SearchQuery::new()
            .param("subject", format!("Patient/{patient_id}"))
            .param("category", category.as_fhir_code())
            .param("_lastUpdated", since(cursor.last_synced_at));

        let bundle = match self.gateway.search_observations(&query).await {
            Ok(bundle) => bundle,
            Err(err) => {
                return Err(self
                    .record_pull_failure(&mut cursor, "Observation", cpf, &query, err)
                    .await);
            }
        };

        if bundle.entry.is_empty() {
            return self.finish_empty(&mut cursor).await;
        }

        let mut items = Vec::new();
        for resource in bundle.resources() {
            match deserialize::<crate::fhir::Observation>(resource)
                .and_then(|o| mapper::observation_to_domain(&o, cpf))
            {
                Ok(observation) => items.push(observation),
                Err(err) => {
                    self.record_mapping_failure("Observation", cpf, resource, &err)
                        .await
                }
            }
        }

        self.advance_cursor(&mut cursor, &bundle).await?;

        Ok(SyncOutcome {
            items,
            next_link: bundle.next_link().map(str::to_string),
        })
    }

    /// Pull everything the registry holds for one citizen
    ///
    /// # Errors
    ///
    /// Fails when no registry Patient exists for the CPF: the dependent
    /// pulls cannot run without a subject reference, so the whole sync
    /// short-circuits as a failure rather than reporting an empty success.
    pub async fn sync_patient_complete(&self, cpf: &str) -> Result<CompleteSyncReport> {
        let patients = self.sync_patient(cpf).await?;
        let citizen = patients.items.into_iter().next();

        let patient_id = match self.remote_patient_id(cpf).await? {
            Some(id) => id,
            None => {
                tracing::warn!(cpf = %mask_cpf(cpf), "No registry Patient for subject");
                return Err(crate::domain::PonteError::Sync(format!(
                    "No registry Patient found for CPF {}",
                    mask_cpf(cpf)
                )));
            }
        };

        let pregnancies = self.sync_pregnancies(cpf, &patient_id).await?.items;

        let mut observations = Vec::new();
        for category in [ObservationCategory::VitalSigns, ObservationCategory::Laboratory] {
            observations.extend(self.sync_observations(cpf, &patient_id, category).await?.items);
        }

        Ok(CompleteSyncReport {
            citizen,
            pregnancies,
            observations,
        })
    }

    /// Remote Patient id recorded on the cursor, if any sync has seen one
    async fn remote_patient_id(&self, cpf: &str) -> Result<Option<String>> {
        Ok(self
            .cursors
            .get(&format!("Patient/{cpf}"))
            .await?
            .and_then(|c| c.external_id))
    }

    async fn load_cursor(&self, resource_type: &str, identifier: &str) -> Result<SyncCursor> {
        let key = format!("{resource_type}/{identifier}");
        match self.cursors.get(&key).await? {
            Some(cursor) => Ok(cursor),
            None => Ok(SyncCursor::new(
                resource_type,
                identifier,
                SyncDirection::Bidirectional,
            )),
        }
    }

    async fn finish_empty<T>(&self, cursor: &mut SyncCursor) -> Result<SyncOutcome<T>> {
        cursor.mark_synced(None, None);
        self.cursors.save(cursor).await?;
        tracing::debug!(cursor = %cursor.key(), "No updates since last sync");
        Ok(SyncOutcome::empty())
    }

    /// Advance the cursor from the first entry of the result page
    async fn advance_cursor(&self, cursor: &mut SyncCursor, bundle: &crate::fhir::Bundle) -> Result<()> {
        let first = bundle.resources().next();
        let external_id = first
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let version_id = first
            .and_then(|r| r.pointer("/meta/versionId"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let last_updated = first
            .and_then(|r| r.pointer("/meta/lastUpdated"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        cursor.mark_synced(external_id, version_id);
        if last_updated.is_some() {
            cursor.last_updated_at = last_updated;
        }
        self.cursors.save(cursor).await
    }

    /// Record a gateway failure: durable error, errored cursor, log line
    async fn record_pull_failure(
        &self,
        cursor: &mut SyncCursor,
        resource_type: &str,
        identifier: &str,
        query: &SearchQuery,
        err: crate::domain::GatewayError,
    ) -> crate::domain::PonteError {
        cursor.mark_error();
        if let Err(save_err) = self.cursors.save(cursor).await {
            tracing::error!(error = %save_err, "Failed to persist errored cursor");
        }

        let error_type = err
            .status()
            .map(ErrorType::from_status)
            .unwrap_or(ErrorType::Timeout);
        let mut record = SyncError::new(
            ErrorOperation::Pull,
            error_type,
            resource_type,
            identifier,
            err.to_string(),
            json!({
                "resource_type": resource_type,
                "identifier": identifier,
                "query": format!("{query:?}"),
            }),
        );
        record.sync_cursor_key = Some(cursor.key());
        record.error_code = err.status().map(|s| s.to_string());
        record.external_id = cursor.external_id.clone();
        if let Err(save_err) = record_sync_failure(self.errors.as_ref(), record).await {
            tracing::error!(error = %save_err, "Failed to persist sync error");
        }

        tracing::error!(
            cursor = %cursor.key(),
            retry_count = cursor.retry_count,
            error = %err,
            "Pull sync failed"
        );

        err.into()
    }

    async fn record_mapping_failure(
        &self,
        resource_type: &str,
        identifier: &str,
        resource: &Value,
        err: &crate::domain::PonteError,
    ) {
        tracing::warn!(
            resource_type = resource_type,
            error = %err,
            "Skipping unmappable resource"
        );

        let record = SyncError::new(
            ErrorOperation::Mapping,
            ErrorType::Validation,
            resource_type,
            identifier,
            err.to_string(),
            json!({ "resource": resource }),
        );
        if let Err(save_err) = record_sync_failure(self.errors.as_ref(), record).await {
            tracing::error!(error = %save_err, "Failed to persist mapping error");
        }
    }
}

/// `_lastUpdated` filter value for a cursor position
fn since(at: DateTime<Utc>) -> String {
    format!("ge{}", at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize<T: serde::de::DeserializeOwned>(resource: &Value) -> Result<T> {
    serde_json::from_value(resource.clone()).map_err(|e| {
        crate::domain::PonteError::Mapping(format!("malformed wire resource: {e}"))
    })
}

/// CPF with the middle digits masked, for log and console output
///
/// Anything that is not a plain 11-digit CPF is masked entirely, so a
/// malformed value arriving from outside cannot leak or panic here.
pub fn mask_cpf(cpf: &str) -> String {
    match (cpf.get(..3), cpf.get(8..)) {
        (Some(head), Some(tail)) if cpf.len() == 11 => format!("{head}*****{tail}"),
        _ => "***".to_string(),
    }
}
