//! ClinicalObservation ↔ Observation mapping

use super::{format, systems};
use crate::domain::{
    ClinicalObservation, ObservationCategory, ObservationCode, ObservationValue, PonteError,
    Result,
};
use crate::fhir::{CodeableConcept, Coding, Observation, Quantity, Reference};
use chrono::{DateTime, Utc};

/// Map a local clinical observation to a wire Observation
///
/// A missing value becomes a `dataAbsentReason` rather than an empty
/// resource, so pending lab results can still be published.
pub fn observation_to_fhir(obs: &ClinicalObservation, subject: Reference) -> Observation {
    let mut observation = Observation::new();

    observation.id = obs.external_id.clone();
    observation.status = Some("final".to_string());
    observation.category = vec![CodeableConcept::coded(
        systems::OBSERVATION_CATEGORY,
        obs.category.as_fhir_code(),
        None,
    )];
    observation.code = Some(CodeableConcept {
        coding: vec![Coding {
            system: Some(obs.code.system.clone()),
            code: Some(obs.code.code.clone()),
            display: obs.code.display.clone(),
        }],
        text: obs.code.display.clone(),
    });
    observation.subject = Some(subject);
    observation.effective_date_time = Some(format::instant(obs.effective_at));
    observation.issued = obs.issued_at.map(format::instant);

    match &obs.value {
        Some(ObservationValue::Quantity { value, unit }) => {
            observation.value_quantity = Some(Quantity {
                value: Some(*value),
                unit: Some(unit.clone()),
                system: Some(systems::UCUM.to_string()),
            });
        }
        Some(ObservationValue::Text(text)) => {
            observation.value_string = Some(text.clone());
        }
        None => {
            observation.data_absent_reason = Some(CodeableConcept::coded(
                systems::DATA_ABSENT_REASON,
                "unknown",
                None,
            ));
        }
    }

    observation
}

/// Map a wire Observation back to a local clinical observation
///
/// # Errors
///
/// Returns a mapping error when the resource carries no id, no code or no
/// effective time, or when its category is one Ponte does not track.
pub fn observation_to_domain(
    observation: &Observation,
    citizen_cpf: &str,
) -> Result<ClinicalObservation> {
    let external_id = observation
        .id
        .clone()
        .ok_or_else(|| PonteError::Mapping("Observation carries no id".to_string()))?;

    let category = observation
        .category
        .iter()
        .find_map(|c| c.code_in_system(systems::OBSERVATION_CATEGORY))
        .and_then(ObservationCategory::parse)
        .ok_or_else(|| {
            PonteError::Mapping("Observation category is missing or untracked".to_string())
        })?;

    let coding = observation
        .code
        .as_ref()
        .and_then(|c| c.coding.first())
        .ok_or_else(|| PonteError::Mapping("Observation carries no code".to_string()))?;

    let code = ObservationCode {
        system: coding.system.clone().unwrap_or_default(),
        code: coding
            .code
            .clone()
            .ok_or_else(|| PonteError::Mapping("Observation coding has no code".to_string()))?,
        display: coding.display.clone(),
    };

    let effective_at = observation
        .effective_date_time
        .as_deref()
        .and_then(parse_instant)
        .ok_or_else(|| {
            PonteError::Mapping("Observation effectiveDateTime is missing or invalid".to_string())
        })?;

    let issued_at = observation.issued.as_deref().and_then(parse_instant);

    let value = if let Some(q) = &observation.value_quantity {
        q.value.map(|v| ObservationValue::Quantity {
            value: v,
            unit: q.unit.clone().unwrap_or_default(),
        })
    } else {
        observation.value_string.clone().map(ObservationValue::Text)
    };

    Ok(ClinicalObservation {
        id: external_id.clone(),
        citizen_cpf: citizen_cpf.to_string(),
        external_id: Some(external_id),
        category,
        code,
        value,
        effective_at,
        issued_at,
    })
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
