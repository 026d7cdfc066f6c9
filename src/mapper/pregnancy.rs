//! Pregnancy ↔ Condition and Pregnancy → CarePlan mapping

use super::{format, systems};
use crate::domain::{Pregnancy, PregnancyStatus, PrenatalTask, Result, TaskStatus};
use crate::domain::PonteError;
use crate::fhir::{
    CarePlan, CarePlanActivity, CarePlanActivityDetail, CodeableConcept, Condition, Extension,
    Period, Reference,
};
use chrono::NaiveDate;

/// Map a tracked pregnancy to a wire Condition
///
/// The SNOMED pregnancy code and the expected-delivery-date extension are
/// what the registry keys on; the subject reference is supplied by the
/// caller because only the sync layer knows the remote Patient id.
pub fn pregnancy_to_condition(pregnancy: &Pregnancy, subject: Reference) -> Condition {
    let mut condition = Condition::new();

    condition.id = pregnancy.external_id.clone();
    condition.clinical_status = Some(CodeableConcept::coded(
        systems::CONDITION_CLINICAL,
        pregnancy.status.as_clinical_status(),
        None,
    ));
    condition.code = Some(CodeableConcept::coded(
        systems::SNOMED,
        systems::SNOMED_PREGNANCY,
        Some("Pregnancy".to_string()),
    ));
    condition.subject = Some(subject);
    condition.onset_date_time = pregnancy.start_date.map(format::date);

    if let Some(due_date) = pregnancy.due_date {
        condition.extension.push(Extension {
            url: systems::EXT_EXPECTED_DELIVERY.to_string(),
            value_date: Some(format::date(due_date)),
            value_string: None,
        });
    }

    condition
}

/// Map a wire Condition back to a tracked pregnancy
///
/// # Errors
///
/// Returns a mapping error when the Condition carries no id, since the
/// remote id is the only key the local domain can track it by.
pub fn condition_to_pregnancy(condition: &Condition, citizen_cpf: &str) -> Result<Pregnancy> {
    let external_id = condition
        .id
        .clone()
        .ok_or_else(|| PonteError::Mapping("Condition carries no id".to_string()))?;

    let status = match condition
        .clinical_status
        .as_ref()
        .and_then(|cs| cs.code_in_system(systems::CONDITION_CLINICAL))
    {
        Some("resolved") | Some("inactive") => PregnancyStatus::Resolved,
        _ => PregnancyStatus::Active,
    };

    let start_date = condition
        .onset_date_time
        .as_deref()
        .and_then(parse_fhir_date);

    let due_date = condition
        .extension
        .iter()
        .find(|e| e.url == systems::EXT_EXPECTED_DELIVERY)
        .and_then(|e| e.value_date.as_deref())
        .and_then(parse_fhir_date);

    Ok(Pregnancy {
        id: external_id.clone(),
        citizen_cpf: citizen_cpf.to_string(),
        external_id: Some(external_id),
        status,
        start_date,
        due_date,
        tasks: Vec::new(),
    })
}

/// Map a pregnancy and its planned tasks to a wire CarePlan
pub fn pregnancy_to_care_plan(pregnancy: &Pregnancy, subject: Reference) -> CarePlan {
    let mut care_plan = CarePlan::new();

    care_plan.status = Some(
        match pregnancy.status {
            PregnancyStatus::Active => "active",
            PregnancyStatus::Resolved => "completed",
        }
        .to_string(),
    );
    care_plan.intent = Some("plan".to_string());
    care_plan.title = Some("Plano de cuidado pré-natal".to_string());
    care_plan.subject = Some(subject);
    care_plan.period = Some(Period {
        start: pregnancy.start_date.map(format::date),
        end: pregnancy.due_date.map(format::date),
    });

    care_plan.activity = pregnancy.tasks.iter().map(task_to_activity).collect();

    care_plan
}

fn task_to_activity(task: &PrenatalTask) -> CarePlanActivity {
    let description = match &task.description {
        Some(desc) => format!("{}: {}", task.title, desc),
        None => task.title.clone(),
    };

    CarePlanActivity {
        detail: Some(CarePlanActivityDetail {
            status: Some(task.status.as_activity_status().to_string()),
            description: Some(description),
            scheduled_period: task.scheduled_date.map(|d| Period {
                start: Some(format::date(d)),
                end: None,
            }),
        }),
    }
}

fn parse_fhir_date(s: &str) -> Option<NaiveDate> {
    // Accept both plain dates and full instants; registry values are
    // untrusted, so never index into them by byte position
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
