//! Wire resource validation
//!
//! Resources are validated as serialized JSON, just before transmission,
//! so the checks see exactly what the registry will see. Issues are graded
//! (fatal > error > warning > information); a resource is publishable only
//! when nothing at error level or above was found. Issues convert to and
//! from the registry's OperationOutcome shape for audit purposes.

use crate::fhir::{OperationOutcome, OutcomeIssue};
use crate::mapper::systems;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Issue severity, ordered least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// Wire code used in OperationOutcome.issue.severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Parse the wire code, defaulting unknown values to error
    pub fn parse(s: &str) -> Self {
        match s {
            "information" => Severity::Information,
            "warning" => Severity::Warning,
            "fatal" => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One graded validation finding
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,

    /// Machine-readable issue code (required, value, invalid, ...)
    pub code: String,

    /// Human-readable description
    pub details: String,

    /// Element path, e.g. `Patient.birthDate`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ValidationIssue {
    fn new(
        severity: Severity,
        code: &str,
        details: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.to_string(),
            details: details.into(),
            location,
        }
    }

    fn required(location: &str) -> Self {
        Self::new(
            Severity::Error,
            "required",
            format!("{location} is required"),
            Some(location.to_string()),
        )
    }
}

/// Result of validating one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    /// Worst severity found, when any issue exists
    pub severity: Option<Severity>,
}

impl ValidationOutcome {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let severity = issues.iter().map(|i| i.severity).max();
        let valid = !matches!(severity, Some(Severity::Error) | Some(Severity::Fatal));
        Self {
            valid,
            issues,
            severity,
        }
    }

    /// Issues at error level or above
    pub fn blocking_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity >= Severity::Error)
    }

    /// Convert the findings to a registry-style OperationOutcome
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let mut outcome = OperationOutcome::new();
        outcome.issue = self
            .issues
            .iter()
            .map(|i| OutcomeIssue {
                severity: i.severity.as_str().to_string(),
                code: i.code.clone(),
                details: None,
                diagnostics: Some(i.details.clone()),
                location: i.location.iter().cloned().collect(),
            })
            .collect();
        outcome
    }
}

/// Validation failure carrying the full issue list
///
/// Raised by the publish engine when a resource fails local validation;
/// no network call has been made at that point.
#[derive(Debug, Clone, Error)]
#[error("{resource_type} failed validation with {} issue(s)", issues.len())]
pub struct ValidationFailure {
    pub resource_type: String,
    pub issues: Vec<ValidationIssue>,
}

/// Extract graded issues from an OperationOutcome returned by the registry
pub fn issues_from_outcome(outcome: &OperationOutcome) -> Vec<ValidationIssue> {
    outcome
        .issue
        .iter()
        .map(|i| ValidationIssue {
            severity: Severity::parse(&i.severity),
            code: i.code.clone(),
            details: i
                .diagnostics
                .clone()
                .or_else(|| i.details.as_ref().and_then(|d| d.text.clone()))
                .unwrap_or_default(),
            location: i.location.first().cloned(),
        })
        .collect()
}

/// Validate a serialized wire resource
///
/// Runs universal structural checks, per-type checks for the resource
/// types Ponte publishes, and an optional profile-conformance check.
///
/// # Arguments
///
/// * `resource` - The serialized resource as it will be transmitted
/// * `profile_url` - Expected profile; a missing declaration is a warning,
///   except for profile-specific hard requirements
pub fn validate(resource: &Value, profile_url: Option<&str>) -> ValidationOutcome {
    let mut issues = Vec::new();

    let resource_type = match resource.get("resourceType").and_then(Value::as_str) {
        Some(rt) => rt,
        None => {
            issues.push(ValidationIssue::new(
                Severity::Fatal,
                "structure",
                "resourceType is missing",
                Some("resourceType".to_string()),
            ));
            return ValidationOutcome::from_issues(issues);
        }
    };

    // meta.profile, when present, must be an array
    if let Some(profile) = resource.pointer("/meta/profile") {
        if !profile.is_array() {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "structure",
                "meta.profile must be an array",
                Some(format!("{resource_type}.meta.profile")),
            ));
        }
    }

    match resource_type {
        "Patient" => check_patient(resource, &mut issues),
        "Condition" => check_condition(resource, &mut issues),
        "Observation" => check_observation(resource, &mut issues),
        "CarePlan" => check_care_plan(resource, &mut issues),
        "Bundle" => check_bundle(resource, &mut issues),
        _ => {}
    }

    if let Some(profile_url) = profile_url {
        check_profile(resource, resource_type, profile_url, &mut issues);
    }

    ValidationOutcome::from_issues(issues)
}

fn field_present(resource: &Value, field: &str) -> bool {
    match resource.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn check_patient(resource: &Value, issues: &mut Vec<ValidationIssue>) {
    let identifiers = resource
        .get("identifier")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if identifiers.is_empty() {
        issues.push(ValidationIssue::required("Patient.identifier"));
    }

    for (idx, identifier) in identifiers.iter().enumerate() {
        let system = identifier.get("system").and_then(Value::as_str);
        let value = identifier.get("value").and_then(Value::as_str).unwrap_or("");

        if system == Some(systems::CPF) && !is_digits(value, 11) {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "value",
                "CPF must be 11 digits",
                Some(format!("Patient.identifier[{idx}].value")),
            ));
        }
        if system == Some(systems::CNS) && !is_digits(value, 15) {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "value",
                "CNS must be 15 digits",
                Some(format!("Patient.identifier[{idx}].value")),
            ));
        }
    }

    if !field_present(resource, "name") {
        issues.push(ValidationIssue::required("Patient.name"));
    }

    match resource.get("gender").and_then(Value::as_str) {
        None => issues.push(ValidationIssue::required("Patient.gender")),
        Some(g) if !matches!(g, "male" | "female" | "other" | "unknown") => {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "value",
                format!("Patient.gender '{g}' is not in the required value set"),
                Some("Patient.gender".to_string()),
            ));
        }
        Some(_) => {}
    }

    if !field_present(resource, "birthDate") {
        issues.push(ValidationIssue::required("Patient.birthDate"));
    }
}

fn check_condition(resource: &Value, issues: &mut Vec<ValidationIssue>) {
    if !field_present(resource, "code") {
        issues.push(ValidationIssue::required("Condition.code"));
    } else {
        let has_pregnancy_code = resource
            .pointer("/code/coding")
            .and_then(Value::as_array)
            .map(|codings| {
                codings.iter().any(|c| {
                    c.get("system").and_then(Value::as_str) == Some(systems::SNOMED)
                        && c.get("code").and_then(Value::as_str)
                            == Some(systems::SNOMED_PREGNANCY)
                })
            })
            .unwrap_or(false);

        if !has_pregnancy_code {
            issues.push(ValidationIssue::new(
                Severity::Warning,
                "code-invalid",
                format!(
                    "Condition.code does not carry the pregnancy SNOMED code {}",
                    systems::SNOMED_PREGNANCY
                ),
                Some("Condition.code".to_string()),
            ));
        }
    }

    if !field_present(resource, "subject") {
        issues.push(ValidationIssue::required("Condition.subject"));
    }
    if !field_present(resource, "clinicalStatus") {
        issues.push(ValidationIssue::required("Condition.clinicalStatus"));
    }
}

fn check_observation(resource: &Value, issues: &mut Vec<ValidationIssue>) {
    for field in ["status", "code", "subject"] {
        if !field_present(resource, field) {
            issues.push(ValidationIssue::required(&format!("Observation.{field}")));
        }
    }

    let has_effective = resource
        .as_object()
        .map(|o| o.keys().any(|k| k.starts_with("effective")))
        .unwrap_or(false);
    if !has_effective {
        issues.push(ValidationIssue::required("Observation.effective[x]"));
    }

    let has_value = resource
        .as_object()
        .map(|o| o.keys().any(|k| k.starts_with("value")))
        .unwrap_or(false);
    if !has_value && !field_present(resource, "dataAbsentReason") {
        issues.push(ValidationIssue::new(
            Severity::Warning,
            "value",
            "Observation carries neither a value[x] nor a dataAbsentReason",
            Some("Observation.value[x]".to_string()),
        ));
    }
}

fn check_care_plan(resource: &Value, issues: &mut Vec<ValidationIssue>) {
    for field in ["status", "intent", "subject"] {
        if !field_present(resource, field) {
            issues.push(ValidationIssue::required(&format!("CarePlan.{field}")));
        }
    }
}

fn check_bundle(resource: &Value, issues: &mut Vec<ValidationIssue>) {
    let bundle_type = resource.get("type").and_then(Value::as_str);
    if bundle_type.is_none() {
        issues.push(ValidationIssue::required("Bundle.type"));
        return;
    }

    if matches!(bundle_type, Some("transaction") | Some("batch")) {
        let entries = resource
            .get("entry")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if entries.is_empty() {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "required",
                "transaction/batch Bundle must have at least one entry",
                Some("Bundle.entry".to_string()),
            ));
        }

        for (idx, entry) in entries.iter().enumerate() {
            if !field_present(entry, "resource") {
                issues.push(ValidationIssue::required(&format!(
                    "Bundle.entry[{idx}].resource"
                )));
            }
            if !field_present(entry, "request") {
                issues.push(ValidationIssue::required(&format!(
                    "Bundle.entry[{idx}].request"
                )));
            }
        }
    }
}

fn check_profile(
    resource: &Value,
    resource_type: &str,
    profile_url: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let declared = resource
        .pointer("/meta/profile")
        .and_then(Value::as_array)
        .map(|profiles| {
            profiles
                .iter()
                .any(|p| p.as_str() == Some(profile_url))
        })
        .unwrap_or(false);

    if !declared {
        issues.push(ValidationIssue::new(
            Severity::Warning,
            "invariant",
            format!("meta.profile does not declare {profile_url}"),
            Some(format!("{resource_type}.meta.profile")),
        ));
    }

    // The national individual profile requires a CPF or CNS identifier
    if resource_type == "Patient" && profile_url == systems::PROFILE_BR_INDIVIDUO {
        let has_national_id = resource
            .get("identifier")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter().any(|i| {
                    matches!(
                        i.get("system").and_then(Value::as_str),
                        Some(systems::CPF) | Some(systems::CNS)
                    )
                })
            })
            .unwrap_or(false);

        if !has_national_id {
            issues.push(ValidationIssue::new(
                Severity::Error,
                "required",
                "Patient must carry a CPF or CNS identifier for the national profile",
                Some("Patient.identifier".to_string()),
            ));
        }
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_patient() -> Value {
        json!({
            "resourceType": "Patient",
            "identifier": [
                {"system": systems::CPF, "value": "12345678901"}
            ],
            "name": [{"text": "Maria da Silva"}],
            "gender": "female",
            "birthDate": "1994-03-12"
        })
    }

    #[test]
    fn test_valid_patient_passes() {
        let outcome = validate(&valid_patient(), None);
        assert!(outcome.valid, "issues: {:?}", outcome.issues);
    }

    #[test]
    fn test_missing_resource_type_is_fatal() {
        let outcome = validate(&json!({"gender": "female"}), None);
        assert!(!outcome.valid);
        assert_eq!(outcome.severity, Some(Severity::Fatal));
    }

    #[test]
    fn test_patient_missing_birth_date() {
        let mut patient = valid_patient();
        patient.as_object_mut().unwrap().remove("birthDate");

        let outcome = validate(&patient, None);
        assert!(!outcome.valid);
        let issue = outcome
            .issues
            .iter()
            .find(|i| i.location.as_deref() == Some("Patient.birthDate"))
            .expect("birthDate issue");
        assert_eq!(issue.code, "required");
    }

    #[test]
    fn test_patient_invalid_gender() {
        let mut patient = valid_patient();
        patient["gender"] = json!("feminino");
        let outcome = validate(&patient, None);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_patient_short_cpf_rejected() {
        let mut patient = valid_patient();
        patient["identifier"][0]["value"] = json!("123");
        let outcome = validate(&patient, None);
        assert!(!outcome.valid);
        assert!(outcome.issues.iter().any(|i| i.details.contains("CPF")));
    }

    #[test]
    fn test_meta_profile_must_be_array() {
        let mut patient = valid_patient();
        patient["meta"] = json!({"profile": "not-an-array"});
        let outcome = validate(&patient, None);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_condition_warns_without_pregnancy_code() {
        let condition = json!({
            "resourceType": "Condition",
            "code": {"coding": [{"system": systems::SNOMED, "code": "386661006"}]},
            "subject": {"reference": "Patient/1"},
            "clinicalStatus": {"coding": [{"code": "active"}]}
        });

        let outcome = validate(&condition, None);
        // Warning only, still valid
        assert!(outcome.valid);
        assert_eq!(outcome.severity, Some(Severity::Warning));
    }

    #[test]
    fn test_observation_requires_effective_and_value() {
        let observation = json!({
            "resourceType": "Observation",
            "status": "final",
            "code": {"coding": [{"system": "http://loinc.org", "code": "8310-5"}]},
            "subject": {"reference": "Patient/1"}
        });

        let outcome = validate(&observation, None);
        assert!(!outcome.valid);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.location.as_deref() == Some("Observation.effective[x]")));
        // Missing value is only a warning
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn test_observation_data_absent_reason_suppresses_value_warning() {
        let observation = json!({
            "resourceType": "Observation",
            "status": "final",
            "code": {"coding": [{"code": "8310-5"}]},
            "subject": {"reference": "Patient/1"},
            "effectiveDateTime": "2026-02-01T10:00:00Z",
            "dataAbsentReason": {"coding": [{"code": "not-performed"}]}
        });

        let outcome = validate(&observation, None);
        assert!(outcome.valid, "issues: {:?}", outcome.issues);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn test_transaction_bundle_requires_entries() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": []
        });
        let outcome = validate(&bundle, None);
        assert!(!outcome.valid);
    }

    #[test]
    fn test_bundle_entry_requires_resource_and_request() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "batch",
            "entry": [{"fullUrl": "urn:uuid:1"}]
        });
        let outcome = validate(&bundle, None);
        assert!(!outcome.valid);
        assert_eq!(outcome.blocking_issues().count(), 2);
    }

    #[test]
    fn test_profile_missing_declaration_warns() {
        let outcome = validate(&valid_patient(), Some(systems::PROFILE_BR_INDIVIDUO));
        assert!(outcome.valid);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.severity == Severity::Warning && i.code == "invariant"));
    }

    #[test]
    fn test_national_profile_requires_cpf_or_cns() {
        let patient = json!({
            "resourceType": "Patient",
            "identifier": [{"system": "urn:local", "value": "42"}],
            "name": [{"text": "Maria"}],
            "gender": "female",
            "birthDate": "1994-03-12"
        });

        let outcome = validate(&patient, Some(systems::PROFILE_BR_INDIVIDUO));
        assert!(!outcome.valid);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Information);
    }

    #[test]
    fn test_outcome_conversion_roundtrip() {
        let mut patient = valid_patient();
        patient.as_object_mut().unwrap().remove("birthDate");
        let outcome = validate(&patient, None);

        let op_outcome = outcome.to_operation_outcome();
        assert_eq!(op_outcome.issue.len(), outcome.issues.len());

        let recovered = issues_from_outcome(&op_outcome);
        assert_eq!(recovered.len(), outcome.issues.len());
        assert_eq!(recovered[0].severity, outcome.issues[0].severity);
    }
}
