//! Local clinical domain records
//!
//! These are the records the rest of the clinical application owns. The
//! mapper converts them to and from FHIR wire resources; nothing in this
//! module knows about the registry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative gender, constrained to the FHIR value set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    /// Wire representation used in Patient.gender
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }

    /// Parse the FHIR code back into the domain enum
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            "unknown" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Postal address of a citizen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Stored as entered; normalized to 8 digits by the mapper
    pub postal_code: Option<String>,
}

/// A citizen known to the local clinical domain
///
/// The CPF is the primary local identifier; the CNS is carried when known.
/// Both determine registry acceptance, so they are kept verbatim here and
/// only normalized at the wire boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citizen {
    /// Brazilian taxpayer identifier (11 digits)
    pub cpf: String,

    /// National health card number (15 digits), when known
    pub cns: Option<String>,

    /// Full name
    pub name: String,

    /// Mother's full name, required by the BRIndividuo profile
    pub mother_name: Option<String>,

    pub birth_date: NaiveDate,

    pub gender: Gender,

    /// Contact phone as entered locally
    pub phone: Option<String>,

    pub email: Option<String>,

    pub address: Option<Address>,
}

/// Status of a tracked pregnancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PregnancyStatus {
    /// Ongoing pregnancy
    Active,
    /// Concluded (delivery, loss or other resolution)
    Resolved,
}

impl PregnancyStatus {
    /// FHIR Condition.clinicalStatus code
    pub fn as_clinical_status(&self) -> &'static str {
        match self {
            PregnancyStatus::Active => "active",
            PregnancyStatus::Resolved => "resolved",
        }
    }
}

/// Status of a planned prenatal task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// FHIR CarePlan activity status code
    pub fn as_activity_status(&self) -> &'static str {
        match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// A scheduled prenatal-care activity (consultation, exam, vaccination)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrenatalTask {
    pub title: String,
    pub description: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub status: TaskStatus,
}

/// A pregnancy tracked by the local domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pregnancy {
    /// Local identifier
    pub id: String,

    /// CPF of the pregnant citizen
    pub citizen_cpf: String,

    /// Remote Condition id once published, if known
    pub external_id: Option<String>,

    pub status: PregnancyStatus,

    /// Clinically estimated start (LMP or ultrasound dated)
    pub start_date: Option<NaiveDate>,

    /// Expected delivery date
    pub due_date: Option<NaiveDate>,

    /// Planned prenatal activities, mapped into the CarePlan
    #[serde(default)]
    pub tasks: Vec<PrenatalTask>,
}

/// Category of a clinical observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObservationCategory {
    VitalSigns,
    Laboratory,
}

impl ObservationCategory {
    /// FHIR observation-category code
    pub fn as_fhir_code(&self) -> &'static str {
        match self {
            ObservationCategory::VitalSigns => "vital-signs",
            ObservationCategory::Laboratory => "laboratory",
        }
    }

    /// Parse the FHIR category code
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vital-signs" => Some(ObservationCategory::VitalSigns),
            "laboratory" => Some(ObservationCategory::Laboratory),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_fhir_code())
    }
}

/// Measured or reported value of an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Quantity { value: f64, unit: String },
    Text(String),
}

/// Coded concept identifying what was observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationCode {
    pub system: String,
    pub code: String,
    pub display: Option<String>,
}

/// A clinical observation recorded locally (vital sign or lab result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalObservation {
    pub id: String,

    pub citizen_cpf: String,

    pub external_id: Option<String>,

    pub category: ObservationCategory,

    pub code: ObservationCode,

    /// Absent when the result is not yet available; the mapper emits a
    /// dataAbsentReason in that case
    pub value: Option<ObservationValue>,

    pub effective_at: DateTime<Utc>,

    pub issued_at: Option<DateTime<Utc>>,
}
