//! Domain ↔ wire mapping
//!
//! Pure, side-effect-free transforms between the local clinical records and
//! the FHIR resources the registry accepts. The identifier systems, profile
//! and extension URLs in [`systems`] determine registry acceptance and must
//! not drift.

pub mod bundle;
pub mod observation;
pub mod patient;
pub mod pregnancy;

pub use bundle::{build_batch_bundle, build_transaction_bundle};
pub use observation::{observation_to_fhir, observation_to_domain};
pub use patient::{citizen_to_patient, patient_to_citizen};
pub use pregnancy::{condition_to_pregnancy, pregnancy_to_care_plan, pregnancy_to_condition};

/// Terminology systems, profiles and extension URLs used on the wire
pub mod systems {
    /// CPF identifier system
    pub const CPF: &str = "http://rnds.saude.gov.br/fhir/r4/NamingSystem/cpf";
    /// CNS identifier system
    pub const CNS: &str = "http://rnds.saude.gov.br/fhir/r4/NamingSystem/cns";
    /// SNOMED CT
    pub const SNOMED: &str = "http://snomed.info/sct";
    /// SNOMED code for pregnancy
    pub const SNOMED_PREGNANCY: &str = "77386006";
    /// National individual (Patient) profile
    pub const PROFILE_BR_INDIVIDUO: &str =
        "http://www.saude.gov.br/fhir/r4/StructureDefinition/BRIndividuo-1.0";
    /// Expected delivery date extension
    pub const EXT_EXPECTED_DELIVERY: &str =
        "http://rnds.saude.gov.br/fhir/r4/StructureDefinition/expected-delivery-date";
    /// Mother's name extension
    pub const EXT_MOTHERS_NAME: &str =
        "http://rnds.saude.gov.br/fhir/r4/StructureDefinition/mothers-name";
    /// Condition clinical status code system
    pub const CONDITION_CLINICAL: &str =
        "http://terminology.hl7.org/CodeSystem/condition-clinical";
    /// Observation category code system
    pub const OBSERVATION_CATEGORY: &str =
        "http://terminology.hl7.org/CodeSystem/observation-category";
    /// Data absent reason code system
    pub const DATA_ABSENT_REASON: &str =
        "http://terminology.hl7.org/CodeSystem/data-absent-reason";
    /// UCUM units
    pub const UCUM: &str = "http://unitsofmeasure.org";
}

pub(crate) mod format {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

    /// FHIR date (YYYY-MM-DD)
    pub fn date(d: NaiveDate) -> String {
        d.format("%Y-%m-%d").to_string()
    }

    /// FHIR instant with millisecond precision, UTC
    pub fn instant(t: DateTime<Utc>) -> String {
        t.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Strip formatting from a Brazilian phone number and prefix +55
    /// when no country code is present
    pub fn phone(raw: &str) -> String {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if raw.trim_start().starts_with('+') || digits.starts_with("55") && digits.len() > 11 {
            format!("+{digits}")
        } else {
            format!("+55{digits}")
        }
    }

    /// Strip formatting from a CEP postal code (8 digits)
    pub fn postal_code(raw: &str) -> String {
        raw.chars().filter(|c| c.is_ascii_digit()).collect()
    }

}
