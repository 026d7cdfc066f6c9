//! Citizen ↔ Patient mapping

use super::{format, systems};
use crate::domain::{Address, Citizen, Gender, PonteError, Result};
use crate::fhir::{ContactPoint, Extension, FhirAddress, HumanName, Identifier, Meta, Patient};
use chrono::NaiveDate;

/// Map a local citizen to a wire Patient
///
/// The CPF identifier is always emitted; the CNS only when known. The
/// national individual profile is declared in `meta.profile` and the
/// mother's name travels in its dedicated extension.
pub fn citizen_to_patient(citizen: &Citizen) -> Patient {
    let mut patient = Patient::new();

    patient.id = None;
    patient.meta = Some(Meta {
        profile: Some(vec![systems::PROFILE_BR_INDIVIDUO.to_string()]),
        ..Default::default()
    });

    patient.identifier.push(Identifier {
        system: Some(systems::CPF.to_string()),
        value: Some(citizen.cpf.clone()),
    });
    if let Some(cns) = &citizen.cns {
        patient.identifier.push(Identifier {
            system: Some(systems::CNS.to_string()),
            value: Some(cns.clone()),
        });
    }

    patient.name.push(HumanName {
        text: Some(citizen.name.clone()),
        ..Default::default()
    });

    patient.gender = Some(citizen.gender.as_str().to_string());
    patient.birth_date = Some(format::date(citizen.birth_date));

    if let Some(phone) = &citizen.phone {
        patient.telecom.push(ContactPoint {
            system: Some("phone".to_string()),
            value: Some(format::phone(phone)),
            r#use: Some("mobile".to_string()),
        });
    }
    if let Some(email) = &citizen.email {
        patient.telecom.push(ContactPoint {
            system: Some("email".to_string()),
            value: Some(email.clone()),
            r#use: None,
        });
    }

    if let Some(address) = &citizen.address {
        patient.address.push(FhirAddress {
            line: address.street.iter().cloned().collect(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.as_deref().map(format::postal_code),
            country: Some("BR".to_string()),
        });
    }

    if let Some(mother_name) = &citizen.mother_name {
        patient.extension.push(Extension {
            url: systems::EXT_MOTHERS_NAME.to_string(),
            value_string: Some(mother_name.clone()),
            value_date: None,
        });
    }

    patient
}

/// Map a wire Patient back to a local citizen
///
/// # Errors
///
/// Returns a mapping error when the Patient carries no CPF identifier,
/// no name or no parseable birth date.
pub fn patient_to_citizen(patient: &Patient) -> Result<Citizen> {
    let cpf = identifier_value(patient, systems::CPF)
        .ok_or_else(|| PonteError::Mapping("Patient carries no CPF identifier".to_string()))?;
    let cns = identifier_value(patient, systems::CNS);

    let name = patient
        .name
        .first()
        .and_then(|n| n.text.clone())
        .ok_or_else(|| PonteError::Mapping("Patient carries no name".to_string()))?;

    let birth_date = patient
        .birth_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .ok_or_else(|| PonteError::Mapping("Patient birthDate is missing or invalid".to_string()))?;

    let gender = patient
        .gender
        .as_deref()
        .and_then(Gender::parse)
        .unwrap_or(Gender::Unknown);

    let phone = telecom_value(patient, "phone");
    let email = telecom_value(patient, "email");

    let address = patient.address.first().map(|a| Address {
        street: a.line.first().cloned(),
        city: a.city.clone(),
        state: a.state.clone(),
        postal_code: a.postal_code.clone(),
    });

    let mother_name = patient
        .extension
        .iter()
        .find(|e| e.url == systems::EXT_MOTHERS_NAME)
        .and_then(|e| e.value_string.clone());

    Ok(Citizen {
        cpf,
        cns,
        name,
        mother_name,
        birth_date,
        gender,
        phone,
        email,
        address,
    })
}

fn identifier_value(patient: &Patient, system: &str) -> Option<String> {
    patient
        .identifier
        .iter()
        .find(|i| i.system.as_deref() == Some(system))
        .and_then(|i| i.value.clone())
}

fn telecom_value(patient: &Patient, system: &str) -> Option<String> {
    patient
        .telecom
        .iter()
        .find(|t| t.system.as_deref() == Some(system))
        .and_then(|t| t.value.clone())
}
