//! FHIR R4 wire types exchanged with the national registry
//!
//! Only the resources and datatypes Ponte actually sends or receives are
//! modelled; unknown fields arriving from the registry are ignored by
//! serde. Resources are serialized to `serde_json::Value` before they are
//! validated or transmitted.

pub mod resources;

pub use resources::{
    Bundle, BundleEntry, BundleLink, BundleRequest, BundleResponse, CarePlan, CarePlanActivity,
    CarePlanActivityDetail, CodeableConcept, Coding, Condition, ContactPoint, Extension,
    FhirAddress, HumanName, Identifier, Meta, Observation, OperationOutcome, OutcomeIssue, Patient,
    Period, Quantity, Reference,
};
