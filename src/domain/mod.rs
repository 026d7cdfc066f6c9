//! Domain models and types for Ponte.
//!
//! The domain layer provides:
//! - **Clinical records** ([`Citizen`], [`Pregnancy`], [`ClinicalObservation`])
//! - **Error types** ([`PonteError`], [`GatewayError`])
//! - **Result type alias** ([`Result`])
//!
//! All fallible operations in the crate return [`Result<T>`]; errors are
//! domain-specific and never expose third-party client types.

pub mod errors;
pub mod model;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{GatewayError, PonteError};
pub use model::{
    Address, Citizen, ClinicalObservation, Gender, ObservationCategory, ObservationCode,
    ObservationValue, Pregnancy, PregnancyStatus, PrenatalTask, TaskStatus,
};
pub use result::Result;
