// Ponte - Clinical record bridge to the national FHIR registry
// Copyright (c) 2026 Ponte Contributors
// Licensed under the MIT License

//! # Ponte - Clinical record bridge to the national FHIR registry
//!
//! Ponte synchronizes local clinical records (citizens, pregnancies,
//! clinical observations) with Brazil's national FHIR R4 registry. It
//! publishes local changes with idempotency keys and a full audit trail,
//! and pulls registry updates behind per-resource synchronization cursors.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Publishing** local records as FHIR resources with local validation,
//!   idempotency keys and per-attempt audit logs
//! - **Pulling** registry changes incrementally with `_lastUpdated` cursors
//! - **Recovering** from failures with retry backoff, a circuit breaker and
//!   durable error records replayed by a background worker
//! - **Operating** as a long-lived service or as one-shot CLI commands
//!
//! ## Architecture
//!
//! Ponte follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`engine`] - Business logic (pull sync, publication)
//! - [`gateway`] - Registry HTTP client, OAuth2 tokens, mutual TLS
//! - [`mapper`] - Domain ↔ FHIR wire transforms
//! - [`validator`] - Pre-transmission resource validation
//! - [`state`] - Cursors, publish logs, durable sync errors
//! - [`workers`] - Scheduled sync, retry and cleanup workers
//! - [`retry`] - Backoff executor and circuit breaker
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ponte::cli::commands::build_runtime;
//! use ponte::config::load_config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("ponte.toml")?;
//!     let runtime = build_runtime(&config)?;
//!
//!     let report = runtime.sync_engine.sync_patient_complete("12345678901").await?;
//!     println!("Pulled {} pregnancies", report.pregnancies.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Ponte uses the [`domain::PonteError`] type for all errors:
//!
//! ```rust,no_run
//! use ponte::domain::PonteError;
//!
//! fn example() -> Result<(), PonteError> {
//!     let config = ponte::config::load_config("ponte.toml")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Ponte uses structured logging with the `tracing` crate:
//!
//! ```rust,no_run
//! use tracing::{info, warn};
//!
//! info!("Starting sync cycle");
//! warn!(cursor = "Patient/123*****901", "No updates since last sync");
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod fhir;
pub mod gateway;
pub mod logging;
pub mod mapper;
pub mod retry;
pub mod state;
pub mod validator;
pub mod workers;
