//! National registry gateway
//!
//! Everything Ponte sends to or receives from the registry passes through
//! this module: OAuth2 token management ([`auth`]), mutual-TLS client
//! construction ([`tls`]) and the retried, circuit-broken HTTP surface
//! ([`client`]).

pub mod auth;
pub mod client;
pub mod tls;

pub use auth::TokenCache;
pub use client::{RegistryClient, SearchQuery};
pub use tls::build_http_client;
