//! # Riverwatch Client
//!
//! Outbound HTTP for the collector: a permissive/validated client pair with
//! hot trust-store reload ([`pair`]), the retry policy shared by every
//! outbound call ([`retry`]), and thin typed clients for the two pieces of
//! trusted infrastructure the collector depends on — the HSM state manager
//! ([`hsm`]) and the Vault secret store ([`vault`]).
//!
//! # Trust model
//!
//! ```text
//!                 ┌────────────────────┐
//!   request ────▶ │  validated client  │──── CA bundle, swapped atomically
//!                 │  (if built)        │     on reload_trust()
//!                 └─────────┬──────────┘
//!                           │ TLS failure / not built
//!                           ▼
//!                 ┌────────────────────┐
//!                 │ permissive client  │──── bootstrap + endpoints without
//!                 └────────────────────┘     a trusted chain
//! ```
//!
//! Readers load the validated-client pointer once per request; a reload
//! publishes a new immutable client without waiting for in-flight requests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod hsm;
pub mod pair;
pub mod retry;
pub mod vault;

pub use hsm::{HsmClient, RedfishEndpointRecord};
pub use pair::{HttpClientPair, HttpResponse};
pub use retry::RetryPolicy;
pub use vault::VaultClient;
