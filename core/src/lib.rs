//! # Riverwatch Core
//!
//! Data model and vendor parser registry for the Riverwatch hardware-telemetry
//! collector.
//!
//! This crate holds everything the collector's moving parts agree on:
//!
//! - **Normalized events**: the common schema every BMC reading is folded into
//!   before it is published ([`event`])
//! - **Endpoints**: the reachable BMCs, their vendor binding, and the shared
//!   inventory map ([`endpoint`], [`inventory`])
//! - **Vendor parsers**: pure functions from vendor-specific Redfish payloads
//!   to normalized events ([`parser`])
//! - **Error taxonomy**: the transport/auth/parse/backpressure/config/shutdown
//!   error classes shared across the workspace ([`error`])
//!
//! # Data Flow
//!
//! ```text
//! ┌─────────┐    raw bytes     ┌──────────────┐   normalized   ┌───────────┐
//! │   BMC   │ ───────────────▶ │ parser       │ ─────────────▶ │ publisher │
//! │ (poll / │   (kind, loc)    │ registry     │    events      │  (Kafka)  │
//! │  push)  │                  │ (per vendor) │                └───────────┘
//! └─────────┘                  └──────────────┘
//! ```
//!
//! Parsers are pure: no I/O, no clock reads beyond the caller-supplied
//! timestamp. That keeps the whole normalization path testable at memory
//! speed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod event;
pub mod inventory;
pub mod parser;

pub use endpoint::{Credentials, Endpoint, TelemetryKind, VendorFamily};
pub use error::CollectorError;
pub use event::{MessageKind, NormalizedEvent, PhysicalContext, SensorPayload};
pub use inventory::Inventory;
