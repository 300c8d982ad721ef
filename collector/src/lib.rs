//! # Riverwatch Collector
//!
//! The collector daemon: wires the HTTP client pair, the publisher, the
//! ingress server, and the three reconcile loops (inventory, polling,
//! subscriptions) into one supervised process.
//!
//! # Startup order
//!
//! ```text
//! HTTP client pair → publisher → ingress server → inventory loop
//!                                                → poller workers + tick loop
//!                                                → subscription manager
//! ```
//!
//! Shutdown reverses the flow: a watch-channel signal stops the loops, the
//! poll channel closes and its workers drain, the publisher flushes within
//! its deadline, and the ingress server exits gracefully.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod inventory;
pub mod metrics;
pub mod poller;
pub mod subscriptions;

pub use config::CollectorConfig;
