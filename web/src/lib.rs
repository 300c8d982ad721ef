//! # Riverwatch Web
//!
//! The event ingress server: accepts Redfish event callbacks pushed by BMCs,
//! routes their bodies through the vendor parser registry, and forwards the
//! resulting normalized events to the publisher. Also serves the liveness and
//! readiness probes.
//!
//! # Request Flow
//!
//! 1. A BMC POSTs a Redfish event body to the configured events path
//! 2. The source endpoint is resolved from the origin header or peer address
//!    against the inventory
//! 3. The body is parsed by the endpoint's vendor parser (telemetry bodies)
//!    or forwarded verbatim as a resource event
//! 4. Normalized events go to the publisher; backpressure drops are counted
//!
//! TLS terminates upstream of this server; inbound callers are not
//! authenticated beyond that.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod state;

pub use error::AppError;
pub use state::{AppState, Readiness};

use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the ingress router.
///
/// The events route is only mounted when REST ingress is enabled; the
/// liveness and readiness probes are always served.
#[must_use]
pub fn router(state: Arc<AppState>, events_path: &str, rest_enabled: bool) -> Router {
    let probes = Router::new()
        .route("/liveness", get(handlers::liveness))
        .route("/readiness", get(handlers::readiness));

    let router = if rest_enabled {
        probes.route(events_path, post(handlers::ingest_event))
    } else {
        probes
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
