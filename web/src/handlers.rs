//! Ingress and probe handlers.

use crate::error::AppError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use riverwatch_core::{CollectorError, MessageKind, TelemetryKind, parser};
use std::net::SocketAddr;
use std::sync::Arc;

/// Header a BMC (or a proxy in front of it) may use to identify the source
/// endpoint. Falls back to the peer address when absent.
pub const ORIGIN_HEADER: &str = "x-riverwatch-origin";

/// Liveness probe. Always 200; checks nothing.
#[allow(clippy::unused_async)]
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness probe.
///
/// 200 iff the publisher holds at least one broker connection and the
/// inventory loop has completed at least one iteration, else 503.
#[allow(clippy::unused_async)]
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.readiness.inventory_ready() && state.publisher.broker_count() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// What an inbound event body turned out to contain.
enum BodyKind {
    Telemetry(TelemetryKind),
    Resource,
}

fn classify_body(document: &serde_json::Value) -> BodyKind {
    if document.get("Temperatures").is_some() {
        return BodyKind::Telemetry(TelemetryKind::Thermal);
    }
    if document.get("PowerControl").is_some()
        || document.get("Voltages").is_some()
        || document.get("PowerSupplies").is_some()
    {
        return BodyKind::Telemetry(TelemetryKind::Power);
    }
    BodyKind::Resource
}

/// Overwrite the body's own event timestamp with receipt time.
fn stamp_receipt_time(mut document: serde_json::Value, now: DateTime<Utc>) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut document {
        map.insert(
            "EventTimestamp".to_string(),
            serde_json::Value::String(now.to_rfc3339()),
        );
    }
    document
}

fn forward(publish: impl FnOnce() -> Result<(), CollectorError>) -> Result<(), AppError> {
    match publish() {
        Ok(()) => Ok(()),
        Err(CollectorError::Backpressure { topic }) => {
            metrics::counter!("riverwatch_events_dropped_total", "reason" => "backpressure")
                .increment(1);
            tracing::warn!(topic, "publisher backpressure, dropping ingress event");
            Err(AppError::unavailable("publisher queue full"))
        }
        Err(CollectorError::Shutdown) => Err(AppError::unavailable("collector is shutting down")),
        Err(err) => Err(AppError::internal("publish failed").with_source(err.into())),
    }
}

/// Accept one POSTed Redfish event body.
///
/// The source endpoint is resolved from [`ORIGIN_HEADER`] or the peer
/// address; telemetry-shaped bodies go through the endpoint's vendor parser,
/// anything else is forwarded verbatim as a resource event.
///
/// # Errors
///
/// 400 for malformed bodies or unknown origins, 503 for transient publish
/// failures.
#[allow(clippy::unused_async)]
pub async fn ingest_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let origin = headers
        .get(ORIGIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .ok_or_else(|| AppError::bad_request("event source could not be determined"))?;

    let endpoint = state
        .inventory
        .resolve_host(&origin)
        .ok_or_else(|| AppError::bad_request(format!("unknown event source {origin}")))?;

    let document: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("malformed event body: {e}")))?;

    let now = Utc::now();

    match classify_body(&document) {
        BodyKind::Telemetry(kind) => {
            let events = parser::parse_and_tag(&body, endpoint.vendor, kind, &endpoint.id, now)
                .map_err(|e| AppError::bad_request(format!("unparseable telemetry body: {e}")))?;

            let count = events.len();
            for event in &events {
                forward(|| state.publisher.publish(event))?;
            }

            metrics::counter!("riverwatch_ingress_events_total", "kind" => "telemetry")
                .increment(1);
            tracing::debug!(
                endpoint = %endpoint.id,
                kind = %kind,
                events = count,
                "ingress telemetry accepted"
            );
            Ok(StatusCode::OK)
        }
        BodyKind::Resource => {
            let outbound = if state.ignore_provided_timestamp {
                stamp_receipt_time(document, now)
            } else {
                document
            };
            let payload = serde_json::to_vec(&outbound)
                .map_err(|e| AppError::internal("event re-serialization").with_source(e.into()))?;

            forward(|| {
                state
                    .publisher
                    .publish_raw(MessageKind::ResourceEvent, &payload)
            })?;

            metrics::counter!("riverwatch_ingress_events_total", "kind" => "resource")
                .increment(1);
            tracing::debug!(endpoint = %endpoint.id, "ingress resource event accepted");
            Ok(StatusCode::OK)
        }
    }
}
