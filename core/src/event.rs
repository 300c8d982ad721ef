//! Normalized telemetry events.
//!
//! Every reading the collector acquires — whether polled from a BMC or pushed
//! to the ingress server — is folded into a [`NormalizedEvent`] before it is
//! handed to the publisher. The JSON rendering uses PascalCase field names to
//! match the schema the downstream analytics consumers expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind tag carried by every normalized event.
///
/// The publisher routes events to Kafka topics by this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Chassis power draw readings.
    Power,
    /// Power-supply and voltage-rail readings.
    Voltage,
    /// Temperature readings.
    Temperature,
    /// A Redfish resource or alert event forwarded from the ingress path.
    ResourceEvent,
}

impl MessageKind {
    /// Stable string form of the kind tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Power => "Power",
            Self::Voltage => "Voltage",
            Self::Temperature => "Temperature",
            Self::ResourceEvent => "ResourceEvent",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where on the machine a sensor physically sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhysicalContext {
    /// Whole-chassis reading (e.g. total power draw).
    Chassis,
    /// A power supply bay.
    PowerSupplyBay,
    /// A voltage rail on the system board.
    SystemBoard,
    /// A sensor on the baseboard (temperatures).
    Baseboard,
}

/// One reading from one sensor on one endpoint.
///
/// The smallest unit of normalized telemetry. `value` is kept as a decimal
/// string so full precision survives the trip through JSON; it always parses
/// back to a finite number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorPayload {
    /// When the reading was taken (or received, for polled payloads).
    pub timestamp: DateTime<Utc>,
    /// Stable ID of the endpoint the reading came from.
    pub location: String,
    /// Physical placement of the sensor.
    pub physical_context: PhysicalContext,
    /// Device-specific name suffix (e.g. a voltage rail name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_specific_context: Option<String>,
    /// Member index within the physical context, when the vendor reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u8>,
    /// Index of the parent member, for nested sensors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parental_index: Option<u8>,
    /// The reading, serialized as a decimal string with full precision.
    pub value: String,
}

impl SensorPayload {
    /// Create a payload with the required fields; optional fields start empty.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        location: String,
        physical_context: PhysicalContext,
        value: String,
    ) -> Self {
        Self {
            timestamp,
            location,
            physical_context,
            device_specific_context: None,
            index: None,
            parental_index: None,
            value,
        }
    }

    /// Attach a member index.
    #[must_use]
    pub const fn with_index(mut self, index: u8) -> Self {
        self.index = Some(index);
        self
    }

    /// Attach a device-specific context string.
    #[must_use]
    pub fn with_device_context(mut self, context: impl Into<String>) -> Self {
        self.device_specific_context = Some(context.into());
        self
    }
}

/// A batch of sensor payloads sharing a kind tag and source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NormalizedEvent {
    /// Kind tag; determines the destination topic.
    pub message_kind: MessageKind,
    /// Event timestamp, RFC 3339.
    pub event_timestamp: DateTime<Utc>,
    /// Deployment class of the source ("River").
    pub telemetry_source: String,
    /// The readings. Never empty for events handed to the publisher.
    pub sensors: Vec<SensorPayload>,
}

/// Telemetry-source tag stamped on every event this collector emits.
pub const TELEMETRY_SOURCE: &str = "River";

impl NormalizedEvent {
    /// Create an empty event of the given kind.
    #[must_use]
    pub fn new(message_kind: MessageKind, event_timestamp: DateTime<Utc>) -> Self {
        Self {
            message_kind,
            event_timestamp,
            telemetry_source: TELEMETRY_SOURCE.to_string(),
            sensors: Vec::new(),
        }
    }

    /// True when the event carries no sensor payloads.
    ///
    /// Empty events must not be forwarded to the publisher.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}
