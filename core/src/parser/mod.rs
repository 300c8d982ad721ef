//! Vendor parser registry.
//!
//! Keyed by `(vendor family, telemetry kind)`. Each vendor family carries a
//! capability set — a chassis identifier for URL building plus one parser per
//! telemetry kind — selected once at endpoint-bind time. Parsers are pure
//! functions: payload bytes and an endpoint location in, zero or more
//! normalized events out. No I/O, no clock reads beyond the caller-supplied
//! timestamp.

mod power;
mod thermal;

use crate::endpoint::{TelemetryKind, VendorFamily};
use crate::error::CollectorError;
use crate::event::NormalizedEvent;
use chrono::{DateTime, Utc};

/// A pure telemetry parser: `(payload, location, timestamp) → events`.
pub type TelemetryParser =
    fn(&[u8], &str, DateTime<Utc>) -> Result<Vec<NormalizedEvent>, CollectorError>;

/// The capability set bound to a vendor family.
///
/// One of these per family is all the vendor polymorphism in the system:
/// a chassis identifier for URL building and a parser per telemetry kind.
pub struct VendorCapabilities {
    chassis: &'static str,
    power: TelemetryParser,
    thermal: TelemetryParser,
}

impl VendorCapabilities {
    /// Relative URL of the telemetry surface for this vendor.
    #[must_use]
    pub fn telemetry_path(&self, kind: TelemetryKind) -> String {
        format!("/redfish/v1/Chassis/{}/{}", self.chassis, kind.as_str())
    }

    /// The parser for a telemetry kind.
    #[must_use]
    pub fn parser(&self, kind: TelemetryKind) -> TelemetryParser {
        match kind {
            TelemetryKind::Power => self.power,
            TelemetryKind::Thermal => self.thermal,
        }
    }
}

// The payload shapes are stock DMTF Redfish across the fleet; what differs
// per vendor is the chassis identifier baked into the telemetry URLs.
static CRAY: VendorCapabilities = VendorCapabilities {
    chassis: "Enclosure",
    power: power::parse,
    thermal: thermal::parse,
};
static GIGABYTE: VendorCapabilities = VendorCapabilities {
    chassis: "Self",
    power: power::parse,
    thermal: thermal::parse,
};
static INTEL: VendorCapabilities = VendorCapabilities {
    chassis: "RackMount/Baseboard",
    power: power::parse,
    thermal: thermal::parse,
};
static HPE: VendorCapabilities = VendorCapabilities {
    chassis: "1",
    power: power::parse,
    thermal: thermal::parse,
};
static GENERIC: VendorCapabilities = VendorCapabilities {
    chassis: "Self",
    power: power::parse,
    thermal: thermal::parse,
};

/// Look up the capability set for a vendor family.
///
/// Total over the closed vendor enum: every family resolves to a capability
/// set, with [`VendorFamily::Generic`] as the stock-DMTF fallback.
#[must_use]
pub const fn capabilities(vendor: VendorFamily) -> &'static VendorCapabilities {
    match vendor {
        VendorFamily::Cray => &CRAY,
        VendorFamily::Gigabyte => &GIGABYTE,
        VendorFamily::Intel => &INTEL,
        VendorFamily::Hpe => &HPE,
        VendorFamily::Generic => &GENERIC,
    }
}

/// Look up the parser for a `(vendor, kind)` pair.
#[must_use]
pub fn lookup(vendor: VendorFamily, kind: TelemetryKind) -> TelemetryParser {
    capabilities(vendor).parser(kind)
}

/// Parse a raw payload and tag the resulting events with their source.
///
/// Returns zero or more normalized events; events with no sensor payloads are
/// never produced. Payload-level problems (a missing reading, an out-of-range
/// member index) skip that payload; only a malformed top-level document is an
/// error.
///
/// # Errors
///
/// Returns [`CollectorError::Parse`] when the payload is not valid JSON of
/// the expected top-level shape.
pub fn parse_and_tag(
    payload: &[u8],
    vendor: VendorFamily,
    kind: TelemetryKind,
    location: &str,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizedEvent>, CollectorError> {
    lookup(vendor, kind)(payload, location, now)
}
