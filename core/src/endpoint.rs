//! Endpoints: the reachable BMCs and their vendor binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The telemetry surfaces the collector polls.
///
/// A closed enumeration: each kind maps, per vendor, to a single relative URL
/// on the BMC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    /// Chassis power readings (`.../Power`).
    Power,
    /// Chassis thermal readings (`.../Thermal`).
    Thermal,
}

impl TelemetryKind {
    /// All kinds, in polling order.
    pub const ALL: [Self; 2] = [Self::Power, Self::Thermal];

    /// Stable string form, matching the Redfish resource name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Power => "Power",
            Self::Thermal => "Thermal",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BMC vendor families the collector knows how to talk to.
///
/// The family determines the capability set used for an endpoint: which
/// chassis identifier its telemetry URLs use and which parsers decode its
/// payloads (see [`crate::parser::capabilities`]). Exactly one family is
/// bound to each endpoint, chosen from the HSM-reported model string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VendorFamily {
    /// Cray EX liquid-cooled controllers.
    Cray,
    /// Gigabyte server boards.
    Gigabyte,
    /// Intel reference platforms.
    Intel,
    /// HPE iLO controllers.
    Hpe,
    /// Anything else speaking stock DMTF Redfish.
    Generic,
}

impl VendorFamily {
    /// Bind a vendor family from the model string HSM reports for a BMC.
    ///
    /// Falls back to [`VendorFamily::Generic`] when no family matches.
    #[must_use]
    pub fn from_model(model: &str) -> Self {
        let model = model.to_ascii_lowercase();
        if model.contains("cray") {
            Self::Cray
        } else if model.contains("gigabyte") {
            Self::Gigabyte
        } else if model.contains("intel") {
            Self::Intel
        } else if model.contains("ilo") || model.contains("proliant") {
            Self::Hpe
        } else {
            Self::Generic
        }
    }
}

impl fmt::Display for VendorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cray => "Cray",
            Self::Gigabyte => "Gigabyte",
            Self::Intel => "Intel",
            Self::Hpe => "HPE",
            Self::Generic => "Generic",
        };
        f.write_str(name)
    }
}

/// BMC credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
}

impl Credentials {
    /// Create credentials from a username/password pair.
    #[must_use]
    pub const fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    /// True when both fields are empty (no credentials known).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

// Credentials show up in endpoint debug logs; never print the password.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A reachable BMC.
///
/// Created by the inventory loop on first sighting and mutated only by it
/// (credentials, staleness). Held in the inventory only while HSM most
/// recently reported it with discovery status `DiscoverOK`.
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Opaque stable ID (the HSM component name, e.g. `x3000c0s1b0`).
    pub id: String,
    /// Fully-qualified domain name the BMC answers on.
    pub fqdn: String,
    /// Vendor/model string as discovered by HSM.
    pub model: String,
    /// Vendor family bound from the model string.
    pub vendor: VendorFamily,
    /// Current credentials for the BMC.
    pub credentials: Credentials,
    /// Set by the poller on a 401; cleared after the next credential refetch.
    pub credentials_stale: bool,
    /// Last successful contact with the BMC.
    pub last_contact: Option<DateTime<Utc>>,
}

impl Endpoint {
    /// Create an endpoint, binding its vendor family from the model string.
    #[must_use]
    pub fn new(id: String, fqdn: String, model: String, credentials: Credentials) -> Self {
        let vendor = VendorFamily::from_model(&model);
        Self {
            id,
            fqdn,
            model,
            vendor,
            credentials,
            credentials_stale: false,
            last_contact: None,
        }
    }

    /// Base URL of the BMC. A bare FQDN gets `https://`; an FQDN that
    /// already carries a scheme is used as-is.
    #[must_use]
    pub fn base_url(&self) -> String {
        if self.fqdn.contains("://") {
            self.fqdn.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.fqdn)
        }
    }

    /// Absolute URL for one of this endpoint's telemetry surfaces.
    #[must_use]
    pub fn telemetry_url(&self, kind: TelemetryKind) -> String {
        format!(
            "{}{}",
            self.base_url(),
            crate::parser::capabilities(self.vendor).telemetry_path(kind)
        )
    }

    /// Absolute URL of the BMC's event subscription collection.
    #[must_use]
    pub fn subscriptions_url(&self) -> String {
        format!("{}/redfish/v1/EventService/Subscriptions", self.base_url())
    }
}
