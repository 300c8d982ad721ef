//! HSM state-manager client.
//!
//! The HSM holds the authoritative list of discovered BMCs. The collector
//! consumes a single read-only operation: listing the Redfish endpoint
//! inventory. HSM is trusted infrastructure, so the permissive client is
//! acceptable for this call.

use crate::pair::HttpClientPair;
use riverwatch_core::CollectorError;
use serde::Deserialize;

/// Discovery status value that marks an endpoint as usable.
pub const DISCOVER_OK: &str = "DiscoverOK";

/// One endpoint record as HSM reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RedfishEndpointRecord {
    /// Stable component ID (e.g. `x3000c0s1b0`).
    #[serde(rename = "ID")]
    pub id: String,
    /// Hostname the BMC answers on.
    #[serde(rename = "FQDN")]
    pub fqdn: String,
    /// Vendor/model string discovered over Redfish.
    #[serde(rename = "Type", default)]
    pub model: String,
    /// Discovery bookkeeping.
    #[serde(rename = "DiscoveryInfo", default)]
    pub discovery_info: Option<DiscoveryInfo>,
    /// Username HSM holds for the BMC (when Vault is not in use).
    #[serde(rename = "User", default)]
    pub user: String,
    /// Password HSM holds for the BMC (when Vault is not in use).
    #[serde(rename = "Password", default)]
    pub password: String,
}

/// Discovery bookkeeping attached to an endpoint record.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryInfo {
    /// Outcome of the most recent discovery pass.
    #[serde(rename = "LastDiscoveryStatus", default)]
    pub last_discovery_status: String,
}

impl RedfishEndpointRecord {
    /// Whether HSM most recently reported this endpoint as discovered OK.
    ///
    /// Only such endpoints may enter the inventory.
    #[must_use]
    pub fn is_discover_ok(&self) -> bool {
        self.discovery_info
            .as_ref()
            .is_some_and(|info| info.last_discovery_status == DISCOVER_OK)
    }
}

/// Client for the HSM inventory API.
#[derive(Debug, Clone)]
pub struct HsmClient {
    base_url: String,
}

impl HsmClient {
    /// Create a client against an HSM base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// URL of the Redfish endpoint inventory.
    #[must_use]
    pub fn endpoints_url(&self) -> String {
        format!("{}/Inventory/RedfishEndpoints", self.base_url)
    }

    /// Fetch the current endpoint list.
    ///
    /// # Errors
    ///
    /// [`CollectorError::Transport`] on network failure,
    /// [`CollectorError::Parse`] when the response body is not the expected
    /// JSON array.
    pub async fn redfish_endpoints(
        &self,
        http: &HttpClientPair,
    ) -> Result<Vec<RedfishEndpointRecord>, CollectorError> {
        let response = http.get_permissive(&self.endpoints_url(), None).await?;
        if !response.is_success() {
            return Err(CollectorError::Transport(format!(
                "HSM returned status {}",
                response.status
            )));
        }
        response.json()
    }
}
