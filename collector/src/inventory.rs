//! The endpoint inventory loop.
//!
//! Periodically reconciles the known-BMC set with HSM and attaches
//! credentials. Endpoints are inserted on first sighting with a usable
//! discovery status; they are never proactively evicted — removal is
//! implicit on shutdown.

use riverwatch_client::{HsmClient, HttpClientPair, VaultClient};
use riverwatch_core::{CollectorError, Credentials, Endpoint, Inventory};
use riverwatch_web::Readiness;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// What one reconcile pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Endpoints newly inserted this pass.
    pub added: usize,
    /// Endpoints skipped because their discovery status is not usable.
    pub skipped_undiscovered: usize,
    /// Endpoints skipped because credentials could not be fetched.
    pub skipped_no_credentials: usize,
    /// Stale credential sets refreshed from the secret store.
    pub credentials_refreshed: usize,
}

/// One reconcile pass against HSM.
///
/// # Errors
///
/// Returns the transport or parse error from the HSM fetch; per-endpoint
/// credential failures are absorbed into the summary and retried next tick.
pub async fn reconcile_once(
    inventory: &Inventory,
    http: &HttpClientPair,
    hsm: &HsmClient,
    vault: Option<&VaultClient>,
) -> Result<ReconcileSummary, CollectorError> {
    let mut summary = ReconcileSummary::default();

    // Endpoints the poller flagged after a 401 get fresh credentials before
    // anything else, so the next poll tick can use them.
    if let Some(vault) = vault {
        for id in inventory.stale_credential_ids() {
            match vault.credentials(http, &id).await {
                Ok(creds) => {
                    inventory.update_credentials(&id, creds);
                    summary.credentials_refreshed += 1;
                    tracing::info!(endpoint = %id, "refreshed stale credentials");
                }
                Err(err) => {
                    tracing::warn!(endpoint = %id, error = %err, "credential refresh failed");
                }
            }
        }
    }

    let records = hsm.redfish_endpoints(http).await?;
    if records.is_empty() && inventory.is_empty() {
        tracing::warn!("HSM returned no endpoints, inventory is empty");
    }

    for record in records {
        if inventory.contains(&record.id) {
            continue;
        }
        if !record.is_discover_ok() {
            let status = record
                .discovery_info
                .as_ref()
                .map_or("<none>", |info| info.last_discovery_status.as_str());
            tracing::warn!(
                endpoint = %record.id,
                status,
                "skipping endpoint with unusable discovery status"
            );
            summary.skipped_undiscovered += 1;
            continue;
        }

        let credentials = match vault {
            Some(vault) => match vault.credentials(http, &record.id).await {
                Ok(creds) => creds,
                Err(err) => {
                    // Retried next tick; the endpoint stays out of the
                    // inventory until it has credentials.
                    tracing::warn!(
                        endpoint = %record.id,
                        error = %err,
                        "credential fetch failed, skipping endpoint this tick"
                    );
                    summary.skipped_no_credentials += 1;
                    continue;
                }
            },
            None => Credentials::new(record.user.clone(), record.password.clone()),
        };

        let endpoint = Endpoint::new(record.id, record.fqdn, record.model, credentials);
        tracing::info!(
            endpoint = %endpoint.id,
            fqdn = %endpoint.fqdn,
            vendor = %endpoint.vendor,
            "endpoint joined inventory"
        );
        inventory.insert(endpoint);
        summary.added += 1;
    }

    Ok(summary)
}

/// Run the inventory loop until shutdown.
///
/// The first tick fires immediately; each completed pass (even an empty one)
/// marks the inventory side of readiness.
pub async fn run_inventory_loop(
    inventory: Arc<Inventory>,
    http: Arc<HttpClientPair>,
    hsm: HsmClient,
    vault: Option<VaultClient>,
    readiness: Arc<Readiness>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::debug!("inventory loop exiting");
                return;
            }
            _ = ticker.tick() => {
                tokio::select! {
                    _ = shutdown.changed() => {
                        tracing::debug!("inventory loop exiting mid-reconcile");
                        return;
                    }
                    result = reconcile_once(&inventory, &http, &hsm, vault.as_ref()) => {
                        match result {
                            Ok(summary) => {
                                if summary != ReconcileSummary::default() {
                                    tracing::info!(
                                        added = summary.added,
                                        skipped_undiscovered = summary.skipped_undiscovered,
                                        skipped_no_credentials = summary.skipped_no_credentials,
                                        credentials_refreshed = summary.credentials_refreshed,
                                        total = inventory.len(),
                                        "inventory reconciled"
                                    );
                                }
                                readiness.mark_inventory_ready();
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "inventory reconcile failed, retrying next tick");
                            }
                        }
                    }
                }
            }
        }
    }
}
