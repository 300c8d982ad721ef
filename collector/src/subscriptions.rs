//! The subscription manager.
//!
//! Ensures each BMC holds exactly one push subscription pointed at this
//! collector's ingress URL with the expected event classes. Reconciliation is
//! idempotent: a pass that finds a matching remote subscription performs no
//! writes. Remote subscriptions are deliberately left in place on shutdown so
//! brief restarts do not lose events.
//!
//! Per endpoint × subscription:
//!
//! ```text
//! UNVERIFIED --(list ok, match) --> VERIFIED
//! UNVERIFIED --(list ok, miss)  --> CREATING
//! CREATING   --(create ok)       --> VERIFIED
//! CREATING   --(create fail)     --> UNVERIFIED
//! VERIFIED   --(tick)            --> UNVERIFIED
//! ```

use chrono::{DateTime, Utc};
use riverwatch_client::HttpClientPair;
use riverwatch_core::{CollectorError, Endpoint, Inventory};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Event classes this collector subscribes to on every BMC.
pub const DEFAULT_EVENT_TYPES: [&str; 2] = ["StatisticsEvent", "Alert"];

/// Reconcile state for one endpoint's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    /// Remote state unknown; next pass will list.
    #[default]
    Unverified,
    /// A create is in flight.
    Creating,
    /// A matching remote subscription was confirmed this cycle.
    Verified,
}

/// What the manager knows about one endpoint's subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRecord {
    /// Identifier the BMC assigned to the subscription.
    pub remote_id: Option<String>,
    /// When a matching remote subscription was last confirmed.
    pub last_verified: Option<DateTime<Utc>>,
    /// Current reconcile state.
    pub state: SubscriptionState,
}

/// What one reconcile pass against one endpoint did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Remote write operations performed (creates + deletes).
    pub writes: usize,
    /// Whether a valid subscription exists after the pass.
    pub verified: bool,
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "Members", default)]
    members: Vec<RawMember>,
}

#[derive(Deserialize)]
struct RawMember {
    #[serde(rename = "@odata.id")]
    odata_id: String,
}

#[derive(Deserialize)]
struct RawSubscription {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Destination", default)]
    destination: String,
    #[serde(rename = "EventTypes", default)]
    event_types: Vec<String>,
}

/// Maintains one push subscription per endpoint.
pub struct SubscriptionManager {
    http: Arc<HttpClientPair>,
    inventory: Arc<Inventory>,
    destination: String,
    event_types: Vec<String>,
    records: Mutex<HashMap<String, SubscriptionRecord>>,
}

impl SubscriptionManager {
    /// Create a manager advertising `destination` as the callback URL.
    #[must_use]
    pub fn new(http: Arc<HttpClientPair>, inventory: Arc<Inventory>, destination: String) -> Self {
        Self {
            http,
            inventory,
            destination,
            event_types: DEFAULT_EVENT_TYPES.iter().map(ToString::to_string).collect(),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, SubscriptionRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Copy out the record for one endpoint.
    #[must_use]
    pub fn record(&self, endpoint_id: &str) -> SubscriptionRecord {
        self.records().get(endpoint_id).cloned().unwrap_or_default()
    }

    fn set_state(&self, endpoint_id: &str, state: SubscriptionState) {
        self.records()
            .entry(endpoint_id.to_string())
            .or_default()
            .state = state;
    }

    fn mark_verified(&self, endpoint_id: &str, remote_id: Option<String>) {
        let mut records = self.records();
        let record = records.entry(endpoint_id.to_string()).or_default();
        record.state = SubscriptionState::Verified;
        record.remote_id = remote_id;
        record.last_verified = Some(Utc::now());
    }

    fn event_types_match(&self, remote: &[String]) -> bool {
        let want: HashSet<&str> = self.event_types.iter().map(String::as_str).collect();
        let have: HashSet<&str> = remote.iter().map(String::as_str).collect();
        want == have
    }

    /// Reconcile one endpoint's subscription with the BMC.
    ///
    /// Lists the remote subscription collection, verifies a match against
    /// this collector's destination and event classes, deletes drifted
    /// entries that point at this collector, and creates a subscription when
    /// none matches. Safe to repeat: with no remote changes a second pass
    /// performs zero writes.
    ///
    /// # Errors
    ///
    /// Transport or parse failures from the BMC; the caller logs and retries
    /// next cycle.
    pub async fn reconcile_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> Result<ReconcileOutcome, CollectorError> {
        // Every cycle re-verifies from scratch.
        self.set_state(&endpoint.id, SubscriptionState::Unverified);

        let collection_url = endpoint.subscriptions_url();
        let response = self
            .http
            .get(&collection_url, Some(&endpoint.credentials))
            .await?;
        if !response.is_success() {
            return Err(CollectorError::Transport(format!(
                "subscription list returned status {}",
                response.status
            )));
        }
        let collection: RawCollection = response.json()?;

        let mut outcome = ReconcileOutcome::default();
        let mut matched: Option<String> = None;

        for member in &collection.members {
            let member_url = format!("{}{}", endpoint.base_url(), member.odata_id);
            let detail = match self.http.get(&member_url, Some(&endpoint.credentials)).await {
                Ok(response) if response.is_success() => {
                    match response.json::<RawSubscription>() {
                        Ok(detail) => detail,
                        Err(err) => {
                            tracing::warn!(
                                endpoint = %endpoint.id,
                                member = %member.odata_id,
                                error = %err,
                                "unreadable subscription entry, skipping"
                            );
                            continue;
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        endpoint = %endpoint.id,
                        member = %member.odata_id,
                        status = response.status,
                        "subscription entry fetch failed, skipping"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::warn!(
                        endpoint = %endpoint.id,
                        member = %member.odata_id,
                        error = %err,
                        "subscription entry fetch failed, skipping"
                    );
                    continue;
                }
            };

            // Subscriptions pointed elsewhere belong to someone else.
            if detail.destination != self.destination {
                continue;
            }

            if matched.is_none() && self.event_types_match(&detail.event_types) {
                let id = detail
                    .id
                    .or_else(|| member.odata_id.rsplit('/').next().map(ToString::to_string));
                matched = id;
                continue;
            }

            // Ours, but drifted (or a duplicate): tear it down.
            tracing::info!(
                endpoint = %endpoint.id,
                member = %member.odata_id,
                "deleting drifted subscription"
            );
            match self.http.delete(&member_url, Some(&endpoint.credentials)).await {
                Ok(_) => outcome.writes += 1,
                Err(err) => {
                    tracing::warn!(
                        endpoint = %endpoint.id,
                        member = %member.odata_id,
                        error = %err,
                        "drifted subscription delete failed"
                    );
                }
            }
        }

        if let Some(remote_id) = matched {
            self.mark_verified(&endpoint.id, Some(remote_id));
            outcome.verified = true;
            return Ok(outcome);
        }

        self.set_state(&endpoint.id, SubscriptionState::Creating);
        let body = serde_json::json!({
            "Destination": self.destination,
            "EventTypes": self.event_types,
            "Context": endpoint.id,
            "Protocol": "Redfish",
        });
        let body = serde_json::to_vec(&body)
            .map_err(|e| CollectorError::Parse(format!("subscription body: {e}")))?;

        match self
            .http
            .post(&collection_url, Some(&endpoint.credentials), body)
            .await
        {
            Ok(response) if response.is_success() => {
                outcome.writes += 1;
                let remote_id = response.json::<RawSubscription>().ok().and_then(|s| s.id);
                self.mark_verified(&endpoint.id, remote_id);
                outcome.verified = true;
                tracing::info!(endpoint = %endpoint.id, "subscription created");
                Ok(outcome)
            }
            Ok(response) => {
                self.set_state(&endpoint.id, SubscriptionState::Unverified);
                Err(CollectorError::Transport(format!(
                    "subscription create returned status {}",
                    response.status
                )))
            }
            Err(err) => {
                self.set_state(&endpoint.id, SubscriptionState::Unverified);
                Err(err)
            }
        }
    }

    /// Reconcile every endpoint in the current inventory snapshot.
    ///
    /// Sequential by construction, so at most one reconcile is in flight per
    /// endpoint. Per-endpoint failures are logged and retried next cycle.
    pub async fn reconcile_all(&self) {
        for endpoint in self.inventory.snapshot() {
            if let Err(err) = self.reconcile_endpoint(&endpoint).await {
                tracing::warn!(
                    endpoint = %endpoint.id,
                    error = %err,
                    "subscription reconcile failed, retrying next cycle"
                );
            }
        }
    }

    /// Run the reconcile loop until shutdown.
    ///
    /// Exiting leaves remote subscriptions in place: a restarting collector
    /// keeps receiving events it would otherwise lose.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("subscription manager exiting");
                    return;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            tracing::debug!("subscription manager exiting mid-cycle");
                            return;
                        }
                        () = self.reconcile_all() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riverwatch_client::RetryPolicy;

    fn manager() -> SubscriptionManager {
        #[allow(clippy::unwrap_used)]
        let http = Arc::new(
            HttpClientPair::new(Duration::from_secs(1), RetryPolicy::none(), false).unwrap(),
        );
        SubscriptionManager::new(
            http,
            Arc::new(Inventory::new()),
            "https://collector.local:8080/events".to_string(),
        )
    }

    #[test]
    fn event_types_match_is_order_insensitive() {
        let manager = manager();
        assert!(manager.event_types_match(&[
            "Alert".to_string(),
            "StatisticsEvent".to_string()
        ]));
        assert!(!manager.event_types_match(&["Alert".to_string()]));
        assert!(!manager.event_types_match(&[
            "Alert".to_string(),
            "StatisticsEvent".to_string(),
            "StatusChange".to_string()
        ]));
    }

    #[test]
    fn records_start_unverified() {
        let manager = manager();
        let record = manager.record("x3000c0s1b0");
        assert_eq!(record.state, SubscriptionState::Unverified);
        assert!(record.remote_id.is_none());
        assert!(record.last_verified.is_none());
    }

    #[test]
    fn state_transitions_update_records() {
        let manager = manager();
        manager.set_state("x3000c0s1b0", SubscriptionState::Creating);
        assert_eq!(
            manager.record("x3000c0s1b0").state,
            SubscriptionState::Creating
        );

        manager.mark_verified("x3000c0s1b0", Some("7".to_string()));
        let record = manager.record("x3000c0s1b0");
        assert_eq!(record.state, SubscriptionState::Verified);
        assert_eq!(record.remote_id.as_deref(), Some("7"));
        assert!(record.last_verified.is_some());
    }
}
