//! Collector configuration.
//!
//! All options come from environment variables. Validation happens up front:
//! a URL that a mode needs but does not have is a fatal startup error, before
//! any component runs.

use riverwatch_core::CollectorError;
use std::time::Duration;

/// Default number of poller workers.
pub const DEFAULT_WORKER_COUNT: usize = 30;

/// Default publisher flush deadline at shutdown.
pub const FLUSH_DEADLINE: Duration = Duration::from_secs(15);

/// Attempts and spacing for building the validated HTTP client at startup.
pub const TRUST_BUILD_ATTEMPTS: usize = 10;
/// Interval between validated-client build attempts.
pub const TRUST_BUILD_INTERVAL: Duration = Duration::from_secs(2);

/// Everything the collector can be told from the environment.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Enable the polling loop.
    pub polling_enabled: bool,
    /// Enable the subscription manager (and with it, push ingest).
    pub rf_subscribe_enabled: bool,
    /// Route the ingress events path (probes are always served).
    pub rest_enabled: bool,
    /// Poll tick interval.
    pub polling_interval: Duration,
    /// Inventory reconcile interval (also the subscription cadence).
    pub hsm_refresh_interval: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// HSM base URL.
    pub sm_url: String,
    /// This collector's advertised event-callback URL.
    pub rest_url: String,
    /// Listen port for the ingress server.
    pub rest_port: u16,
    /// Fetch BMC credentials from Vault instead of HSM.
    pub vault_enabled: bool,
    /// Vault address.
    pub vault_addr: String,
    /// Vault keypath holding per-endpoint credentials.
    pub vault_keypath: String,
    /// Vault token.
    pub vault_token: String,
    /// Path to the broker-list JSON file.
    pub kafka_brokers_config: String,
    /// CA bundle source; empty disables the validated client.
    pub ca_uri: String,
    /// Log requests that fall back to the permissive client.
    pub log_insecure_failover: bool,
    /// Replace event timestamps with receipt time.
    pub ignore_provided_timestamp: bool,
    /// Poller worker-pool size.
    pub worker_count: usize,
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl CollectorConfig {
    /// Read configuration from the process environment and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] when a mandatory URL for an
    /// enabled mode is missing or a numeric option does not parse.
    pub fn from_env() -> Result<Self, CollectorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any name → value lookup.
    ///
    /// # Errors
    ///
    /// As [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bool_opt =
            |name: &str, default: bool| lookup(name).map_or(default, |raw| parse_bool(&raw));
        let string_opt = |name: &str| lookup(name).unwrap_or_default();
        let secs_opt = |name: &str, default: u64| -> Result<Duration, CollectorError> {
            match lookup(name) {
                None => Ok(Duration::from_secs(default)),
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| CollectorError::Config(format!("{name}: not a number: {raw}"))),
            }
        };

        let rest_port = match lookup("REST_PORT") {
            None => 8080,
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| CollectorError::Config(format!("REST_PORT: not a port: {raw}")))?,
        };

        let config = Self {
            polling_enabled: bool_opt("POLLING_ENABLED", true),
            rf_subscribe_enabled: bool_opt("RF_SUBSCRIBE_ENABLED", false),
            rest_enabled: bool_opt("REST_ENABLED", true),
            polling_interval: secs_opt("POLLING_INTERVAL", 10)?,
            hsm_refresh_interval: secs_opt("HSM_REFRESH_INTERVAL", 30)?,
            http_timeout: secs_opt("HTTP_TIMEOUT", 10)?,
            sm_url: string_opt("SM_URL"),
            rest_url: string_opt("REST_URL"),
            rest_port,
            vault_enabled: bool_opt("VAULT_ENABLED", false),
            vault_addr: string_opt("VAULT_ADDR"),
            vault_keypath: string_opt("VAULT_KEYPATH"),
            vault_token: string_opt("VAULT_TOKEN"),
            kafka_brokers_config: string_opt("KAFKA_BROKERS_CONFIG"),
            ca_uri: string_opt("HMCOLLECTOR_CA_URI"),
            log_insecure_failover: bool_opt("HMCOLLECTOR_LOG_INSECURE_FAILOVER", false),
            ignore_provided_timestamp: bool_opt("IGNORE_PROVIDED_TIMESTAMP", false),
            worker_count: DEFAULT_WORKER_COUNT,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CollectorError> {
        if (self.polling_enabled || self.rf_subscribe_enabled) && self.sm_url.is_empty() {
            return Err(CollectorError::Config(
                "SM_URL is required when polling or subscriptions are enabled".to_string(),
            ));
        }
        if self.rf_subscribe_enabled && self.rest_url.is_empty() {
            return Err(CollectorError::Config(
                "REST_URL is required when subscriptions are enabled".to_string(),
            ));
        }
        if self.vault_enabled && (self.vault_addr.is_empty() || self.vault_keypath.is_empty()) {
            return Err(CollectorError::Config(
                "VAULT_ADDR and VAULT_KEYPATH are required when Vault is enabled".to_string(),
            ));
        }
        if self.kafka_brokers_config.is_empty() {
            return Err(CollectorError::Config(
                "KAFKA_BROKERS_CONFIG is required".to_string(),
            ));
        }
        Ok(())
    }

    /// The path component of the advertised callback URL.
    ///
    /// This is where the ingress server mounts the events route, so that the
    /// URL registered with BMCs and the route served here agree.
    #[must_use]
    pub fn events_path(&self) -> String {
        let after_scheme = self
            .rest_url
            .split_once("://")
            .map_or(self.rest_url.as_str(), |(_, rest)| rest);
        match after_scheme.find('/') {
            Some(idx) => after_scheme[idx..].to_string(),
            None => "/events".to_string(),
        }
    }
}
