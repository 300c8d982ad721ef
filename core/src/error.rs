//! Error taxonomy shared across the collector.
//!
//! Every failure in the system folds into one of these classes. The policy
//! attached to each class lives with the component that observes it: the
//! poller swallows transport and parse errors at job boundaries, auth errors
//! trigger a credential refresh, backpressure counts and drops, config errors
//! abort startup, and shutdown errors silently end loops.

use thiserror::Error;

/// Errors that can occur anywhere in the collector.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Network or TLS failure reaching a remote service.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote rejected our credentials (HTTP 401/403).
    #[error("authentication rejected (status {status})")]
    Auth {
        /// HTTP status code returned by the remote.
        status: u16,
    },

    /// A payload could not be decoded.
    #[error("malformed payload: {0}")]
    Parse(String),

    /// The publisher's local queue is full; the event was not enqueued.
    #[error("publisher queue full for topic {topic}")]
    Backpressure {
        /// Topic the event would have been routed to.
        topic: String,
    },

    /// Startup misconfiguration. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// The collector is shutting down; new work is rejected.
    #[error("shutting down")]
    Shutdown,
}

impl CollectorError {
    /// Whether this error is worth retrying at the transport layer.
    ///
    /// Only transport-class failures (connection resets, timeouts, 5xx) are
    /// transient. Auth and parse failures will not improve on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether this error indicates rejected credentials.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_transient() {
        assert!(CollectorError::Transport("connection reset".into()).is_transient());
        assert!(!CollectorError::Auth { status: 401 }.is_transient());
        assert!(!CollectorError::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn auth_classification() {
        assert!(CollectorError::Auth { status: 401 }.is_auth());
        assert!(!CollectorError::Shutdown.is_auth());
    }

    #[test]
    fn display_includes_context() {
        let err = CollectorError::Backpressure {
            topic: "cray-telemetry-power".into(),
        };
        assert_eq!(
            err.to_string(),
            "publisher queue full for topic cray-telemetry-power"
        );
    }
}
