//! Shared state for ingress handlers.

use riverwatch_core::Inventory;
use riverwatch_kafka::Publisher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Readiness signals the probes consult.
///
/// The collector is ready once the inventory loop has completed at least one
/// reconcile and the publisher holds at least one broker connection.
#[derive(Debug, Default)]
pub struct Readiness {
    inventory_ready: AtomicBool,
}

impl Readiness {
    /// Create the readiness tracker in its not-ready state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inventory_ready: AtomicBool::new(false),
        }
    }

    /// Record that the inventory loop finished an iteration.
    pub fn mark_inventory_ready(&self) {
        self.inventory_ready.store(true, Ordering::Release);
    }

    /// Whether the inventory loop has completed at least one iteration.
    #[must_use]
    pub fn inventory_ready(&self) -> bool {
        self.inventory_ready.load(Ordering::Acquire)
    }
}

/// State shared across all ingress handlers.
pub struct AppState {
    /// The endpoint inventory, for resolving event sources.
    pub inventory: Arc<Inventory>,
    /// The publishing fabric.
    pub publisher: Arc<Publisher>,
    /// Readiness signals owned by the supervisor.
    pub readiness: Arc<Readiness>,
    /// Replace timestamps provided in event bodies with receipt time.
    pub ignore_provided_timestamp: bool,
}
