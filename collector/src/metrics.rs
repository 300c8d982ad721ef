//! Metric registrations.
//!
//! Counters are emitted from wherever the event happens; this module only
//! attaches descriptions so an installed recorder can render them. No scrape
//! endpoint is bound by the collector itself.

use metrics::describe_counter;

/// Register descriptions for every counter the collector emits.
pub fn register_metrics() {
    describe_counter!(
        "riverwatch_events_published_total",
        "Normalized events enqueued to a broker, by topic"
    );
    describe_counter!(
        "riverwatch_events_dropped_total",
        "Events dropped on publisher backpressure, by source"
    );
    describe_counter!(
        "riverwatch_events_unrouted_total",
        "Events dropped because no broker advertises their topic"
    );
    describe_counter!(
        "riverwatch_events_abandoned_total",
        "Events still unflushed when the shutdown deadline expired"
    );
    describe_counter!(
        "riverwatch_poll_failures_total",
        "Poll jobs abandoned, by failure class"
    );
    describe_counter!(
        "riverwatch_ingress_events_total",
        "Inbound event bodies accepted, by kind"
    );
}
