//! Metric helpers for `tapwire`.
//!
//! This module defines metric names and simple helper functions wrapping
//! the [`metrics`](https://docs.rs/metrics) crate. Without the `metrics`
//! feature every helper compiles to a no-op, so call sites stay
//! unconditional.

/// Name of the counter tracking elements admitted to history.
pub const MESSAGES_ADMITTED: &str = "tapwire_messages_admitted_total";
/// Name of the counter tracking history evictions and removals.
pub const MESSAGES_REMOVED: &str = "tapwire_messages_removed_total";
/// Name of the counter tracking recovered plugin failures.
pub const PLUGIN_FAILURES: &str = "tapwire_plugin_failures_total";
/// Name of the gauge tracking live connection reassemblers.
pub const REASSEMBLERS_ACTIVE: &str = "tapwire_reassemblers_active";

/// Record an admission into the message history.
pub fn inc_admitted() {
    #[cfg(feature = "metrics")]
    metrics::counter!(MESSAGES_ADMITTED).increment(1);
}

/// Record `count` evicted or removed history entries.
pub fn inc_evicted(count: u64) {
    #[cfg(feature = "metrics")]
    metrics::counter!(MESSAGES_REMOVED).increment(count);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

/// Record a recovered plugin failure or panic.
pub fn inc_plugin_failures() {
    #[cfg(feature = "metrics")]
    metrics::counter!(PLUGIN_FAILURES).increment(1);
}

/// Record the lazy creation of a connection reassembler.
pub fn inc_reassemblers() {
    #[cfg(feature = "metrics")]
    metrics::gauge!(REASSEMBLERS_ACTIVE).increment(1.0);
}
