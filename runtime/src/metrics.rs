//! Metric names and descriptions for the store runtime.
//!
//! The runtime records through the [`metrics`] facade only; which recorder
//! (Prometheus, statsd, a test recorder, ...) receives the values is up to the
//! application.
//!
//! # Example
//!
//! ```rust,no_run
//! // Describe every store metric before installing a recorder's exporter
//! slicestore_runtime::metrics::register_metrics();
//! ```

use metrics::{describe_counter, describe_histogram};
use std::sync::Once;

/// Metric names recorded by the runtime
pub mod names {
    /// Actions applied by the store
    pub const ACTIONS_DISPATCHED: &str = "store.actions.dispatched";
    /// Actions enqueued while another action was being applied
    pub const ACTIONS_QUEUED: &str = "store.actions.queued";
    /// Time spent in the composed root reducer
    pub const REDUCER_DURATION: &str = "store.reducer.duration_seconds";
    /// Feature reducers added to the registry
    pub const FEATURES_REGISTERED: &str = "store.features.registered";
    /// Feature reducers removed from the registry
    pub const FEATURES_REMOVED: &str = "store.features.removed";
    /// Faults caught at the effect boundary
    pub const EFFECT_FAULTS: &str = "store.effects.faults";
    /// Effects stopped after exhausting their resubscriptions
    pub const EFFECT_EXHAUSTED: &str = "store.effects.exhausted";
    /// Extensions initialized
    pub const EXTENSIONS_INITIALIZED: &str = "store.extensions.initialized";
}

static DESCRIBE: Once = Once::new();

/// Register all metric descriptions.
///
/// Safe to call any number of times; descriptions are only sent once.
pub fn register_metrics() {
    DESCRIBE.call_once(|| {
        // Dispatch
        describe_counter!(names::ACTIONS_DISPATCHED, "Total number of actions applied by the store");
        describe_counter!(
            names::ACTIONS_QUEUED,
            "Total number of actions queued behind an action being applied"
        );
        describe_histogram!(names::REDUCER_DURATION, "Time taken to run the root reducer");

        // Registry
        describe_counter!(names::FEATURES_REGISTERED, "Total number of feature reducers registered");
        describe_counter!(names::FEATURES_REMOVED, "Total number of feature reducers removed");

        // Effects
        describe_counter!(names::EFFECT_FAULTS, "Total number of faults caught in effects");
        describe_counter!(
            names::EFFECT_EXHAUSTED,
            "Total number of effects stopped after exhausting resubscriptions"
        );

        // Extensions
        describe_counter!(names::EXTENSIONS_INITIALIZED, "Total number of extensions initialized");
    });
}
