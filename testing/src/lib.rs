//! # Slicestore Testing
//!
//! Testing utilities and helpers for slicestore.
//!
//! This crate provides:
//! - A recording extension and call log to observe what the store did
//! - Reducer fixtures shared by the test suites
//! - Async helpers for waiting on selections
//! - Property-based testing strategies
//! - A Given-When-Then harness for reducers
//!
//! ## Example
//!
//! ```
//! use slicestore_core::action::Action;
//! use slicestore_runtime::{Store, StoreConfig};
//! use slicestore_testing::fixtures::counter_reducer;
//! use slicestore_testing::mocks::{CallLog, RecordingExtension};
//!
//! let log = CallLog::new();
//! let store = Store::new();
//! store
//!     .configure(
//!         StoreConfig::default()
//!             .with_reducer("counter", counter_reducer())
//!             .with_extension(RecordingExtension::new(log.clone())),
//!     )
//!     .unwrap();
//!
//! store.dispatch(Action::new("counter"));
//! assert!(log.contains("counter"));
//! ```

use std::time::Duration;


/// Mock extensions and call recording
pub mod mocks {
    use slicestore_core::action::Action;
    use slicestore_core::reducer::{BoxedReducer, meta_reducer_fn, reducer_fn};
    use slicestore_core::state::AppState;
    use slicestore_runtime::{ExtensionContext, ExtensionId, ExtensionSortOrder, StoreExtension};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Shared, cloneable list of recorded entries
    ///
    /// # Example
    ///
    /// ```
    /// use slicestore_testing::mocks::CallLog;
    ///
    /// let log = CallLog::new();
    /// let writer = log.clone();
    /// writer.push("a");
    /// writer.push("b");
    /// assert_eq!(log.entries(), vec!["a", "b"]);
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct CallLog {
        entries: Arc<Mutex<Vec<String>>>,
    }

    impl CallLog {
        /// Create an empty log
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Append an entry
        pub fn push(&self, entry: impl Into<String>) {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(entry.into());
        }

        /// Snapshot of all entries, oldest first
        #[must_use]
        pub fn entries(&self) -> Vec<String> {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Whether an entry equal to `entry` was recorded
        #[must_use]
        pub fn contains(&self, entry: &str) -> bool {
            self.entries().iter().any(|recorded| recorded == entry)
        }

        /// Number of entries
        #[must_use]
        pub fn len(&self) -> usize {
            self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Forget all entries
        pub fn clear(&self) {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    /// Extension recording the type of every action its meta-reducer sees
    ///
    /// Sorts as a default extension, so its meta-reducer wraps the undo
    /// extension's and never sees undo replays.
    #[derive(Debug, Clone)]
    pub struct RecordingExtension {
        name: &'static str,
        log: CallLog,
    }

    impl RecordingExtension {
        /// Record into `log`
        #[must_use]
        pub const fn new(log: CallLog) -> Self {
            Self::named("recording", log)
        }

        /// Record into `log` under a custom extension id
        #[must_use]
        pub const fn named(name: &'static str, log: CallLog) -> Self {
            Self { name, log }
        }
    }

    impl StoreExtension for RecordingExtension {
        fn id(&self) -> ExtensionId {
            ExtensionId::Custom(self.name)
        }

        fn sort_order(&self) -> ExtensionSortOrder {
            ExtensionSortOrder::Default
        }

        fn init(&self, context: &ExtensionContext) {
            let log = self.log.clone();
            context.add_meta_reducer(meta_reducer_fn(move |inner: BoxedReducer<AppState>| {
                let log = log.clone();
                reducer_fn(move |state: AppState, action: &Action| {
                    log.push(action.action_type());
                    inner.reduce(state, action)
                })
            }));
        }
    }
}

/// Shared reducers and states
pub mod fixtures {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use slicestore_core::action::Action;
    use slicestore_core::reducer::{BoxedReducer, typed_reducer};

    /// Action type incrementing [`CounterState`]
    pub const INCREMENT: &str = "counter";

    /// Slice managed by [`counter_reducer`]
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CounterState {
        /// Current count, starting at 1
        pub counter: i64,
    }

    impl Default for CounterState {
        fn default() -> Self {
            Self { counter: 1 }
        }
    }

    /// Counter slice reducer: `{"counter": 1}` incremented by `"counter"` actions
    #[must_use]
    pub fn counter_reducer() -> BoxedReducer<Value> {
        typed_reducer(|state: Option<CounterState>, action: &Action| {
            let mut state = state.unwrap_or_default();
            if action.is(INCREMENT) {
                state.counter += 1;
            }
            state
        })
    }

    /// User slice used by feature-store tests
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UserState {
        /// First name
        pub first_name: String,
        /// Last name
        pub last_name: String,
        /// Age in years
        pub age: u32,
    }

    impl UserState {
        /// The user most tests start from
        #[must_use]
        pub fn bruce() -> Self {
            Self {
                first_name: "Bruce".to_string(),
                last_name: "Willis".to_string(),
                age: 30,
            }
        }
    }
}

/// Async helpers
pub mod helpers {
    use super::Duration;
    use futures::StreamExt;
    use slicestore_runtime::Selection;

    /// Wait until `selection` emits a value matching `predicate`
    ///
    /// Returns `None` if no matching value arrives within `timeout`. The
    /// current value is checked first.
    pub async fn wait_for<T, R, F>(selection: &Selection<T, R>, predicate: F, timeout: Duration) -> Option<R>
    where
        T: Clone + Send + Sync + 'static,
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&R) -> bool,
    {
        let mut values = selection.stream();
        tokio::time::timeout(timeout, async {
            while let Some(value) = values.next().await {
                if predicate(&value) {
                    return Some(value);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Install a test-friendly tracing subscriber honouring `RUST_LOG`
    ///
    /// Safe to call from every test; only the first call installs it.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities
///
/// Strategies producing actions and action sequences for proptest.
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use slicestore_core::action::Action;

    /// Plain JSON leaf values
    pub fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    /// Flat JSON objects with up to four fields
    pub fn json_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z]{1,4}", json_leaf(), 0..4)
            .prop_map(|fields| Value::Object(fields.into_iter().collect()))
    }

    /// Application actions (never the store's internal ones)
    pub fn action() -> impl Strategy<Value = Action> {
        ("[a-z]{1,6}", prop::option::of(json_leaf())).prop_map(|(action_type, payload)| match payload {
            Some(payload) => Action::with_payload(action_type, payload),
            None => Action::new(action_type),
        })
    }

    /// Sequences of application actions
    pub fn actions(max_len: usize) -> impl Strategy<Value = Vec<Action>> {
        prop::collection::vec(action(), 0..max_len)
    }
}

pub use helpers::{init_test_tracing, wait_for};
pub use mocks::{CallLog, RecordingExtension};
pub use reducer_test::ReducerTest;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fixtures::{CounterState, counter_reducer};
    use serde_json::json;
    use slicestore_core::action::Action;

    #[test]
    fn counter_fixture_starts_at_one() {
        let state = counter_reducer().reduce(json!(null), &Action::new("init"));
        assert_eq!(state, json!({"counter": 1}));
        assert_eq!(CounterState::default().counter, 1);
    }

    #[test]
    fn call_log_is_shared_between_clones() {
        let log = CallLog::new();
        log.clone().push("a");
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn wait_for_times_out_without_match() {
        let store = slicestore_runtime::Store::new();
        let size = store.select(|state| state.len());

        let result = wait_for(&size, |len| *len > 0, Duration::from_millis(20)).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn wait_for_returns_current_matching_value() {
        let store = slicestore_runtime::Store::new();
        let size = store.select(|state| state.len());

        let result = wait_for(&size, |len| *len == 0, Duration::from_millis(20)).await;
        assert_eq!(result, Some(0));
    }
}
