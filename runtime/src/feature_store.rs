//! Typed handles over one feature slice
//!
//! A [`FeatureStore`] registers a slice with a generated reducer that merges
//! `set-state` patches, keeps a typed copy of the slice for synchronous reads
//! and callbacks, and runs effects whose output is applied as state patches.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use slicestore_runtime::{FeatureStore, Store};
//!
//! #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Counter {
//!     count: i64,
//! }
//!
//! # fn main() -> Result<(), slicestore_runtime::StoreError> {
//! let store = Store::new();
//! let counter = FeatureStore::new(&store, "counter", Counter::default())?;
//!
//! counter.set_state(json!({"count": 3}), Some("reset"));
//! assert_eq!(counter.state(), Counter { count: 3 });
//! # Ok(())
//! # }
//! ```

use crate::config::{EffectConfig, FeatureConfig, FeatureStoreConfig};
use crate::effects::{self, EffectHandle, EffectSource, EffectTrigger, Payloads};
use crate::extension::ExtensionId;
use crate::lock;
use crate::store::Store;
use crate::subject::{Selection, StateSubject, Subscription};
use crate::StoreError;
use futures::Stream;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use slicestore_core::action::{Action, lifecycle};
use slicestore_core::reducer::{BoxedReducer, reducer_fn};
use slicestore_core::state::{AppState, shallow_merge};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Length of the random suffix appended to `multi` feature keys
const MULTI_KEY_SUFFIX_LEN: usize = 8;

/// A state patch, or a function computing one from the current state
pub enum StateOrCallback<S> {
    /// A JSON patch merged into the slice
    State(Value),
    /// Computes the patch from the feature's current state
    Callback(Box<dyn FnOnce(&S) -> Value + Send>),
}

impl<S> StateOrCallback<S> {
    /// Wrap a callback
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(&S) -> Value + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Serialize a typed partial state into a patch
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `patch` cannot be serialized.
    pub fn patch<T: Serialize>(patch: &T) -> Result<Self, StoreError> {
        Ok(Self::State(serde_json::to_value(patch)?))
    }

    fn resolve(self, state: &S) -> Value {
        match self {
            Self::State(patch) => patch,
            Self::Callback(callback) => callback(state),
        }
    }
}

impl<S> From<Value> for StateOrCallback<S> {
    fn from(patch: Value) -> Self {
        Self::State(patch)
    }
}

impl<S> fmt::Debug for StateOrCallback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State(patch) => f.debug_tuple("State").field(patch).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

struct FeatureInner<S> {
    key: String,
    set_state_type: String,
    store: Store,
    state: Arc<StateSubject<S>>,
    subscriptions: Mutex<Vec<Subscription>>,
    effects: Mutex<Vec<EffectHandle>>,
    destroyed: AtomicBool,
}

/// A typed handle owning one slice of the store
///
/// Cheap to clone; clones share the same slice, subscriptions and effects.
pub struct FeatureStore<S> {
    inner: Arc<FeatureInner<S>>,
}

impl<S> Clone for FeatureStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for FeatureStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureStore")
            .field("key", &self.inner.key)
            .field("destroyed", &self.inner.destroyed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<S> FeatureStore<S>
where
    S: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    /// Register the slice `key` with `initial_state`
    ///
    /// # Errors
    ///
    /// - [`StoreError::FeatureExists`] if `key` is already registered
    /// - [`StoreError::Serialization`] if `initial_state` cannot be serialized
    pub fn new(store: &Store, key: impl Into<String>, initial_state: S) -> Result<Self, StoreError> {
        Self::with_config(store, key, initial_state, FeatureStoreConfig::default())
    }

    /// Register the slice with options
    ///
    /// With `multi`, a random suffix is appended to `key` so several
    /// instances of the same feature store can live side by side.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_config(
        store: &Store,
        key: impl Into<String>,
        initial_state: S,
        config: FeatureStoreConfig,
    ) -> Result<Self, StoreError> {
        let mut key = key.into();
        if config.multi {
            key = format!("{key}-{}", random_suffix());
        }

        let initial_slice = serde_json::to_value(&initial_state)?;
        let set_state_type = lifecycle::set_state_type(&key);

        store.register_feature(
            key.clone(),
            set_state_reducer(set_state_type.clone()),
            FeatureConfig::default().with_initial_state(initial_slice),
        )?;

        let inner = Arc::new(FeatureInner {
            key: key.clone(),
            set_state_type,
            store: store.clone(),
            state: StateSubject::new(initial_state),
            subscriptions: Mutex::new(Vec::new()),
            effects: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });

        let cache = Arc::clone(&inner.state);
        let slice_key = key.clone();
        let sync = store
            .select(move |state: &AppState| state.get(&slice_key).cloned())
            .subscribe(move |slice: Option<Value>| {
                let Some(slice) = slice else {
                    return;
                };
                match serde_json::from_value::<S>(slice) {
                    Ok(next) => cache.next(next),
                    Err(error) => {
                        tracing::warn!(feature = %key, %error, "Slice does not match feature state type");
                    },
                }
            });
        lock(&inner.subscriptions).push(sync);

        tracing::debug!(feature = %inner.key, "Feature store created");
        Ok(Self { inner })
    }

    /// Key of the slice (including the random suffix of `multi` stores)
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The latest state of the slice
    #[must_use]
    pub fn state(&self) -> S {
        self.inner.state.value()
    }

    /// Merge a patch into the slice
    ///
    /// Dispatches `@slicestore/set-state/<key>` (with `/<name>` appended when
    /// a name is given) carrying the patch as payload, and returns that action.
    /// A callback is evaluated against the current state of the slice.
    pub fn set_state(&self, patch: impl Into<StateOrCallback<S>>, name: Option<&str>) -> Action {
        let patch = patch.into().resolve(&self.inner.state.value());
        let action_type = match name {
            Some(name) => format!("{}/{name}", self.inner.set_state_type),
            None => self.inner.set_state_type.clone(),
        };

        let action = Action::with_payload(action_type, patch);
        self.inner.store.dispatch(action.clone());
        action
    }

    /// Select derived state of the slice
    pub fn select<R, F>(&self, map: F) -> Selection<S, R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        Selection::new(Arc::clone(&self.inner.state), map)
    }

    /// Select the whole slice
    #[must_use]
    pub fn select_state(&self) -> Selection<S, S> {
        self.select(S::clone)
    }

    /// Run an effect whose output patches this slice
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn effect<P, F, St, E>(&self, factory: F) -> Result<EffectTrigger<P>, StoreError>
    where
        P: Send + 'static,
        F: Fn(Payloads<P>) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<StateOrCallback<S>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.spawn(None, factory)
    }

    /// Run an effect whose output patches this slice with named actions
    ///
    /// Every patch is dispatched as `@slicestore/set-state/<key>/<name>`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn effect_named<P, F, St, E>(
        &self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<EffectTrigger<P>, StoreError>
    where
        P: Send + 'static,
        F: Fn(Payloads<P>) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<StateOrCallback<S>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.spawn(Some(name.into()), factory)
    }

    fn spawn<P, F, St, E>(&self, name: Option<String>, factory: F) -> Result<EffectTrigger<P>, StoreError>
    where
        P: Send + 'static,
        F: Fn(Payloads<P>) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<StateOrCallback<S>, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let effect_name = match &name {
            Some(name) => format!("{}/{name}", self.inner.key),
            None => self.inner.key.clone(),
        };

        let feature = Arc::downgrade(&self.inner);
        let handle = effects::spawn_effect(
            effect_name,
            EffectSource::new(receiver),
            factory,
            EffectConfig::default(),
            move |patch: StateOrCallback<S>| {
                let Some(inner) = feature.upgrade() else {
                    return false;
                };
                if inner.destroyed.load(Ordering::Acquire) {
                    return false;
                }
                Self { inner }.set_state(patch, name.as_deref());
                true
            },
        )?;

        lock(&self.inner.effects).push(handle);
        Ok(EffectTrigger::new(sender))
    }

    /// Ask the undo extension to revert `action`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UndoExtensionMissing`] unless an undo extension
    /// was added to the store.
    pub fn undo(&self, action: &Action) -> Result<(), StoreError> {
        if !self.inner.store.has_extension(ExtensionId::Undo) {
            return Err(StoreError::UndoExtensionMissing);
        }
        self.inner.store.dispatch(lifecycle::undo(action));
        Ok(())
    }

    /// Keep `subscription` until the feature store is destroyed
    pub fn hold(&self, subscription: Subscription) {
        if self.inner.destroyed.load(Ordering::Acquire) {
            subscription.unsubscribe();
            return;
        }
        lock(&self.inner.subscriptions).push(subscription);
    }

    /// Whether [`destroy`](Self::destroy) was called
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Cancel subscriptions and effects, then remove the slice
    ///
    /// Calling it again is a no-op.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        for subscription in subscriptions {
            subscription.unsubscribe();
        }

        let effects = std::mem::take(&mut *lock(&self.inner.effects));
        for effect in &effects {
            effect.cancel();
        }

        self.inner.store.remove_feature(&self.inner.key);
        tracing::debug!(feature = %self.inner.key, "Feature store destroyed");
    }
}

/// The reducer generated for a feature store
///
/// Applies the payload of `<set_state_type>` and `<set_state_type>/<name>`
/// actions. Types that only share a textual prefix (`.../a` vs `.../ab`) are
/// not matched.
fn set_state_reducer(set_state_type: String) -> BoxedReducer<Value> {
    let named_prefix = format!("{set_state_type}/");
    reducer_fn(move |state: Value, action: &Action| {
        let action_type = action.action_type();
        if action_type != set_state_type && !action_type.starts_with(&named_prefix) {
            return state;
        }
        match action.payload() {
            Some(patch) => shallow_merge(state, patch),
            None => state,
        }
    })
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MULTI_KEY_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    #[test]
    fn set_state_reducer_ignores_keys_sharing_a_prefix() {
        let reducer = set_state_reducer(lifecycle::set_state_type("a"));
        let state = json!({"count": 1});

        let other = Action::with_payload(lifecycle::set_state_type("ab"), json!({"count": 9}));
        assert_eq!(reducer.reduce(state.clone(), &other), state);

        let named = Action::with_payload(format!("{}/inc", lifecycle::set_state_type("a")), json!({"count": 2}));
        assert_eq!(reducer.reduce(state, &named), json!({"count": 2}));
    }

    #[test]
    fn callback_patch_sees_current_state() {
        let store = Store::new();
        let counter = FeatureStore::new(&store, "counter", Counter { count: 1 }).unwrap();

        counter.set_state(
            StateOrCallback::callback(|state: &Counter| json!({"count": state.count + 1})),
            None,
        );

        assert_eq!(counter.state(), Counter { count: 2 });
        assert_eq!(store.state(|s| s.get("counter").cloned()), Some(json!({"count": 2})));
    }

    #[test]
    fn multi_feature_stores_get_distinct_keys() {
        let store = Store::new();
        let config = FeatureStoreConfig::default().with_multi(true);
        let first = FeatureStore::with_config(&store, "todo", Counter::default(), config).unwrap();
        let second = FeatureStore::with_config(&store, "todo", Counter::default(), config).unwrap();

        assert_ne!(first.key(), second.key());
        assert!(first.key().starts_with("todo-"));
        assert_eq!(first.key().len(), "todo-".len() + MULTI_KEY_SUFFIX_LEN);
    }

    #[test]
    fn destroy_is_idempotent() {
        let store = Store::new();
        let counter = FeatureStore::new(&store, "counter", Counter::default()).unwrap();

        counter.destroy();
        counter.destroy();

        assert!(counter.is_destroyed());
        assert!(!store.state(|s| s.contains_key("counter")));
    }
}
