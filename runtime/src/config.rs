//! Configuration types for the store, features, feature stores and effects
//!
//! All of them follow the same builder style:
//!
//! ```ignore
//! let config = StoreConfig::default()
//!     .with_reducer("user", user_reducer)
//!     .with_meta_reducer(logging_meta_reducer)
//!     .with_extension(UndoExtension::new());
//!
//! store.configure(config)?;
//! ```

use crate::extension::StoreExtension;
use serde_json::Value;
use slicestore_core::reducer::{BoxedMetaReducer, BoxedReducer};
use slicestore_core::state::AppState;
use std::fmt;
use std::sync::Arc;

/// Default number of times a faulting effect is resubscribed
pub const DEFAULT_MAX_RESUBSCRIPTIONS: u32 = 10;

/// One-time store setup passed to [`Store::configure`](crate::Store::configure)
#[derive(Default)]
pub struct StoreConfig {
    pub(crate) reducers: Vec<(String, BoxedReducer<Value>)>,
    pub(crate) initial_state: Option<AppState>,
    pub(crate) meta_reducers: Vec<BoxedMetaReducer<AppState>>,
    pub(crate) extensions: Vec<Arc<dyn StoreExtension>>,
}

impl StoreConfig {
    /// Register a slice reducer under `key`
    #[must_use]
    pub fn with_reducer(mut self, key: impl Into<String>, reducer: BoxedReducer<Value>) -> Self {
        self.reducers.push((key.into(), reducer));
        self
    }

    /// Set the state published before `init-store` is dispatched
    #[must_use]
    pub fn with_initial_state(mut self, initial_state: AppState) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    /// Append a global meta-reducer (first appended runs first)
    #[must_use]
    pub fn with_meta_reducer(mut self, meta_reducer: BoxedMetaReducer<AppState>) -> Self {
        self.meta_reducers.push(meta_reducer);
        self
    }

    /// Add an extension; extensions are initialized in sort order
    #[must_use]
    pub fn with_extension<E>(mut self, extension: E) -> Self
    where
        E: StoreExtension + 'static,
    {
        self.extensions.push(Arc::new(extension));
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field(
                "reducers",
                &self.reducers.iter().map(|(key, _)| key).collect::<Vec<_>>(),
            )
            .field("initial_state", &self.initial_state)
            .field("meta_reducers", &self.meta_reducers.len())
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Options of [`Store::register_feature`](crate::Store::register_feature)
#[derive(Default)]
pub struct FeatureConfig {
    pub(crate) initial_state: Option<Value>,
    pub(crate) meta_reducers: Vec<BoxedMetaReducer<Value>>,
}

impl FeatureConfig {
    /// Slice value substituted whenever the slice is absent
    #[must_use]
    pub fn with_initial_state(mut self, initial_state: Value) -> Self {
        self.initial_state = Some(initial_state);
        self
    }

    /// Append a local meta-reducer wrapping only this feature's reducer
    #[must_use]
    pub fn with_meta_reducer(mut self, meta_reducer: BoxedMetaReducer<Value>) -> Self {
        self.meta_reducers.push(meta_reducer);
        self
    }
}

impl fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureConfig")
            .field("initial_state", &self.initial_state)
            .field("meta_reducers", &self.meta_reducers.len())
            .finish()
    }
}

/// Options of [`FeatureStore::with_config`](crate::FeatureStore::with_config)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureStoreConfig {
    /// Append a random suffix to the key so several instances can coexist
    pub multi: bool,
}

impl FeatureStoreConfig {
    /// Allow multiple instances of the same feature store
    #[must_use]
    pub const fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }
}

/// Options of an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectConfig {
    /// Whether the effect's output is dispatched (or applied as a patch)
    pub dispatch: bool,
    /// How many times a faulting pipeline is rebuilt before the effect stops
    pub max_resubscriptions: u32,
}

impl EffectConfig {
    /// Set whether the output is dispatched
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: bool) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Set the resubscription budget
    #[must_use]
    pub const fn with_max_resubscriptions(mut self, max_resubscriptions: u32) -> Self {
        self.max_resubscriptions = max_resubscriptions;
        self
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            dispatch: true,
            max_resubscriptions: DEFAULT_MAX_RESUBSCRIPTIONS,
        }
    }
}
