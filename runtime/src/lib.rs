//! # Slicestore Runtime
//!
//! Runtime implementation of the slicestore state container.
//!
//! This crate provides the [`Store`] that owns the state tree, applies actions
//! through the composed reducer, and runs effects and extensions around it.
//!
//! ## Core Components
//!
//! - **Store**: reducer registry, global meta-reducers, FIFO dispatch queue
//! - **`FeatureStore`**: a typed handle owning one slice of the state tree
//! - **Effects**: fault-isolated async pipelines that resubscribe on failure
//! - **Extensions**: cross-cutting observers such as [`UndoExtension`]
//!
//! ## Example
//!
//! ```
//! use slicestore_core::action::Action;
//! use slicestore_core::reducer::typed_reducer;
//! use slicestore_runtime::{FeatureConfig, Store};
//!
//! # fn main() -> Result<(), slicestore_runtime::StoreError> {
//! let store = Store::new();
//! store.register_feature(
//!     "counter",
//!     typed_reducer(|count: Option<i64>, action: &Action| {
//!         let count = count.unwrap_or(0);
//!         if action.is("increment") { count + 1 } else { count }
//!     }),
//!     FeatureConfig::default(),
//! )?;
//!
//! store.dispatch(Action::new("increment"));
//! assert_eq!(store.state(|s| s["counter"].clone()), serde_json::json!(1));
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Store configuration builders
pub mod config;

/// Effect execution with resubscription on fault
pub mod effects;

/// Store extensions and the extension context
pub mod extension;

/// Typed handles over one feature slice
pub mod feature_store;

/// Metric names and descriptions
pub mod metrics;

/// The store
pub mod store;

/// Behavior subjects, selections and streams
pub mod subject;

/// Undo extension
pub mod undo;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors returned by store operations
    ///
    /// Every variant is returned before the store is mutated. Faults inside
    /// effects never surface here; they are logged and contained by the
    /// effect runner.
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// A reducer is already registered under this key
        #[error("Feature \"{0}\" already exists")]
        FeatureExists(String),

        /// `configure` was called after features were registered
        #[error("`configure` must be called before any feature is registered")]
        FeaturesAlreadyRegistered,

        /// `configure` was called twice
        #[error("Store is already configured")]
        AlreadyConfigured,

        /// `undo` was called without the undo extension
        #[error("Undo extension is not registered")]
        UndoExtensionMissing,

        /// A feature state could not be converted to or from JSON
        #[error("Failed to serialize feature state: {0}")]
        Serialization(#[from] serde_json::Error),

        /// An effect was created outside a Tokio runtime
        #[error("Effects require a running Tokio runtime")]
        NoRuntime,
    }
}

pub use config::{EffectConfig, FeatureConfig, FeatureStoreConfig, StoreConfig};
pub use effects::{Actions, EffectHandle, EffectTrigger, Payloads};
pub use error::StoreError;
pub use extension::{ExtensionContext, ExtensionId, ExtensionSortOrder, StoreExtension};
pub use feature_store::{FeatureStore, StateOrCallback};
pub use store::{FeatureHandle, Store, StoreSelection, WeakStore};
pub use subject::{Selection, StoreStream, Subscription};
pub use undo::UndoExtension;

/// Lock a mutex, recovering the guard if a previous holder panicked
///
/// Panics inside user reducers or listeners never run while a runtime lock is
/// held, so the protected data is consistent even when poisoned.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
