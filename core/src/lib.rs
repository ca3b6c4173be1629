//! # Slicestore Core
//!
//! Core traits and types for slicestore, a Redux-style state container.
//!
//! This crate contains everything that is pure: it never owns state, never
//! schedules work and never talks to subscribers. The runtime crate builds the
//! store on top of it.
//!
//! ## Core Concepts
//!
//! - **Action**: Tagged record with a `type` discriminator and open extra fields
//! - **AppState**: JSON object mapping feature keys to opaque slices
//! - **Reducer**: Pure function `(State, Action) → State`
//! - **MetaReducer**: Function `Reducer → Reducer` wrapping a reducer
//! - **Selector**: Memoized derivation `State → R`
//!
//! ## Example
//!
//! ```
//! use slicestore_core::{Action, AppState, Reducer, reducer_fn};
//! use slicestore_core::composition::{combine_meta_reducers, combine_reducers};
//! use slicestore_core::reducer::{BoxedReducer, MetaReducer, meta_reducer_fn};
//! use serde_json::{Value, json};
//! use std::collections::BTreeMap;
//!
//! let mut reducers = BTreeMap::new();
//! reducers.insert(
//!     "todos".to_string(),
//!     reducer_fn(|state: Value, action: &Action| match action.action_type() {
//!         "add" => {
//!             let mut todos = state.as_array().cloned().unwrap_or_default();
//!             todos.push(action.payload().cloned().unwrap_or_default());
//!             Value::Array(todos)
//!         }
//!         _ => state,
//!     }),
//! );
//!
//! let logging = meta_reducer_fn(|inner: BoxedReducer<AppState>| {
//!     reducer_fn(move |state: AppState, action: &Action| {
//!         let next = inner.reduce(state, action);
//!         println!("{action}: {next:?}");
//!         next
//!     })
//! });
//!
//! let root = combine_meta_reducers(vec![logging]).wrap(std::sync::Arc::new(combine_reducers(reducers)));
//! let state = root.reduce(AppState::new(), &Action::with_payload("add", json!("write docs")));
//! assert_eq!(state["todos"], json!(["write docs"]));
//! ```

// Re-export commonly used types
pub use serde_json::{Value, json};

/// Action module - the tagged record every state transition starts from
pub mod action;

/// State module - the application state tree and slice helpers
pub mod state;

/// Reducer module - reducer and meta-reducer traits and adapters
pub mod reducer;

/// Reducer composition utilities
pub mod composition;

/// Selector module - memoized derivations over state
pub mod selector;

pub use action::{Action, lifecycle};
pub use composition::{combine_meta_reducers, combine_reducers};
pub use reducer::{
    BoxedMetaReducer, BoxedReducer, MetaReducer, Reducer, meta_reducer_fn, reducer_fn,
    typed_reducer, with_initial_state,
};
pub use selector::{
    Selector, create_feature_selector, create_feature_selector_as, create_selector,
    create_selector2,
};
pub use state::{AppState, shallow_merge};
