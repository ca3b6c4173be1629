//! Reducer composition utilities
//!
//! This module provides the two composition rules of the store:
//! - **`combine_reducers`**: Build the root reducer from a dictionary of slice reducers
//! - **`combine_meta_reducers`**: Fold an ordered list of meta-reducers into one wrapper
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use slicestore_core::action::Action;
//! use slicestore_core::composition::combine_reducers;
//! use slicestore_core::reducer::{Reducer, reducer_fn};
//! use slicestore_core::state::AppState;
//! use serde_json::{Value, json};
//! use std::collections::BTreeMap;
//!
//! let mut reducers = BTreeMap::new();
//! reducers.insert(
//!     "counter".to_string(),
//!     reducer_fn(|state: Value, action: &Action| match action.action_type() {
//!         "increment" => json!(state.as_i64().unwrap_or(0) + 1),
//!         _ => state,
//!     }),
//! );
//!
//! let root = combine_reducers(reducers);
//! let state = root.reduce(AppState::new(), &Action::new("increment"));
//! assert_eq!(state.get("counter"), Some(&json!(1)));
//! ```
//!
//! ## Combining Meta-Reducers
//!
//! Given `[m1, m2, ..., mn]` and a reducer `r`, the composed reducer is
//! `m1(m2(...(mn(r))))`: the body of `m1` runs first, `r` runs last.

use crate::action::Action;
use crate::reducer::{BoxedMetaReducer, BoxedReducer, MetaReducer, Reducer};
use crate::state::AppState;
use serde_json::Value;
use std::collections::BTreeMap;

/// Builds the root reducer over the whole state tree.
///
/// Every slice reducer runs on every action and sees only its own slice
/// (`Null` when absent). Slices without a reducer are dropped from the result
/// and `Null` results are left absent.
#[must_use]
pub fn combine_reducers(reducers: BTreeMap<String, BoxedReducer<Value>>) -> CombinedReducer {
    CombinedReducer { reducers }
}

/// The root reducer created by [`combine_reducers`].
pub struct CombinedReducer {
    reducers: BTreeMap<String, BoxedReducer<Value>>,
}

impl CombinedReducer {
    /// Keys of the slices this reducer produces
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.reducers.keys().map(String::as_str)
    }
}

impl Reducer<AppState> for CombinedReducer {
    fn reduce(&self, mut state: AppState, action: &Action) -> AppState {
        let mut next = AppState::new();

        for (key, reducer) in &self.reducers {
            let slice = state.remove(key).unwrap_or(Value::Null);
            let slice = reducer.reduce(slice, action);
            if !slice.is_null() {
                next.insert(key.clone(), slice);
            }
        }

        next
    }
}

/// Combines an ordered list of meta-reducers into one wrapper.
///
/// The first meta-reducer of the list is the outermost one.
#[must_use]
pub fn combine_meta_reducers<S>(meta_reducers: Vec<BoxedMetaReducer<S>>) -> CombinedMetaReducer<S> {
    CombinedMetaReducer { meta_reducers }
}

/// A meta-reducer chain created by [`combine_meta_reducers`].
pub struct CombinedMetaReducer<S> {
    meta_reducers: Vec<BoxedMetaReducer<S>>,
}

impl<S> CombinedMetaReducer<S> {
    /// Number of meta-reducers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.meta_reducers.len()
    }

    /// Whether the chain is empty (wrapping is then the identity)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meta_reducers.is_empty()
    }
}

impl<S> MetaReducer<S> for CombinedMetaReducer<S> {
    fn wrap(&self, inner: BoxedReducer<S>) -> BoxedReducer<S> {
        self.meta_reducers
            .iter()
            .rev()
            .fold(inner, |reducer, meta_reducer| meta_reducer.wrap(reducer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{meta_reducer_fn, reducer_fn};
    use serde_json::json;

    fn append(mark: &'static str) -> BoxedMetaReducer<Value> {
        meta_reducer_fn(move |inner: BoxedReducer<Value>| {
            reducer_fn(move |state: Value, action: &Action| {
                let state = json!(format!("{}{mark}", state.as_str().unwrap_or_default()));
                inner.reduce(state, action)
            })
        })
    }

    #[test]
    fn test_combine_reducers_runs_every_slice() {
        let mut reducers = BTreeMap::new();
        reducers.insert(
            "a".to_string(),
            reducer_fn(|state: Value, _: &Action| json!(state.as_i64().unwrap_or(0) + 1)),
        );
        reducers.insert(
            "b".to_string(),
            reducer_fn(|state: Value, _: &Action| json!(state.as_i64().unwrap_or(10) + 1)),
        );
        let root = combine_reducers(reducers);

        let state = root.reduce(AppState::new(), &Action::new("tick"));
        let state = root.reduce(state, &Action::new("tick"));

        assert_eq!(state.get("a"), Some(&json!(2)));
        assert_eq!(state.get("b"), Some(&json!(12)));
    }

    #[test]
    fn test_combine_reducers_drops_unknown_and_null_slices() {
        let mut reducers = BTreeMap::new();
        reducers.insert("empty".to_string(), reducer_fn(|_: Value, _: &Action| Value::Null));
        let root = combine_reducers(reducers);

        let mut state = AppState::new();
        state.insert("orphan".to_string(), json!(1));

        let next = root.reduce(state, &Action::new("x"));
        assert!(next.is_empty());
    }

    #[test]
    fn test_meta_reducers_run_first_registered_first() {
        let chain = combine_meta_reducers(vec![append("b"), append("c"), append("d")]);
        let reducer = chain.wrap(reducer_fn(|state: Value, _: &Action| {
            json!(format!("{}e", state.as_str().unwrap_or_default()))
        }));

        assert_eq!(reducer.reduce(json!("a"), &Action::new("x")), json!("abcde"));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = combine_meta_reducers::<Value>(Vec::new());
        assert!(chain.is_empty());
        let reducer = chain.wrap(reducer_fn(|state: Value, _: &Action| state));
        assert_eq!(reducer.reduce(json!(5), &Action::new("x")), json!(5));
    }
}
