//! Reducer and meta-reducer traits
//!
//! A reducer is a pure function `(state, action) -> state`. A meta-reducer wraps
//! a reducer and returns a new one, so it can inspect or rewrite the state and
//! the action before and after delegating to the wrapped reducer.
//!
//! Both traits are implemented for plain closures and `fn` items, so most code
//! never names them:
//!
//! ```
//! use slicestore_core::action::Action;
//! use slicestore_core::reducer::{BoxedReducer, Reducer, meta_reducer_fn, reducer_fn};
//! use serde_json::{Value, json};
//!
//! fn counter(state: Value, action: &Action) -> Value {
//!     match action.action_type() {
//!         "increment" => json!(state.as_i64().unwrap_or(0) + 1),
//!         _ => state,
//!     }
//! }
//!
//! let doubled = meta_reducer_fn(|inner: BoxedReducer<Value>| {
//!     reducer_fn(move |state: Value, action: &Action| {
//!         let once = inner.reduce(state, action);
//!         inner.reduce(once, action)
//!     })
//! });
//!
//! let reducer = doubled.wrap(reducer_fn(counter));
//! assert_eq!(reducer.reduce(json!(0), &Action::new("increment")), json!(2));
//! ```

use crate::action::Action;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// A pure state transition function for one state type
///
/// Must be referentially transparent: the store calls it once per dispatched
/// action and may call it again during undo replays.
pub trait Reducer<S>: Send + Sync {
    /// Compute the next state
    fn reduce(&self, state: S, action: &Action) -> S;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(S, &Action) -> S + Send + Sync,
{
    fn reduce(&self, state: S, action: &Action) -> S {
        self(state, action)
    }
}

/// Shared, type-erased reducer
pub type BoxedReducer<S> = Arc<dyn Reducer<S>>;

/// A higher-order wrapper around a reducer
pub trait MetaReducer<S>: Send + Sync {
    /// Wrap `inner`, returning the reducer that runs in its place
    fn wrap(&self, inner: BoxedReducer<S>) -> BoxedReducer<S>;
}

impl<S, F> MetaReducer<S> for F
where
    F: Fn(BoxedReducer<S>) -> BoxedReducer<S> + Send + Sync,
{
    fn wrap(&self, inner: BoxedReducer<S>) -> BoxedReducer<S> {
        self(inner)
    }
}

/// Shared, type-erased meta-reducer
pub type BoxedMetaReducer<S> = Arc<dyn MetaReducer<S>>;

/// Box a closure as a reducer
///
/// Exists mostly for closure type inference: the `Fn(S, &Action) -> S` bound
/// lets the compiler infer the parameter types.
pub fn reducer_fn<S, F>(f: F) -> BoxedReducer<S>
where
    F: Fn(S, &Action) -> S + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a meta-reducer
pub fn meta_reducer_fn<S, F>(f: F) -> BoxedMetaReducer<S>
where
    F: Fn(BoxedReducer<S>) -> BoxedReducer<S> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Substitute `initial_state` whenever the slice is `Null` (first touch)
pub fn with_initial_state(reducer: BoxedReducer<Value>, initial_state: Value) -> BoxedReducer<Value> {
    reducer_fn(move |state: Value, action: &Action| {
        let state = if state.is_null() {
            initial_state.clone()
        } else {
            state
        };
        reducer.reduce(state, action)
    })
}

/// Adapt a typed reducer to the JSON slice representation
///
/// The typed function receives `None` while the slice is absent. If the slice
/// does not deserialize into `T` (or the result does not serialize) the slice
/// is left untouched and a warning is logged.
///
/// ```
/// use slicestore_core::action::Action;
/// use slicestore_core::reducer::{Reducer, typed_reducer};
/// use serde_json::json;
///
/// let reducer = typed_reducer(|count: Option<u32>, action: &Action| {
///     let count = count.unwrap_or(1);
///     if action.is("counter") { count + 1 } else { count }
/// });
///
/// assert_eq!(reducer.reduce(json!(null), &Action::new("init")), json!(1));
/// assert_eq!(reducer.reduce(json!(1), &Action::new("counter")), json!(2));
/// ```
pub fn typed_reducer<T, F>(f: F) -> BoxedReducer<Value>
where
    T: Serialize + DeserializeOwned,
    F: Fn(Option<T>, &Action) -> T + Send + Sync + 'static,
{
    reducer_fn(move |state: Value, action: &Action| {
        let typed = if state.is_null() {
            None
        } else {
            match serde_json::from_value::<T>(state.clone()) {
                Ok(typed) => Some(typed),
                Err(error) => {
                    tracing::warn!(
                        action_type = action.action_type(),
                        %error,
                        "Slice does not match reducer state type, leaving it untouched"
                    );
                    return state;
                },
            }
        };

        match serde_json::to_value(f(typed, action)) {
            Ok(next) => next,
            Err(error) => {
                tracing::warn!(
                    action_type = action.action_type(),
                    %error,
                    "Reducer produced unserializable state, leaving slice untouched"
                );
                state
            },
        }
    })
}
