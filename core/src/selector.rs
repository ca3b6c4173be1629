//! Memoized selectors
//!
//! A [`Selector`] is a cheap-to-clone derivation `&S -> R`. Feature selectors
//! read one slice of the state tree; composed selectors project the output of
//! one or two parent selectors and remember their last input, so the projector
//! only re-runs when its input actually changed.
//!
//! # Example
//!
//! ```
//! use slicestore_core::selector::{create_feature_selector, create_selector};
//! use slicestore_core::state::AppState;
//! use serde_json::{Value, json};
//!
//! let user = create_feature_selector("user");
//! let first_name = create_selector(&user, |user: &Option<Value>| {
//!     user.as_ref()
//!         .and_then(|user| user.get("firstName"))
//!         .and_then(Value::as_str)
//!         .map(str::to_string)
//! });
//!
//! let mut state = AppState::new();
//! assert_eq!(first_name.select(&state), None);
//!
//! state.insert("user".to_string(), json!({ "firstName": "Bruce" }));
//! assert_eq!(first_name.select(&state), Some("Bruce".to_string()));
//! ```

use crate::state::AppState;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A derivation from `S` to `R`
pub struct Selector<S, R> {
    project: Arc<dyn Fn(&S) -> R + Send + Sync>,
}

impl<S, R> Selector<S, R> {
    /// Wrap a projection function
    pub fn new<F>(project: F) -> Self
    where
        F: Fn(&S) -> R + Send + Sync + 'static,
    {
        Self {
            project: Arc::new(project),
        }
    }

    /// Derive the value for `state`
    pub fn select(&self, state: &S) -> R {
        (self.project)(state)
    }
}

impl<S, R> Clone for Selector<S, R> {
    fn clone(&self) -> Self {
        Self {
            project: Arc::clone(&self.project),
        }
    }
}

impl<S, R> fmt::Debug for Selector<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector").finish_non_exhaustive()
    }
}

/// Select the slice stored under `key`
///
/// Absence is a valid value: `None` before the feature registers and after it
/// is removed.
#[must_use]
pub fn create_feature_selector(key: impl Into<String>) -> Selector<AppState, Option<Value>> {
    let key = key.into();
    Selector::new(move |state: &AppState| state.get(&key).cloned())
}

/// Select the slice stored under `key`, deserialized into `T`
///
/// Yields `None` when the slice is absent or does not match `T`.
#[must_use]
pub fn create_feature_selector_as<T>(key: impl Into<String>) -> Selector<AppState, Option<T>>
where
    T: DeserializeOwned + 'static,
{
    let key = key.into();
    Selector::new(move |state: &AppState| {
        let slice = state.get(&key)?;
        match serde_json::from_value(slice.clone()) {
            Ok(typed) => Some(typed),
            Err(error) => {
                tracing::warn!(feature = %key, %error, "Feature slice does not match selected type");
                None
            },
        }
    })
}

/// Memo cell shared by the composed selectors
struct Memo<I, R> {
    last: Mutex<Option<(I, R)>>,
}

impl<I, R> Memo<I, R>
where
    I: PartialEq,
    R: Clone,
{
    const fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// The projector runs without the memo locked, so it may re-enter the
    /// selector that owns this memo.
    fn get_or_compute(&self, input: I, compute: impl FnOnce(&I) -> R) -> R {
        {
            let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((previous, result)) = last.as_ref() {
                if *previous == input {
                    return result.clone();
                }
            }
        }

        let result = compute(&input);
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some((input, result.clone()));
        result
    }
}

/// Project the output of `parent`, memoized on that output
///
/// The projector must be pure; it runs again only when the parent output is
/// no longer equal to the previous one.
pub fn create_selector<S, P, R, F>(parent: &Selector<S, P>, project: F) -> Selector<S, R>
where
    S: 'static,
    P: PartialEq + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(&P) -> R + Send + Sync + 'static,
{
    let parent = parent.clone();
    let memo = Memo::new();
    Selector::new(move |state: &S| memo.get_or_compute(parent.select(state), &project))
}

/// Project the outputs of two parents, memoized on both outputs
pub fn create_selector2<S, P1, P2, R, F>(
    first: &Selector<S, P1>,
    second: &Selector<S, P2>,
    project: F,
) -> Selector<S, R>
where
    S: 'static,
    P1: PartialEq + Send + 'static,
    P2: PartialEq + Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(&P1, &P2) -> R + Send + Sync + 'static,
{
    let first = first.clone();
    let second = second.clone();
    let memo = Memo::new();
    Selector::new(move |state: &S| {
        memo.get_or_compute((first.select(state), second.select(state)), |(a, b)| {
            project(a, b)
        })
    })
}
