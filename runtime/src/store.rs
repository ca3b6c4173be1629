//! The store - owner of the state tree
//!
//! The [`Store`] manages:
//! 1. The current state tree, published through a behavior subject
//! 2. The reducer registry (one reducer per top-level key)
//! 3. The ordered list of global meta-reducers
//! 4. Action observers (effects and `actions()` streams)
//! 5. The extension registry
//!
//! # Dispatch
//!
//! [`Store::dispatch`] pushes onto a FIFO queue. If nobody is draining the
//! queue, the caller becomes the drainer and applies actions until the queue is
//! empty; dispatches made while an action is being applied (from reducers,
//! subscribers, extensions or effects) are only queued. Per action the store
//! reduces, publishes the new state to subscribers and only then forwards the
//! action to its observers.

use crate::config::{EffectConfig, FeatureConfig, StoreConfig};
use crate::effects::{self, Actions, EffectHandle, EffectSource};
use crate::extension::{ExtensionContext, ExtensionId, ExtensionRegistry, StoreExtension, sort_extensions};
use crate::lock;
use crate::metrics::{names, register_metrics};
use crate::subject::{Selection, StateSubject, StoreStream};
use crate::StoreError;
use futures::Stream;
use serde_json::Value;
use slicestore_core::action::{Action, lifecycle};
use slicestore_core::composition::{combine_meta_reducers, combine_reducers};
use slicestore_core::reducer::{BoxedMetaReducer, BoxedReducer, MetaReducer, with_initial_state};
use slicestore_core::selector::Selector;
use slicestore_core::state::AppState;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::sync::mpsc;

/// A selection over the whole state tree
pub type StoreSelection<R> = Selection<Arc<AppState>, R>;

/// Reducers and meta-reducers, plus the root reducer composed from them
#[derive(Default)]
struct Registry {
    reducers: BTreeMap<String, BoxedReducer<Value>>,
    meta_reducers: Vec<BoxedMetaReducer<AppState>>,
    root: Option<BoxedReducer<AppState>>,
    generation: u64,
    configured: bool,
}

impl Registry {
    fn invalidate(&mut self) {
        self.root = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<Action>,
    draining: bool,
}

/// Resets the queue if a reducer or listener panics mid-drain
struct DrainGuard<'a> {
    queue: &'a Mutex<DispatchQueue>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut queue = lock(self.queue);
            if !queue.pending.is_empty() {
                tracing::warn!(dropped = queue.pending.len(), "Dispatch panicked, discarding queued actions");
            }
            queue.pending.clear();
            queue.draining = false;
        }
    }
}

struct StoreInner {
    state: Arc<StateSubject<Arc<AppState>>>,
    registry: Mutex<Registry>,
    queue: Mutex<DispatchQueue>,
    observers: Mutex<Vec<mpsc::UnboundedSender<Action>>>,
    extensions: Mutex<ExtensionRegistry>,
    next_effect_id: AtomicU64,
}

/// The store - single source of truth for the application state
///
/// Cheap to clone; clones share the same state tree.
///
/// # Example
///
/// ```
/// use slicestore_core::action::Action;
/// use slicestore_core::reducer::reducer_fn;
/// use slicestore_runtime::{Store, StoreConfig};
/// use serde_json::{Value, json};
///
/// # fn main() -> Result<(), slicestore_runtime::StoreError> {
/// let store = Store::new();
/// store.configure(StoreConfig::default().with_reducer(
///     "todos",
///     reducer_fn(|state: Value, action: &Action| match action.payload() {
///         Some(todo) if action.is("addTodo") => {
///             let mut todos = state.as_array().cloned().unwrap_or_default();
///             todos.push(todo.clone());
///             Value::Array(todos)
///         },
///         _ if state.is_null() => json!([]),
///         _ => state,
///     }),
/// ))?;
///
/// let todos = store.select(|state| state.get("todos").cloned());
/// store.dispatch(Action::with_payload("addTodo", json!("write docs")));
/// assert_eq!(todos.get(), Some(json!(["write docs"])));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create an empty store
    ///
    /// The state starts as an empty tree; nothing is dispatched until a
    /// feature is registered or [`configure`](Self::configure) is called.
    #[must_use]
    pub fn new() -> Self {
        register_metrics();

        Self {
            inner: Arc::new(StoreInner {
                state: StateSubject::new(Arc::new(AppState::new())),
                registry: Mutex::new(Registry::default()),
                queue: Mutex::new(DispatchQueue::default()),
                observers: Mutex::new(Vec::new()),
                extensions: Mutex::new(ExtensionRegistry::default()),
                next_effect_id: AtomicU64::new(0),
            }),
        }
    }

    /// One-time store setup
    ///
    /// Appends the global meta-reducers, initializes the extensions in sort
    /// order, registers the reducers, publishes the initial state (if any)
    /// and dispatches `@slicestore/init-store`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyConfigured`] on a second call
    /// - [`StoreError::FeaturesAlreadyRegistered`] if a feature was registered before
    /// - [`StoreError::FeatureExists`] if the config names a key twice
    ///
    /// Nothing is changed when an error is returned.
    pub fn configure(&self, config: StoreConfig) -> Result<(), StoreError> {
        {
            let mut registry = lock(&self.inner.registry);
            if registry.configured {
                return Err(StoreError::AlreadyConfigured);
            }
            if !registry.reducers.is_empty() {
                return Err(StoreError::FeaturesAlreadyRegistered);
            }

            let mut seen = BTreeSet::new();
            for (key, _) in &config.reducers {
                if !seen.insert(key.as_str()) {
                    return Err(StoreError::FeatureExists(key.clone()));
                }
            }

            registry.configured = true;
        }

        let StoreConfig {
            reducers,
            initial_state,
            meta_reducers,
            extensions,
        } = config;

        tracing::debug!(
            reducers = reducers.len(),
            meta_reducers = meta_reducers.len(),
            extensions = extensions.len(),
            "Configuring store"
        );

        self.add_meta_reducers(meta_reducers);

        for extension in sort_extensions(extensions) {
            self.add_extension_arc(extension);
        }

        {
            let mut registry = lock(&self.inner.registry);
            for (key, reducer) in reducers {
                metrics::counter!(names::FEATURES_REGISTERED).increment(1);
                registry.reducers.insert(key, reducer);
            }
            registry.invalidate();
        }

        if let Some(initial_state) = initial_state {
            self.inner.state.next(Arc::new(initial_state));
        }

        self.dispatch(lifecycle::init_store());
        Ok(())
    }

    /// Add a reducer for one top-level key
    ///
    /// The reducer is wrapped by the local meta-reducers of `config`, then by
    /// the initial-state wrapper, and `@slicestore/init-feature/<key>` is
    /// dispatched so the slice appears in the state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FeatureExists`] if `key` is already registered.
    pub fn register_feature(
        &self,
        key: impl Into<String>,
        reducer: BoxedReducer<Value>,
        config: FeatureConfig,
    ) -> Result<FeatureHandle, StoreError> {
        let key = key.into();
        let FeatureConfig {
            initial_state,
            meta_reducers,
        } = config;

        let reducer = combine_meta_reducers(meta_reducers).wrap(reducer);
        let reducer = match initial_state {
            Some(initial_state) => with_initial_state(reducer, initial_state),
            None => reducer,
        };

        {
            let mut registry = lock(&self.inner.registry);
            if registry.reducers.contains_key(&key) {
                return Err(StoreError::FeatureExists(key));
            }
            registry.reducers.insert(key.clone(), reducer);
            registry.invalidate();
        }

        metrics::counter!(names::FEATURES_REGISTERED).increment(1);
        tracing::debug!(feature = %key, "Feature registered");

        self.dispatch(lifecycle::init_feature(&key));

        Ok(FeatureHandle {
            key,
            store: self.downgrade(),
        })
    }

    /// Remove the reducer of `key` and drop its slice
    ///
    /// Returns `false` (and dispatches nothing) if no reducer is registered
    /// under `key`.
    pub fn remove_feature(&self, key: &str) -> bool {
        {
            let mut registry = lock(&self.inner.registry);
            if registry.reducers.remove(key).is_none() {
                tracing::debug!(feature = %key, "No feature registered under key, nothing removed");
                return false;
            }
            registry.invalidate();
        }

        metrics::counter!(names::FEATURES_REMOVED).increment(1);
        tracing::debug!(feature = %key, "Feature removed");

        self.dispatch(lifecycle::destroy_feature(key));
        true
    }

    /// Apply an action
    ///
    /// Returns once the action (and everything it caused to be queued) has
    /// been applied, unless another dispatch is already draining the queue,
    /// in which case the action is applied by that drain.
    ///
    /// # Panics
    ///
    /// A panic in a reducer or a state listener propagates to the caller that
    /// is draining the queue. Actions still queued behind the failing one are
    /// discarded; the store stays usable afterwards.
    pub fn dispatch(&self, action: Action) {
        {
            let mut queue = lock(&self.inner.queue);
            queue.pending.push_back(action);
            if queue.draining {
                metrics::counter!(names::ACTIONS_QUEUED).increment(1);
                tracing::trace!(pending = queue.pending.len(), "Action queued behind running dispatch");
                return;
            }
            queue.draining = true;
        }

        let _guard = DrainGuard {
            queue: &self.inner.queue,
        };

        loop {
            let next = {
                let mut queue = lock(&self.inner.queue);
                if let Some(action) = queue.pending.pop_front() {
                    action
                } else {
                    queue.draining = false;
                    break;
                }
            };
            self.apply(&next);
        }
    }

    fn apply(&self, action: &Action) {
        let span = tracing::debug_span!("dispatch", action_type = action.action_type());
        let _enter = span.enter();

        let reducer = self.root_reducer();
        let current = self.inner.state.value();

        let start = Instant::now();
        let next = reducer.reduce(AppState::clone(&current), action);
        metrics::histogram!(names::REDUCER_DURATION).record(start.elapsed().as_secs_f64());
        metrics::counter!(names::ACTIONS_DISPATCHED).increment(1);

        tracing::trace!(slices = next.len(), "Reducer completed, publishing state");
        self.inner.state.next(Arc::new(next));

        lock(&self.inner.observers).retain(|observer| observer.send(action.clone()).is_ok());
    }

    /// Select derived state
    ///
    /// Subscribers receive the current value immediately and afterwards only
    /// values that differ from the previous one.
    pub fn select<R, F>(&self, map: F) -> StoreSelection<R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&AppState) -> R + Send + Sync + 'static,
    {
        Selection::new(Arc::clone(&self.inner.state), move |state: &Arc<AppState>| {
            map(state.as_ref())
        })
    }

    /// Select through a (possibly memoized) [`Selector`]
    #[must_use]
    pub fn select_with<R>(&self, selector: &Selector<AppState, R>) -> StoreSelection<R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
    {
        let selector = selector.clone();
        self.select(move |state| selector.select(state))
    }

    /// Read the latest published state
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&AppState) -> T,
    {
        let state = self.inner.state.value();
        f(&state)
    }

    /// Every action applied after this call, in dispatch order
    ///
    /// Actions reach the stream after the state they produced was published.
    #[must_use]
    pub fn actions(&self) -> Actions {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        lock(&self.inner.observers).push(sender);

        StoreStream::new(async_stream::stream! {
            while let Some(action) = receiver.recv().await {
                yield action;
            }
        })
    }

    /// Run an effect over the action stream, dispatching its output
    ///
    /// See [`create_effect_with`](Self::create_effect_with).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn create_effect<F, St, E>(&self, factory: F) -> Result<EffectHandle, StoreError>
    where
        F: Fn(Actions) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<Action, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.create_effect_with(EffectConfig::default(), factory)
    }

    /// Run an effect over the action stream
    ///
    /// `factory` builds the pipeline from the stream of applied actions. It is
    /// called again whenever the pipeline yields an `Err` or panics, up to
    /// `config.max_resubscriptions` times. With `config.dispatch` the `Ok`
    /// items are dispatched, otherwise they are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoRuntime`] outside a Tokio runtime.
    pub fn create_effect_with<F, St, E>(
        &self,
        config: EffectConfig,
        factory: F,
    ) -> Result<EffectHandle, StoreError>
    where
        F: Fn(Actions) -> St + Send + Sync + 'static,
        St: Stream<Item = Result<Action, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime)?;

        let id = self.inner.next_effect_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner.observers).push(sender);

        let store = self.downgrade();
        let handle = effects::spawn_effect(
            format!("store-effect-{id}"),
            EffectSource::new(receiver),
            factory,
            config,
            move |action: Action| {
                let Some(store) = store.upgrade() else {
                    return false;
                };
                if config.dispatch {
                    store.dispatch(action);
                }
                true
            },
        )?;

        tracing::debug!(effect_id = id, dispatch = config.dispatch, "Effect created");
        Ok(handle)
    }

    /// Initialize an extension and add it to the registry
    pub fn add_extension<E>(&self, extension: E)
    where
        E: StoreExtension + 'static,
    {
        self.add_extension_arc(Arc::new(extension));
    }

    fn add_extension_arc(&self, extension: Arc<dyn StoreExtension>) {
        let id = extension.id();
        extension.init(&ExtensionContext::new(self.clone()));
        lock(&self.inner.extensions).insert(extension);

        metrics::counter!(names::EXTENSIONS_INITIALIZED).increment(1);
        tracing::debug!(extension = %id, "Extension initialized");
    }

    /// Whether an extension with this id was added
    #[must_use]
    pub fn has_extension(&self, id: ExtensionId) -> bool {
        lock(&self.inner.extensions).contains(id)
    }

    /// Ids of the added extensions, in sort order
    #[must_use]
    pub fn extensions(&self) -> Vec<ExtensionId> {
        lock(&self.inner.extensions).ids()
    }

    /// Append global meta-reducers to the end of the chain
    /// The composed root reducer, rebuilt after any registry change
    ///
    /// Meta-reducers wrap outside the registry lock, so their `wrap` may
    /// call back into the store. A result composed from a registry that
    /// changed in the meantime is used once but not cached.
    fn root_reducer(&self) -> BoxedReducer<AppState> {
        let (reducers, meta_reducers, generation) = {
            let registry = lock(&self.inner.registry);
            if let Some(root) = &registry.root {
                return Arc::clone(root);
            }
            (
                registry.reducers.clone(),
                registry.meta_reducers.clone(),
                registry.generation,
            )
        };

        let combined: BoxedReducer<AppState> = Arc::new(combine_reducers(reducers));
        let root = combine_meta_reducers(meta_reducers).wrap(combined);

        let mut registry = lock(&self.inner.registry);
        if registry.generation == generation {
            registry.root = Some(Arc::clone(&root));
        }
        root
    }

    pub(crate) fn add_meta_reducers(&self, meta_reducers: Vec<BoxedMetaReducer<AppState>>) {
        if meta_reducers.is_empty() {
            return;
        }
        let mut registry = lock(&self.inner.registry);
        registry.meta_reducers.extend(meta_reducers);
        registry.invalidate();
    }

    /// A handle that does not keep the store alive
    #[must_use]
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let features: Vec<String> = lock(&self.inner.registry).reducers.keys().cloned().collect();
        f.debug_struct("Store")
            .field("features", &features)
            .field("extensions", &self.extensions())
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Store`]
#[derive(Clone, Debug)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    /// The store, if it is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

/// Returned by [`Store::register_feature`]
#[derive(Clone, Debug)]
pub struct FeatureHandle {
    key: String,
    store: WeakStore,
}

impl FeatureHandle {
    /// Key the feature's reducer is registered under
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the feature from its store
    ///
    /// Returns `false` if the store is gone or the feature was already removed.
    pub fn remove(self) -> bool {
        self.store
            .upgrade()
            .is_some_and(|store| store.remove_feature(&self.key))
    }
}
