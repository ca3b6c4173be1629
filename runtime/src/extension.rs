//! Store extensions
//!
//! An extension is a cross-cutting observer initialized once. Its
//! [`init`](StoreExtension::init) receives an [`ExtensionContext`] that can
//! dispatch, select, observe actions and install global meta-reducers, but
//! cannot touch the reducer registry.
//!
//! Extensions are kept sorted by [`ExtensionSortOrder`]; equal sort keys keep
//! registration order. `configure` initializes them in that order, so the undo
//! extension always comes after every default extension and its replays stay
//! invisible to them.

use crate::effects::Actions;
use crate::store::{Store, StoreSelection};
use slicestore_core::action::Action;
use slicestore_core::reducer::BoxedMetaReducer;
use slicestore_core::state::AppState;
use std::fmt;
use std::sync::Arc;

/// Position of an extension in the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtensionSortOrder {
    /// Ordinary extensions (loggers, devtools bridges, ...)
    #[default]
    Default,
    /// The undo extension, initialized after every default extension
    Undo,
}

/// Capability identifier used by [`Store::has_extension`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionId {
    /// The built-in undo extension
    Undo,
    /// Any other extension, named by its implementor
    Custom(&'static str),
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undo => f.write_str("undo"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A cross-cutting observer of the store
pub trait StoreExtension: Send + Sync {
    /// Capability this extension provides
    fn id(&self) -> ExtensionId;

    /// Where the extension sorts relative to others
    fn sort_order(&self) -> ExtensionSortOrder {
        ExtensionSortOrder::Default
    }

    /// Called exactly once when the extension is added
    fn init(&self, context: &ExtensionContext);
}

/// What an extension may do with the store during `init`
pub struct ExtensionContext {
    store: Store,
}

impl ExtensionContext {
    pub(crate) const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Dispatch an action
    pub fn dispatch(&self, action: Action) {
        self.store.dispatch(action);
    }

    /// Select derived state
    pub fn select<R, F>(&self, map: F) -> StoreSelection<R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&AppState) -> R + Send + Sync + 'static,
    {
        self.store.select(map)
    }

    /// Observe every action applied from now on
    #[must_use]
    pub fn actions(&self) -> Actions {
        self.store.actions()
    }

    /// Append a global meta-reducer to the end of the chain
    pub fn add_meta_reducer(&self, meta_reducer: BoxedMetaReducer<AppState>) {
        self.store.add_meta_reducers(vec![meta_reducer]);
    }
}

impl fmt::Debug for ExtensionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionContext").finish_non_exhaustive()
    }
}

/// Extensions sorted by sort order, stable for equal keys
#[derive(Default)]
pub(crate) struct ExtensionRegistry {
    extensions: Vec<Arc<dyn StoreExtension>>,
}

impl ExtensionRegistry {
    pub(crate) fn insert(&mut self, extension: Arc<dyn StoreExtension>) {
        let order = extension.sort_order();
        let position = self
            .extensions
            .partition_point(|existing| existing.sort_order() <= order);
        self.extensions.insert(position, extension);
    }

    pub(crate) fn contains(&self, id: ExtensionId) -> bool {
        self.extensions.iter().any(|extension| extension.id() == id)
    }

    pub(crate) fn ids(&self) -> Vec<ExtensionId> {
        self.extensions.iter().map(|extension| extension.id()).collect()
    }
}

/// Stable sort used by `configure` before initializing extensions
pub(crate) fn sort_extensions(mut extensions: Vec<Arc<dyn StoreExtension>>) -> Vec<Arc<dyn StoreExtension>> {
    extensions.sort_by_key(|extension| extension.sort_order());
    extensions
}
