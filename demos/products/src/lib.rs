//! # Products Example
//!
//! A product catalog kept in one feature slice of a slicestore [`Store`].
//!
//! This example showcases:
//! - A [`FeatureStore`] owning the `products` slice
//! - Feature effects calling an async [`ProductService`]
//! - An optimistic delete that rolls back when the service fails
//! - Memoized selectors and undo of plain state updates
//!
//! ## Example
//!
//! ```no_run
//! use products_demo::{InMemoryProductService, ProductsStore};
//! use slicestore_runtime::Store;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), slicestore_runtime::StoreError> {
//! let store = Store::new();
//! let products = ProductsStore::new(&store, Arc::new(InMemoryProductService::new(Vec::new())))?;
//!
//! products.load_products();
//! products.show_product_code(true);
//! # Ok(())
//! # }
//! ```

use futures::{StreamExt, future, stream};
use serde_json::json;
use slicestore_core::action::Action;
use slicestore_core::selector::Selector;
use slicestore_runtime::{
    EffectTrigger, FeatureStore, Payloads, Selection, StateOrCallback, Store, StoreError,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Product service trait and in-memory backend
pub mod service;

/// Memoized selectors
pub mod selectors;

/// Domain types
pub mod types;

pub use service::{InMemoryProductService, ProductError, ProductService};
pub use types::{Product, ProductsState, without};

/// Key of the products slice
pub const FEATURE_KEY: &str = "products";

type Patch = StateOrCallback<ProductsState>;

/// Feature store for the product catalog
///
/// Requests to the service go through feature effects; their results are
/// merged into the slice as named `set-state` actions
/// (`@slicestore/set-state/products/<effect>`).
#[derive(Debug, Clone)]
pub struct ProductsStore {
    feature: FeatureStore<ProductsState>,
    load: EffectTrigger<()>,
    create: EffectTrigger<Product>,
    delete: EffectTrigger<u32>,
}

impl ProductsStore {
    /// Register the products slice and its effects
    ///
    /// # Errors
    ///
    /// - [`StoreError::FeatureExists`] if the slice is already registered
    /// - [`StoreError::NoRuntime`] outside a Tokio runtime
    pub fn new<P: ProductService>(store: &Store, service: Arc<P>) -> Result<Self, StoreError> {
        let feature = FeatureStore::new(store, FEATURE_KEY, ProductsState::default())?;

        let load = Self::load_effect(&feature, Arc::clone(&service))?;
        let create = Self::create_effect(&feature, Arc::clone(&service))?;
        let delete = Self::delete_effect(&feature, service)?;

        Ok(Self {
            feature,
            load,
            create,
            delete,
        })
    }

    fn load_effect<P: ProductService>(
        feature: &FeatureStore<ProductsState>,
        service: Arc<P>,
    ) -> Result<EffectTrigger<()>, StoreError> {
        feature.effect_named("load", move |payloads: Payloads<()>| {
            let service = Arc::clone(&service);
            payloads.then(move |()| {
                let service = Arc::clone(&service);
                async move {
                    let patch = match service.get_products().await {
                        Ok(products) => json!({"products": products, "error": ""}),
                        Err(error) => {
                            tracing::warn!(%error, "Failed to load products");
                            json!({"products": [], "error": error.to_string()})
                        },
                    };
                    Ok::<Patch, Infallible>(patch.into())
                }
            })
        })
    }

    fn create_effect<P: ProductService>(
        feature: &FeatureStore<ProductsState>,
        service: Arc<P>,
    ) -> Result<EffectTrigger<Product>, StoreError> {
        feature.effect_named("create", move |payloads: Payloads<Product>| {
            let service = Arc::clone(&service);
            payloads.then(move |product| {
                let service = Arc::clone(&service);
                async move {
                    let patch = match service.create_product(product).await {
                        Ok(created) => Patch::callback(move |state: &ProductsState| {
                            let id = created.id;
                            let mut products = state.products.clone();
                            products.push(created);
                            json!({"products": products, "currentProductId": id, "error": ""})
                        }),
                        Err(error) => json!({"error": error.to_string()}).into(),
                    };
                    Ok::<_, Infallible>(patch)
                }
            })
        })
    }

    /// Delete with optimistic update
    ///
    /// The product disappears from the slice right away; if the service then
    /// fails, the list from before the delete is restored.
    fn delete_effect<P: ProductService>(
        feature: &FeatureStore<ProductsState>,
        service: Arc<P>,
    ) -> Result<EffectTrigger<u32>, StoreError> {
        let latest = feature.select(|state: &ProductsState| state.products.clone());

        feature.effect_named("delete", move |payloads: Payloads<u32>| {
            let service = Arc::clone(&service);
            let latest = latest.clone();
            payloads.flat_map(move |id| {
                let service = Arc::clone(&service);
                let previous = latest.get();

                let optimistic = Patch::callback(move |state: &ProductsState| {
                    json!({"products": without(&state.products, id)})
                });
                let confirmed = async move {
                    match service.delete_product(id).await {
                        Ok(()) => Patch::callback(move |state: &ProductsState| {
                            json!({
                                "products": without(&state.products, id),
                                "currentProductId": null,
                                "error": ""
                            })
                        }),
                        Err(error) => {
                            tracing::warn!(product = id, %error, "Delete failed, restoring products");
                            json!({"products": previous, "error": error.to_string()}).into()
                        },
                    }
                };

                stream::once(future::ready(optimistic))
                    .chain(stream::once(confirmed))
                    .map(Ok::<_, Infallible>)
            })
        })
    }

    /// The underlying feature store
    #[must_use]
    pub const fn feature(&self) -> &FeatureStore<ProductsState> {
        &self.feature
    }

    /// Latest state of the slice
    #[must_use]
    pub fn state(&self) -> ProductsState {
        self.feature.state()
    }

    /// Observe the slice through a memoized selector
    #[must_use]
    pub fn select<R>(&self, selector: Selector<ProductsState, R>) -> Selection<ProductsState, R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
    {
        self.feature.select(move |state: &ProductsState| selector.select(state))
    }

    /// Fetch the catalog from the service
    pub fn load_products(&self) {
        self.load.trigger(());
    }

    /// Create a product and select it once stored
    pub fn create_product(&self, product: Product) {
        self.create.trigger(product);
    }

    /// Delete a product, removing it from the slice immediately
    pub fn delete_product(&self, id: u32) {
        self.delete.trigger(id);
    }

    /// Select the product `id`
    ///
    /// Selecting the already selected product leaves the slice unchanged.
    pub fn set_current_product(&self, id: u32) -> Action {
        self.feature.set_state(
            Patch::callback(move |state: &ProductsState| {
                if state.current_product_id == Some(id) {
                    json!({})
                } else {
                    json!({"currentProductId": id})
                }
            }),
            Some("currProd"),
        )
    }

    /// Clear the selection
    pub fn clear_current_product(&self) -> Action {
        self.feature
            .set_state(json!({"currentProductId": null}), Some("clearCurrProd"))
    }

    /// Show or hide product codes
    pub fn show_product_code(&self, show: bool) -> Action {
        self.feature
            .set_state(json!({"showProductCode": show}), Some("showProductCode"))
    }

    /// Revert a state update returned by one of the setters
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UndoExtensionMissing`] unless the store was
    /// configured with the undo extension.
    pub fn undo(&self, action: &Action) -> Result<(), StoreError> {
        self.feature.undo(action)
    }

    /// Stop the effects and remove the slice
    pub fn destroy(&self) {
        self.feature.destroy();
    }
}

/// Wait for the first value of `selection` matching `predicate`
///
/// The current value counts. Returns `None` once `timeout` elapses.
pub async fn next_matching<R, F>(
    selection: &Selection<ProductsState, R>,
    predicate: F,
    timeout: Duration,
) -> Option<R>
where
    R: Clone + PartialEq + Send + Sync + 'static,
    F: Fn(&R) -> bool,
{
    let matching = selection.stream().filter(|value| future::ready(predicate(value)));
    futures::pin_mut!(matching);
    tokio::time::timeout(timeout, matching.next()).await.ok().flatten()
}
