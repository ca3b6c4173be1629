//! Memoized selectors over [`ProductsState`]

use crate::types::{Product, ProductsState};
use slicestore_core::selector::{Selector, create_selector, create_selector2};

/// All loaded products
#[must_use]
pub fn get_products() -> Selector<ProductsState, Vec<Product>> {
    Selector::new(|state: &ProductsState| state.products.clone())
}

/// Identifier of the selected product
#[must_use]
pub fn get_current_product_id() -> Selector<ProductsState, Option<u32>> {
    Selector::new(|state: &ProductsState| state.current_product_id)
}

/// Whether product codes are shown
#[must_use]
pub fn get_show_product_code() -> Selector<ProductsState, bool> {
    Selector::new(|state: &ProductsState| state.show_product_code)
}

/// Last service error
#[must_use]
pub fn get_error() -> Selector<ProductsState, String> {
    Selector::new(|state: &ProductsState| state.error.clone())
}

/// The selected product, if it is loaded
#[must_use]
pub fn get_current_product() -> Selector<ProductsState, Option<Product>> {
    create_selector2(&get_products(), &get_current_product_id(), |products, id| {
        id.and_then(|id| products.iter().find(|product| product.id == id).cloned())
    })
}

/// The product `id`, if it is loaded
#[must_use]
pub fn get_product_by_id(id: u32) -> Selector<ProductsState, Option<Product>> {
    create_selector(&get_products(), move |products: &Vec<Product>| {
        products.iter().find(|product| product.id == id).cloned()
    })
}
