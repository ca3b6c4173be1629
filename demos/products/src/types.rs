//! Domain types for the products example

use serde::{Deserialize, Serialize};

/// A product of the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Identifier assigned by the product service
    pub id: u32,
    /// Display name
    pub name: String,
    /// Catalog code, e.g. `GDN-0011`
    pub code: String,
    /// Price in cents
    pub price: u64,
}

impl Product {
    /// Create a product without an identifier yet (`id` is 0)
    #[must_use]
    pub fn draft(name: impl Into<String>, code: impl Into<String>, price: u64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            code: code.into(),
            price,
        }
    }
}

/// State of the `products` slice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsState {
    /// Whether product codes are shown in listings
    pub show_product_code: bool,
    /// Currently selected product
    pub current_product_id: Option<u32>,
    /// Loaded products
    pub products: Vec<Product>,
    /// Last service error, empty when the last request succeeded
    pub error: String,
}

/// Returns `products` without the product `id`
#[must_use]
pub fn without(products: &[Product], id: u32) -> Vec<Product> {
    products.iter().filter(|product| product.id != id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_uses_camel_case_keys() {
        let state = ProductsState {
            current_product_id: Some(2),
            ..ProductsState::default()
        };

        assert_eq!(
            serde_json::to_value(state).ok(),
            Some(json!({
                "showProductCode": false,
                "currentProductId": 2,
                "products": [],
                "error": ""
            }))
        );
    }

    #[test]
    fn without_keeps_order() {
        let products: Vec<Product> = (1..=3)
            .map(|id| Product {
                id,
                ..Product::draft(format!("p{id}"), "X", 1)
            })
            .collect();

        let ids: Vec<u32> = without(&products, 2).iter().map(|product| product.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
