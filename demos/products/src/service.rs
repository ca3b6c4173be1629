//! Product service abstraction and an in-memory implementation
//!
//! Effects only see the [`ProductService`] trait, so tests can swap in an
//! implementation that fails on demand.

use crate::types::Product;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`ProductService`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    /// No product with this identifier exists
    #[error("Product {0} not found")]
    NotFound(u32),

    /// The service is not reachable
    #[error("Product service unavailable")]
    Unavailable,
}

/// Backend for the products feature
pub trait ProductService: Send + Sync + 'static {
    /// Fetch every product
    fn get_products(&self) -> impl Future<Output = Result<Vec<Product>, ProductError>> + Send;

    /// Store a new product, returning it with its assigned identifier
    fn create_product(&self, product: Product) -> impl Future<Output = Result<Product, ProductError>> + Send;

    /// Delete the product `id`
    fn delete_product(&self, id: u32) -> impl Future<Output = Result<(), ProductError>> + Send;
}

/// Product service keeping its catalog in memory
#[derive(Debug)]
pub struct InMemoryProductService {
    products: Mutex<Vec<Product>>,
    next_id: AtomicU32,
    latency: Duration,
    unavailable: AtomicBool,
}

impl InMemoryProductService {
    /// Create a service seeded with `products`
    ///
    /// Identifiers of seeded products are kept; new products are numbered
    /// after the highest one.
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let next_id = products.iter().map(|product| product.id).max().unwrap_or(0) + 1;
        Self {
            products: Mutex::new(products),
            next_id: AtomicU32::new(next_id),
            latency: Duration::ZERO,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Delay every request by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every following request fail with [`ProductError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the stored catalog
    #[must_use]
    pub fn catalog(&self) -> Vec<Product> {
        self.products.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn request(&self) -> Result<(), ProductError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProductError::Unavailable);
        }
        Ok(())
    }
}

impl ProductService for InMemoryProductService {
    async fn get_products(&self) -> Result<Vec<Product>, ProductError> {
        self.request().await?;
        Ok(self.catalog())
    }

    async fn create_product(&self, product: Product) -> Result<Product, ProductError> {
        self.request().await?;
        let created = Product {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            ..product
        };
        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(created.clone());
        Ok(created)
    }

    async fn delete_product(&self, id: u32) -> Result<(), ProductError> {
        self.request().await?;
        let mut products = self.products.lock().unwrap_or_else(PoisonError::into_inner);
        let index = products
            .iter()
            .position(|product| product.id == id)
            .ok_or(ProductError::NotFound(id))?;
        products.remove(index);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> InMemoryProductService {
        InMemoryProductService::new(vec![Product {
            id: 7,
            ..Product::draft("Hammer", "TBX-0048", 899)
        }])
    }

    #[tokio::test]
    async fn created_products_are_numbered_after_seed() {
        let service = service();
        let created = service
            .create_product(Product::draft("Saw", "TBX-0022", 1599))
            .await
            .unwrap();

        assert_eq!(created.id, 8);
        assert_eq!(service.get_products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_unknown_product_fails() {
        let service = service();
        assert_eq!(service.delete_product(1).await, Err(ProductError::NotFound(1)));
        assert_eq!(service.catalog().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_service_rejects_requests() {
        let service = service();
        service.set_unavailable(true);

        assert_eq!(service.get_products().await, Err(ProductError::Unavailable));
        assert_eq!(service.delete_product(7).await, Err(ProductError::Unavailable));
        assert_eq!(service.catalog().len(), 1);
    }
}
