//! Products example binary
//!
//! Loads a small catalog, creates and deletes products, and shows the
//! optimistic delete rolling back while the service is down.

use products_demo::selectors::{get_current_product, get_error, get_products};
use products_demo::{InMemoryProductService, Product, ProductsStore, next_matching};
use slicestore_runtime::{Store, StoreConfig, UndoExtension};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TIMEOUT: Duration = Duration::from_secs(2);

fn catalog() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            ..Product::draft("Leaf Rake", "GDN-0011", 1995)
        },
        Product {
            id: 2,
            ..Product::draft("Garden Cart", "GDN-0023", 3295)
        },
        Product {
            id: 5,
            ..Product::draft("Hammer", "TBX-0048", 899)
        },
    ]
}

fn names(products: &[Product]) -> Vec<&str> {
    products.iter().map(|product| product.name.as_str()).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "products=debug,products_demo=debug,slicestore_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Products Example: slicestore feature store ===\n");

    let store = Store::new();
    store.configure(StoreConfig::default().with_extension(UndoExtension::new()))?;

    let service = Arc::new(InMemoryProductService::new(catalog()).with_latency(Duration::from_millis(50)));
    let products = ProductsStore::new(&store, Arc::clone(&service))?;
    let listing = products.select(get_products());

    println!(">>> Loading products");
    products.load_products();
    if let Some(loaded) = next_matching(&listing, |list| !list.is_empty(), TIMEOUT).await {
        println!("Loaded: {:?}", names(&loaded));
    }

    println!("\n>>> Creating a product");
    products.create_product(Product::draft("Saw", "TBX-0022", 1599));
    let current = products.select(get_current_product());
    if let Some(Some(created)) = next_matching(&current, Option::is_some, TIMEOUT).await {
        println!("Created and selected: {} (id {})", created.name, created.id);
    }

    println!("\n>>> Deleting product 1");
    products.delete_product(1);
    println!("Right after the trigger: {:?}", names(&listing.get()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("Service catalog: {:?}", names(&service.catalog()));

    println!("\n>>> Deleting product 2 while the service is down");
    service.set_unavailable(true);
    products.delete_product(2);
    tokio::time::sleep(Duration::from_millis(10)).await;
    println!("Optimistic state: {:?}", names(&listing.get()));
    let error = products.select(get_error());
    if let Some(message) = next_matching(&error, |message| !message.is_empty(), TIMEOUT).await {
        println!("Rolled back to {:?} after: {message}", names(&listing.get()));
    }
    service.set_unavailable(false);

    println!("\n>>> Toggling product codes, then undoing");
    let toggle = products.show_product_code(true);
    println!("Show codes: {}", products.state().show_product_code);
    products.undo(&toggle)?;
    println!("Show codes after undo: {}", products.state().show_product_code);

    products.destroy();
    println!("\n=== Example Complete ===");
    Ok(())
}
