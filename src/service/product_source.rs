//! Product source: where the crawler gets listings from.
//!
//! The real fetcher (HTML scraping or a partner API) lives outside this
//! crate. [`StaticProductSource`] serves fixed listings per leaf, and can
//! synthesize a small demo feed so the service runs end to end.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{CategoryId, CategoryNode, ProductCounters, ProductSnapshot, VariantSnapshot};
use crate::error::FetchError;

/// Fetches the current product listing of one leaf category.
#[async_trait]
pub trait ProductSource: Send + Sync + fmt::Debug {
    /// Returns every product currently listed under `leaf`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the listing could not be retrieved or
    /// understood.
    async fn fetch(&self, leaf: &CategoryNode) -> Result<Vec<ProductSnapshot>, FetchError>;
}

/// In-process product source with per-leaf fixtures.
#[derive(Debug, Default)]
pub struct StaticProductSource {
    listings: RwLock<HashMap<CategoryId, Result<Vec<ProductSnapshot>, FetchError>>>,
    demo_feed: bool,
}

impl StaticProductSource {
    /// Creates a source with no listings. Unknown leaves yield nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that synthesizes [`demo_listing`] for every leaf
    /// without an explicit fixture.
    #[must_use]
    pub fn with_demo_feed() -> Self {
        Self {
            listings: RwLock::default(),
            demo_feed: true,
        }
    }

    /// Sets the listing returned for `leaf`.
    pub async fn set_listing(&self, leaf: CategoryId, products: Vec<ProductSnapshot>) {
        self.listings.write().await.insert(leaf, Ok(products));
    }

    /// Makes fetches of `leaf` fail with `error`.
    pub async fn fail_leaf(&self, leaf: CategoryId, error: FetchError) {
        self.listings.write().await.insert(leaf, Err(error));
    }
}

#[async_trait]
impl ProductSource for StaticProductSource {
    async fn fetch(&self, leaf: &CategoryNode) -> Result<Vec<ProductSnapshot>, FetchError> {
        if let Some(listing) = self.listings.read().await.get(&leaf.id) {
            return listing.clone();
        }
        if self.demo_feed {
            return Ok(demo_listing(leaf.id));
        }
        Ok(Vec::new())
    }
}

/// Two products per leaf with two variants each, priced 99.99 and 109.99
/// with five units in stock.
///
/// Product ids are `leaf * 100 + n`, variant ids `product * 10 + k`.
#[must_use]
pub fn demo_listing(leaf: CategoryId) -> Vec<ProductSnapshot> {
    (1..=2)
        .map(|n| {
            let product_id = leaf.get() * 100 + n;
            ProductSnapshot {
                external_id: product_id.to_string(),
                name: format!("Mock Product {n}"),
                description: "This is a mock product for testing".to_string(),
                counters: ProductCounters {
                    views: 1000,
                    favorites: 50,
                    add_to_cart: 20,
                    orders: 5,
                },
                variants: [99.99, 109.99]
                    .iter()
                    .zip(1..)
                    .map(|(&price, k)| VariantSnapshot {
                        external_variant_id: (product_id * 10 + k).to_string(),
                        price,
                        stock_quantity: 5,
                    })
                    .collect(),
            }
        })
        .collect()
}
