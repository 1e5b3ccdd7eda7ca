//! Catalog products as recorded by the crawl orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{CategoryId, ProductId, VariantId};

/// A variant row of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductVariant {
    /// Variant identifier.
    pub id: VariantId,
    /// Last observed price.
    pub price: f64,
    /// Last observed stock quantity.
    pub stock_quantity: i32,
}

/// A catalog product with its variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Leaf category the product was discovered under.
    pub category_id: Option<CategoryId>,
    /// Product title.
    pub name: String,
    /// Product description.
    pub description: String,
    /// Variants, ordered by id.
    pub variants: Vec<ProductVariant>,
    /// Last time a crawl recorded this product.
    pub last_crawled_at: Option<DateTime<Utc>>,
}

/// One page of products and the total count across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductPage {
    /// Products on the requested page.
    pub products: Vec<Product>,
    /// Total products in the category.
    pub total: u64,
}
