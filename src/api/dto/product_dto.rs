//! Product DTOs: catalog reads, snapshot analysis, priority and analytics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{
    AnalyticsSnapshot, PriceHistoryEntry, Product, ProductCounters, ProductSnapshot,
    ProductVariant, UpdatePriority, VariantSnapshot,
};

/// One variant of a catalog product.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VariantDto {
    /// Variant identifier.
    pub id: i64,
    /// Last observed price.
    pub price: f64,
    /// Last observed stock quantity.
    pub stock_quantity: i32,
}

impl From<ProductVariant> for VariantDto {
    fn from(variant: ProductVariant) -> Self {
        Self {
            id: variant.id.get(),
            price: variant.price,
            stock_quantity: variant.stock_quantity,
        }
    }
}

/// A catalog product with its variants.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductDto {
    /// Product identifier.
    pub id: i64,
    /// Leaf category the product was discovered under.
    pub category_id: Option<i64>,
    /// Title.
    pub name: String,
    /// Description.
    pub description: String,
    /// Variants ordered by id.
    pub variants: Vec<VariantDto>,
    /// Last time a crawl recorded the product.
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl From<Product> for ProductDto {
    fn from(product: Product) -> Self {
        Self {
            id: product.id.get(),
            category_id: product.category_id.map(i64::from),
            name: product.name,
            description: product.description,
            variants: product.variants.into_iter().map(VariantDto::from).collect(),
            last_crawled_at: product.last_crawled_at,
        }
    }
}

/// Response body for `GET /categories/{id}/products`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    /// Products on this page.
    pub products: Vec<ProductDto>,
    /// Products in the category across all pages.
    pub total: u64,
    /// Page position.
    pub pagination: PaginationMeta,
}

/// A variant inside an analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnapshotVariantDto {
    /// Source-site variant id (numeric string).
    pub id: String,
    /// Observed price.
    pub price: f64,
    /// Observed stock quantity.
    pub stock_quantity: i32,
}

/// A product as observed on the source site.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SnapshotDto {
    /// Source-site product id (numeric string).
    pub id: String,
    /// Title.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Page views.
    #[serde(default)]
    pub view_count: u64,
    /// Users who favorited the product.
    #[serde(default)]
    pub favorite_count: u64,
    /// Add-to-cart actions.
    #[serde(default)]
    pub add_to_cart_count: u64,
    /// Orders.
    #[serde(default)]
    pub order_count: u64,
    /// Variants with price and stock.
    #[serde(default)]
    pub variants: Vec<SnapshotVariantDto>,
}

impl From<SnapshotDto> for ProductSnapshot {
    fn from(dto: SnapshotDto) -> Self {
        Self {
            external_id: dto.id,
            name: dto.name,
            description: dto.description,
            counters: ProductCounters {
                views: dto.view_count,
                favorites: dto.favorite_count,
                add_to_cart: dto.add_to_cart_count,
                orders: dto.order_count,
            },
            variants: dto
                .variants
                .into_iter()
                .map(|v| VariantSnapshot {
                    external_variant_id: v.id,
                    price: v.price,
                    stock_quantity: v.stock_quantity,
                })
                .collect(),
        }
    }
}

/// Request body for `POST /products/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeProductRequest {
    /// The snapshot to analyse.
    pub product: SnapshotDto,
}

/// Response body for `POST /products/analyze`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyzeProductResponse {
    /// `"success"`.
    pub status: String,
    /// Emitted changes, one summary line each.
    pub notifications: Vec<String>,
}

/// Request body for `PUT /products/{id}/priority`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePriorityRequest {
    /// Whether the product is favorited.
    pub is_favorited: bool,
}

/// Response body for `PUT /products/{id}/priority`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PriorityResponse {
    /// Product identifier.
    pub product_id: i64,
    /// 1 normal, 2 favorited, 3 high demand.
    pub priority_tier: i16,
    /// When the tier was set.
    pub last_updated: DateTime<Utc>,
}

impl From<UpdatePriority> for PriorityResponse {
    fn from(priority: UpdatePriority) -> Self {
        Self {
            product_id: priority.product_id.get(),
            priority_tier: priority.tier.as_i16(),
            last_updated: priority.last_updated,
        }
    }
}

/// One point of the price history.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PricePointDto {
    /// Variant whose price changed.
    pub variant_id: i64,
    /// Price before the change.
    pub old_price: f64,
    /// Price after the change.
    pub price: f64,
    /// Detection time.
    pub timestamp: DateTime<Utc>,
}

impl From<PriceHistoryEntry> for PricePointDto {
    fn from(entry: PriceHistoryEntry) -> Self {
        Self {
            variant_id: entry.variant_id.get(),
            old_price: entry.old_price,
            price: entry.new_price,
            timestamp: entry.changed_at,
        }
    }
}

/// Response body for `GET /products/{id}/analytics`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsResponse {
    /// Product identifier.
    pub product_id: i64,
    /// Popularity score of the last analysis.
    pub popularity_score: f64,
    /// Percentage change across the returned history.
    pub price_trend: f64,
    /// Stock trend, currently always 0.
    pub stock_trend: f64,
    /// Favorites counter of the last analysis.
    pub favorite_count_trend: u64,
    /// Most recent price changes, newest first.
    pub price_history: Vec<PricePointDto>,
}

impl From<AnalyticsSnapshot> for AnalyticsResponse {
    fn from(snapshot: AnalyticsSnapshot) -> Self {
        Self {
            product_id: snapshot.product_id.get(),
            popularity_score: snapshot.popularity_score,
            price_trend: snapshot.price_trend,
            stock_trend: snapshot.stock_trend,
            favorite_count_trend: snapshot.favorite_count_trend,
            price_history: snapshot
                .price_history
                .into_iter()
                .map(PricePointDto::from)
                .collect(),
        }
    }
}
