//! Persistence layer: narrow store traits and their backends.
//!
//! Each component only sees the store it needs. [`PostgresStore`] and
//! [`InMemoryStore`] implement every trait, and [`Stores`] bundles one
//! backend behind the individual trait objects.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CategoryId, CategoryNode, CrawlStatus, NewCategory, NewNotification, NewPreference,
    Notification, NotificationId, NotificationPreference, PriceHistoryEntry, Product,
    ProductAnalytics, ProductId, ProductPage, StockHistoryEntry, UpdatePriority, ValidatedSnapshot,
    VariantId, VariantState,
};
use crate::error::PipelineError;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Category tree and per-leaf crawl status.
#[async_trait]
pub trait CategoryStore: Send + Sync + fmt::Debug {
    /// All categories, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn list_categories(&self) -> Result<Vec<CategoryNode>, PipelineError>;

    /// One category by id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn get_category(&self, id: CategoryId) -> Result<Option<CategoryNode>, PipelineError>;

    /// Categories that are nobody's parent, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn leaf_categories(&self) -> Result<Vec<CategoryNode>, PipelineError>;

    /// Inserts a category or updates the name and slug of the one with the
    /// same external id. The parent of an existing node is never changed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if a new node names an unknown
    /// parent, [`PipelineError::TransientIo`] on store failure.
    async fn upsert_category(&self, category: NewCategory) -> Result<CategoryNode, PipelineError>;

    /// Crawl status of a leaf, `None` if it was never crawled.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn crawl_status(&self, id: CategoryId) -> Result<Option<CrawlStatus>, PipelineError>;

    /// Creates or replaces the crawl status of a leaf.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn save_crawl_status(&self, status: &CrawlStatus) -> Result<(), PipelineError>;
}

/// Catalog products as recorded by the crawler.
#[async_trait]
pub trait CatalogStore: Send + Sync + fmt::Debug {
    /// Records a product and its variants under `category_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn upsert_product(
        &self,
        category_id: CategoryId,
        snapshot: &ValidatedSnapshot,
        crawled_at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    /// One page of the products of a category, ordered by id. `page` is
    /// 1-indexed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn list_products(
        &self,
        category_id: CategoryId,
        page: u32,
        per_page: u32,
    ) -> Result<ProductPage, PipelineError>;

    /// One product with its variants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, PipelineError>;
}

/// Append-only price and stock history.
#[async_trait]
pub trait HistoryStore: Send + Sync + fmt::Debug {
    /// Latest known price and stock of a variant.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn variant_state(&self, variant_id: VariantId) -> Result<VariantState, PipelineError>;

    /// Appends a price row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn append_price(&self, entry: &PriceHistoryEntry) -> Result<(), PipelineError>;

    /// Appends a stock row.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn append_stock(&self, entry: &StockHistoryEntry) -> Result<(), PipelineError>;

    /// The `limit` most recent price rows across the variants of a
    /// product, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn recent_price_history(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>, PipelineError>;
}

/// Derived analytics and update priority.
#[async_trait]
pub trait AnalyticsStore: Send + Sync + fmt::Debug {
    /// Replaces the analytics row of a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn save_analytics(&self, analytics: &ProductAnalytics) -> Result<(), PipelineError>;

    /// Analytics row of a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn get_analytics(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductAnalytics>, PipelineError>;

    /// Replaces the priority row of a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn save_priority(&self, priority: &UpdatePriority) -> Result<(), PipelineError>;

    /// Priority row of a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn get_priority(
        &self,
        product_id: ProductId,
    ) -> Result<Option<UpdatePriority>, PipelineError>;
}

/// User notification preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync + fmt::Debug {
    /// All preferences on a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn preferences_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError>;

    /// Preferences on a product with `notify_stock` set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn stock_watchers(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError>;

    /// Stores a new preference and returns it with its id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn create_preference(
        &self,
        preference: NewPreference,
    ) -> Result<NotificationPreference, PipelineError>;
}

/// User notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync + fmt::Debug {
    /// Inserts a notification unless one with the same dedup key exists.
    /// Returns `true` if a row was written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn insert_once(&self, notification: &NewNotification) -> Result<bool, PipelineError>;

    /// Notifications of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn notifications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, PipelineError>;

    /// Marks a notification read. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    async fn mark_read(&self, id: NotificationId) -> Result<bool, PipelineError>;
}

/// One backend seen through each of the store traits.
#[derive(Debug, Clone)]
pub struct Stores {
    /// Category tree and crawl status.
    pub categories: Arc<dyn CategoryStore>,
    /// Catalog products.
    pub catalog: Arc<dyn CatalogStore>,
    /// Price and stock history.
    pub history: Arc<dyn HistoryStore>,
    /// Analytics and priority.
    pub analytics: Arc<dyn AnalyticsStore>,
    /// Notification preferences.
    pub preferences: Arc<dyn PreferenceStore>,
    /// Notifications.
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// Exposes `backend` through every store trait.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CategoryStore
            + CatalogStore
            + HistoryStore
            + AnalyticsStore
            + PreferenceStore
            + NotificationStore
            + 'static,
    {
        Self {
            categories: Arc::clone(&backend) as Arc<dyn CategoryStore>,
            catalog: Arc::clone(&backend) as Arc<dyn CatalogStore>,
            history: Arc::clone(&backend) as Arc<dyn HistoryStore>,
            analytics: Arc::clone(&backend) as Arc<dyn AnalyticsStore>,
            preferences: Arc::clone(&backend) as Arc<dyn PreferenceStore>,
            notifications: backend as Arc<dyn NotificationStore>,
        }
    }
}

/// Inserts [`crate::domain::SEED_TREE`] into an empty category store.
///
/// Returns the number of categories written, 0 if the store already had
/// categories.
///
/// # Errors
///
/// Returns [`PipelineError::TransientIo`] on store failure.
pub async fn seed_categories(store: &dyn CategoryStore) -> Result<usize, PipelineError> {
    if !store.list_categories().await?.is_empty() {
        return Ok(0);
    }
    let mut written = 0;
    for root in crate::domain::SEED_TREE {
        let parent = store
            .upsert_category(NewCategory {
                name: root.name.to_string(),
                parent_id: None,
                external_id: root.external_id.to_string(),
                slug: root.slug.to_string(),
            })
            .await?;
        written += 1;
        for (name, external_id, slug) in root.children {
            store
                .upsert_category(NewCategory {
                    name: (*name).to_string(),
                    parent_id: Some(parent.id),
                    external_id: (*external_id).to_string(),
                    slug: (*slug).to_string(),
                })
                .await?;
            written += 1;
        }
    }
    tracing::info!(categories = written, "seeded category tree");
    Ok(written)
}
