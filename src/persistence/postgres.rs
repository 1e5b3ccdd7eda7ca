//! PostgreSQL backend over `sqlx::PgPool`.
//!
//! Upserts are single `INSERT ... ON CONFLICT` statements; notification
//! deduplication relies on the unique `dedup_key` column.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::{
    self, AnalyticsRow, CategoryRow, CategoryTuple, CrawlStatusRow, NotificationTuple,
    PreferenceTuple, PriceHistoryTuple, PriorityRow,
};
use super::{
    AnalyticsStore, CatalogStore, CategoryStore, HistoryStore, NotificationStore, PreferenceStore,
};
use crate::domain::{
    CategoryId, CategoryNode, CrawlStatus, NewCategory, NewNotification, NewPreference,
    Notification, NotificationId, NotificationPreference, PriceHistoryEntry, Product,
    ProductAnalytics, ProductId, ProductPage, ProductVariant, StockHistoryEntry, UpdatePriority,
    ValidatedSnapshot, VariantId, VariantState,
};
use crate::error::PipelineError;

const CATEGORY_COLUMNS: &str = "id, name, parent_id, external_id, slug";
const PREFERENCE_COLUMNS: &str = "id, user_id, product_id, min_price, max_price, notify_stock";

type ProductTuple = (i64, Option<i64>, String, String, Option<DateTime<Utc>>);
type VariantTuple = (i64, i64, f64, i32);

/// PostgreSQL-backed store implementing every store trait.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if the database is
    /// unreachable within `connect_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), PipelineError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn variants_of(
        &self,
        product_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ProductVariant>>, PipelineError> {
        let rows = sqlx::query_as::<_, VariantTuple>(
            "SELECT id, product_id, price, stock_quantity FROM product_variants \
             WHERE product_id = ANY($1) ORDER BY id",
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<ProductVariant>> = HashMap::new();
        for (id, product_id, price, stock_quantity) in rows {
            grouped.entry(product_id).or_default().push(ProductVariant {
                id: VariantId::new(id),
                price,
                stock_quantity,
            });
        }
        Ok(grouped)
    }

    fn assemble(
        rows: Vec<ProductTuple>,
        mut variants: HashMap<i64, Vec<ProductVariant>>,
    ) -> Vec<Product> {
        rows.into_iter()
            .map(|(id, category_id, name, description, last_crawled_at)| Product {
                id: ProductId::new(id),
                category_id: category_id.map(CategoryId::new),
                name,
                description,
                variants: variants.remove(&id).unwrap_or_default(),
                last_crawled_at,
            })
            .collect()
    }
}

#[async_trait]
impl CategoryStore for PostgresStore {
    async fn list_categories(&self) -> Result<Vec<CategoryNode>, PipelineError> {
        let rows = sqlx::query_as::<_, CategoryTuple>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|t| CategoryRow::from(t).into()).collect())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<CategoryNode>, PipelineError> {
        let row = sqlx::query_as::<_, CategoryTuple>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|t| CategoryRow::from(t).into()))
    }

    async fn leaf_categories(&self) -> Result<Vec<CategoryNode>, PipelineError> {
        let rows = sqlx::query_as::<_, CategoryTuple>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE id NOT IN (SELECT parent_id FROM categories WHERE parent_id IS NOT NULL) \
             ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|t| CategoryRow::from(t).into()).collect())
    }

    async fn upsert_category(&self, new: NewCategory) -> Result<CategoryNode, PipelineError> {
        let parent_id = new.parent_id;
        let row = sqlx::query_as::<_, CategoryTuple>(&format!(
            "INSERT INTO categories (name, parent_id, external_id, slug) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (external_id) DO UPDATE \
             SET name = EXCLUDED.name, slug = EXCLUDED.slug, updated_at = now() \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(new.name)
        .bind(parent_id.map(CategoryId::get))
        .bind(new.external_id)
        .bind(new.slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let orphan = e
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation());
            match (orphan, parent_id) {
                (true, Some(parent)) => PipelineError::not_found("category", parent),
                _ => PipelineError::from(e),
            }
        })?;
        Ok(CategoryRow::from(row).into())
    }

    async fn crawl_status(&self, id: CategoryId) -> Result<Option<CrawlStatus>, PipelineError> {
        let row = sqlx::query_as::<_, (i64, String, Option<DateTime<Utc>>)>(
            "SELECT category_id, status, last_crawled_at FROM category_crawl_status \
             WHERE category_id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(category_id, status, last_crawled_at)| {
            CrawlStatus::try_from(CrawlStatusRow {
                category_id,
                status,
                last_crawled_at,
            })
        })
        .transpose()
    }

    async fn save_crawl_status(&self, status: &CrawlStatus) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO category_crawl_status (category_id, status, last_crawled_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (category_id) DO UPDATE \
             SET status = EXCLUDED.status, last_crawled_at = EXCLUDED.last_crawled_at",
        )
        .bind(status.category_id.get())
        .bind(status.state.as_str())
        .bind(status.last_crawled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn upsert_product(
        &self,
        category_id: CategoryId,
        snapshot: &ValidatedSnapshot,
        crawled_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO products (id, category_id, name, description, last_crawled_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET category_id = EXCLUDED.category_id, \
             name = EXCLUDED.name, description = EXCLUDED.description, \
             last_crawled_at = EXCLUDED.last_crawled_at",
        )
        .bind(snapshot.product_id.get())
        .bind(category_id.get())
        .bind(&snapshot.name)
        .bind(&snapshot.description)
        .bind(crawled_at)
        .execute(&mut *tx)
        .await?;

        for variant in &snapshot.variants {
            sqlx::query(
                "INSERT INTO product_variants (id, product_id, price, stock_quantity) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (id) DO UPDATE SET product_id = EXCLUDED.product_id, \
                 price = EXCLUDED.price, stock_quantity = EXCLUDED.stock_quantity",
            )
            .bind(variant.id.get())
            .bind(snapshot.product_id.get())
            .bind(variant.price)
            .bind(variant.stock_quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_products(
        &self,
        category_id: CategoryId,
        page: u32,
        per_page: u32,
    ) -> Result<ProductPage, PipelineError> {
        let per_page = i64::from(per_page.max(1));
        let offset = (i64::from(page.max(1)) - 1) * per_page;

        let total =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products WHERE category_id = $1")
                .bind(category_id.get())
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, ProductTuple>(
            "SELECT id, category_id, name, description, last_crawled_at FROM products \
             WHERE category_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(category_id.get())
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.0).collect();
        let variants = self.variants_of(&ids).await?;
        Ok(ProductPage {
            products: Self::assemble(rows, variants),
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, PipelineError> {
        let Some(row) = sqlx::query_as::<_, ProductTuple>(
            "SELECT id, category_id, name, description, last_crawled_at FROM products WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let variants = self.variants_of(&[id.get()]).await?;
        Ok(Self::assemble(vec![row], variants).into_iter().next())
    }
}

#[async_trait]
impl HistoryStore for PostgresStore {
    async fn variant_state(&self, variant_id: VariantId) -> Result<VariantState, PipelineError> {
        let (price, stock_quantity) = sqlx::query_as::<_, (Option<f64>, Option<i32>)>(
            "SELECT \
             (SELECT new_price FROM price_history WHERE variant_id = $1 ORDER BY id DESC LIMIT 1), \
             (SELECT new_quantity FROM stock_history WHERE variant_id = $1 ORDER BY id DESC LIMIT 1)",
        )
        .bind(variant_id.get())
        .fetch_one(&self.pool)
        .await?;
        Ok(VariantState {
            price,
            stock_quantity,
        })
    }

    async fn append_price(&self, entry: &PriceHistoryEntry) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO price_history (variant_id, product_id, old_price, new_price, changed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.variant_id.get())
        .bind(entry.product_id.get())
        .bind(entry.old_price)
        .bind(entry.new_price)
        .bind(entry.changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_stock(&self, entry: &StockHistoryEntry) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO stock_history (variant_id, product_id, old_quantity, new_quantity, changed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.variant_id.get())
        .bind(entry.product_id.get())
        .bind(entry.old_quantity)
        .bind(entry.new_quantity)
        .bind(entry.changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_price_history(
        &self,
        product_id: ProductId,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>, PipelineError> {
        let rows = sqlx::query_as::<_, PriceHistoryTuple>(
            "SELECT variant_id, product_id, old_price, new_price, changed_at FROM price_history \
             WHERE product_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(product_id.get())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(models::price_entry).collect())
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStore {
    async fn save_analytics(&self, analytics: &ProductAnalytics) -> Result<(), PipelineError> {
        let counters = analytics.counters;
        sqlx::query(
            "INSERT INTO product_analytics \
             (product_id, view_count, favorite_count, cart_count, order_count, popularity_score, last_analyzed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (product_id) DO UPDATE SET view_count = EXCLUDED.view_count, \
             favorite_count = EXCLUDED.favorite_count, cart_count = EXCLUDED.cart_count, \
             order_count = EXCLUDED.order_count, popularity_score = EXCLUDED.popularity_score, \
             last_analyzed_at = EXCLUDED.last_analyzed_at",
        )
        .bind(analytics.product_id.get())
        .bind(models::counter_column(counters.views))
        .bind(models::counter_column(counters.favorites))
        .bind(models::counter_column(counters.add_to_cart))
        .bind(models::counter_column(counters.orders))
        .bind(analytics.popularity_score)
        .bind(analytics.last_analyzed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_analytics(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductAnalytics>, PipelineError> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, f64, DateTime<Utc>)>(
            "SELECT product_id, view_count, favorite_count, cart_count, order_count, \
             popularity_score, last_analyzed_at FROM product_analytics WHERE product_id = $1",
        )
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(
                product_id,
                view_count,
                favorite_count,
                cart_count,
                order_count,
                popularity_score,
                last_analyzed_at,
            )| {
                AnalyticsRow {
                    product_id,
                    view_count,
                    favorite_count,
                    cart_count,
                    order_count,
                    popularity_score,
                    last_analyzed_at,
                }
                .into()
            },
        ))
    }

    async fn save_priority(&self, priority: &UpdatePriority) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO update_priority (product_id, priority_tier, last_updated) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (product_id) DO UPDATE \
             SET priority_tier = EXCLUDED.priority_tier, last_updated = EXCLUDED.last_updated",
        )
        .bind(priority.product_id.get())
        .bind(priority.tier.as_i16())
        .bind(priority.last_updated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_priority(
        &self,
        product_id: ProductId,
    ) -> Result<Option<UpdatePriority>, PipelineError> {
        let row = sqlx::query_as::<_, (i64, i16, DateTime<Utc>)>(
            "SELECT product_id, priority_tier, last_updated FROM update_priority \
             WHERE product_id = $1",
        )
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(product_id, priority_tier, last_updated)| {
            UpdatePriority::try_from(PriorityRow {
                product_id,
                priority_tier,
                last_updated,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl PreferenceStore for PostgresStore {
    async fn preferences_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError> {
        let rows = sqlx::query_as::<_, PreferenceTuple>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences \
             WHERE product_id = $1 ORDER BY id"
        ))
        .bind(product_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(models::preference).collect())
    }

    async fn stock_watchers(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<NotificationPreference>, PipelineError> {
        let rows = sqlx::query_as::<_, PreferenceTuple>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences \
             WHERE product_id = $1 AND notify_stock = TRUE ORDER BY id"
        ))
        .bind(product_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(models::preference).collect())
    }

    async fn create_preference(
        &self,
        new: NewPreference,
    ) -> Result<NotificationPreference, PipelineError> {
        let row = sqlx::query_as::<_, PreferenceTuple>(&format!(
            "INSERT INTO notification_preferences \
             (user_id, product_id, min_price, max_price, notify_stock) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PREFERENCE_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(new.product_id.get())
        .bind(new.min_price)
        .bind(new.max_price)
        .bind(new.notify_stock)
        .fetch_one(&self.pool)
        .await?;
        Ok(models::preference(row))
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn insert_once(&self, new: &NewNotification) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            "INSERT INTO notifications (dedup_key, user_id, product_id, kind, message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (dedup_key) DO NOTHING",
        )
        .bind(&new.dedup_key)
        .bind(&new.user_id)
        .bind(new.product_id.get())
        .bind(new.kind.as_str())
        .bind(&new.message)
        .bind(new.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn notifications_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, PipelineError> {
        let rows = sqlx::query_as::<_, NotificationTuple>(
            "SELECT id, user_id, product_id, kind, message, is_read, created_at \
             FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(models::notification).collect()
    }

    async fn mark_read(&self, id: NotificationId) -> Result<bool, PipelineError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
