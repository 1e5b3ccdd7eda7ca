//! Database row shapes and their conversion into domain types.
//!
//! Queries fetch plain tuples; these structs name the columns and do the
//! checked conversions (state strings, tier numbers, unsigned counters).

use chrono::{DateTime, Utc};

use crate::domain::{
    CategoryId, CategoryNode, CrawlState, CrawlStatus, Notification, NotificationId,
    NotificationKind, NotificationPreference, PreferenceId, PriceHistoryEntry, PriorityTier,
    ProductAnalytics, ProductCounters, ProductId, UpdatePriority, VariantId,
};
use crate::error::PipelineError;

/// Columns of `categories`: id, name, parent_id, external_id, slug.
pub type CategoryTuple = (i64, String, Option<i64>, String, String);

/// A row of `categories`.
#[derive(Debug, Clone)]
pub struct CategoryRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Parent key.
    pub parent_id: Option<i64>,
    /// Source-site identifier.
    pub external_id: String,
    /// URL slug.
    pub slug: String,
}

impl From<CategoryTuple> for CategoryRow {
    fn from((id, name, parent_id, external_id, slug): CategoryTuple) -> Self {
        Self {
            id,
            name,
            parent_id,
            external_id,
            slug,
        }
    }
}

impl From<CategoryRow> for CategoryNode {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            parent_id: row.parent_id.map(CategoryId::new),
            external_id: row.external_id,
            slug: row.slug,
        }
    }
}

/// A row of `category_crawl_status`.
#[derive(Debug, Clone)]
pub struct CrawlStatusRow {
    /// Category key.
    pub category_id: i64,
    /// Persisted state string.
    pub status: String,
    /// Start of the most recent attempt.
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl TryFrom<CrawlStatusRow> for CrawlStatus {
    type Error = PipelineError;

    fn try_from(row: CrawlStatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            category_id: CategoryId::new(row.category_id),
            state: CrawlState::parse(&row.status)?,
            last_crawled_at: row.last_crawled_at,
        })
    }
}

/// Columns of `price_history`: variant_id, product_id, old, new, changed_at.
pub type PriceHistoryTuple = (i64, i64, f64, f64, DateTime<Utc>);

/// Converts a `price_history` tuple.
#[must_use]
pub fn price_entry(
    (variant_id, product_id, old_price, new_price, changed_at): PriceHistoryTuple,
) -> PriceHistoryEntry {
    PriceHistoryEntry {
        variant_id: VariantId::new(variant_id),
        product_id: ProductId::new(product_id),
        old_price,
        new_price,
        changed_at,
    }
}

/// A row of `product_analytics`.
#[derive(Debug, Clone)]
pub struct AnalyticsRow {
    /// Product key.
    pub product_id: i64,
    /// Views counter.
    pub view_count: i64,
    /// Favorites counter.
    pub favorite_count: i64,
    /// Add-to-cart counter.
    pub cart_count: i64,
    /// Orders counter.
    pub order_count: i64,
    /// Derived score.
    pub popularity_score: f64,
    /// Analysis time.
    pub last_analyzed_at: DateTime<Utc>,
}

impl From<AnalyticsRow> for ProductAnalytics {
    fn from(row: AnalyticsRow) -> Self {
        let counter = |raw: i64| u64::try_from(raw).unwrap_or(0);
        Self {
            product_id: ProductId::new(row.product_id),
            counters: ProductCounters {
                views: counter(row.view_count),
                favorites: counter(row.favorite_count),
                add_to_cart: counter(row.cart_count),
                orders: counter(row.order_count),
            },
            popularity_score: row.popularity_score,
            last_analyzed_at: row.last_analyzed_at,
        }
    }
}

/// Converts an unsigned counter for a `BIGINT` column, saturating.
#[must_use]
pub fn counter_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A row of `update_priority`.
#[derive(Debug, Clone)]
pub struct PriorityRow {
    /// Product key.
    pub product_id: i64,
    /// Persisted tier number.
    pub priority_tier: i16,
    /// Update time.
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<PriorityRow> for UpdatePriority {
    type Error = PipelineError;

    fn try_from(row: PriorityRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: ProductId::new(row.product_id),
            tier: PriorityTier::from_i16(row.priority_tier)?,
            last_updated: row.last_updated,
        })
    }
}

/// Columns of `notification_preferences`:
/// id, user_id, product_id, min_price, max_price, notify_stock.
pub type PreferenceTuple = (i64, String, i64, f64, f64, bool);

/// Converts a `notification_preferences` tuple.
#[must_use]
pub fn preference(
    (id, user_id, product_id, min_price, max_price, notify_stock): PreferenceTuple,
) -> NotificationPreference {
    NotificationPreference {
        id: PreferenceId::new(id),
        user_id,
        product_id: ProductId::new(product_id),
        min_price,
        max_price,
        notify_stock,
    }
}

/// Columns of `notifications`:
/// id, user_id, product_id, kind, message, is_read, created_at.
pub type NotificationTuple = (i64, String, i64, String, String, bool, DateTime<Utc>);

/// Converts a `notifications` tuple.
///
/// # Errors
///
/// Returns [`PipelineError::Internal`] for an unknown kind string.
pub fn notification(
    (id, user_id, product_id, kind, message, is_read, created_at): NotificationTuple,
) -> Result<Notification, PipelineError> {
    Ok(Notification {
        id: NotificationId::new(id),
        user_id,
        product_id: ProductId::new(product_id),
        kind: NotificationKind::parse(&kind)?,
        message,
        is_read,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_crawl_state_is_rejected() {
        let row = CrawlStatusRow {
            category_id: 1,
            status: "paused".to_string(),
            last_crawled_at: None,
        };
        assert!(CrawlStatus::try_from(row).is_err());
    }

    #[test]
    fn negative_counters_read_as_zero() {
        let row = AnalyticsRow {
            product_id: 1,
            view_count: -5,
            favorite_count: 3,
            cart_count: 0,
            order_count: 0,
            popularity_score: 0.0,
            last_analyzed_at: Utc::now(),
        };
        let analytics = ProductAnalytics::from(row);
        assert_eq!(analytics.counters.views, 0);
        assert_eq!(analytics.counters.favorites, 3);
    }

    #[test]
    fn counters_saturate_on_write() {
        assert_eq!(counter_column(u64::MAX), i64::MAX);
        assert_eq!(counter_column(42), 42);
    }
}
