//! Derived per-product scores: popularity, price trend and update priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PriceHistoryEntry, ProductCounters, ProductId};
use crate::error::PipelineError;

/// Number of price history points returned by an analytics query.
pub const PRICE_HISTORY_WINDOW: usize = 10;

/// Weighted popularity of a product.
///
/// `(views·0.1 + favorites·0.2 + add_to_cart·0.3 + orders·0.4) / 1000`.
/// Re-derived from the latest counters on every analysis.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn popularity_score(counters: &ProductCounters) -> f64 {
    (counters.views as f64 * 0.1
        + counters.favorites as f64 * 0.2
        + counters.add_to_cart as f64 * 0.3
        + counters.orders as f64 * 0.4)
        / 1000.0
}

/// Percentage change between the oldest and the newest point of `history`.
///
/// `history` is newest first, as returned by the history store. Returns 0
/// with fewer than two points or when the oldest price is zero.
#[must_use]
pub fn price_trend(history: &[PriceHistoryEntry]) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }
    let (Some(latest), Some(earliest)) = (history.first(), history.last()) else {
        return 0.0;
    };
    if earliest.new_price == 0.0 {
        return 0.0;
    }
    (latest.new_price - earliest.new_price) / earliest.new_price * 100.0
}

/// Analytics row of a product. Replaced, never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductAnalytics {
    /// Product identifier.
    pub product_id: ProductId,
    /// Counters the score was derived from.
    pub counters: ProductCounters,
    /// Derived popularity score.
    pub popularity_score: f64,
    /// Time of the analysis that produced this row.
    pub last_analyzed_at: DateTime<Utc>,
}

impl ProductAnalytics {
    /// Derives a fresh analytics row from the given counters.
    #[must_use]
    pub fn derive(product_id: ProductId, counters: ProductCounters, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            counters,
            popularity_score: popularity_score(&counters),
            last_analyzed_at: now,
        }
    }
}

/// Crawl priority class of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Default tier.
    Normal = 1,
    /// At least one user favorited the product.
    Favorited = 2,
    /// Reserved for high-demand detection; nothing assigns it yet.
    HighDemand = 3,
}

impl PriorityTier {
    /// Tier for a product with the given favorite status.
    #[must_use]
    pub const fn for_favorited(is_favorited: bool) -> Self {
        if is_favorited {
            Self::Favorited
        } else {
            Self::Normal
        }
    }

    /// Persisted integer form.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    /// Parses the persisted integer form.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] for a value outside 1..=3.
    pub fn from_i16(raw: i16) -> Result<Self, PipelineError> {
        match raw {
            1 => Ok(Self::Normal),
            2 => Ok(Self::Favorited),
            3 => Ok(Self::HighDemand),
            other => Err(PipelineError::Internal(format!(
                "unknown priority tier {other}"
            ))),
        }
    }
}

/// Update priority row of a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatePriority {
    /// Product identifier.
    pub product_id: ProductId,
    /// Assigned tier.
    pub tier: PriorityTier,
    /// Time of the last priority update.
    pub last_updated: DateTime<Utc>,
}

/// Result of an analytics query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    /// Product identifier.
    pub product_id: ProductId,
    /// Stored popularity score.
    pub popularity_score: f64,
    /// Percentage price change across `price_history`.
    pub price_trend: f64,
    /// Always 0: stock trend is not computed yet.
    pub stock_trend: f64,
    /// Favorites counter from the last analysis.
    pub favorite_count_trend: u64,
    /// Most recent price history rows, newest first.
    pub price_history: Vec<PriceHistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VariantId;

    fn point(new_price: f64) -> PriceHistoryEntry {
        PriceHistoryEntry {
            variant_id: VariantId::new(1),
            product_id: ProductId::new(1),
            old_price: new_price,
            new_price,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn popularity_matches_weights() {
        let counters = ProductCounters {
            views: 1000,
            favorites: 500,
            add_to_cart: 300,
            orders: 100,
        };
        assert!((popularity_score(&counters) - 0.33).abs() < 1e-9);
    }

    #[test]
    fn popularity_of_zero_counters_is_zero() {
        assert!(popularity_score(&ProductCounters::default()).abs() < f64::EPSILON);
    }

    #[test]
    fn trend_uses_oldest_and_newest() {
        // Stored newest first: 90 (latest), 120, 100 (earliest).
        let history = vec![point(90.0), point(120.0), point(100.0)];
        assert!((price_trend(&history) - -10.0).abs() < 1e-9);
    }

    #[test]
    fn trend_needs_two_points() {
        assert!(price_trend(&[]).abs() < f64::EPSILON);
        assert!(price_trend(&[point(50.0)]).abs() < f64::EPSILON);
    }

    #[test]
    fn trend_with_zero_base_is_neutral() {
        let history = vec![point(10.0), point(0.0)];
        assert!(price_trend(&history).abs() < f64::EPSILON);
    }

    #[test]
    fn favorited_maps_to_tier_two() {
        assert_eq!(PriorityTier::for_favorited(true).as_i16(), 2);
        assert_eq!(PriorityTier::for_favorited(false).as_i16(), 1);
        assert!(PriorityTier::from_i16(4).is_err());
    }
}
