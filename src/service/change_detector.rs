//! Change detector: turns product snapshots into history, events and
//! analytics.
//!
//! Every variant of a snapshot is diffed against its latest known state
//! inside a per-variant critical section: read state, append history,
//! publish events, release. Two snapshots of the same variant therefore
//! never both see the same "old" value.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::analytics::{self, PRICE_HISTORY_WINDOW};
use crate::domain::event_bus::publish_change;
use crate::domain::{
    AnalyticsSnapshot, ChangeEvent, EventBus, PriceHistoryEntry, PriorityTier, ProductAnalytics,
    ProductId, ProductSnapshot, StockHistoryEntry, UpdatePriority, ValidatedSnapshot,
    ValidatedVariant, VariantLocks,
};
use crate::error::PipelineError;
use crate::persistence::{AnalyticsStore, HistoryStore};

/// Status reported for a successfully analysed snapshot.
pub const ANALYSIS_SUCCESS: &str = "success";

/// Result of analysing one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// Always [`ANALYSIS_SUCCESS`] when returned.
    pub status: &'static str,
    /// Events emitted, in publication order.
    pub events: Vec<ChangeEvent>,
}

impl AnalysisOutcome {
    /// Events rendered as one-line summaries.
    #[must_use]
    pub fn notifications(&self) -> Vec<String> {
        self.events.iter().map(ChangeEvent::summary).collect()
    }
}

/// The crawler's view of the change detector.
#[async_trait]
pub trait SnapshotAnalyzer: Send + Sync + fmt::Debug {
    /// Analyses one product snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for malformed snapshots and
    /// [`PipelineError::TransientIo`] for store or bus failures.
    async fn analyze(&self, snapshot: &ProductSnapshot) -> Result<AnalysisOutcome, PipelineError>;
}

/// Diffs snapshots against stored history and maintains analytics.
#[derive(Debug)]
pub struct ChangeDetector {
    history: Arc<dyn HistoryStore>,
    analytics: Arc<dyn AnalyticsStore>,
    bus: Arc<dyn EventBus>,
    locks: VariantLocks,
}

impl ChangeDetector {
    /// Creates a detector over the given stores and event bus.
    #[must_use]
    pub fn new(
        history: Arc<dyn HistoryStore>,
        analytics: Arc<dyn AnalyticsStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            history,
            analytics,
            bus,
            locks: VariantLocks::new(),
        }
    }

    /// Validates and applies one snapshot.
    ///
    /// Nothing is written if validation fails. A store or bus failure
    /// aborts the remaining variants of this snapshot only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for non-numeric ids or invalid
    /// values, [`PipelineError::TransientIo`] for store or bus failures.
    pub async fn analyze_snapshot(
        &self,
        snapshot: &ProductSnapshot,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let snapshot = snapshot.validate()?;
        self.apply(&snapshot).await
    }

    async fn apply(&self, snapshot: &ValidatedSnapshot) -> Result<AnalysisOutcome, PipelineError> {
        let now = Utc::now();
        let product_id = snapshot.product_id;

        let mut events = Vec::new();
        for variant in &snapshot.variants {
            events.extend(self.diff_variant(product_id, variant, now).await?);
        }

        let analytics = ProductAnalytics::derive(product_id, snapshot.counters, now);
        self.analytics.save_analytics(&analytics).await?;

        tracing::info!(
            %product_id,
            variants = snapshot.variants.len(),
            events = events.len(),
            popularity = analytics.popularity_score,
            "product analyzed"
        );

        Ok(AnalysisOutcome {
            status: ANALYSIS_SUCCESS,
            events,
        })
    }

    async fn diff_variant(
        &self,
        product_id: ProductId,
        variant: &ValidatedVariant,
        now: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, PipelineError> {
        let _guard = self.locks.acquire(variant.id).await;
        let state = self.history.variant_state(variant.id).await?;
        let mut events = Vec::new();

        let last_price = state.price.unwrap_or(variant.price);
        if state.price.is_none() || last_price != variant.price {
            self.history
                .append_price(&PriceHistoryEntry {
                    variant_id: variant.id,
                    product_id,
                    old_price: last_price,
                    new_price: variant.price,
                    changed_at: now,
                })
                .await?;
            if variant.price < last_price {
                events.push(ChangeEvent::price_change(
                    product_id,
                    variant.id,
                    last_price,
                    variant.price,
                    now,
                ));
            }
        }

        let last_quantity = state.stock_quantity.unwrap_or(variant.stock_quantity);
        if state.stock_quantity.is_none() || last_quantity != variant.stock_quantity {
            self.history
                .append_stock(&StockHistoryEntry {
                    variant_id: variant.id,
                    product_id,
                    old_quantity: last_quantity,
                    new_quantity: variant.stock_quantity,
                    changed_at: now,
                })
                .await?;
            // Only crossings of zero are signalled.
            if (last_quantity == 0) != (variant.stock_quantity == 0) {
                events.push(ChangeEvent::stock_change(
                    product_id,
                    variant.id,
                    last_quantity,
                    variant.stock_quantity,
                    now,
                ));
            }
        }

        if state.price.is_none() {
            tracing::debug!(%product_id, variant_id = %variant.id, "variant history seeded");
        }

        for event in &events {
            publish_change(self.bus.as_ref(), event).await?;
            tracing::debug!(
                %product_id,
                variant_id = %variant.id,
                event_id = %event.event_id(),
                event_type = event.event_type_str(),
                "change event published"
            );
        }
        Ok(events)
    }

    /// Sets the update priority of a product from its favorite status,
    /// overwriting any previous tier.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn update_priority(
        &self,
        product_id: &str,
        is_favorited: bool,
    ) -> Result<UpdatePriority, PipelineError> {
        let product_id: ProductId = product_id.parse()?;
        let priority = UpdatePriority {
            product_id,
            tier: PriorityTier::for_favorited(is_favorited),
            last_updated: Utc::now(),
        };
        self.analytics.save_priority(&priority).await?;
        tracing::info!(%product_id, tier = priority.tier.as_i16(), "update priority set");
        Ok(priority)
    }

    /// Popularity, recent price history and price trend of a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id,
    /// [`PipelineError::NotFound`] if the product was never analysed and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn analytics_snapshot(
        &self,
        product_id: &str,
    ) -> Result<AnalyticsSnapshot, PipelineError> {
        let product_id: ProductId = product_id.parse()?;
        let stored = self
            .analytics
            .get_analytics(product_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("product analytics", product_id))?;
        let price_history = self
            .history
            .recent_price_history(product_id, PRICE_HISTORY_WINDOW)
            .await?;

        Ok(AnalyticsSnapshot {
            product_id,
            popularity_score: stored.popularity_score,
            price_trend: analytics::price_trend(&price_history),
            stock_trend: 0.0,
            favorite_count_trend: stored.counters.favorites,
            price_history,
        })
    }
}

#[async_trait]
impl SnapshotAnalyzer for ChangeDetector {
    async fn analyze(&self, snapshot: &ProductSnapshot) -> Result<AnalysisOutcome, PipelineError> {
        self.analyze_snapshot(snapshot).await
    }
}
