//! Append-only price and stock history.
//!
//! One row per detected transition. For a given variant, each row's new
//! value equals the next row's old value; rows are never updated or
//! deleted. The first row of a variant is a seed with `old == new`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ProductId, VariantId};

/// Current known state of a variant, derived from its latest history rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VariantState {
    /// Latest known price, `None` before the first sighting.
    pub price: Option<f64>,
    /// Latest known stock quantity, `None` before the first sighting.
    pub stock_quantity: Option<i32>,
}

/// A price transition of one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistoryEntry {
    /// Variant whose price changed.
    pub variant_id: VariantId,
    /// Product owning the variant.
    pub product_id: ProductId,
    /// Price before the transition.
    pub old_price: f64,
    /// Price after the transition.
    pub new_price: f64,
    /// Detection time.
    pub changed_at: DateTime<Utc>,
}

/// A stock transition of one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockHistoryEntry {
    /// Variant whose stock changed.
    pub variant_id: VariantId,
    /// Product owning the variant.
    pub product_id: ProductId,
    /// Quantity before the transition.
    pub old_quantity: i32,
    /// Quantity after the transition.
    pub new_quantity: i32,
    /// Detection time.
    pub changed_at: DateTime<Utc>,
}
