//! Change events emitted by the change detector.
//!
//! The wire envelope is adjacently tagged:
//!
//! ```json
//! {"type": "price_change", "data": {"event_id": "...", "product_id": 12345, ...}}
//! ```
//!
//! Payloads are decoded once at the bus boundary with
//! [`ChangeEvent::decode`]; anything that does not fit the envelope is
//! rejected there instead of failing deep inside a handler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProductId, VariantId};
use crate::error::PipelineError;

/// A detected price or stock transition of one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The price of a variant dropped.
    PriceChange {
        /// Unique event identity, stable across redeliveries.
        event_id: Uuid,
        /// Product owning the variant.
        product_id: ProductId,
        /// Variant whose price changed.
        variant_id: VariantId,
        /// Price before the change.
        old_price: f64,
        /// Price after the change.
        new_price: f64,
        /// Detection time.
        detected_at: DateTime<Utc>,
    },

    /// The stock of a variant ran out or came back.
    StockChange {
        /// Unique event identity, stable across redeliveries.
        event_id: Uuid,
        /// Product owning the variant.
        product_id: ProductId,
        /// Variant whose stock changed.
        variant_id: VariantId,
        /// Quantity before the change.
        old_quantity: i32,
        /// Quantity after the change.
        new_quantity: i32,
        /// Detection time.
        detected_at: DateTime<Utc>,
    },
}

impl ChangeEvent {
    /// Builds a price event with a fresh identity.
    #[must_use]
    pub fn price_change(
        product_id: ProductId,
        variant_id: VariantId,
        old_price: f64,
        new_price: f64,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self::PriceChange {
            event_id: Uuid::new_v4(),
            product_id,
            variant_id,
            old_price,
            new_price,
            detected_at,
        }
    }

    /// Builds a stock event with a fresh identity.
    #[must_use]
    pub fn stock_change(
        product_id: ProductId,
        variant_id: VariantId,
        old_quantity: i32,
        new_quantity: i32,
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self::StockChange {
            event_id: Uuid::new_v4(),
            product_id,
            variant_id,
            old_quantity,
            new_quantity,
            detected_at,
        }
    }

    /// Returns the event identity.
    #[must_use]
    pub const fn event_id(&self) -> Uuid {
        match self {
            Self::PriceChange { event_id, .. } | Self::StockChange { event_id, .. } => *event_id,
        }
    }

    /// Returns the product the event belongs to.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        match self {
            Self::PriceChange { product_id, .. } | Self::StockChange { product_id, .. } => {
                *product_id
            }
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PriceChange { .. } => "price_change",
            Self::StockChange { .. } => "stock_change",
        }
    }

    /// Bus partition key: events of one product share a partition.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.product_id().to_string()
    }

    /// One-line summary returned by `AnalyzeProduct`.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::PriceChange {
                variant_id,
                old_price,
                new_price,
                ..
            } => format!(
                "price_drop:variant_id={variant_id}:old_price={old_price:.2}:new_price={new_price:.2}"
            ),
            Self::StockChange {
                variant_id,
                new_quantity,
                ..
            } => {
                if *new_quantity == 0 {
                    format!("out_of_stock:variant_id={variant_id}")
                } else {
                    format!("back_in_stock:variant_id={variant_id}")
                }
            }
        }
    }

    /// Encodes the event into its wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for unknown types, missing
    /// fields or malformed JSON.
    pub fn decode(payload: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(payload)
            .map_err(|e| PipelineError::Validation(format!("malformed change event: {e}")))
    }
}
