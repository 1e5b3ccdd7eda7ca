//! Product snapshots: the transient input of the change detector.
//!
//! A [`ProductSnapshot`] is what the product source returns and what the
//! `AnalyzeProduct` call accepts. Identifiers arrive as strings; they are
//! checked in one pass by [`ProductSnapshot::validate`] before anything is
//! written, so a bad snapshot never leaves partial history behind.

use serde::{Deserialize, Serialize};

use super::{ProductId, VariantId};
use crate::error::PipelineError;

/// Engagement counters reported by the source site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCounters {
    /// Product page views.
    #[serde(default)]
    pub views: u64,
    /// Users who favorited the product.
    #[serde(default)]
    pub favorites: u64,
    /// Add-to-cart actions.
    #[serde(default)]
    pub add_to_cart: u64,
    /// Completed orders.
    #[serde(default)]
    pub orders: u64,
}

/// One variant (size, color, ...) of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    /// Source-site variant id. Must be numeric.
    pub external_variant_id: String,
    /// Current price.
    pub price: f64,
    /// Units in stock.
    pub stock_quantity: i32,
}

/// A product as observed on the source site at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Source-site product id. Must be numeric.
    pub external_id: String,
    /// Product title.
    pub name: String,
    /// Product description.
    #[serde(default)]
    pub description: String,
    /// Engagement counters.
    #[serde(default)]
    pub counters: ProductCounters,
    /// Variants with their price and stock.
    #[serde(default)]
    pub variants: Vec<VariantSnapshot>,
}

/// A variant whose identifier and values have been checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedVariant {
    /// Parsed variant id.
    pub id: VariantId,
    /// Price, finite and non-negative.
    pub price: f64,
    /// Stock quantity, non-negative.
    pub stock_quantity: i32,
}

/// A snapshot whose identifiers and values have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSnapshot {
    /// Parsed product id.
    pub product_id: ProductId,
    /// Product title.
    pub name: String,
    /// Product description.
    pub description: String,
    /// Engagement counters.
    pub counters: ProductCounters,
    /// Checked variants, in snapshot order.
    pub variants: Vec<ValidatedVariant>,
}

impl ProductSnapshot {
    /// Checks every identifier and value in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] if the product id or any
    /// variant id is not numeric, a price is negative or not finite, a
    /// stock quantity is negative, or a variant id appears twice.
    pub fn validate(&self) -> Result<ValidatedSnapshot, PipelineError> {
        let product_id: ProductId = self.external_id.parse()?;

        let mut variants: Vec<ValidatedVariant> = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            let id: VariantId = variant.external_variant_id.parse()?;
            if !variant.price.is_finite() || variant.price < 0.0 {
                return Err(PipelineError::Validation(format!(
                    "variant {id}: price {} is not a valid amount",
                    variant.price
                )));
            }
            if variant.stock_quantity < 0 {
                return Err(PipelineError::Validation(format!(
                    "variant {id}: stock quantity {} is negative",
                    variant.stock_quantity
                )));
            }
            if variants.iter().any(|v| v.id == id) {
                return Err(PipelineError::Validation(format!(
                    "variant {id} appears more than once in product {product_id}"
                )));
            }
            variants.push(ValidatedVariant {
                id,
                price: variant.price,
                stock_quantity: variant.stock_quantity,
            });
        }

        Ok(ValidatedSnapshot {
            product_id,
            name: self.name.clone(),
            description: self.description.clone(),
            counters: self.counters,
            variants,
        })
    }
}
