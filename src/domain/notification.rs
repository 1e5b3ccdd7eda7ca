//! Notification preferences and the notifications derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{NotificationId, PreferenceId, ProductId};
use crate::error::PipelineError;

/// A user's standing interest in a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPreference {
    /// Preference identifier.
    pub id: PreferenceId,
    /// Owning user.
    pub user_id: String,
    /// Watched product.
    pub product_id: ProductId,
    /// Lower bound of the desired price band (inclusive).
    pub min_price: f64,
    /// Upper bound of the desired price band (inclusive). `0` means no bound.
    pub max_price: f64,
    /// Whether stock transitions should notify.
    pub notify_stock: bool,
}

impl NotificationPreference {
    /// Returns `true` if `new_price` falls inside the desired band.
    #[must_use]
    pub fn wants_price(&self, new_price: f64) -> bool {
        new_price >= self.min_price && (self.max_price <= 0.0 || new_price <= self.max_price)
    }
}

/// A preference before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPreference {
    /// Owning user.
    pub user_id: String,
    /// Watched product.
    pub product_id: ProductId,
    /// Lower bound of the desired price band.
    pub min_price: f64,
    /// Upper bound of the desired price band, `0` for none.
    pub max_price: f64,
    /// Whether stock transitions should notify.
    pub notify_stock: bool,
}

impl NewPreference {
    /// Checks the user id and price band.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for an empty user id, a
    /// negative or non-finite bound, or `min_price > max_price` when an
    /// upper bound is set.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.user_id.trim().is_empty() {
            return Err(PipelineError::Validation("user id must not be empty".to_string()));
        }
        for (label, value) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Validation(format!(
                    "{label} {value} is not a valid amount"
                )));
            }
        }
        if self.max_price > 0.0 && self.min_price > self.max_price {
            return Err(PipelineError::Validation(format!(
                "min_price {} exceeds max_price {}",
                self.min_price, self.max_price
            )));
        }
        Ok(())
    }
}

/// Kind of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// The price dropped into the user's band.
    PriceDrop,
    /// The product went out of stock or came back.
    StockChange,
}

impl NotificationKind {
    /// Persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceDrop => "PRICE_DROP",
            Self::StockChange => "STOCK_CHANGE",
        }
    }

    /// Parses the persisted string form.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Internal`] for an unknown kind.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        match raw {
            "PRICE_DROP" => Ok(Self::PriceDrop),
            "STOCK_CHANGE" => Ok(Self::StockChange),
            other => Err(PipelineError::Internal(format!(
                "unknown notification kind `{other}`"
            ))),
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Notification identifier.
    pub id: NotificationId,
    /// Recipient.
    pub user_id: String,
    /// Product the notification is about.
    pub product_id: ProductId,
    /// Kind.
    pub kind: NotificationKind,
    /// Human-readable message.
    pub message: String,
    /// Whether the user has read it.
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A notification before insertion, with its deduplication key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    /// `"{event_id}:{preference_id}"`, unique across all notifications.
    pub dedup_key: String,
    /// Recipient.
    pub user_id: String,
    /// Product the notification is about.
    pub product_id: ProductId,
    /// Kind.
    pub kind: NotificationKind,
    /// Human-readable message.
    pub message: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl NewNotification {
    /// Builds the notification of `preference` for event `event_id`.
    #[must_use]
    pub fn for_preference(
        event_id: Uuid,
        preference: &NotificationPreference,
        kind: NotificationKind,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dedup_key: dedup_key(event_id, preference.id),
            user_id: preference.user_id.clone(),
            product_id: preference.product_id,
            kind,
            message,
            created_at,
        }
    }
}

/// Deduplication key of the notification produced by one preference for
/// one event.
#[must_use]
pub fn dedup_key(event_id: Uuid, preference_id: PreferenceId) -> String {
    format!("{event_id}:{preference_id}")
}

/// Message of a price-drop notification.
#[must_use]
pub fn price_drop_message(old_price: f64, new_price: f64) -> String {
    format!("Price dropped from {old_price:.2} to {new_price:.2}")
}

/// Message of a stock notification.
#[must_use]
pub fn stock_message(new_quantity: i32) -> String {
    let status = if new_quantity == 0 {
        "out of stock"
    } else {
        "back in stock"
    };
    format!("Product is now {status}")
}
