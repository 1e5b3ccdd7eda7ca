//! Preference and notification DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Notification, NotificationPreference};

/// Request body for `POST /preferences`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePreferenceRequest {
    /// Owning user.
    pub user_id: String,
    /// Watched product (numeric string).
    pub product_id: String,
    /// Lower bound of the price band.
    #[serde(default)]
    pub min_price: f64,
    /// Upper bound of the price band, 0 for none.
    #[serde(default)]
    pub max_price: f64,
    /// Notify on stock transitions.
    #[serde(default)]
    pub notify_stock: bool,
}

/// A stored preference.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PreferenceDto {
    /// Preference identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: String,
    /// Watched product.
    pub product_id: i64,
    /// Lower bound of the price band.
    pub min_price: f64,
    /// Upper bound of the price band, 0 for none.
    pub max_price: f64,
    /// Notify on stock transitions.
    pub notify_stock: bool,
}

impl From<NotificationPreference> for PreferenceDto {
    fn from(pref: NotificationPreference) -> Self {
        Self {
            id: pref.id.get(),
            user_id: pref.user_id,
            product_id: pref.product_id.get(),
            min_price: pref.min_price,
            max_price: pref.max_price,
            notify_stock: pref.notify_stock,
        }
    }
}

/// A delivered notification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationDto {
    /// Notification identifier.
    pub id: i64,
    /// Product the notification is about.
    pub product_id: i64,
    /// `PRICE_DROP` or `STOCK_CHANGE`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the user has read it.
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationDto {
    fn from(note: Notification) -> Self {
        Self {
            id: note.id.get(),
            product_id: note.product_id.get(),
            kind: note.kind.as_str().to_string(),
            message: note.message,
            is_read: note.is_read,
            created_at: note.created_at,
        }
    }
}

/// Response body for `GET /users/{user_id}/notifications`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationListResponse {
    /// Recipient.
    pub user_id: String,
    /// Notifications, newest first.
    pub notifications: Vec<NotificationDto>,
}
