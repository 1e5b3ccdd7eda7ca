//! User inbox: notification preferences and delivered notifications.

use std::sync::Arc;

use crate::domain::{
    NewPreference, Notification, NotificationId, NotificationPreference, ProductId,
};
use crate::error::PipelineError;
use crate::persistence::{NotificationStore, PreferenceStore};

/// Preference registration and notification reads.
#[derive(Debug, Clone)]
pub struct InboxService {
    preferences: Arc<dyn PreferenceStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl InboxService {
    /// Creates an inbox service.
    #[must_use]
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            preferences,
            notifications,
        }
    }

    /// Registers a user's interest in a product.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric product id
    /// or an invalid price band, and [`PipelineError::TransientIo`] on
    /// store failure.
    pub async fn create_preference(
        &self,
        user_id: &str,
        product_id: &str,
        min_price: f64,
        max_price: f64,
        notify_stock: bool,
    ) -> Result<NotificationPreference, PipelineError> {
        let product_id: ProductId = product_id.parse()?;
        let preference = NewPreference {
            user_id: user_id.trim().to_string(),
            product_id,
            min_price,
            max_price,
            notify_stock,
        };
        preference.validate()?;

        let created = self.preferences.create_preference(preference).await?;
        tracing::info!(
            preference_id = %created.id,
            user_id = %created.user_id,
            %product_id,
            "notification preference created"
        );
        Ok(created)
    }

    /// A user's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for an empty user id and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn list_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<Notification>, PipelineError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(PipelineError::Validation("user id must not be empty".to_string()));
        }
        self.notifications.notifications_for_user(user_id).await
    }

    /// Marks one notification read.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for a non-numeric id,
    /// [`PipelineError::NotFound`] for an unknown notification and
    /// [`PipelineError::TransientIo`] on store failure.
    pub async fn mark_read(&self, notification_id: &str) -> Result<(), PipelineError> {
        let id: NotificationId = notification_id.parse()?;
        if self.notifications.mark_read(id).await? {
            tracing::debug!(notification_id = %id, "notification marked read");
            Ok(())
        } else {
            Err(PipelineError::not_found("notification", id))
        }
    }
}
