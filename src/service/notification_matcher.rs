//! Notification matcher: change events in, user notifications out.
//!
//! One consumer loop per bus partition, all in the same consumer group.
//! Each record is decoded once into a [`ChangeEvent`], matched against the
//! product's preferences and committed. Notifications are keyed by
//! `(event, preference)`, so a redelivered event writes nothing new.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::domain::notification::{price_drop_message, stock_message};
use crate::domain::{
    BusRecord, ChangeEvent, EventBus, EventConsumer, NewNotification, NotificationKind,
    NotificationPreference,
};
use crate::error::PipelineError;
use crate::persistence::{NotificationStore, PreferenceStore};

/// Consumer group used when none is configured.
pub const DEFAULT_GROUP: &str = "notification-service";

/// Turns change events into persisted notifications.
#[derive(Debug)]
pub struct NotificationMatcher {
    preferences: Arc<dyn PreferenceStore>,
    notifications: Arc<dyn NotificationStore>,
    bus: Arc<dyn EventBus>,
    group: String,
}

impl NotificationMatcher {
    /// Creates a matcher consuming `bus` as `group`.
    #[must_use]
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        notifications: Arc<dyn NotificationStore>,
        bus: Arc<dyn EventBus>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            preferences,
            notifications,
            bus,
            group: group.into(),
        }
    }

    /// Starts one consumer loop per partition.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a partition consumer cannot be opened.
    pub fn spawn(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, PipelineError> {
        let partitions = self.bus.partitions();
        let mut handles = Vec::with_capacity(partitions);
        for partition in 0..partitions {
            let consumer = self.bus.consumer(&self.group, partition)?;
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                this.consume(partition, consumer).await;
            }));
        }
        tracing::info!(group = %self.group, partitions, "notification matcher started");
        Ok(handles)
    }

    async fn consume(&self, partition: usize, mut consumer: Box<dyn EventConsumer>) {
        loop {
            let record = match consumer.poll().await {
                Ok(record) => record,
                Err(error) => {
                    tracing::error!(partition, %error, "partition consumer stopped");
                    return;
                }
            };

            match self.handle_record(&record).await {
                Ok(created) => tracing::debug!(
                    partition,
                    offset = record.offset,
                    created,
                    "change event handled"
                ),
                Err(error) => tracing::warn!(
                    partition,
                    offset = record.offset,
                    %error,
                    "change event handling failed"
                ),
            }

            if let Err(error) = consumer.commit().await {
                tracing::warn!(partition, offset = record.offset, %error, "commit failed");
            }
        }
    }

    /// Decodes and handles one bus record. Malformed payloads are logged
    /// and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    pub async fn handle_record(&self, record: &BusRecord) -> Result<usize, PipelineError> {
        match ChangeEvent::decode(&record.payload) {
            Ok(event) => self.handle_event(&event).await,
            Err(error) => {
                tracing::warn!(
                    partition = record.partition,
                    offset = record.offset,
                    key = %record.key,
                    %error,
                    "dropping malformed change event"
                );
                Ok(0)
            }
        }
    }

    /// Creates the notifications `event` calls for. Returns how many were
    /// newly written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] on store failure.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<usize, PipelineError> {
        let (recipients, kind, message): (Vec<NotificationPreference>, _, _) = match event {
            ChangeEvent::PriceChange {
                product_id,
                old_price,
                new_price,
                ..
            } => {
                let matching = self
                    .preferences
                    .preferences_for_product(*product_id)
                    .await?
                    .into_iter()
                    .filter(|p| p.wants_price(*new_price))
                    .collect();
                (
                    matching,
                    NotificationKind::PriceDrop,
                    price_drop_message(*old_price, *new_price),
                )
            }
            ChangeEvent::StockChange {
                product_id,
                new_quantity,
                ..
            } => (
                self.preferences.stock_watchers(*product_id).await?,
                NotificationKind::StockChange,
                stock_message(*new_quantity),
            ),
        };

        let now = Utc::now();
        let mut created = 0;
        for preference in &recipients {
            let notification = NewNotification::for_preference(
                event.event_id(),
                preference,
                kind,
                message.clone(),
                now,
            );
            if self.notifications.insert_once(&notification).await? {
                created += 1;
            } else {
                tracing::debug!(
                    dedup_key = %notification.dedup_key,
                    "duplicate notification skipped"
                );
            }
        }

        if created > 0 {
            tracing::info!(
                product_id = %event.product_id(),
                event_id = %event.event_id(),
                kind = kind.as_str(),
                created,
                "notifications created"
            );
        }
        Ok(created)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::event_bus::publish_change;
    use crate::domain::{InMemoryEventBus, NewPreference, ProductId, VariantId};
    use crate::persistence::InMemoryStore;

    const PRODUCT: ProductId = ProductId::new(12345);

    struct Fixture {
        store: Arc<InMemoryStore>,
        bus: Arc<InMemoryEventBus>,
        matcher: Arc<NotificationMatcher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new(4));
        let matcher = Arc::new(NotificationMatcher::new(
            Arc::clone(&store) as Arc<dyn PreferenceStore>,
            Arc::clone(&store) as Arc<dyn NotificationStore>,
            Arc::clone(&bus) as Arc<dyn EventBus>,
            DEFAULT_GROUP,
        ));
        Fixture {
            store,
            bus,
            matcher,
        }
    }

    async fn prefer(store: &InMemoryStore, user: &str, min: f64, max: f64, stock: bool) {
        let created = store
            .create_preference(NewPreference {
                user_id: user.to_string(),
                product_id: PRODUCT,
                min_price: min,
                max_price: max,
                notify_stock: stock,
            })
            .await;
        assert!(created.is_ok());
    }

    async fn inbox(store: &InMemoryStore, user: &str) -> Vec<crate::domain::Notification> {
        let Ok(found) = store.notifications_for_user(user).await else {
            panic!("inbox should load");
        };
        found
    }

    fn drop_to(new_price: f64) -> ChangeEvent {
        ChangeEvent::price_change(PRODUCT, VariantId::new(1), 109.99, new_price, Utc::now())
    }

    #[tokio::test]
    async fn redelivered_event_does_not_duplicate() {
        let f = fixture();
        for user in ["alice", "bob", "carol"] {
            prefer(&f.store, user, 0.0, 150.0, false).await;
        }
        let event = drop_to(99.99);

        assert_eq!(f.matcher.handle_event(&event).await.ok(), Some(3));
        assert_eq!(f.matcher.handle_event(&event).await.ok(), Some(0));

        let total: usize = [
            inbox(&f.store, "alice").await.len(),
            inbox(&f.store, "bob").await.len(),
            inbox(&f.store, "carol").await.len(),
        ]
        .iter()
        .sum();
        assert_eq!(total, 3);

        let alice = inbox(&f.store, "alice").await;
        let Some(first) = alice.first() else {
            panic!("alice has a notification");
        };
        assert_eq!(first.message, "Price dropped from 109.99 to 99.99");
        assert_eq!(first.kind, NotificationKind::PriceDrop);
        assert!(!first.is_read);
    }

    #[tokio::test]
    async fn price_band_filters_preferences() {
        let f = fixture();
        prefer(&f.store, "in-band", 50.0, 100.0, false).await;
        prefer(&f.store, "too-cheap-wanted", 0.0, 80.0, false).await;
        prefer(&f.store, "floor-too-high", 120.0, 0.0, false).await;
        prefer(&f.store, "unbounded", 0.0, 0.0, false).await;

        assert_eq!(f.matcher.handle_event(&drop_to(99.99)).await.ok(), Some(2));
        assert_eq!(inbox(&f.store, "in-band").await.len(), 1);
        assert_eq!(inbox(&f.store, "unbounded").await.len(), 1);
        assert!(inbox(&f.store, "too-cheap-wanted").await.is_empty());
        assert!(inbox(&f.store, "floor-too-high").await.is_empty());
    }

    #[tokio::test]
    async fn stock_events_reach_watchers_only() {
        let f = fixture();
        prefer(&f.store, "watcher", 0.0, 0.0, true).await;
        prefer(&f.store, "price-only", 0.0, 0.0, false).await;

        let out = ChangeEvent::stock_change(PRODUCT, VariantId::new(1), 5, 0, Utc::now());
        let back = ChangeEvent::stock_change(PRODUCT, VariantId::new(1), 0, 2, Utc::now());
        assert_eq!(f.matcher.handle_event(&out).await.ok(), Some(1));
        assert_eq!(f.matcher.handle_event(&back).await.ok(), Some(1));

        let messages: Vec<String> = inbox(&f.store, "watcher")
            .await
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(
            messages,
            vec!["Product is now back in stock", "Product is now out of stock"]
        );
        assert!(inbox(&f.store, "price-only").await.is_empty());
    }

    #[tokio::test]
    async fn malformed_record_is_dropped() {
        let f = fixture();
        let record = BusRecord {
            partition: 0,
            offset: 0,
            key: "12345".to_string(),
            payload: br#"{"type":"price_change","data":{"product_id":"12345"}}"#.to_vec(),
        };
        assert_eq!(f.matcher.handle_record(&record).await.ok(), Some(0));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_transient() {
        let f = fixture();
        f.store.set_offline(true);
        assert!(matches!(
            f.matcher.handle_event(&drop_to(10.0)).await,
            Err(PipelineError::TransientIo(_))
        ));
    }

    #[tokio::test]
    async fn consumer_loop_survives_bad_payloads_and_keeps_order() {
        let f = fixture();
        prefer(&f.store, "alice", 0.0, 0.0, false).await;

        let key = PRODUCT.to_string();
        assert!(f.bus.publish(&key, b"garbage".to_vec()).await.is_ok());
        for price in [99.0, 89.0, 79.0] {
            assert!(publish_change(f.bus.as_ref(), &drop_to(price)).await.is_ok());
        }

        let Ok(handles) = f.matcher.spawn() else {
            panic!("matcher should start");
        };

        let partition = f.bus.partition_for(&key);
        let mut delivered = Vec::new();
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            delivered = inbox(&f.store, "alice").await;
            if delivered.len() == 3 && f.bus.committed(DEFAULT_GROUP, partition).await == 4 {
                break;
            }
        }
        for handle in handles {
            handle.abort();
        }

        // Newest first, so publication order reads backwards.
        let messages: Vec<&str> = delivered.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Price dropped from 109.99 to 79.00",
                "Price dropped from 109.99 to 89.00",
                "Price dropped from 109.99 to 99.00",
            ]
        );
        assert_eq!(f.bus.committed(DEFAULT_GROUP, partition).await, 4);
    }
}
