//! Domain layer: catalog entities, history, analytics, change events and
//! the event transport.
//!
//! Nothing in this module talks to a store. Entities carry their own
//! validation and the pure derivations (leaf selection, popularity, price
//! trend, notification messages) live next to the types they derive from.

pub mod analytics;
pub mod category;
pub mod change_event;
pub mod crawl_status;
pub mod event_bus;
pub mod history;
pub mod ids;
pub mod notification;
pub mod product;
pub mod snapshot;
pub mod variant_locks;

pub use analytics::{AnalyticsSnapshot, PriorityTier, ProductAnalytics, UpdatePriority};
pub use category::{CategoryNode, NewCategory, SEED_TREE};
pub use change_event::ChangeEvent;
pub use crawl_status::{CrawlState, CrawlStatus};
pub use event_bus::{BusRecord, EventBus, EventConsumer, InMemoryEventBus};
pub use history::{PriceHistoryEntry, StockHistoryEntry, VariantState};
pub use ids::{CategoryId, NotificationId, PreferenceId, ProductId, VariantId};
pub use notification::{
    NewNotification, NewPreference, Notification, NotificationKind, NotificationPreference,
};
pub use product::{Product, ProductPage, ProductVariant};
pub use snapshot::{
    ProductCounters, ProductSnapshot, ValidatedSnapshot, ValidatedVariant, VariantSnapshot,
};
pub use variant_locks::{VariantGuard, VariantLocks};
