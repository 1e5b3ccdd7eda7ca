//! Service layer: the three pipeline stages and the read-side queries.
//!
//! [`CrawlOrchestrator`] feeds snapshots from a [`ProductSource`] into the
//! [`ChangeDetector`], which publishes change events that the
//! [`NotificationMatcher`] turns into notifications.

pub mod catalog_service;
pub mod change_detector;
pub mod crawl_orchestrator;
pub mod inbox_service;
pub mod notification_matcher;
pub mod product_source;

pub use catalog_service::{CatalogService, CategoryListing};
pub use change_detector::{AnalysisOutcome, ChangeDetector, SnapshotAnalyzer};
pub use crawl_orchestrator::{CrawlConfig, CrawlOrchestrator, CycleReport};
pub use inbox_service::InboxService;
pub use notification_matcher::NotificationMatcher;
pub use product_source::{ProductSource, StaticProductSource};
