//! Shared application state injected into all Axum handlers, and the
//! assembly of the pipeline behind it.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::EventBus;
use crate::persistence::Stores;
use crate::service::{
    CatalogService, ChangeDetector, CrawlOrchestrator, InboxService, NotificationMatcher,
    ProductSource, SnapshotAnalyzer,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Category, product and crawl-status queries.
    pub catalog: Arc<CatalogService>,
    /// Snapshot analysis, priority and analytics.
    pub detector: Arc<ChangeDetector>,
    /// Crawl cycles triggered on demand.
    pub orchestrator: Arc<CrawlOrchestrator>,
    /// Preferences and notifications.
    pub inbox: Arc<InboxService>,
}

/// Every long-lived component of a running service.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// State handed to the HTTP layer.
    pub state: AppState,
    /// Event consumer; not started yet.
    pub matcher: Arc<NotificationMatcher>,
}

impl Pipeline {
    /// Wires the three stages and the query services over `stores`.
    #[must_use]
    pub fn assemble(
        stores: &Stores,
        bus: Arc<dyn EventBus>,
        source: Arc<dyn ProductSource>,
        config: &AppConfig,
    ) -> Self {
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&stores.history),
            Arc::clone(&stores.analytics),
            Arc::clone(&bus),
        ));
        let orchestrator = Arc::new(CrawlOrchestrator::new(
            Arc::clone(&stores.categories),
            Arc::clone(&stores.catalog),
            source,
            Arc::clone(&detector) as Arc<dyn SnapshotAnalyzer>,
            config.crawl_config(),
        ));
        let matcher = Arc::new(NotificationMatcher::new(
            Arc::clone(&stores.preferences),
            Arc::clone(&stores.notifications),
            bus,
            config.notification_group.clone(),
        ));
        let catalog = Arc::new(CatalogService::new(
            Arc::clone(&stores.categories),
            Arc::clone(&stores.catalog),
            config.catalog_base_url.clone(),
        ));
        let inbox = Arc::new(InboxService::new(
            Arc::clone(&stores.preferences),
            Arc::clone(&stores.notifications),
        ));

        Self {
            state: AppState {
                catalog,
                detector,
                orchestrator,
                inbox,
            },
            matcher,
        }
    }
}
