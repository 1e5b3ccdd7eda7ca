//! Crawl orchestrator: periodic, failure-isolated discovery over the leaf
//! categories.
//!
//! A cycle selects every leaf, then crawls them through a bounded
//! `buffer_unordered` fan-out with a pause between dispatches. Each leaf
//! runs its own status machine; one leaf failing never stops the others.
//! Only one cycle runs at a time: a tick that finds a cycle still draining
//! is skipped, not queued.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::change_detector::SnapshotAnalyzer;
use super::product_source::ProductSource;
use crate::domain::{CategoryId, CategoryNode, CrawlStatus};
use crate::error::PipelineError;
use crate::persistence::{CatalogStore, CategoryStore};

/// Status returned by an operator-triggered refresh.
pub const REFRESH_STARTED: &str = "refresh started";

/// Scheduling and rate-limit settings of the orchestrator.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Period between scheduled cycles.
    pub interval: Duration,
    /// Maximum leaves crawled at once.
    pub max_concurrency: usize,
    /// Pause between two leaf dispatches.
    pub dispatch_delay: Duration,
    /// Pause between two products of one leaf.
    pub product_delay: Duration,
    /// Deadline of each fetch and analyze call.
    pub rpc_timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            max_concurrency: 4,
            dispatch_delay: Duration::from_millis(500),
            product_delay: Duration::from_millis(200),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one crawl cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Leaves selected for the cycle.
    pub leaves: usize,
    /// Leaves that reached `Completed`.
    pub completed: usize,
    /// Leaves that ended `Failed`.
    pub failed: usize,
}

/// Drives crawl cycles over the category tree.
#[derive(Debug)]
pub struct CrawlOrchestrator {
    categories: Arc<dyn CategoryStore>,
    catalog: Arc<dyn CatalogStore>,
    source: Arc<dyn ProductSource>,
    analyzer: Arc<dyn SnapshotAnalyzer>,
    config: CrawlConfig,
    cycle: Mutex<()>,
}

impl CrawlOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        categories: Arc<dyn CategoryStore>,
        catalog: Arc<dyn CatalogStore>,
        source: Arc<dyn ProductSource>,
        analyzer: Arc<dyn SnapshotAnalyzer>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            categories,
            catalog,
            source,
            analyzer,
            config,
            cycle: Mutex::new(()),
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Runs one cycle over every leaf category.
    ///
    /// Returns `None` without doing anything if another cycle is still
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TransientIo`] if the leaves cannot be
    /// loaded. Per-leaf failures are counted in the report instead.
    pub async fn schedule_cycle(&self) -> Result<Option<CycleReport>, PipelineError> {
        let Ok(_cycle) = self.cycle.try_lock() else {
            tracing::warn!("previous crawl cycle still draining, skipping");
            return Ok(None);
        };

        let leaves = self.categories.leaf_categories().await?;
        let mut report = CycleReport {
            leaves: leaves.len(),
            ..CycleReport::default()
        };
        tracing::info!(leaves = report.leaves, "crawl cycle started");

        let dispatch_delay = self.config.dispatch_delay;
        let crawls = stream::iter(leaves.into_iter().enumerate())
            .then(move |(index, leaf)| async move {
                if index > 0 && !dispatch_delay.is_zero() {
                    tokio::time::sleep(dispatch_delay).await;
                }
                leaf.id
            })
            .map(|leaf_id| async move { (leaf_id, self.crawl_leaf(leaf_id).await) })
            .buffer_unordered(self.config.max_concurrency.max(1));
        let mut crawls = pin!(crawls);

        while let Some((leaf_id, result)) = crawls.next().await {
            match result {
                Ok(()) => report.completed += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(%leaf_id, %error, "leaf crawl failed");
                }
            }
        }

        tracing::info!(
            leaves = report.leaves,
            completed = report.completed,
            failed = report.failed,
            "crawl cycle finished"
        );
        Ok(Some(report))
    }

    /// Crawls one leaf: fetch its listing, record each product and submit
    /// it to the analyzer.
    ///
    /// The leaf's status moves to `InProgress` when the attempt starts and
    /// to `Completed` or `Failed` when it ends. The first error stops this
    /// leaf.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] for an unknown category (no
    /// status row is written), otherwise the error that failed the leaf.
    pub async fn crawl_leaf(&self, leaf_id: CategoryId) -> Result<(), PipelineError> {
        let leaf = self
            .categories
            .get_category(leaf_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("category", leaf_id))?;

        let mut status = self
            .categories
            .crawl_status(leaf_id)
            .await?
            .unwrap_or_else(|| CrawlStatus::pending(leaf_id));
        let previous = status.start_attempt(Utc::now());
        self.categories.save_crawl_status(&status).await?;
        tracing::info!(%leaf_id, previous = previous.as_str(), "leaf crawl started");

        let result = self.crawl_products(&leaf).await;
        match &result {
            Ok(products) => {
                status.complete()?;
                tracing::info!(%leaf_id, products, "leaf crawl completed");
            }
            Err(error) => {
                status.fail()?;
                tracing::warn!(%leaf_id, %error, "leaf crawl marked failed");
            }
        }
        self.categories.save_crawl_status(&status).await?;
        result.map(|_| ())
    }

    async fn crawl_products(&self, leaf: &CategoryNode) -> Result<usize, PipelineError> {
        let leaf_id = leaf.id;
        let snapshots = self.with_deadline("fetch", self.source.fetch(leaf)).await?;
        tracing::debug!(%leaf_id, products = snapshots.len(), "listing fetched");

        for (index, snapshot) in snapshots.iter().enumerate() {
            if index > 0 && !self.config.product_delay.is_zero() {
                tokio::time::sleep(self.config.product_delay).await;
            }
            let validated = snapshot.validate()?;
            self.catalog
                .upsert_product(leaf_id, &validated, Utc::now())
                .await?;
            let outcome = self
                .with_deadline("analyze", self.analyzer.analyze(snapshot))
                .await?;
            tracing::debug!(
                %leaf_id,
                product_id = %validated.product_id,
                status = outcome.status,
                events = outcome.events.len(),
                "product submitted"
            );
        }
        Ok(snapshots.len())
    }

    async fn with_deadline<T, E>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, PipelineError>
    where
        PipelineError: From<E>,
    {
        match tokio::time::timeout(self.config.rpc_timeout, call).await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::Timeout {
                operation,
                after_ms: u64::try_from(self.config.rpc_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn run_cycle(&self) -> Option<CycleReport> {
        match self.schedule_cycle().await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(%error, "crawl cycle aborted");
                None
            }
        }
    }

    /// Starts an out-of-band cycle in the background and returns at once.
    ///
    /// The handle resolves to the cycle report, or `None` if the cycle was
    /// skipped or could not load the leaves.
    pub fn refresh_now(self: &Arc<Self>) -> JoinHandle<Option<CycleReport>> {
        let this = Arc::clone(self);
        tracing::info!("crawl refresh requested");
        tokio::spawn(async move { this.run_cycle().await })
    }

    /// Runs cycles forever on the configured interval. The first cycle
    /// starts one interval after the call.
    pub async fn run_scheduler(self: Arc<Self>) {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = period.as_secs(), "crawl scheduler started");

        loop {
            ticker.tick().await;
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.run_cycle().await;
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::{Notify, Semaphore};

    use crate::domain::{CrawlState, EventBus, InMemoryEventBus, ProductId, ProductSnapshot};
    use crate::error::FetchError;
    use crate::persistence::{AnalyticsStore, HistoryStore, InMemoryStore, seed_categories};
    use crate::service::change_detector::ChangeDetector;
    use crate::service::product_source::{StaticProductSource, demo_listing};

    const SMARTPHONES: CategoryId = CategoryId::new(2);
    const LAPTOPS: CategoryId = CategoryId::new(3);

    fn fast_config() -> CrawlConfig {
        CrawlConfig {
            interval: Duration::from_millis(50),
            max_concurrency: 2,
            dispatch_delay: Duration::ZERO,
            product_delay: Duration::ZERO,
            rpc_timeout: Duration::from_secs(2),
        }
    }

    async fn setup(
        source: Arc<dyn ProductSource>,
        config: CrawlConfig,
    ) -> (Arc<InMemoryStore>, Arc<CrawlOrchestrator>) {
        let store = Arc::new(InMemoryStore::new());
        assert!(seed_categories(store.as_ref()).await.is_ok());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(2));
        let detector = Arc::new(ChangeDetector::new(
            Arc::clone(&store) as Arc<dyn HistoryStore>,
            Arc::clone(&store) as Arc<dyn AnalyticsStore>,
            bus,
        ));
        let orchestrator = Arc::new(CrawlOrchestrator::new(
            Arc::clone(&store) as Arc<dyn CategoryStore>,
            Arc::clone(&store) as Arc<dyn CatalogStore>,
            source,
            detector,
            config,
        ));
        (store, orchestrator)
    }

    async fn state_of(store: &InMemoryStore, leaf: CategoryId) -> Option<CrawlState> {
        let Ok(status) = store.crawl_status(leaf).await else {
            panic!("status should load");
        };
        status.map(|s| s.state)
    }

    /// Blocks every fetch until the test hands out permits.
    #[derive(Debug)]
    struct GatedSource {
        entered: Notify,
        release: Semaphore,
    }

    impl GatedSource {
        fn new() -> Self {
            Self {
                entered: Notify::new(),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl ProductSource for GatedSource {
        async fn fetch(&self, leaf: &CategoryNode) -> Result<Vec<ProductSnapshot>, FetchError> {
            self.entered.notify_one();
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|e| FetchError::Unavailable(e.to_string()))?;
            Ok(demo_listing(leaf.id))
        }
    }

    /// Never answers within any reasonable deadline.
    #[derive(Debug)]
    struct StalledSource;

    #[async_trait]
    impl ProductSource for StalledSource {
        async fn fetch(&self, _leaf: &CategoryNode) -> Result<Vec<ProductSnapshot>, FetchError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn cycle_crawls_every_leaf() {
        let source = Arc::new(StaticProductSource::with_demo_feed());
        let (store, orchestrator) = setup(source, fast_config()).await;

        let Ok(Some(report)) = orchestrator.schedule_cycle().await else {
            panic!("cycle should run");
        };
        assert_eq!(
            report,
            CycleReport {
                leaves: 5,
                completed: 5,
                failed: 0
            }
        );
        assert_eq!(state_of(&store, LAPTOPS).await, Some(CrawlState::Completed));
        // Parents are never crawled.
        assert_eq!(state_of(&store, CategoryId::new(1)).await, None);

        let Ok(Some(product)) = store.get_product(ProductId::new(301)).await else {
            panic!("crawled product should be in the catalog");
        };
        assert_eq!(product.variants.len(), 2);
        assert_eq!(product.category_id, Some(LAPTOPS));
        assert_eq!(store.price_history_len().await, 20);
    }

    #[tokio::test]
    async fn dispatch_delay_spaces_out_leaves() {
        let source = Arc::new(StaticProductSource::with_demo_feed());
        let config = CrawlConfig {
            dispatch_delay: Duration::from_millis(20),
            ..fast_config()
        };
        let (store, orchestrator) = setup(source, config).await;

        let started = Instant::now();
        let Ok(Some(report)) = orchestrator.schedule_cycle().await else {
            panic!("cycle should run");
        };
        assert_eq!(report.completed, 5);
        // Four pauses between five dispatches.
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(state_of(&store, SMARTPHONES).await, Some(CrawlState::Completed));
    }

    #[tokio::test]
    async fn failing_leaf_does_not_affect_others() {
        let source = Arc::new(StaticProductSource::with_demo_feed());
        source
            .fail_leaf(SMARTPHONES, FetchError::Unavailable("connection reset".to_string()))
            .await;
        let (store, orchestrator) =
            setup(Arc::clone(&source) as Arc<dyn ProductSource>, fast_config()).await;

        let Ok(Some(report)) = orchestrator.schedule_cycle().await else {
            panic!("cycle should run");
        };
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 4);
        assert_eq!(state_of(&store, SMARTPHONES).await, Some(CrawlState::Failed));
        assert_eq!(state_of(&store, LAPTOPS).await, Some(CrawlState::Completed));

        // A failed leaf is eligible again on the next cycle.
        source.set_listing(SMARTPHONES, demo_listing(SMARTPHONES)).await;
        let Ok(Some(second)) = orchestrator.schedule_cycle().await else {
            panic!("cycle should run");
        };
        assert_eq!(second.failed, 0);
        assert_eq!(state_of(&store, SMARTPHONES).await, Some(CrawlState::Completed));
    }

    #[tokio::test]
    async fn invalid_snapshot_fails_its_leaf() {
        let source = Arc::new(StaticProductSource::with_demo_feed());
        let mut listing = demo_listing(LAPTOPS);
        if let Some(product) = listing.first_mut() {
            product.external_id = "not-a-number".to_string();
        }
        source.set_listing(LAPTOPS, listing).await;
        let (store, orchestrator) = setup(source, fast_config()).await;

        let result = orchestrator.crawl_leaf(LAPTOPS).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
        assert_eq!(state_of(&store, LAPTOPS).await, Some(CrawlState::Failed));
    }

    #[tokio::test]
    async fn unknown_leaf_is_not_found() {
        let source = Arc::new(StaticProductSource::new());
        let (store, orchestrator) = setup(source, fast_config()).await;
        let missing = CategoryId::new(404);
        assert!(matches!(
            orchestrator.crawl_leaf(missing).await,
            Err(PipelineError::NotFound { .. })
        ));
        assert_eq!(state_of(&store, missing).await, None);
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let config = CrawlConfig {
            rpc_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let (store, orchestrator) = setup(Arc::new(StalledSource), config).await;
        let result = orchestrator.crawl_leaf(LAPTOPS).await;
        assert!(matches!(
            result,
            Err(PipelineError::Timeout {
                operation: "fetch",
                ..
            })
        ));
        assert_eq!(state_of(&store, LAPTOPS).await, Some(CrawlState::Failed));
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let source = Arc::new(GatedSource::new());
        let (_store, orchestrator) =
            setup(Arc::clone(&source) as Arc<dyn ProductSource>, fast_config()).await;

        let first = orchestrator.refresh_now();
        source.entered.notified().await;

        let Ok(skipped) = orchestrator.schedule_cycle().await else {
            panic!("skipped cycle is not an error");
        };
        assert!(skipped.is_none());

        source.release.add_permits(16);
        let Ok(Some(report)) = first.await else {
            panic!("first cycle should finish");
        };
        assert_eq!(report.completed, 5);
    }

    #[tokio::test]
    async fn refresh_returns_before_crawl_finishes() {
        let source = Arc::new(GatedSource::new());
        let (store, orchestrator) =
            setup(Arc::clone(&source) as Arc<dyn ProductSource>, fast_config()).await;

        let handle = orchestrator.refresh_now();
        source.entered.notified().await;
        assert!(!handle.is_finished());
        assert_eq!(state_of(&store, SMARTPHONES).await, Some(CrawlState::InProgress));

        source.release.add_permits(16);
        let Ok(Some(report)) = handle.await else {
            panic!("refresh cycle should finish");
        };
        assert_eq!(report.completed, 5);
        assert_eq!(state_of(&store, SMARTPHONES).await, Some(CrawlState::Completed));
    }

    #[tokio::test]
    async fn scheduler_runs_cycles_on_interval() {
        let source = Arc::new(StaticProductSource::with_demo_feed());
        let (store, orchestrator) = setup(source, fast_config()).await;

        let scheduler = tokio::spawn(Arc::clone(&orchestrator).run_scheduler());
        assert_eq!(state_of(&store, LAPTOPS).await, None);

        let mut completed = false;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            if state_of(&store, LAPTOPS).await == Some(CrawlState::Completed) {
                completed = true;
                break;
            }
        }
        scheduler.abort();
        assert!(completed);
    }
}
