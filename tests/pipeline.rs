//! End-to-end pipeline runs over the in-memory store and event bus.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use shelfwatch::app_state::Pipeline;
use shelfwatch::config::AppConfig;
use shelfwatch::domain::{
    CategoryId, EventBus, InMemoryEventBus, Notification, ProductCounters, ProductSnapshot,
    VariantSnapshot,
};
use shelfwatch::persistence::{InMemoryStore, NotificationStore, Stores, seed_categories};
use shelfwatch::service::{ProductSource, StaticProductSource};

const SMARTPHONES: CategoryId = CategoryId::new(2);

struct Harness {
    store: Arc<InMemoryStore>,
    source: Arc<StaticProductSource>,
    pipeline: Pipeline,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    assert!(seed_categories(store.as_ref()).await.is_ok());
    let stores = Stores::from_backend(Arc::clone(&store));
    let source = Arc::new(StaticProductSource::new());
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(4));

    let Ok(config) = AppConfig::from_lookup(|key| match key {
        "CRAWL_DISPATCH_DELAY_MS" | "CRAWL_PRODUCT_DELAY_MS" => Some("0".to_string()),
        _ => None,
    }) else {
        panic!("config should load");
    };
    let pipeline = Pipeline::assemble(
        &stores,
        bus,
        Arc::clone(&source) as Arc<dyn ProductSource>,
        &config,
    );
    Harness {
        store,
        source,
        pipeline,
    }
}

fn phone(price: f64, stock_quantity: i32) -> ProductSnapshot {
    ProductSnapshot {
        external_id: "501".to_string(),
        name: "Pocket Phone".to_string(),
        description: "6.1 inch".to_string(),
        counters: ProductCounters {
            views: 100,
            favorites: 10,
            add_to_cart: 10,
            orders: 10,
        },
        variants: vec![VariantSnapshot {
            external_variant_id: "5011".to_string(),
            price,
            stock_quantity,
        }],
    }
}

async fn wait_for_inbox(store: &InMemoryStore, user: &str, count: usize) -> Vec<Notification> {
    for _ in 0..80 {
        let Ok(found) = store.notifications_for_user(user).await else {
            panic!("inbox should load");
        };
        if found.len() >= count {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("{user} never received {count} notifications");
}

#[tokio::test]
async fn crawl_to_inbox() {
    let h = harness().await;
    let state = &h.pipeline.state;

    let Ok(pref) = state.inbox.create_preference("alice", "501", 0.0, 0.0, true).await else {
        panic!("preference should be created");
    };
    assert!(pref.notify_stock);
    let Ok(tasks) = h.pipeline.matcher.spawn() else {
        panic!("matcher should start");
    };

    // First sighting seeds history and notifies nobody.
    h.source.set_listing(SMARTPHONES, vec![phone(100.0, 5)]).await;
    let Ok(Some(first)) = state.orchestrator.schedule_cycle().await else {
        panic!("first cycle should run");
    };
    assert_eq!(first.leaves, 5);
    assert_eq!(first.completed, 5);
    assert_eq!(first.failed, 0);

    // The drop and the sell-out each notify alice once.
    h.source.set_listing(SMARTPHONES, vec![phone(90.0, 0)]).await;
    let Ok(Some(second)) = state.orchestrator.schedule_cycle().await else {
        panic!("second cycle should run");
    };
    assert_eq!(second.completed, 5);

    let inbox = wait_for_inbox(&h.store, "alice", 2).await;
    let mut messages: Vec<&str> = inbox.iter().map(|n| n.message.as_str()).collect();
    messages.sort_unstable();
    assert_eq!(
        messages,
        vec!["Price dropped from 100.00 to 90.00", "Product is now out of stock"]
    );

    let Ok(product) = state.catalog.get_product("501").await else {
        panic!("product should be recorded");
    };
    assert_eq!(product.category_id, Some(SMARTPHONES));
    let Some(variant) = product.variants.first() else {
        panic!("product has one variant");
    };
    assert!((variant.price - 90.0).abs() < f64::EPSILON);
    assert_eq!(variant.stock_quantity, 0);

    let Ok(analytics) = state.detector.analytics_snapshot("501").await else {
        panic!("analytics should exist");
    };
    assert_eq!(analytics.price_history.len(), 2);
    assert!((analytics.price_trend + 10.0).abs() < 1e-9);

    let Ok(status) = state.catalog.crawl_status("2").await else {
        panic!("status should exist");
    };
    assert_eq!(status.state.as_str(), "completed");

    for task in tasks {
        task.abort();
    }
}

#[tokio::test]
async fn unchanged_recrawl_is_silent() {
    let h = harness().await;
    let state = &h.pipeline.state;
    assert!(
        state
            .inbox
            .create_preference("bob", "501", 0.0, 0.0, true)
            .await
            .is_ok()
    );
    let Ok(tasks) = h.pipeline.matcher.spawn() else {
        panic!("matcher should start");
    };

    h.source.set_listing(SMARTPHONES, vec![phone(100.0, 5)]).await;
    for _ in 0..3 {
        assert!(state.orchestrator.schedule_cycle().await.is_ok());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.store.price_history_len().await, 1);
    assert_eq!(h.store.stock_history_len().await, 1);
    let Ok(inbox) = h.store.notifications_for_user("bob").await else {
        panic!("inbox should load");
    };
    assert!(inbox.is_empty());

    for task in tasks {
        task.abort();
    }
}
