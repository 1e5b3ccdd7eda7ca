//! REST surface driven over a real socket.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use shelfwatch::api;
use shelfwatch::app_state::Pipeline;
use shelfwatch::config::AppConfig;
use shelfwatch::domain::{EventBus, InMemoryEventBus};
use shelfwatch::persistence::{InMemoryStore, Stores, seed_categories};
use shelfwatch::service::{ProductSource, StaticProductSource};

struct Server {
    base: String,
    client: reqwest::Client,
    pipeline: Pipeline,
}

impl Server {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let Ok(response) = self.client.get(self.url(path)).send().await else {
            panic!("GET {path} failed");
        };
        decode(response).await
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: &Value) -> (u16, Value) {
        let Ok(response) = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
        else {
            panic!("request to {path} failed");
        };
        decode(response).await
    }
}

async fn decode(response: reqwest::Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let Ok(text) = response.text().await else {
        panic!("body should be readable");
    };
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}

async fn start() -> Server {
    let store = Arc::new(InMemoryStore::new());
    assert!(seed_categories(store.as_ref()).await.is_ok());
    let stores = Stores::from_backend(store);
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(2));
    let source: Arc<dyn ProductSource> = Arc::new(StaticProductSource::with_demo_feed());
    let Ok(config) = AppConfig::from_lookup(|key| match key {
        "CRAWL_DISPATCH_DELAY_MS" | "CRAWL_PRODUCT_DELAY_MS" => Some("0".to_string()),
        _ => None,
    }) else {
        panic!("config should load");
    };
    let pipeline = Pipeline::assemble(&stores, bus, source, &config);

    let app = api::build_router().with_state(pipeline.state.clone());
    let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
        panic!("should bind an ephemeral port");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has an address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Server {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        pipeline,
    }
}

fn snapshot(price: f64, stock: i32) -> Value {
    json!({
        "product": {
            "id": "12345",
            "name": "Mock Product",
            "view_count": 1000,
            "favorite_count": 50,
            "add_to_cart_count": 20,
            "order_count": 5,
            "variants": [{ "id": "123451", "price": price, "stock_quantity": stock }]
        }
    })
}

#[tokio::test]
async fn health_and_categories() {
    let server = start().await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");

    let (status, body) = server.get("/api/v1/categories").await;
    assert_eq!(status, 200);
    let Some(categories) = body["categories"].as_array() else {
        panic!("categories should be an array: {body}");
    };
    assert_eq!(categories.len(), 7);
    assert!(
        categories
            .iter()
            .all(|c| c["url"].as_str().is_some_and(|u| u.contains("/categories/")))
    );
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let server = start().await;

    let (status, body) = server.get("/api/v1/products/abc").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1001);

    let (status, body) = server.get("/api/v1/products/42").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], 2001);

    let (status, _) = server.get("/api/v1/products/42/analytics").await;
    assert_eq!(status, 404);

    let (status, _) = server
        .send(reqwest::Method::PUT, "/api/v1/notifications/999/read", &json!({}))
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn analyze_priority_and_analytics() {
    let server = start().await;

    let (status, body) = server
        .send(reqwest::Method::POST, "/api/v1/products/analyze", &snapshot(100.0, 5))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "status": "success", "notifications": [] }));

    let (status, body) = server
        .send(reqwest::Method::POST, "/api/v1/products/analyze", &snapshot(90.0, 0))
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["notifications"],
        json!([
            "price_drop:variant_id=123451:old_price=100.00:new_price=90.00",
            "out_of_stock:variant_id=123451"
        ])
    );

    let (status, body) = server
        .send(
            reqwest::Method::PUT,
            "/api/v1/products/12345/priority",
            &json!({ "is_favorited": true }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["priority_tier"], 2);

    let (status, body) = server.get("/api/v1/products/12345/analytics").await;
    assert_eq!(status, 200);
    assert_eq!(body["favorite_count_trend"], 50);
    let Some(trend) = body["price_trend"].as_f64() else {
        panic!("trend should be a number: {body}");
    };
    assert!((trend + 10.0).abs() < 1e-9);
    assert_eq!(body["price_history"].as_array().map(Vec::len), Some(2));

    let (status, body) = server
        .send(
            reqwest::Method::POST,
            "/api/v1/products/analyze",
            &json!({ "product": { "id": "not-a-number", "variants": [] } }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], 1001);
}

#[tokio::test]
async fn refresh_returns_before_crawl_completes() {
    let server = start().await;

    let (status, body) = server
        .send(reqwest::Method::POST, "/api/v1/categories/refresh", &json!({}))
        .await;
    assert_eq!(status, 202);
    assert_eq!(body, json!({ "status": "refresh started" }));

    let mut listed = 0;
    for _ in 0..80 {
        let (status, body) = server.get("/api/v1/categories/2/products").await;
        if status == 200 {
            listed = body["total"].as_u64().unwrap_or(0);
            if listed == 2 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(listed, 2);

    let (status, body) = server
        .get("/api/v1/categories/2/products?page=1&per_page=1")
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["products"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn preference_to_read_notification() {
    let server = start().await;
    let Ok(tasks) = server.pipeline.matcher.spawn() else {
        panic!("matcher should start");
    };

    let (status, body) = server
        .send(
            reqwest::Method::POST,
            "/api/v1/preferences",
            &json!({ "user_id": "carol", "product_id": "12345", "min_price": 50.0, "max_price": 95.0 }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["user_id"], "carol");

    let (status, _) = server
        .send(
            reqwest::Method::POST,
            "/api/v1/preferences",
            &json!({ "user_id": "carol", "product_id": "12345", "min_price": 90.0, "max_price": 10.0 }),
        )
        .await;
    assert_eq!(status, 400);

    for price in [100.0, 90.0] {
        let (status, _) = server
            .send(reqwest::Method::POST, "/api/v1/products/analyze", &snapshot(price, 5))
            .await;
        assert_eq!(status, 200);
    }

    let mut id = None;
    for _ in 0..80 {
        let (_, body) = server.get("/api/v1/users/carol/notifications").await;
        if let Some(first) = body["notifications"].as_array().and_then(|n| n.first()) {
            assert_eq!(first["message"], "Price dropped from 100.00 to 90.00");
            assert_eq!(first["type"], "PRICE_DROP");
            id = first["id"].as_i64();
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let Some(id) = id else {
        panic!("carol should be notified");
    };

    let (status, _) = server
        .send(
            reqwest::Method::PUT,
            &format!("/api/v1/notifications/{id}/read"),
            &json!({}),
        )
        .await;
    assert_eq!(status, 204);

    let (_, body) = server.get("/api/v1/users/carol/notifications").await;
    assert_eq!(body["notifications"][0]["is_read"], true);

    for task in tasks {
        task.abort();
    }
}
