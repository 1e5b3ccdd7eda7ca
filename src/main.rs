//! shelfwatch server entry point.
//!
//! Connects the store, starts the crawl scheduler and the notification
//! matcher, and serves the REST API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shelfwatch::api;
use shelfwatch::app_state::Pipeline;
use shelfwatch::config::{AppConfig, LogFormat};
use shelfwatch::domain::{EventBus, InMemoryEventBus};
use shelfwatch::persistence::{InMemoryStore, PostgresStore, Stores, seed_categories};
use shelfwatch::service::{ProductSource, StaticProductSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting shelfwatch");

    // Storage
    let stores = if config.persistence_enabled {
        let store = PostgresStore::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            Duration::from_secs(config.database_connect_timeout_secs),
        )
        .await
        .context("connecting to PostgreSQL")?;
        store.migrate().await.context("running migrations")?;
        tracing::info!("PostgreSQL store ready");
        Stores::from_backend(Arc::new(store))
    } else {
        tracing::info!("persistence disabled, using in-memory store");
        Stores::from_backend(Arc::new(InMemoryStore::new()))
    };

    let source: Arc<dyn ProductSource> = if config.seed_demo_catalog {
        seed_categories(stores.categories.as_ref())
            .await
            .context("seeding category tree")?;
        Arc::new(StaticProductSource::with_demo_feed())
    } else {
        Arc::new(StaticProductSource::new())
    };

    // Pipeline. Change events are not durable: unconsumed records die with the process.
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(config.event_bus_partitions));
    let pipeline = Pipeline::assemble(&stores, bus, source, &config);

    let matcher_tasks = pipeline
        .matcher
        .spawn()
        .context("starting notification matcher")?;
    let scheduler = tokio::spawn(Arc::clone(&pipeline.state.orchestrator).run_scheduler());

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::new(config.rpc_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline.state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.abort();
    for task in matcher_tasks {
        task.abort();
    }
    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
