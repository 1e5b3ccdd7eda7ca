//! # shelfwatch
//!
//! Catalog monitoring for e-commerce sites: periodic crawl of a category
//! tree, per-variant price and stock change detection, and per-user
//! notifications filtered by stored preferences.
//!
//! The pipeline has three stages connected by narrow traits, so each can
//! be driven and tested on its own:
//!
//! 1. [`service::CrawlOrchestrator`] walks the leaf categories on a timer,
//!    fetches listings from a [`service::ProductSource`] and submits each
//!    product snapshot for analysis.
//! 2. [`service::ChangeDetector`] diffs snapshots against stored history,
//!    refreshes popularity analytics and publishes [`domain::ChangeEvent`]s.
//! 3. [`service::NotificationMatcher`] consumes the events and writes
//!    deduplicated notifications for every matching preference.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── CrawlOrchestrator ──► ChangeDetector ──► EventBus ──► NotificationMatcher
//!     │          │                    │                                │
//!     │    ProductSource              └──────── Stores (persistence/) ─┘
//!     │
//!     └── PostgreSQL or in-memory store
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
