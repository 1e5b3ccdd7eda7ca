//! REST endpoint handlers organized by resource.

pub mod categories;
pub mod inbox;
pub mod products;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(categories::routes())
        .merge(products::routes())
        .merge(inbox::routes())
}
