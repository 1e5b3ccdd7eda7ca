//! Product handlers: get, analyze, priority, analytics.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    AnalyticsResponse, AnalyzeProductRequest, AnalyzeProductResponse, PriorityResponse,
    ProductDto, UpdatePriorityRequest,
};
use crate::app_state::AppState;
use crate::domain::ProductSnapshot;
use crate::error::{ErrorResponse, PipelineError};

/// `GET /products/{id}` — Product with its variants.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if the product was never crawled.
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "Products",
    summary = "Get product",
    description = "Returns a catalog product with the last observed price and stock of each variant.",
    params(
        ("id" = String, Path, description = "Product id"),
    ),
    responses(
        (status = 200, description = "Product details", body = ProductDto),
        (status = 400, description = "Malformed product id", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let product = state.catalog.get_product(&id).await?;
    Ok(Json(ProductDto::from(product)))
}

/// `POST /products/analyze` — Diff a snapshot against history.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] for malformed ids or values and
/// [`PipelineError::TransientIo`] on store or bus failure.
#[utoipa::path(
    post,
    path = "/api/v1/products/analyze",
    tag = "Products",
    summary = "Analyze product snapshot",
    description = "Records price and stock transitions of each variant, replaces the product analytics and publishes change events.",
    request_body = AnalyzeProductRequest,
    responses(
        (status = 200, description = "Snapshot analysed", body = AnalyzeProductResponse),
        (status = 400, description = "Malformed snapshot", body = ErrorResponse),
        (status = 503, description = "Store or bus unavailable", body = ErrorResponse),
    )
)]
pub async fn analyze_product(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeProductRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let snapshot = ProductSnapshot::from(req.product);
    let outcome = state.detector.analyze_snapshot(&snapshot).await?;
    Ok(Json(AnalyzeProductResponse {
        status: outcome.status.to_string(),
        notifications: outcome.notifications(),
    }))
}

/// `PUT /products/{id}/priority` — Set the update priority tier.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] for a non-numeric id.
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}/priority",
    tag = "Products",
    summary = "Update product priority",
    description = "Favorited products get tier 2, all others tier 1. Any previous tier is overwritten.",
    params(
        ("id" = String, Path, description = "Product id"),
    ),
    request_body = UpdatePriorityRequest,
    responses(
        (status = 200, description = "Priority stored", body = PriorityResponse),
        (status = 400, description = "Malformed product id", body = ErrorResponse),
    )
)]
pub async fn update_priority(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePriorityRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let priority = state.detector.update_priority(&id, req.is_favorited).await?;
    Ok(Json(PriorityResponse::from(priority)))
}

/// `GET /products/{id}/analytics` — Popularity and price trend.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if the product was never analysed.
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/analytics",
    tag = "Products",
    summary = "Get product analytics",
    description = "Returns the stored popularity score, the ten most recent price changes and the price trend over them.",
    params(
        ("id" = String, Path, description = "Product id"),
    ),
    responses(
        (status = 200, description = "Product analytics", body = AnalyticsResponse),
        (status = 400, description = "Malformed product id", body = ErrorResponse),
        (status = 404, description = "Never analysed", body = ErrorResponse),
    )
)]
pub async fn product_analytics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let snapshot = state.detector.analytics_snapshot(&id).await?;
    Ok(Json(AnalyticsResponse::from(snapshot)))
}

/// Product routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products/analyze", post(analyze_product))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/priority", put(update_priority))
        .route("/products/{id}/analytics", get(product_analytics))
}
