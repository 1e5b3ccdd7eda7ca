//! Category handlers: list, refresh, products of a category, crawl status.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CategoryDto, CategoryListResponse, CrawlStatusDto, PaginationParams, ProductDto,
    ProductListResponse, StatusResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PipelineError};
use crate::service::crawl_orchestrator::REFRESH_STARTED;

/// `GET /categories` — List every known category.
///
/// # Errors
///
/// Returns [`PipelineError::TransientIo`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "Categories",
    summary = "List categories",
    description = "Returns the whole category tree with each category's page on the source site.",
    responses(
        (status = 200, description = "Category list", body = CategoryListResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PipelineError> {
    let categories = state
        .catalog
        .list_categories()
        .await?
        .into_iter()
        .map(CategoryDto::from)
        .collect();
    Ok(Json(CategoryListResponse { categories }))
}

/// `POST /categories/refresh` — Start a crawl cycle now.
#[utoipa::path(
    post,
    path = "/api/v1/categories/refresh",
    tag = "Categories",
    summary = "Refresh categories",
    description = "Starts a crawl cycle in the background and returns immediately. A cycle already running is not duplicated.",
    responses(
        (status = 202, description = "Refresh started", body = StatusResponse),
    )
)]
pub async fn refresh_categories(State(state): State<AppState>) -> impl IntoResponse {
    drop(state.orchestrator.refresh_now());
    (
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: REFRESH_STARTED.to_string(),
        }),
    )
}

/// `GET /categories/{id}/products` — Paginated products of a category.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] for a non-numeric id and
/// [`PipelineError::NotFound`] for an unknown category.
#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}/products",
    tag = "Categories",
    summary = "List products of a category",
    description = "Returns one page of the products recorded under a leaf category, ordered by id.",
    params(
        ("id" = String, Path, description = "Category id"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Product page", body = ProductListResponse),
        (status = 400, description = "Malformed category id", body = ErrorResponse),
        (status = 404, description = "Category not found", body = ErrorResponse),
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, PipelineError> {
    let params = params.clamped();
    let page = state
        .catalog
        .list_products(&id, params.page, params.per_page)
        .await?;

    Ok(Json(ProductListResponse {
        pagination: params.meta(page.total),
        total: page.total,
        products: page.products.into_iter().map(ProductDto::from).collect(),
    }))
}

/// `GET /categories/{id}/crawl-status` — Crawl status of a leaf.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if the category was never crawled.
#[utoipa::path(
    get,
    path = "/api/v1/categories/{id}/crawl-status",
    tag = "Categories",
    summary = "Get crawl status",
    description = "Returns the state and start time of the latest crawl attempt of a leaf category.",
    params(
        ("id" = String, Path, description = "Category id"),
    ),
    responses(
        (status = 200, description = "Crawl status", body = CrawlStatusDto),
        (status = 400, description = "Malformed category id", body = ErrorResponse),
        (status = 404, description = "Never crawled", body = ErrorResponse),
    )
)]
pub async fn crawl_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let status = state.catalog.crawl_status(&id).await?;
    Ok(Json(CrawlStatusDto::from(status)))
}

/// Category routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/refresh", post(refresh_categories))
        .route("/categories/{id}/products", get(list_products))
        .route("/categories/{id}/crawl-status", get(crawl_status))
}
