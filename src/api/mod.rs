//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`, the health check at the
//! root. With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "shelfwatch",
        description = "Catalog monitoring: crawl, change detection and notifications"
    ),
    paths(
        handlers::system::health_handler,
        handlers::categories::list_categories,
        handlers::categories::refresh_categories,
        handlers::categories::list_products,
        handlers::categories::crawl_status,
        handlers::products::get_product,
        handlers::products::analyze_product,
        handlers::products::update_priority,
        handlers::products::product_analytics,
        handlers::inbox::create_preference,
        handlers::inbox::list_notifications,
        handlers::inbox::mark_read,
    ),
    tags(
        (name = "System", description = "Liveness"),
        (name = "Categories", description = "Category tree and crawl control"),
        (name = "Products", description = "Catalog, analysis and analytics"),
        (name = "Inbox", description = "Notification preferences and delivered notifications"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/categories",
            "/api/v1/categories/refresh",
            "/api/v1/categories/{id}/products",
            "/api/v1/categories/{id}/crawl-status",
            "/api/v1/products/{id}",
            "/api/v1/products/analyze",
            "/api/v1/products/{id}/priority",
            "/api/v1/products/{id}/analytics",
            "/api/v1/preferences",
            "/api/v1/users/{user_id}/notifications",
            "/api/v1/notifications/{id}/read",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
