//! Inbox handlers: preferences and notifications.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::dto::{
    CreatePreferenceRequest, NotificationDto, NotificationListResponse, PreferenceDto,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PipelineError};

/// `POST /preferences` — Register interest in a product.
///
/// # Errors
///
/// Returns [`PipelineError::Validation`] for a malformed product id or an
/// invalid price band.
#[utoipa::path(
    post,
    path = "/api/v1/preferences",
    tag = "Inbox",
    summary = "Create notification preference",
    description = "Price drops inside `[min_price, max_price]` (no upper bound when `max_price` is 0) and, with `notify_stock`, stock transitions will notify the user.",
    request_body = CreatePreferenceRequest,
    responses(
        (status = 201, description = "Preference created", body = PreferenceDto),
        (status = 400, description = "Invalid preference", body = ErrorResponse),
    )
)]
pub async fn create_preference(
    State(state): State<AppState>,
    Json(req): Json<CreatePreferenceRequest>,
) -> Result<impl IntoResponse, PipelineError> {
    let created = state
        .inbox
        .create_preference(
            &req.user_id,
            &req.product_id,
            req.min_price,
            req.max_price,
            req.notify_stock,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(PreferenceDto::from(created))))
}

/// `GET /users/{user_id}/notifications` — A user's notifications.
///
/// # Errors
///
/// Returns [`PipelineError::TransientIo`] on store failure.
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/notifications",
    tag = "Inbox",
    summary = "List notifications",
    description = "Returns every notification of the user, newest first.",
    params(
        ("user_id" = String, Path, description = "User id"),
    ),
    responses(
        (status = 200, description = "Notifications", body = NotificationListResponse),
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    let notifications = state
        .inbox
        .list_notifications(&user_id)
        .await?
        .into_iter()
        .map(NotificationDto::from)
        .collect();
    Ok(Json(NotificationListResponse {
        user_id,
        notifications,
    }))
}

/// `PUT /notifications/{id}/read` — Mark a notification read.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown notification.
#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}/read",
    tag = "Inbox",
    summary = "Mark notification read",
    params(
        ("id" = String, Path, description = "Notification id"),
    ),
    responses(
        (status = 204, description = "Marked read"),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse),
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, PipelineError> {
    state.inbox.mark_read(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Inbox routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/preferences", post(create_preference))
        .route("/users/{user_id}/notifications", get(list_notifications))
        .route("/notifications/{id}/read", put(mark_read))
}
