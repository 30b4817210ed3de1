use crate::{
    api::models::notifications::{ListNotificationsQuery, NotificationResponse},
    auth::permissions::{operation, resource, RequiresPermission},
    db::handlers::Notifications,
    errors::{Error, Result},
    types::NotificationId,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};

/// List the caller's notifications
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    summary = "List notifications",
    description = "List the caller's notifications, newest first. Notifications are strictly personal; there is no cross-user view.",
    params(
        ListNotificationsQuery
    ),
    responses(
        (status = 200, description = "List of notifications", body = Vec<NotificationResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    current_user: RequiresPermission<resource::Notifications, operation::ReadOwn>,
) -> Result<Json<Vec<NotificationResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let unread_only = query.unread.unwrap_or(false);

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut pool_conn);
    let notifications = repo.list_for_user(current_user.id, unread_only, skip, limit).await?;
    Ok(Json(notifications.into_iter().map(NotificationResponse::from).collect()))
}

/// Acknowledge a notification
#[utoipa::path(
    patch,
    path = "/notifications/{id}/read",
    tag = "notifications",
    summary = "Mark a notification as read",
    description = "Acknowledge one of the caller's notifications. Another user's notification reads as not found.",
    params(
        ("id" = String, Path, description = "Notification ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Notification acknowledged", body = NotificationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateOwn>,
) -> Result<Json<NotificationResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut pool_conn);

    let notification = repo.mark_read(id, current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Notification".to_string(),
        id: id.to_string(),
    })?;
    Ok(Json(NotificationResponse::from(notification)))
}
