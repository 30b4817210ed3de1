use crate::{
    db::models::notifications::NotificationDBResponse,
    types::{NotificationId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// A notification delivered to a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: NotificationId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// What happened (e.g. "withdrawal_requested", "withdrawal_paid")
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    /// The entity this notification is about
    #[schema(value_type = Option<String>, format = "uuid")]
    pub related_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing notifications
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListNotificationsQuery {
    /// Only return unread notifications
    pub unread: Option<bool>,

    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            kind: db.kind,
            title: db.title,
            body: db.body,
            related_id: db.related_id,
            read: db.read,
            created_at: db.created_at,
        }
    }
}
