use crate::types::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Database request for creating a notification for one user
#[derive(Debug, Clone)]
pub struct NotificationCreateDBRequest {
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub related_id: Option<Uuid>,
}

/// Database response for a notification
#[derive(Debug, Clone)]
pub struct NotificationDBResponse {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: Option<String>,
    pub related_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
