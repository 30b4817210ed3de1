use crate::{
    db::{
        errors::Result,
        models::notifications::{NotificationCreateDBRequest, NotificationDBResponse},
    },
    types::{NotificationId, UserId},
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

// Database entity model for a notification
#[derive(Debug, Clone, FromRow)]
struct NotificationRow {
    id: NotificationId,
    user_id: UserId,
    kind: String,
    title: String,
    body: Option<String>,
    related_id: Option<Uuid>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for NotificationDBResponse {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            title: row.title,
            body: row.body,
            related_id: row.related_id,
            read: row.read,
            created_at: row.created_at,
        }
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, body, related_id, read, created_at";

pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn create(&mut self, request: &NotificationCreateDBRequest) -> Result<NotificationDBResponse> {
        let query = format!(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, related_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(request.user_id)
            .bind(&request.kind)
            .bind(&request.title)
            .bind(&request.body)
            .bind(request.related_id)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(NotificationDBResponse::from(row))
    }

    pub async fn list_for_user(
        &mut self,
        user_id: UserId,
        unread_only: bool,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<NotificationDBResponse>> {
        let query = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC, id DESC
            OFFSET $3
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .bind(unread_only)
            .bind(skip)
            .bind(limit)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows.into_iter().map(NotificationDBResponse::from).collect())
    }

    /// Acknowledge a notification. Scoped by owner, so acknowledging
    /// another user's notification reads as absent.
    pub async fn mark_read(&mut self, id: NotificationId, user_id: UserId) -> Result<Option<NotificationDBResponse>> {
        let query = format!(
            r#"
            UPDATE notifications
            SET read = true
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row.map(NotificationDBResponse::from))
    }
}
