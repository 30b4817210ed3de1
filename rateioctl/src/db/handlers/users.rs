use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    types::UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{Connection, FromRow, PgConnection};
use std::collections::HashMap;

// Database entity model for a user row; roles live in user_roles and are
// stitched in separately.
#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: UserId,
    username: String,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    is_admin: bool,
    referral_code: String,
    referred_by: Option<UserId>,
    auth_source: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_response(self, roles: Vec<Role>) -> UserDBResponse {
        UserDBResponse {
            id: self.id,
            username: self.username,
            email: self.email,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            is_admin: self.is_admin,
            roles,
            referral_code: self.referral_code,
            referred_by: self.referred_by,
            auth_source: self.auth_source,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserRoleRow {
    user_id: UserId,
    role: Role,
}

/// Pagination filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, display_name, avatar_url, is_admin, referral_code, referred_by, auth_source, created_at, updated_at";

fn generate_referral_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    async fn roles_for_user(conn: &mut PgConnection, user_id: UserId) -> Result<Vec<Role>> {
        let roles = sqlx::query_scalar::<_, Role>("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
            .bind(user_id)
            .fetch_all(conn)
            .await?;
        Ok(roles)
    }

    async fn roles_for_users(conn: &mut PgConnection, user_ids: &[UserId]) -> Result<HashMap<UserId, Vec<Role>>> {
        let rows = sqlx::query_as::<_, UserRoleRow>("SELECT user_id, role FROM user_roles WHERE user_id = ANY($1)")
            .bind(user_ids)
            .fetch_all(conn)
            .await?;

        let mut map: HashMap<UserId, Vec<Role>> = HashMap::new();
        for row in rows {
            map.entry(row.user_id).or_default().push(row.role);
        }
        Ok(map)
    }

    /// Look up a user by email. Used by the auth layer on every request.
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        match row {
            Some(row) => {
                let roles = Self::roles_for_user(self.db, row.id).await?;
                Ok(Some(row.into_response(roles)))
            }
            None => Ok(None),
        }
    }

    /// Resolve a referral code to its owner.
    pub async fn get_user_by_referral_code(&mut self, code: &str) -> Result<Option<UserDBResponse>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE referral_code = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(code)
            .fetch_optional(&mut *self.db)
            .await?;

        match row {
            Some(row) => {
                let roles = Self::roles_for_user(self.db, row.id).await?;
                Ok(Some(row.into_response(roles)))
            }
            None => Ok(None),
        }
    }

}

#[async_trait]
impl Repository for Users<'_> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        // Referral codes are random, so an insert can collide with an
        // existing code. Retry with a fresh code instead of surfacing that.
        let mut attempts = 0;
        let row = loop {
            let code = request.referral_code.clone().unwrap_or_else(generate_referral_code);
            let query = format!(
                r#"
                INSERT INTO users (username, email, display_name, avatar_url, is_admin, referral_code, referred_by, auth_source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {USER_COLUMNS}
                "#
            );
            let result = sqlx::query_as::<_, UserRow>(&query)
                .bind(&request.username)
                .bind(&request.email)
                .bind(&request.display_name)
                .bind(&request.avatar_url)
                .bind(request.is_admin)
                .bind(&code)
                .bind(request.referred_by)
                .bind(&request.auth_source)
                .fetch_one(&mut *tx)
                .await
                .map_err(DbError::from);

            match result {
                Ok(row) => break row,
                Err(DbError::UniqueViolation { ref constraint })
                    if constraint == "users_referral_code_key" && request.referral_code.is_none() && attempts < 3 =>
                {
                    attempts += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        for role in &request.roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(row.id)
                .bind(role)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(row.into_response(request.roles.clone()))
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match row {
            Some(row) => {
                let roles = Self::roles_for_user(self.db, row.id).await?;
                Ok(Some(row.into_response(roles)))
            }
            None => Ok(None),
        }
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC OFFSET $1 LIMIT $2");
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;

        let ids: Vec<UserId> = rows.iter().map(|r| r.id).collect();
        let mut roles_map = Self::roles_for_users(self.db, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let roles = roles_map.remove(&row.id).unwrap_or_default();
                row.into_response(roles)
            })
            .collect())
    }

    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let query = format!(
            r#"
            UPDATE users
            SET display_name = COALESCE($2, display_name),
                avatar_url = COALESCE($3, avatar_url),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .bind(&request.display_name)
            .bind(&request.avatar_url)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

        if let Some(roles) = &request.roles {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for role in roles {
                sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                    .bind(id)
                    .bind(role)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let roles = Self::roles_for_user(&mut tx, id).await?;
        tx.commit().await?;

        Ok(row.into_response(roles))
    }

    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
