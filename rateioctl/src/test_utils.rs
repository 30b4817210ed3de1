use crate::{
    api::models::users::Role,
    config::{Config, ProxyHeaderAuthConfig},
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
};
use axum_test::TestServer;
use sqlx::PgPool;
use tokio_util::sync::DropGuard;
use uuid::Uuid;

/// Build the full router over a test database. The guard stops the cache
/// sweeper when dropped.
pub async fn create_test_app(pool: PgPool) -> (TestServer, DropGuard) {
    let config = create_test_config();
    let (router, drop_guard) = crate::setup_app(pool, config).await.expect("Failed to setup test app");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, drop_guard)
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        enable_metrics: false,
        ..Default::default()
    }
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let user_id = Uuid::new_v4();
    let username = format!("testuser_{}", user_id.simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username,
        email,
        display_name: Some("Test User".to_string()),
        avatar_url: None,
        is_admin: false,
        roles: vec![role],
        auth_source: "test".to_string(),
        referral_code: None,
        referred_by: None,
    };

    users_repo.create(&user_create).await.expect("Failed to create test user")
}

pub async fn create_test_admin_user(pool: &PgPool, role: Role) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let user_id = Uuid::new_v4();
    let username = format!("testadmin_{}", user_id.simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username,
        email,
        display_name: Some("Test Admin User".to_string()),
        avatar_url: None,
        is_admin: true,
        roles: vec![role],
        auth_source: "test".to_string(),
        referral_code: None,
        referred_by: None,
    };

    users_repo.create(&user_create).await.expect("Failed to create test admin user")
}

pub fn add_auth_headers(user: &UserDBResponse) -> (String, String) {
    (ProxyHeaderAuthConfig::default().header_name, user.email.clone())
}
