use crate::api::models::users::{Role, UserCreate, UserUpdate};
use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub roles: Vec<Role>,
    pub auth_source: String,
    /// Referral code to publish for this user. Generated by the repository
    /// when absent.
    pub referral_code: Option<String>,
    /// The user whose referral code was used at signup, already resolved to
    /// an id. Unresolvable codes are dropped before this point.
    pub referred_by: Option<UserId>,
}

impl From<UserCreate> for UserCreateDBRequest {
    fn from(user: UserCreate) -> Self {
        Self {
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            is_admin: false,
            roles: user.roles,
            auth_source: "admin_api".to_string(),
            referral_code: None,
            referred_by: None,
        }
    }
}

/// Database request for updating an existing user
#[derive(Debug, Clone)]
pub struct UserUpdateDBRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: Option<Vec<Role>>,
}

impl UserUpdateDBRequest {
    pub fn new(update: UserUpdate) -> Self {
        Self {
            display_name: update.display_name,
            avatar_url: update.avatar_url,
            roles: update.roles,
        }
    }
}

/// Database response for a user, roles included
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub roles: Vec<Role>,
    pub referral_code: String,
    pub referred_by: Option<UserId>,
    pub auth_source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
