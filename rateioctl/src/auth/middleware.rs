use crate::{
    api::models::users::{CurrentUser, UserResponse},
    db::handlers::Users,
    errors::Error,
    AppState,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

/// Proxy-header authentication.
///
/// A trusted reverse proxy authenticates the caller and asserts their email
/// in a configurable header; we resolve that email to a user on every
/// request. A missing header or an email no user carries rejects with 401.
/// There is no auto-provisioning here: accounts come from the signup flow
/// or the admin API.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_name = state.config.auth.proxy_header.header_name.as_str();
        let email = parts
            .headers
            .get(header_name)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthorized)?;

        let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut users = Users::new(&mut conn);
        let user = users.get_user_by_email(email).await?.ok_or_else(|| {
            debug!("Rejecting unknown user {email}");
            Error::Unauthorized
        })?;

        Ok(CurrentUser::from(UserResponse::from(user)))
    }
}
