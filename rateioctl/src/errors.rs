use crate::db::errors::DbError;
use crate::types::{Operation, Permission};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

/// API-level errors. Every variant renders as `{"error": <message>}` with
/// the status code the variant implies; internal failures are logged and
/// never leak their details to the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("{resource} with id {id} not found")]
    NotFound { resource: String, id: String },

    #[error("Insufficient permissions: {action} on {resource} requires {required:?}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    #[error(transparent)]
    Database(#[from] DbError),
}

impl Error {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Error::BadRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Error::InsufficientPermissions { .. } => (StatusCode::FORBIDDEN, self.to_string()),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
                DbError::CreditAccountNotFound { .. } => (StatusCode::NOT_FOUND, db_err.to_string()),
                DbError::InsufficientCredits { .. } => (StatusCode::BAD_REQUEST, db_err.to_string()),
                DbError::PendingWithdrawalExists { .. } => (StatusCode::CONFLICT, db_err.to_string()),
                DbError::InvalidStatusTransition { .. } => (StatusCode::CONFLICT, db_err.to_string()),
                DbError::UniqueViolation { .. } => (StatusCode::CONFLICT, db_err.to_string()),
                DbError::CheckViolation { .. } => (StatusCode::BAD_REQUEST, db_err.to_string()),
                // The only dangling references our inserts can produce are
                // to users, so report the referenced row as missing.
                DbError::ForeignKeyViolation { .. } => (StatusCode::NOT_FOUND, "Referenced user not found".to_string()),
                DbError::Sqlx(e) => {
                    error!("Database error: {e}");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resource;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_ledger_error_statuses() {
        let (status, _) = Error::Database(DbError::InsufficientCredits {
            available: Decimal::from(10),
            requested: Decimal::from(30),
        })
        .status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = Error::Database(DbError::CreditAccountNotFound { user_id: Uuid::new_v4() }).status_and_message();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = Error::Database(DbError::PendingWithdrawalExists { user_id: Uuid::new_v4() }).status_and_message();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let (status, message) = Error::Database(DbError::Sqlx(sqlx::Error::PoolTimedOut)).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "Internal server error");
    }

    #[test]
    fn test_permission_error_is_forbidden() {
        let error = Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Credits, Operation::CreateAll),
            action: Operation::CreateAll,
            resource: "Credits".to_string(),
        };
        let (status, message) = error.status_and_message();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(message.contains("Insufficient permissions"));
    }
}
