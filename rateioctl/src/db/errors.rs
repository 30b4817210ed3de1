use crate::types::UserId;
use rust_decimal::Decimal;
use thiserror::Error;

use super::models::withdrawals::WithdrawalStatus;

pub type Result<T> = std::result::Result<T, DbError>;

/// Errors surfaced by the repository layer.
///
/// Postgres failures are classified into the constraint-shaped variants so
/// handlers can map them to meaningful statuses; the ledger and withdrawal
/// repositories additionally report their domain conflicts directly instead
/// of leaning on constraint violations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Resource not found")]
    NotFound,

    #[error("Unique constraint violation on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Check constraint violation on {constraint}")]
    CheckViolation { constraint: String },

    #[error("Foreign key constraint violation on {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("User {user_id} has no credit account")]
    CreditAccountNotFound { user_id: UserId },

    #[error("Insufficient credits: {available} available, {requested} requested")]
    InsufficientCredits { available: Decimal, requested: Decimal },

    #[error("User {user_id} already has a pending withdrawal request")]
    PendingWithdrawalExists { user_id: UserId },

    #[error("Withdrawal request cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => DbError::UniqueViolation { constraint },
                    sqlx::error::ErrorKind::CheckViolation => DbError::CheckViolation { constraint },
                    sqlx::error::ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { constraint },
                    _ => DbError::Sqlx(sqlx::Error::Database(db_err)),
                }
            }
            other => DbError::Sqlx(other),
        }
    }
}
