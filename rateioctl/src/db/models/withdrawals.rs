use crate::types::{UserId, WithdrawalRequestId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Withdrawal request lifecycle, stored as a postgres enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "withdrawal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "pending"),
            WithdrawalStatus::Approved => write!(f, "approved"),
            WithdrawalStatus::Rejected => write!(f, "rejected"),
            WithdrawalStatus::Paid => write!(f, "paid"),
        }
    }
}

/// Database request for opening a withdrawal request
#[derive(Debug, Clone)]
pub struct WithdrawalCreateDBRequest {
    pub user_id: UserId,
    pub amount: Decimal,
}

/// Database response for a withdrawal request
#[derive(Debug, Clone)]
pub struct WithdrawalRequestDBResponse {
    pub id: WithdrawalRequestId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
