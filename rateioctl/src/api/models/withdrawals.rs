use crate::{
    db::models::withdrawals::{WithdrawalRequestDBResponse, WithdrawalStatus},
    types::{UserId, WithdrawalRequestId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request body for `POST /withdrawals`.
///
/// camelCase keys, same webhook-era contract as the ledger entrypoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalCreate {
    /// User requesting the payout (must be the caller unless admin)
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Amount of credits to withdraw
    #[schema(value_type = f64)]
    pub amount: Decimal,
}

/// Success body for withdrawal creation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalCreatedResponse {
    pub success: bool,
    /// ID of the newly opened request
    #[schema(value_type = String, format = "uuid")]
    pub request_id: WithdrawalRequestId,
    pub amount: f64,
}

/// A withdrawal request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: WithdrawalRequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    /// When the request left the pending state
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing withdrawal requests
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListWithdrawalsQuery {
    /// Filter by user ID (optional, admin only for other users)
    #[param(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,

    /// Filter by lifecycle state
    pub status: Option<WithdrawalStatus>,

    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

impl From<WithdrawalRequestDBResponse> for WithdrawalResponse {
    fn from(db: WithdrawalRequestDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            amount: db.amount,
            status: db.status,
            created_at: db.created_at,
            resolved_at: db.resolved_at,
        }
    }
}
