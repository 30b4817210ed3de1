use crate::{db::models::credits::UserCreditsDBResponse, types::UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Request body for `POST /credits/add` and `POST /credits/use`.
///
/// Keys are camelCase: this contract is consumed by the payment and
/// commission webhooks, which predate this service. The rest of the API
/// stays snake_case.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryCreate {
    /// User ID (required - UUID format)
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Amount of credits (absolute value, must be positive)
    #[schema(value_type = f64)]
    pub amount: Decimal,
    /// Where the entry came from (e.g. "purchase", "referral_commission")
    pub source: String,
    /// Human-readable description of the entry
    pub description: String,
    /// Optional order correlation
    #[schema(value_type = Option<String>, format = "uuid")]
    pub related_order_id: Option<Uuid>,
}

/// Success body for the ledger entrypoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerActionResponse {
    pub success: bool,
    pub message: String,
    pub amount: f64,
}

/// Query parameters for reading a balance
#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// User to read (optional; admins only for other users)
    #[param(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
}

/// A user's balance row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Lifetime credits granted
    #[schema(value_type = f64)]
    pub total_credits: Decimal,
    /// Credits spendable right now
    #[schema(value_type = f64)]
    pub available_credits: Decimal,
    /// Credits reserved by open withdrawal requests
    #[schema(value_type = f64)]
    pub pending_withdrawal: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl From<UserCreditsDBResponse> for BalanceResponse {
    fn from(db: UserCreditsDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            total_credits: db.total_credits,
            available_credits: db.available_credits,
            pending_withdrawal: db.pending_withdrawal,
            updated_at: db.updated_at,
        }
    }
}
