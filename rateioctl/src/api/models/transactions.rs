use crate::{
    db::models::credits::{CreditEntryType, CreditTransactionDBResponse},
    types::{TransactionId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreditTransactionResponse {
    /// Transaction ID
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    /// User ID
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Whether the entry added or removed available credits
    pub entry_type: CreditEntryType,
    /// Amount of credits (absolute value)
    #[schema(value_type = f64)]
    pub amount: Decimal,
    /// Where the entry came from
    pub source: String,
    /// Description
    pub description: Option<String>,
    /// Correlated order or withdrawal request
    #[schema(value_type = Option<String>, format = "uuid")]
    pub related_id: Option<Uuid>,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

/// Query parameters for listing transactions
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    /// Filter by user ID (optional, admin only for other users)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[param(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,

    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

// Conversions
impl From<CreditTransactionDBResponse> for CreditTransactionResponse {
    fn from(db: CreditTransactionDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            entry_type: db.entry_type,
            amount: db.amount,
            source: db.source,
            description: db.description,
            related_id: db.related_id,
            created_at: db.created_at,
        }
    }
}
