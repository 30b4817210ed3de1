use crate::types::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Ledger entry direction, stored as TEXT in the database
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditEntryType {
    Credit,
    Debit,
}

/// Database request for appending a ledger entry.
///
/// The repository decides how the balance row moves; this only carries the
/// facts of the entry itself.
#[derive(Debug, Clone)]
pub struct CreditTransactionCreateDBRequest {
    pub user_id: UserId,
    pub entry_type: CreditEntryType,
    pub amount: Decimal,
    pub source: String,
    pub description: Option<String>,
    pub related_id: Option<Uuid>,
}

/// Database response for a ledger entry
#[derive(Debug, Clone)]
pub struct CreditTransactionDBResponse {
    pub id: TransactionId,
    pub user_id: UserId,
    pub entry_type: CreditEntryType,
    pub amount: Decimal,
    pub source: String,
    pub description: Option<String>,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Database response for a user's balance row
#[derive(Debug, Clone)]
pub struct UserCreditsDBResponse {
    pub user_id: UserId,
    pub total_credits: Decimal,
    pub available_credits: Decimal,
    pub pending_withdrawal: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl UserCreditsDBResponse {
    /// Balance row for a user with no ledger activity yet. Accounts are
    /// created lazily on first credit, so absence just means all zeros.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            total_credits: Decimal::ZERO,
            available_credits: Decimal::ZERO,
            pending_withdrawal: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}
