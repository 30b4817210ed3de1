use crate::db::handlers::stats::PlatformStatsDBResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Platform-wide aggregates for the admin dashboard
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlatformStatsResponse {
    /// Total registered accounts
    pub total_users: i64,
    /// Sum of all spendable credits
    #[schema(value_type = f64)]
    pub credits_in_circulation: Decimal,
    /// Sum of credits reserved by pending withdrawal requests
    #[schema(value_type = f64)]
    pub pending_withdrawal_total: Decimal,
    /// Number of withdrawal requests awaiting review
    pub pending_withdrawal_count: i64,
}

impl From<PlatformStatsDBResponse> for PlatformStatsResponse {
    fn from(db: PlatformStatsDBResponse) -> Self {
        Self {
            total_users: db.total_users,
            credits_in_circulation: db.credits_in_circulation,
            pending_withdrawal_total: db.pending_withdrawal_total,
            pending_withdrawal_count: db.pending_withdrawal_count,
        }
    }
}
