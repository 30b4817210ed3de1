use crate::db::errors::Result;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};

/// Aggregates over the whole platform, computed on demand and normally
/// served through the cache.
#[derive(Debug, Clone, FromRow)]
pub struct PlatformStatsDBResponse {
    pub total_users: i64,
    pub credits_in_circulation: Decimal,
    pub pending_withdrawal_total: Decimal,
    pub pending_withdrawal_count: i64,
}

pub struct Stats<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Stats<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn platform_stats(&mut self) -> Result<PlatformStatsDBResponse> {
        let stats = sqlx::query_as::<_, PlatformStatsDBResponse>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COALESCE(SUM(available_credits), 0) FROM user_credits) AS credits_in_circulation,
                (SELECT COALESCE(SUM(pending_withdrawal), 0) FROM user_credits) AS pending_withdrawal_total,
                (SELECT COUNT(*) FROM withdrawal_requests WHERE status = 'pending') AS pending_withdrawal_count
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::{Credits, Withdrawals};
    use crate::db::models::credits::{CreditEntryType, CreditTransactionCreateDBRequest};
    use crate::db::models::withdrawals::WithdrawalCreateDBRequest;
    use crate::types::UserId;
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use std::str::FromStr;
    use uuid::Uuid;

    async fn create_test_user(pool: &PgPool) -> UserId {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, email, is_admin, referral_code, auth_source) VALUES ($1, $2, $3, false, $4, 'test')")
            .bind(user_id)
            .bind(format!("testuser_{}", user_id.simple()))
            .bind(format!("test_{}@example.com", user_id.simple()))
            .bind(user_id.simple().to_string()[..8].to_uppercase())
            .execute(pool)
            .await
            .expect("Failed to create test user");

        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(Role::Customer)
            .execute(pool)
            .await
            .expect("Failed to add user role");

        user_id
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_platform_stats(pool: PgPool) {
        let user1 = create_test_user(&pool).await;
        let user2 = create_test_user(&pool).await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        {
            let mut credits = Credits::new(&mut conn);
            for (user_id, amount) in [(user1, "100"), (user2, "200")] {
                credits
                    .create_transaction(&CreditTransactionCreateDBRequest {
                        user_id,
                        entry_type: CreditEntryType::Credit,
                        amount: Decimal::from_str(amount).unwrap(),
                        source: "commission".to_string(),
                        description: None,
                        related_id: None,
                    })
                    .await
                    .expect("Failed to grant credits");
            }
        }
        {
            let mut withdrawals = Withdrawals::new(&mut conn);
            withdrawals
                .create(&WithdrawalCreateDBRequest {
                    user_id: user2,
                    amount: Decimal::from_str("80").unwrap(),
                })
                .await
                .expect("Failed to create withdrawal");
        }

        let mut stats = Stats::new(&mut conn);
        let snapshot = stats.platform_stats().await.expect("Failed to compute stats");

        assert_eq!(snapshot.total_users, 2);
        assert_eq!(snapshot.credits_in_circulation, Decimal::from_str("220").unwrap());
        assert_eq!(snapshot.pending_withdrawal_total, Decimal::from_str("80").unwrap());
        assert_eq!(snapshot.pending_withdrawal_count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_platform_stats_empty_database(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut stats = Stats::new(&mut conn);
        let snapshot = stats.platform_stats().await.expect("Failed to compute stats");

        assert_eq!(snapshot.total_users, 0);
        assert_eq!(snapshot.credits_in_circulation, Decimal::ZERO);
        assert_eq!(snapshot.pending_withdrawal_total, Decimal::ZERO);
        assert_eq!(snapshot.pending_withdrawal_count, 0);
    }
}
