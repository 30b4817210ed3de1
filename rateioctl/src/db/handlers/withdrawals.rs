use crate::{
    db::{
        errors::{DbError, Result},
        models::withdrawals::{WithdrawalCreateDBRequest, WithdrawalRequestDBResponse, WithdrawalStatus},
    },
    types::{UserId, WithdrawalRequestId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Connection, FromRow, PgConnection};
use tracing::debug;

// Database entity model for a withdrawal request
#[derive(Debug, Clone, FromRow)]
struct WithdrawalRow {
    id: WithdrawalRequestId,
    user_id: UserId,
    amount: Decimal,
    status: WithdrawalStatus,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<WithdrawalRow> for WithdrawalRequestDBResponse {
    fn from(row: WithdrawalRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            status: row.status,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        }
    }
}

/// Filter for listing withdrawal requests
#[derive(Debug, Clone)]
pub struct WithdrawalFilter {
    pub user_id: Option<UserId>,
    pub status: Option<WithdrawalStatus>,
    pub skip: i64,
    pub limit: i64,
}

impl WithdrawalFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            user_id: None,
            status: None,
            skip,
            limit,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.status = Some(status);
        self
    }
}

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, status, created_at, resolved_at";

pub struct Withdrawals<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Withdrawals<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Open a withdrawal request and reserve its amount.
    ///
    /// Everything happens in one transaction: the balance row is locked up
    /// front so concurrent submissions for the same user serialize, funds
    /// move from `available_credits` into `pending_withdrawal`, the
    /// reserving debit lands in the ledger, and every admin gets a
    /// notification row. At most one pending request can exist per user;
    /// the partial unique index backs the pre-check against races.
    pub async fn create(&mut self, request: &WithdrawalCreateDBRequest) -> Result<WithdrawalRequestDBResponse> {
        let mut tx = self.db.begin().await?;

        let available = sqlx::query_scalar::<_, Decimal>("SELECT available_credits FROM user_credits WHERE user_id = $1 FOR UPDATE")
            .bind(request.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::CreditAccountNotFound { user_id: request.user_id })?;

        if available < request.amount {
            return Err(DbError::InsufficientCredits {
                available,
                requested: request.amount,
            });
        }

        let has_pending =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM withdrawal_requests WHERE user_id = $1 AND status = 'pending')")
                .bind(request.user_id)
                .fetch_one(&mut *tx)
                .await?;
        if has_pending {
            return Err(DbError::PendingWithdrawalExists { user_id: request.user_id });
        }

        let query = format!(
            r#"
            INSERT INTO withdrawal_requests (user_id, amount)
            VALUES ($1, $2)
            RETURNING {WITHDRAWAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&query)
            .bind(request.user_id)
            .bind(request.amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { ref constraint } if constraint == "idx_withdrawal_requests_one_pending" => {
                    DbError::PendingWithdrawalExists { user_id: request.user_id }
                }
                other => other,
            })?;

        sqlx::query(
            r#"
            UPDATE user_credits
            SET available_credits = available_credits - $2,
                pending_withdrawal = pending_withdrawal + $2,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(request.user_id)
        .bind(request.amount)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, entry_type, amount, source, description, related_id)
            VALUES ($1, 'debit', $2, 'withdrawal_request', $3, $4)
            "#,
        )
        .bind(request.user_id)
        .bind(request.amount)
        .bind(format!("Reserved {} credits for withdrawal", request.amount))
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
            .bind(request.user_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, related_id)
            SELECT id, 'withdrawal_requested', $1, $2, $3
            FROM users
            WHERE is_admin
            "#,
        )
        .bind("New withdrawal request")
        .bind(format!("{username} requested a withdrawal of {} credits", request.amount))
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!("Created withdrawal request {} for user {}", row.id, request.user_id);
        Ok(WithdrawalRequestDBResponse::from(row))
    }

    pub async fn get_by_id(&mut self, id: WithdrawalRequestId) -> Result<Option<WithdrawalRequestDBResponse>> {
        let query = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1");
        let row = sqlx::query_as::<_, WithdrawalRow>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(row.map(WithdrawalRequestDBResponse::from))
    }

    pub async fn list(&mut self, filter: &WithdrawalFilter) -> Result<Vec<WithdrawalRequestDBResponse>> {
        let query = format!(
            r#"
            SELECT {WITHDRAWAL_COLUMNS}
            FROM withdrawal_requests
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::withdrawal_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            OFFSET $3
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, WithdrawalRow>(&query)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.skip)
            .bind(filter.limit)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(rows.into_iter().map(WithdrawalRequestDBResponse::from).collect())
    }

    /// `pending -> approved`. Funds stay reserved until the payout is
    /// marked paid.
    pub async fn approve(&mut self, id: WithdrawalRequestId) -> Result<WithdrawalRequestDBResponse> {
        let mut tx = self.db.begin().await?;
        let row = Self::lock_request(&mut tx, id).await?;
        Self::require_status(&row, WithdrawalStatus::Pending, WithdrawalStatus::Approved)?;

        let updated = Self::transition(&mut tx, id, WithdrawalStatus::Approved).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// `pending -> rejected`. The reservation flows back to
    /// `available_credits`, the refund is logged as a `credit` entry and the
    /// requester is notified.
    pub async fn reject(&mut self, id: WithdrawalRequestId) -> Result<WithdrawalRequestDBResponse> {
        let mut tx = self.db.begin().await?;
        let row = Self::lock_request(&mut tx, id).await?;
        Self::require_status(&row, WithdrawalStatus::Pending, WithdrawalStatus::Rejected)?;

        sqlx::query(
            r#"
            UPDATE user_credits
            SET available_credits = available_credits + $2,
                pending_withdrawal = pending_withdrawal - $2,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(row.user_id)
        .bind(row.amount)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, entry_type, amount, source, description, related_id)
            VALUES ($1, 'credit', $2, 'withdrawal_refund', $3, $4)
            "#,
        )
        .bind(row.user_id)
        .bind(row.amount)
        .bind(format!("Withdrawal request rejected, {} credits returned", row.amount))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, related_id)
            VALUES ($1, 'withdrawal_rejected', $2, $3, $4)
            "#,
        )
        .bind(row.user_id)
        .bind("Withdrawal request rejected")
        .bind(format!("Your withdrawal of {} credits was rejected and refunded", row.amount))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = Self::transition(&mut tx, id, WithdrawalStatus::Rejected).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// `approved -> paid`. Clears the reservation; the reserving debit was
    /// already logged at request time, so no ledger row is appended here.
    pub async fn pay(&mut self, id: WithdrawalRequestId) -> Result<WithdrawalRequestDBResponse> {
        let mut tx = self.db.begin().await?;
        let row = Self::lock_request(&mut tx, id).await?;
        Self::require_status(&row, WithdrawalStatus::Approved, WithdrawalStatus::Paid)?;

        sqlx::query(
            r#"
            UPDATE user_credits
            SET pending_withdrawal = pending_withdrawal - $2,
                updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(row.user_id)
        .bind(row.amount)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, related_id)
            VALUES ($1, 'withdrawal_paid', $2, $3, $4)
            "#,
        )
        .bind(row.user_id)
        .bind("Withdrawal paid out")
        .bind(format!("Your withdrawal of {} credits has been paid out", row.amount))
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let updated = Self::transition(&mut tx, id, WithdrawalStatus::Paid).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn lock_request(tx: &mut PgConnection, id: WithdrawalRequestId) -> Result<WithdrawalRow> {
        let query = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, WithdrawalRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)
    }

    fn require_status(row: &WithdrawalRow, expected: WithdrawalStatus, target: WithdrawalStatus) -> Result<()> {
        if row.status != expected {
            return Err(DbError::InvalidStatusTransition {
                from: row.status,
                to: target,
            });
        }
        Ok(())
    }

    async fn transition(tx: &mut PgConnection, id: WithdrawalRequestId, status: WithdrawalStatus) -> Result<WithdrawalRequestDBResponse> {
        let query = format!(
            r#"
            UPDATE withdrawal_requests
            SET status = $2, resolved_at = now()
            WHERE id = $1
            RETURNING {WITHDRAWAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&query)
            .bind(id)
            .bind(status)
            .fetch_one(&mut *tx)
            .await?;
        Ok(WithdrawalRequestDBResponse::from(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::Credits;
    use crate::db::models::credits::{CreditEntryType, CreditTransactionCreateDBRequest};
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use std::str::FromStr;
    use uuid::Uuid;

    async fn create_test_user(pool: &PgPool, is_admin: bool) -> UserId {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, email, is_admin, referral_code, auth_source) VALUES ($1, $2, $3, $4, $5, 'test')")
            .bind(user_id)
            .bind(format!("testuser_{}", user_id.simple()))
            .bind(format!("test_{}@example.com", user_id.simple()))
            .bind(is_admin)
            .bind(user_id.simple().to_string()[..8].to_uppercase())
            .execute(pool)
            .await
            .expect("Failed to create test user");

        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(Role::Professional)
            .execute(pool)
            .await
            .expect("Failed to add user role");

        user_id
    }

    async fn grant_credits(pool: &PgPool, user_id: UserId, amount: &str) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);
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

    async fn balance(pool: &PgPool, user_id: UserId) -> (Decimal, Decimal, Decimal) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);
        let row = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        (row.total_credits, row.available_credits, row.pending_withdrawal)
    }

    async fn notification_count(pool: &PgPool, kind: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE kind = $1")
            .bind(kind)
            .fetch_one(pool)
            .await
            .expect("Failed to count notifications")
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_reserves_funds_and_notifies_admins(pool: PgPool) {
        let admin1 = create_test_user(&pool, true).await;
        let admin2 = create_test_user(&pool, true).await;
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "200").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        let request = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("125").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");

        assert_eq!(request.user_id, user_id);
        assert_eq!(request.amount, Decimal::from_str("125").unwrap());
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert!(request.resolved_at.is_none());

        let (total, available, pending) = balance(&pool, user_id).await;
        assert_eq!(total, Decimal::from_str("200").unwrap());
        assert_eq!(available, Decimal::from_str("75").unwrap());
        assert_eq!(pending, Decimal::from_str("125").unwrap());

        // The reservation is logged as a debit tied to the request
        let mut credits = Credits::new(&mut conn);
        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].entry_type, CreditEntryType::Debit);
        assert_eq!(transactions[0].source, "withdrawal_request");
        assert_eq!(transactions[0].related_id, Some(request.id));

        // One notification per admin account
        assert_eq!(notification_count(&pool, "withdrawal_requested").await, 2);
        for admin in [admin1, admin2] {
            let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND related_id = $2")
                .bind(admin)
                .bind(request.id)
                .fetch_one(&pool)
                .await
                .expect("Failed to count notifications");
            assert_eq!(count, 1);
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_without_credit_account(pool: PgPool) {
        let user_id = create_test_user(&pool, false).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        let result = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("60").unwrap(),
            })
            .await;
        assert!(matches!(result, Err(DbError::CreditAccountNotFound { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_with_insufficient_balance(pool: PgPool) {
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "100").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        let result = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("150").unwrap(),
            })
            .await;
        match result {
            Err(DbError::InsufficientCredits { available, requested }) => {
                assert_eq!(available, Decimal::from_str("100").unwrap());
                assert_eq!(requested, Decimal::from_str("150").unwrap());
            }
            other => panic!("Expected InsufficientCredits, got {other:?}"),
        }

        // Nothing moved, nothing logged
        let (_, available, pending) = balance(&pool, user_id).await;
        assert_eq!(available, Decimal::from_str("100").unwrap());
        assert_eq!(pending, Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_second_pending_request_conflicts(pool: PgPool) {
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "500").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("100").unwrap(),
            })
            .await
            .expect("Failed to create first withdrawal");

        let result = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("100").unwrap(),
            })
            .await;
        assert!(matches!(result, Err(DbError::PendingWithdrawalExists { .. })));

        // Only the first request reserved funds
        let (_, available, pending) = balance(&pool, user_id).await;
        assert_eq!(available, Decimal::from_str("400").unwrap());
        assert_eq!(pending, Decimal::from_str("100").unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_submissions_only_one_wins(pool: PgPool) {
        use std::sync::Arc;
        use tokio::task;

        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "200").await;

        let pool = Arc::new(pool);
        let mut handles = vec![];
        for _ in 0..2 {
            let pool_clone = Arc::clone(&pool);
            handles.push(task::spawn(async move {
                let mut conn = pool_clone.acquire().await.expect("Failed to acquire connection");
                let mut withdrawals = Withdrawals::new(&mut conn);
                withdrawals
                    .create(&WithdrawalCreateDBRequest {
                        user_id,
                        amount: Decimal::from_str("60").unwrap(),
                    })
                    .await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.expect("Task panicked") {
                Ok(_) => successes += 1,
                Err(DbError::PendingWithdrawalExists { .. }) => conflicts += 1,
                Err(e) => panic!("Unexpected error: {e:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);

        let (_, available, pending) = balance(&pool, user_id).await;
        assert_eq!(available, Decimal::from_str("140").unwrap());
        assert_eq!(pending, Decimal::from_str("60").unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reject_refunds_and_notifies_requester(pool: PgPool) {
        create_test_user(&pool, true).await;
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "200").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);
        let request = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("125").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");

        let rejected = withdrawals.reject(request.id).await.expect("Failed to reject withdrawal");
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert!(rejected.resolved_at.is_some());

        let (total, available, pending) = balance(&pool, user_id).await;
        assert_eq!(total, Decimal::from_str("200").unwrap());
        assert_eq!(available, Decimal::from_str("200").unwrap());
        assert_eq!(pending, Decimal::ZERO);

        // Refund shows up in the ledger as a credit
        let mut credits = Credits::new(&mut conn);
        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].entry_type, CreditEntryType::Credit);
        assert_eq!(transactions[0].source, "withdrawal_refund");
        assert_eq!(transactions[0].related_id, Some(request.id));

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND kind = 'withdrawal_rejected'")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .expect("Failed to count notifications");
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_pay_clears_reservation_without_ledger_row(pool: PgPool) {
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "200").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);
        let request = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("125").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");

        let approved = withdrawals.approve(request.id).await.expect("Failed to approve withdrawal");
        assert_eq!(approved.status, WithdrawalStatus::Approved);

        // Approval keeps the reservation in place
        let (_, available, pending) = balance(&pool, user_id).await;
        assert_eq!(available, Decimal::from_str("75").unwrap());
        assert_eq!(pending, Decimal::from_str("125").unwrap());

        let paid = withdrawals.pay(request.id).await.expect("Failed to pay withdrawal");
        assert_eq!(paid.status, WithdrawalStatus::Paid);

        let (total, available, pending) = balance(&pool, user_id).await;
        assert_eq!(total, Decimal::from_str("200").unwrap());
        assert_eq!(available, Decimal::from_str("75").unwrap());
        assert_eq!(pending, Decimal::ZERO);

        // Only the reserving debit is in the ledger
        let mut credits = Credits::new(&mut conn);
        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 2);

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND kind = 'withdrawal_paid'")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .expect("Failed to count notifications");
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_illegal_transitions_conflict(pool: PgPool) {
        let user_id = create_test_user(&pool, false).await;
        grant_credits(&pool, user_id, "200").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);
        let request = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id,
                amount: Decimal::from_str("60").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");

        // Paying a pending request skips the approval step
        let result = withdrawals.pay(request.id).await;
        assert!(matches!(
            result,
            Err(DbError::InvalidStatusTransition {
                from: WithdrawalStatus::Pending,
                to: WithdrawalStatus::Paid,
            })
        ));

        let rejected = withdrawals.reject(request.id).await.expect("Failed to reject withdrawal");
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);

        // Terminal states accept no further transitions
        let result = withdrawals.reject(request.id).await;
        assert!(matches!(result, Err(DbError::InvalidStatusTransition { .. })));
        let result = withdrawals.approve(request.id).await;
        assert!(matches!(result, Err(DbError::InvalidStatusTransition { .. })));

        // The failed attempts must not have touched the balance
        let (_, available, pending) = balance(&pool, user_id).await;
        assert_eq!(available, Decimal::from_str("200").unwrap());
        assert_eq!(pending, Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolving_missing_request_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        let result = withdrawals.approve(Uuid::new_v4()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters(pool: PgPool) {
        let user1 = create_test_user(&pool, false).await;
        let user2 = create_test_user(&pool, false).await;
        grant_credits(&pool, user1, "300").await;
        grant_credits(&pool, user2, "300").await;

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut withdrawals = Withdrawals::new(&mut conn);

        let first = withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id: user1,
                amount: Decimal::from_str("100").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");
        withdrawals.approve(first.id).await.expect("Failed to approve withdrawal");

        withdrawals
            .create(&WithdrawalCreateDBRequest {
                user_id: user2,
                amount: Decimal::from_str("80").unwrap(),
            })
            .await
            .expect("Failed to create withdrawal");

        let all = withdrawals
            .list(&WithdrawalFilter::new(0, 10))
            .await
            .expect("Failed to list withdrawals");
        assert_eq!(all.len(), 2);

        let for_user1 = withdrawals
            .list(&WithdrawalFilter::new(0, 10).for_user(user1))
            .await
            .expect("Failed to list withdrawals");
        assert_eq!(for_user1.len(), 1);
        assert_eq!(for_user1[0].user_id, user1);

        let pending_only = withdrawals
            .list(&WithdrawalFilter::new(0, 10).with_status(WithdrawalStatus::Pending))
            .await
            .expect("Failed to list withdrawals");
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].user_id, user2);

        let get = withdrawals
            .get_by_id(first.id)
            .await
            .expect("Failed to get withdrawal")
            .expect("Withdrawal should exist");
        assert_eq!(get.status, WithdrawalStatus::Approved);
    }
}
