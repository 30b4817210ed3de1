use crate::{
    db::{
        errors::{DbError, Result},
        models::credits::{
            CreditEntryType, CreditTransactionCreateDBRequest, CreditTransactionDBResponse, UserCreditsDBResponse,
        },
    },
    types::{TransactionId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, PgConnection};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

// Database entity model for a ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub entry_type: CreditEntryType,
    pub amount: Decimal,
    pub source: String,
    pub description: Option<String>,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<CreditTransaction> for CreditTransactionDBResponse {
    fn from(tx: CreditTransaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            entry_type: tx.entry_type,
            amount: tx.amount,
            source: tx.source,
            description: tx.description,
            related_id: tx.related_id,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserCreditsRow {
    user_id: UserId,
    total_credits: Decimal,
    available_credits: Decimal,
    pending_withdrawal: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<UserCreditsRow> for UserCreditsDBResponse {
    fn from(row: UserCreditsRow) -> Self {
        Self {
            user_id: row.user_id,
            total_credits: row.total_credits,
            available_credits: row.available_credits,
            pending_withdrawal: row.pending_withdrawal,
            updated_at: row.updated_at,
        }
    }
}

const TRANSACTION_COLUMNS: &str = "id, user_id, entry_type, amount, source, description, related_id, created_at";

pub struct Credits<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Credits<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append a ledger entry and move the balance row accordingly.
    ///
    /// Credits upsert the balance row, so the first credit a user ever
    /// receives also creates their account. Debits never create accounts:
    /// the guarded UPDATE only claims funds that are actually available,
    /// and a zero row count is classified into the two ways it can fail.
    /// Either way the ledger row and the balance move commit together.
    pub async fn create_transaction(&mut self, request: &CreditTransactionCreateDBRequest) -> Result<CreditTransactionDBResponse> {
        let mut tx = self.db.begin().await?;

        match request.entry_type {
            CreditEntryType::Credit => {
                sqlx::query(
                    r#"
                    INSERT INTO user_credits (user_id, total_credits, available_credits)
                    VALUES ($1, $2, $2)
                    ON CONFLICT (user_id) DO UPDATE
                    SET total_credits = user_credits.total_credits + EXCLUDED.total_credits,
                        available_credits = user_credits.available_credits + EXCLUDED.available_credits,
                        updated_at = now()
                    "#,
                )
                .bind(request.user_id)
                .bind(request.amount)
                .execute(&mut *tx)
                .await?;
            }
            CreditEntryType::Debit => {
                let result = sqlx::query(
                    r#"
                    UPDATE user_credits
                    SET available_credits = available_credits - $2,
                        updated_at = now()
                    WHERE user_id = $1 AND available_credits >= $2
                    "#,
                )
                .bind(request.user_id)
                .bind(request.amount)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    let available = sqlx::query_scalar::<_, Decimal>("SELECT available_credits FROM user_credits WHERE user_id = $1")
                        .bind(request.user_id)
                        .fetch_optional(&mut *tx)
                        .await?;

                    // Returning here rolls the transaction back on drop.
                    return Err(match available {
                        Some(available) => DbError::InsufficientCredits {
                            available,
                            requested: request.amount,
                        },
                        None => DbError::CreditAccountNotFound { user_id: request.user_id },
                    });
                }
            }
        }

        let query = format!(
            r#"
            INSERT INTO credit_transactions (user_id, entry_type, amount, source, description, related_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        );
        let transaction = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(request.user_id)
            .bind(request.entry_type)
            .bind(request.amount)
            .bind(&request.source)
            .bind(&request.description)
            .bind(request.related_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CreditTransactionDBResponse::from(transaction))
    }

    /// Get the balance row for a user. Users without ledger activity have no
    /// row yet and read as all zeros.
    pub async fn get_user_balance(&mut self, user_id: UserId) -> Result<UserCreditsDBResponse> {
        let row = sqlx::query_as::<_, UserCreditsRow>(
            "SELECT user_id, total_credits, available_credits, pending_withdrawal, updated_at FROM user_credits WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(UserCreditsDBResponse::from).unwrap_or_else(|| UserCreditsDBResponse::empty(user_id)))
    }

    pub async fn get_users_balances_bulk(&mut self, user_ids: &[UserId]) -> Result<HashMap<UserId, f64>> {
        let rows = sqlx::query_as::<_, UserCreditsRow>(
            "SELECT user_id, total_credits, available_credits, pending_withdrawal, updated_at FROM user_credits WHERE user_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&mut *self.db)
        .await?;

        let mut balances_map = HashMap::new();
        for row in rows {
            balances_map.insert(
                row.user_id,
                row.available_credits.to_f64().unwrap_or_else(|| {
                    error!("Failed to convert balance to f64 for user_id {}", row.user_id);
                    0.0
                }),
            );
        }

        Ok(balances_map)
    }

    /// List ledger entries for a specific user with pagination
    pub async fn list_user_transactions(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<CreditTransactionDBResponse>> {
        let query = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2
            LIMIT $3
            "#
        );
        let transactions = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(skip)
            .bind(limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(transactions.into_iter().map(CreditTransactionDBResponse::from).collect())
    }

    /// List ledger entries across all users (admin view)
    pub async fn list_all_transactions(&mut self, skip: i64, limit: i64) -> Result<Vec<CreditTransactionDBResponse>> {
        let query = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM credit_transactions
            ORDER BY created_at DESC, id DESC
            OFFSET $1
            LIMIT $2
            "#
        );
        let transactions = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(skip)
            .bind(limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(transactions.into_iter().map(CreditTransactionDBResponse::from).collect())
    }

    /// Get a single ledger entry by its ID
    pub async fn get_transaction_by_id(&mut self, transaction_id: TransactionId) -> Result<Option<CreditTransactionDBResponse>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM credit_transactions WHERE id = $1");
        let transaction = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(transaction_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(transaction.map(CreditTransactionDBResponse::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use std::str::FromStr;
    use uuid::Uuid;

    async fn create_test_user(pool: &PgPool) -> UserId {
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, email, is_admin, referral_code, auth_source) VALUES ($1, $2, $3, false, $4, 'test')",
        )
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

    fn credit(user_id: UserId, amount: &str) -> CreditTransactionCreateDBRequest {
        CreditTransactionCreateDBRequest {
            user_id,
            entry_type: CreditEntryType::Credit,
            amount: Decimal::from_str(amount).unwrap(),
            source: "commission".to_string(),
            description: None,
            related_id: None,
        }
    }

    fn debit(user_id: UserId, amount: &str) -> CreditTransactionCreateDBRequest {
        CreditTransactionCreateDBRequest {
            user_id,
            entry_type: CreditEntryType::Debit,
            amount: Decimal::from_str(amount).unwrap(),
            source: "order_payment".to_string(),
            description: None,
            related_id: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_balance_is_zero_for_user_without_account(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        let balance = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.total_credits, Decimal::ZERO);
        assert_eq!(balance.available_credits, Decimal::ZERO);
        assert_eq!(balance.pending_withdrawal, Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_first_credit_creates_account(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        let transaction = credits
            .create_transaction(&credit(user_id, "100.50"))
            .await
            .expect("Failed to create transaction");

        assert_eq!(transaction.user_id, user_id);
        assert_eq!(transaction.entry_type, CreditEntryType::Credit);
        assert_eq!(transaction.amount, Decimal::from_str("100.50").unwrap());
        assert_eq!(transaction.source, "commission");

        let balance = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.total_credits, Decimal::from_str("100.50").unwrap());
        assert_eq!(balance.available_credits, Decimal::from_str("100.50").unwrap());
        assert_eq!(balance.pending_withdrawal, Decimal::ZERO);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_reduces_available_but_not_total(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        credits
            .create_transaction(&credit(user_id, "100"))
            .await
            .expect("Failed to create credit");
        credits
            .create_transaction(&debit(user_id, "30"))
            .await
            .expect("Failed to create debit");

        let balance = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_credits, Decimal::from_str("70").unwrap());
        assert_eq!(balance.total_credits, Decimal::from_str("100").unwrap());

        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].entry_type, CreditEntryType::Debit);
        assert_eq!(transactions[1].entry_type, CreditEntryType::Credit);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_without_account_fails(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        let result = credits.create_transaction(&debit(user_id, "10")).await;
        match result {
            Err(DbError::CreditAccountNotFound { user_id: reported }) => assert_eq!(reported, user_id),
            other => panic!("Expected CreditAccountNotFound, got {other:?}"),
        }

        // No ledger row may survive the failed debit
        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert!(transactions.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_beyond_available_fails_and_rolls_back(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        credits
            .create_transaction(&credit(user_id, "50"))
            .await
            .expect("Failed to create credit");

        let result = credits.create_transaction(&debit(user_id, "80")).await;
        match result {
            Err(DbError::InsufficientCredits { available, requested }) => {
                assert_eq!(available, Decimal::from_str("50").unwrap());
                assert_eq!(requested, Decimal::from_str("80").unwrap());
            }
            other => panic!("Expected InsufficientCredits, got {other:?}"),
        }

        let balance = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_credits, Decimal::from_str("50").unwrap());

        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 1);
    }

    /// Concurrent debits against one account must never overspend. Each
    /// debit claims funds with a guarded UPDATE, so out of ten 30-credit
    /// debits against a 100-credit balance exactly three can win.
    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_debits_never_overspend(pool: PgPool) {
        use std::sync::Arc;
        use tokio::task;

        let user_id = create_test_user(&pool).await;
        {
            let mut conn = pool.acquire().await.expect("Failed to acquire connection");
            let mut credits = Credits::new(&mut conn);
            credits
                .create_transaction(&credit(user_id, "100"))
                .await
                .expect("Failed to create initial credit");
        }

        let pool = Arc::new(pool);
        let mut handles = vec![];
        for _ in 0..10 {
            let pool_clone = Arc::clone(&pool);
            handles.push(task::spawn(async move {
                let mut conn = pool_clone.acquire().await.expect("Failed to acquire connection");
                let mut credits = Credits::new(&mut conn);
                credits.create_transaction(&debit(user_id, "30")).await
            }));
        }

        let mut successes = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.expect("Task panicked") {
                Ok(_) => successes += 1,
                Err(DbError::InsufficientCredits { .. }) => insufficient += 1,
                Err(e) => panic!("Unexpected error: {e:?}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(insufficient, 7);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);
        let balance = credits.get_user_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_credits, Decimal::from_str("10").unwrap());
        assert_eq!(balance.total_credits, Decimal::from_str("100").unwrap());

        let transactions = credits
            .list_user_transactions(user_id, 0, 100)
            .await
            .expect("Failed to list transactions");
        // 1 credit + 3 winning debits
        assert_eq!(transactions.len(), 4);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_user_transactions_ordering_and_pagination(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        for i in 1..=5 {
            credits
                .create_transaction(&credit(user_id, &format!("{}", i * 10)))
                .await
                .expect("Failed to create transaction");
        }

        let transactions = credits
            .list_user_transactions(user_id, 0, 10)
            .await
            .expect("Failed to list transactions");
        assert_eq!(transactions.len(), 5);
        for pair in transactions.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at, "Entries are not ordered by created_at DESC");
            if pair[0].created_at == pair[1].created_at {
                assert!(pair[0].id > pair[1].id, "Entries with same created_at are not ordered by id DESC");
            }
        }

        let page = credits
            .list_user_transactions(user_id, 2, 2)
            .await
            .expect("Failed to list transactions");
        assert_eq!(page.len(), 2);

        let beyond = credits
            .list_user_transactions(user_id, 10, 2)
            .await
            .expect("Failed to list transactions");
        assert!(beyond.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_all_transactions_spans_users(pool: PgPool) {
        let user1 = create_test_user(&pool).await;
        let user2 = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        credits
            .create_transaction(&credit(user1, "100"))
            .await
            .expect("Failed to create transaction");
        credits
            .create_transaction(&credit(user2, "200"))
            .await
            .expect("Failed to create transaction");

        let transactions = credits.list_all_transactions(0, 10).await.expect("Failed to list transactions");
        assert!(transactions.len() >= 2);
        assert!(transactions.iter().any(|t| t.user_id == user1));
        assert!(transactions.iter().any(|t| t.user_id == user2));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_transaction_by_id(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        let created = credits
            .create_transaction(&credit(user_id, "42"))
            .await
            .expect("Failed to create transaction");

        let fetched = credits
            .get_transaction_by_id(created.id)
            .await
            .expect("Failed to get transaction")
            .expect("Transaction should exist");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.amount, Decimal::from_str("42").unwrap());

        assert!(credits
            .get_transaction_by_id(Uuid::new_v4())
            .await
            .expect("Failed to get transaction")
            .is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_bulk_balances(pool: PgPool) {
        let user1 = create_test_user(&pool).await;
        let user2 = create_test_user(&pool).await;
        let user3 = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut credits = Credits::new(&mut conn);

        credits
            .create_transaction(&credit(user1, "10.50"))
            .await
            .expect("Failed to create transaction");
        credits
            .create_transaction(&credit(user2, "20"))
            .await
            .expect("Failed to create transaction");

        let balances = credits
            .get_users_balances_bulk(&[user1, user2, user3])
            .await
            .expect("Failed to get bulk balances");

        assert_eq!(balances.get(&user1), Some(&10.5));
        assert_eq!(balances.get(&user2), Some(&20.0));
        // No account row yet, so no entry in the map
        assert_eq!(balances.get(&user3), None);
    }
}
