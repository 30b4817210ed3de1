use crate::{
    api::models::{
        transactions::{CreditTransactionResponse, ListTransactionsQuery},
        users::CurrentUser,
    },
    auth::permissions,
    db::handlers::Credits,
    errors::{Error, Result},
    types::{Operation, Permission, Resource, TransactionId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};

/// Get a specific transaction by ID
#[utoipa::path(
    get,
    path = "/transactions/{transaction_id}",
    tag = "transactions",
    summary = "Get a specific transaction",
    description = "Get details of a specific ledger entry. Non-admin users can only access their own transactions.",
    params(
        ("transaction_id" = String, Path, description = "Transaction ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Transaction details", body = CreditTransactionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<TransactionId>,
    current_user: CurrentUser,
) -> Result<Json<CreditTransactionResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Credits::new(&mut pool_conn);

    let has_read_all = permissions::has_permission(&current_user, Resource::Credits, Operation::ReadAll);

    let transaction = repo.get_transaction_by_id(transaction_id).await?;

    let transaction = match transaction {
        Some(tx) => {
            if !has_read_all && tx.user_id != current_user.id {
                // Return 404 to avoid leaking existence
                return Err(Error::NotFound {
                    resource: "Transaction".to_string(),
                    id: transaction_id.to_string(),
                });
            }
            tx
        }
        None => {
            return Err(Error::NotFound {
                resource: "Transaction".to_string(),
                id: transaction_id.to_string(),
            });
        }
    };

    Ok(Json(CreditTransactionResponse::from(transaction)))
}

/// List ledger entries
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    summary = "List transactions",
    description = "Get ledger entries, newest first. Non-admin users only see their own. Use user_id to filter by user (admin only).",
    params(
        ListTransactionsQuery
    ),
    responses(
        (status = 200, description = "List of transactions", body = [CreditTransactionResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot access other users' transactions"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<CreditTransactionResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let has_read_all = permissions::has_permission(&current_user, Resource::Credits, Operation::ReadAll);

    // Determine which user_id to filter by
    let filter_user_id = match query.user_id {
        Some(requested_user_id) => {
            if !has_read_all && requested_user_id != current_user.id {
                return Err(Error::InsufficientPermissions {
                    required: Permission::Allow(Resource::Credits, Operation::ReadAll),
                    action: Operation::ReadAll,
                    resource: "transactions".to_string(),
                });
            }
            Some(requested_user_id)
        }
        None => {
            if has_read_all {
                None // Admins can see all
            } else {
                Some(current_user.id) // Others see only their own
            }
        }
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Credits::new(&mut pool_conn);

    let transactions = if let Some(user_id) = filter_user_id {
        repo.list_user_transactions(user_id, skip, limit).await?
    } else {
        repo.list_all_transactions(skip, limit).await?
    };

    Ok(Json(transactions.into_iter().map(CreditTransactionResponse::from).collect()))
}
