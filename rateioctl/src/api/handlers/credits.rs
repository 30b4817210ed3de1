use crate::{
    api::models::{
        credits::{BalanceQuery, BalanceResponse, LedgerActionResponse, LedgerEntryCreate},
        users::CurrentUser,
    },
    auth::permissions::{self, operation, resource, RequiresPermission},
    cache::keys,
    db::{
        handlers::Credits,
        models::credits::{CreditEntryType, CreditTransactionCreateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, Permission, Resource},
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Json,
};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use tracing::error;

/// Shared body of the two ledger entrypoints. Validates, appends the entry
/// and drops the cached balance for the affected user.
async fn apply_ledger_entry(state: &AppState, data: LedgerEntryCreate, entry_type: CreditEntryType) -> Result<LedgerActionResponse> {
    if data.amount <= Decimal::ZERO {
        return Err(Error::BadRequest {
            message: "Amount must be greater than zero".to_string(),
        });
    }
    if data.source.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Source must not be empty".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Credits::new(&mut pool_conn);

    let db_request = CreditTransactionCreateDBRequest {
        user_id: data.user_id,
        entry_type,
        amount: data.amount,
        source: data.source,
        description: Some(data.description),
        related_id: data.related_order_id,
    };

    let transaction = repo.create_transaction(&db_request).await?;

    // The cached balance is stale the moment the ledger moves
    state.cache.invalidate(&keys::user_balance(data.user_id)).await;

    let amount = transaction.amount.to_f64().unwrap_or_else(|| {
        error!("Failed to convert amount to f64 for transaction {}", transaction.id);
        0.0
    });
    let verb = match entry_type {
        CreditEntryType::Credit => "Added",
        CreditEntryType::Debit => "Used",
    };
    Ok(LedgerActionResponse {
        success: true,
        message: format!("{verb} {} credits", transaction.amount),
        amount,
    })
}

/// Grant credits to a user
#[utoipa::path(
    post,
    path = "/credits/add",
    tag = "credits",
    summary = "Add credits",
    description = "Append a credit to a user's ledger, creating their balance row on first use (admin only; called by the payment and commission webhooks)",
    request_body = LedgerEntryCreate,
    responses(
        (status = 200, description = "Credits added", body = LedgerActionResponse),
        (status = 400, description = "Bad request - amount must be positive"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn add_credits(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Credits, operation::CreateAll>,
    Json(data): Json<LedgerEntryCreate>,
) -> Result<Json<LedgerActionResponse>> {
    Ok(Json(apply_ledger_entry(&state, data, CreditEntryType::Credit).await?))
}

/// Spend credits from a user's balance
#[utoipa::path(
    post,
    path = "/credits/use",
    tag = "credits",
    summary = "Use credits",
    description = "Append a debit to a user's ledger. Fails without touching the balance when the user has no credits row or not enough available credits (admin only; called by the order pipeline)",
    request_body = LedgerEntryCreate,
    responses(
        (status = 200, description = "Credits used", body = LedgerActionResponse),
        (status = 400, description = "Bad request - amount must be positive, or insufficient credits"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "User has no credit account"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn use_credits(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Credits, operation::CreateAll>,
    Json(data): Json<LedgerEntryCreate>,
) -> Result<Json<LedgerActionResponse>> {
    Ok(Json(apply_ledger_entry(&state, data, CreditEntryType::Debit).await?))
}

/// Read a user's balance
#[utoipa::path(
    get,
    path = "/credits/balance",
    tag = "credits",
    summary = "Get credit balance",
    description = "Get the caller's balance, or any user's with admin access. Served through the TTL cache.",
    params(
        BalanceQuery
    ),
    responses(
        (status = 200, description = "Balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot read other users' balances"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
    current_user: CurrentUser,
) -> Result<Json<BalanceResponse>> {
    let target_user_id = query.user_id.unwrap_or(current_user.id);

    if target_user_id == current_user.id {
        if !permissions::can_read_own_resource(&current_user, Resource::Credits, target_user_id) {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(Resource::Credits, Operation::ReadOwn),
                action: Operation::ReadOwn,
                resource: "credit balance".to_string(),
            });
        }
    } else if !permissions::has_permission(&current_user, Resource::Credits, Operation::ReadAll) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Credits, Operation::ReadAll),
            action: Operation::ReadAll,
            resource: "credit balance".to_string(),
        });
    }

    let db = state.db.clone();
    let balance = state
        .cache
        .get_or_fetch(&keys::user_balance(target_user_id), Some(state.config.cache.ttl), move || async move {
            let mut pool_conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = Credits::new(&mut pool_conn);
            let row = repo.get_user_balance(target_user_id).await?;
            Ok::<_, Error>(BalanceResponse::from(row))
        })
        .await?;

    Ok(Json(balance))
}
