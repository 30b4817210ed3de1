use crate::{
    api::models::{
        users::CurrentUser,
        withdrawals::{ListWithdrawalsQuery, WithdrawalCreate, WithdrawalCreatedResponse, WithdrawalResponse},
    },
    auth::permissions::{self, operation, resource, RequiresPermission},
    cache::keys,
    db::{
        handlers::{withdrawals::WithdrawalFilter, Withdrawals},
        models::withdrawals::WithdrawalCreateDBRequest,
    },
    errors::{Error, Result},
    types::{Operation, Permission, Resource, WithdrawalRequestId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use rust_decimal::prelude::ToPrimitive;
use tracing::error;

/// Open a withdrawal request
#[utoipa::path(
    post,
    path = "/withdrawals",
    tag = "withdrawals",
    summary = "Request a withdrawal",
    description = "Open a withdrawal request, moving the amount out of available credits into the pending reservation. At most one pending request per user; every admin is notified.",
    request_body = WithdrawalCreate,
    responses(
        (status = 200, description = "Withdrawal request opened", body = WithdrawalCreatedResponse),
        (status = 400, description = "Bad request - below the minimum or insufficient credits"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot request a withdrawal for another user"),
        (status = 404, description = "User has no credit account"),
        (status = 409, description = "Conflict - a pending request already exists"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Withdrawals, operation::CreateOwn>,
    Json(data): Json<WithdrawalCreate>,
) -> Result<Json<WithdrawalCreatedResponse>> {
    if data.user_id != current_user.id && !permissions::has_permission(&current_user, Resource::Withdrawals, Operation::CreateAll) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Withdrawals, Operation::CreateAll),
            action: Operation::CreateAll,
            resource: "withdrawal request".to_string(),
        });
    }

    let minimum = state.config.withdrawals.minimum_amount;
    if data.amount < minimum {
        return Err(Error::BadRequest {
            message: format!("Withdrawal amount must be at least {minimum} credits"),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Withdrawals::new(&mut pool_conn);
    let request = repo
        .create(&WithdrawalCreateDBRequest {
            user_id: data.user_id,
            amount: data.amount,
        })
        .await?;

    // The reservation moved funds out of available credits
    state.cache.invalidate(&keys::user_balance(data.user_id)).await;

    let amount = request.amount.to_f64().unwrap_or_else(|| {
        error!("Failed to convert amount to f64 for withdrawal {}", request.id);
        0.0
    });
    Ok(Json(WithdrawalCreatedResponse {
        success: true,
        request_id: request.id,
        amount,
    }))
}

/// List withdrawal requests
#[utoipa::path(
    get,
    path = "/withdrawals",
    tag = "withdrawals",
    summary = "List withdrawal requests",
    description = "List withdrawal requests, newest first. Regular users see their own; admins can list everyone's and filter by user or status.",
    params(
        ListWithdrawalsQuery
    ),
    responses(
        (status = 200, description = "List of withdrawal requests", body = Vec<WithdrawalResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot list other users' requests"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Query(query): Query<ListWithdrawalsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<WithdrawalResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);
    let has_read_all = permissions::has_permission(&current_user, Resource::Withdrawals, Operation::ReadAll);

    let filter_user_id = match query.user_id {
        Some(user_id) if user_id != current_user.id && !has_read_all => {
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(Resource::Withdrawals, Operation::ReadAll),
                action: Operation::ReadAll,
                resource: "withdrawal requests".to_string(),
            });
        }
        Some(user_id) => Some(user_id),
        None if has_read_all => None,
        None => Some(current_user.id),
    };

    let mut filter = WithdrawalFilter::new(skip, limit);
    if let Some(user_id) = filter_user_id {
        filter = filter.for_user(user_id);
    }
    if let Some(status) = query.status {
        filter = filter.with_status(status);
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Withdrawals::new(&mut pool_conn);
    let requests = repo.list(&filter).await?;
    Ok(Json(requests.into_iter().map(WithdrawalResponse::from).collect()))
}

/// Approve a pending withdrawal request
#[utoipa::path(
    patch,
    path = "/withdrawals/{id}/approve",
    tag = "withdrawals",
    summary = "Approve a withdrawal request",
    description = "Move a pending request to approved. The reservation stays in place until the payout is marked paid.",
    params(
        ("id" = String, Path, description = "Withdrawal request ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Request approved", body = WithdrawalResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "Withdrawal request not found"),
        (status = 409, description = "Conflict - request is not pending"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Withdrawals, operation::UpdateAll>,
    Path(id): Path<WithdrawalRequestId>,
) -> Result<Json<WithdrawalResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Withdrawals::new(&mut pool_conn);
    let request = repo.approve(id).await?;
    Ok(Json(WithdrawalResponse::from(request)))
}

/// Reject a pending withdrawal request
#[utoipa::path(
    patch,
    path = "/withdrawals/{id}/reject",
    tag = "withdrawals",
    summary = "Reject a withdrawal request",
    description = "Move a pending request to rejected. The reserved amount flows back into available credits and the requester is notified.",
    params(
        ("id" = String, Path, description = "Withdrawal request ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Request rejected and refunded", body = WithdrawalResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "Withdrawal request not found"),
        (status = 409, description = "Conflict - request is not pending"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Withdrawals, operation::UpdateAll>,
    Path(id): Path<WithdrawalRequestId>,
) -> Result<Json<WithdrawalResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Withdrawals::new(&mut pool_conn);
    let request = repo.reject(id).await?;

    // The refund lands back in available credits
    state.cache.invalidate(&keys::user_balance(request.user_id)).await;

    Ok(Json(WithdrawalResponse::from(request)))
}

/// Mark an approved withdrawal request as paid
#[utoipa::path(
    patch,
    path = "/withdrawals/{id}/pay",
    tag = "withdrawals",
    summary = "Mark a withdrawal request as paid",
    description = "Move an approved request to paid, clearing the reservation. The payout itself happens outside this service.",
    params(
        ("id" = String, Path, description = "Withdrawal request ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Request marked as paid", body = WithdrawalResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "Withdrawal request not found"),
        (status = 409, description = "Conflict - request is not approved"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn pay_withdrawal(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Withdrawals, operation::UpdateAll>,
    Path(id): Path<WithdrawalRequestId>,
) -> Result<Json<WithdrawalResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Withdrawals::new(&mut pool_conn);
    let request = repo.pay(id).await?;

    // Clearing the reservation changes the balance row
    state.cache.invalidate(&keys::user_balance(request.user_id)).await;

    Ok(Json(WithdrawalResponse::from(request)))
}
