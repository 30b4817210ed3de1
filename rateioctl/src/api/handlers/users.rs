use crate::{
    api::models::users::{CurrentUser, GetUserQuery, ListUsersQuery, UserCreate, UserResponse, UserUpdate},
    auth::permissions::{self, operation, resource, RequiresPermission},
    db::{
        handlers::{users::UserFilter, Credits, Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{Operation, Permission, Resource, UserId, UserIdOrCurrent},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use rust_decimal::prelude::ToPrimitive;
use tracing::{error, warn};

/// List users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "List all users (admin only). Pass include=billing to attach live credit balances.",
    params(
        ListUsersQuery
    ),
    responses(
        (status = 200, description = "List of users", body = [UserResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    current_user: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<Vec<UserResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let users;
    {
        let mut repo = Users::new(&mut tx);
        users = repo.list(&UserFilter::new(skip, limit)).await?;
    }

    let includes: Vec<&str> = query
        .include
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    // Balances ride along only when the caller may read everyone's credits
    let balances_map = if includes.contains(&"billing") && permissions::can_read_all_resources(&current_user, Resource::Credits) {
        let user_ids: Vec<UserId> = users.iter().map(|u| u.id).collect();
        let mut credits_repo = Credits::new(&mut tx);
        Some(credits_repo.get_users_balances_bulk(&user_ids).await?)
    } else {
        None
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let response_users: Vec<UserResponse> = users
        .into_iter()
        .map(|user| {
            let response = UserResponse::from(user);
            match &balances_map {
                // Users with no ledger activity yet read as zero
                Some(balances) => {
                    let balance = balances.get(&response.id).copied().unwrap_or(0.0);
                    response.with_credit_balance(balance)
                }
                None => response,
            }
        })
        .collect();

    Ok(Json(response_users))
}

/// Get a user by id, or the caller through the current alias
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    description = "Get a specific user by ID, or the caller via /users/current. Pass include=billing to attach the live credit balance.",
    params(
        ("user_id" = String, Path, description = "User ID (UUID) or 'current' for the authenticated user"),
        GetUserQuery,
    ),
    responses(
        (status = 200, description = "User information", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - can only view own user data unless admin"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    Query(query): Query<GetUserQuery>,
    // Own-or-admin access cannot be expressed as a single RequiresPermission
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let target_user_id = match user_id {
        UserIdOrCurrent::Current(_) => {
            // Even the alias requires the ReadOwn grant
            if !permissions::can_read_own_resource(&current_user, Resource::Users, current_user.id) {
                return Err(Error::InsufficientPermissions {
                    required: Permission::Allow(Resource::Users, Operation::ReadOwn),
                    action: Operation::ReadOwn,
                    resource: "current user data".to_string(),
                });
            }
            current_user.id
        }
        UserIdOrCurrent::Id(uuid) => {
            if !permissions::can_read_all_resources(&current_user, Resource::Users)
                && !permissions::can_read_own_resource(&current_user, Resource::Users, uuid)
            {
                return Err(Error::InsufficientPermissions {
                    required: Permission::Any(vec![
                        Permission::Allow(Resource::Users, Operation::ReadAll),
                        Permission::Allow(Resource::Users, Operation::ReadOwn),
                    ]),
                    action: Operation::ReadAll,
                    resource: format!("user data for user {uuid}"),
                });
            }
            uuid
        }
    };

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);

    let user = repo.get_by_id(target_user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: target_user_id.to_string(),
    })?;

    let mut response = UserResponse::from(user);

    // Billing is attached when asked for and the caller may read that balance;
    // otherwise the include is silently dropped
    if query.include.as_deref().is_some_and(|includes| includes.contains("billing"))
        && (permissions::can_read_all_resources(&current_user, Resource::Credits)
            || permissions::can_read_own_resource(&current_user, Resource::Credits, target_user_id))
    {
        let mut credits_repo = Credits::new(&mut pool_conn);
        let balance = credits_repo.get_user_balance(target_user_id).await?;
        let available = balance.available_credits.to_f64().unwrap_or_else(|| {
            error!("Failed to convert balance to f64 for user {target_user_id}");
            0.0
        });
        response = response.with_credit_balance(available);
    }

    Ok(Json(response))
}

/// Create a user (admin only)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    description = "Create a new user (admin only). A referral code is generated for the account; an optional referred_by_code records who invited them.",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 400, description = "Bad request - invalid user data"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 409, description = "Conflict - username or email already taken"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Users, operation::CreateAll>,
    Json(data): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);

    // Resolve the inviting user if a referral code was given. Unknown codes
    // are dropped rather than blocking registration.
    let referred_by = match data.referred_by_code.as_deref() {
        Some(code) => {
            let referrer = repo.get_user_by_referral_code(code).await?;
            if referrer.is_none() {
                warn!("Ignoring unknown referral code {code} during registration");
            }
            referrer.map(|r| r.id)
        }
        None => None,
    };

    let mut db_request = UserCreateDBRequest::from(data);
    db_request.referred_by = referred_by;

    let user = repo.create(&db_request).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Update a user's profile, or their roles with admin access
#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user",
    description = "Update profile fields on your own account, or any account with admin access. Role changes require admin access.",
    params(
        ("user_id" = String, Path, description = "User ID (UUID) or 'current' for the authenticated user"),
    ),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "User updated successfully", body = UserResponse),
        (status = 400, description = "Bad request - invalid user data"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot update this user or change roles"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
    Json(data): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let target_user_id = match user_id {
        UserIdOrCurrent::Current(_) => current_user.id,
        UserIdOrCurrent::Id(uuid) => uuid,
    };

    if !permissions::can_update_own_resource(&current_user, Resource::Users, target_user_id)
        && !permissions::can_update_all_resources(&current_user, Resource::Users)
    {
        return Err(Error::InsufficientPermissions {
            required: Permission::Any(vec![
                Permission::Allow(Resource::Users, Operation::UpdateOwn),
                Permission::Allow(Resource::Users, Operation::UpdateAll),
            ]),
            action: Operation::UpdateAll,
            resource: format!("user data for user {target_user_id}"),
        });
    }

    // Role assignments are an admin concern; self-service is profile-only
    if data.roles.is_some() && !permissions::can_update_all_resources(&current_user, Resource::Users) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Users, Operation::UpdateAll),
            action: Operation::UpdateAll,
            resource: "user roles".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);

    let db_request = UserUpdateDBRequest::new(data);
    let user = repo.update(target_user_id, &db_request).await?;
    Ok(Json(UserResponse::from(user)))
}

/// Delete a user (admin only)
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete user",
    description = "Delete a user (admin only). Deleting your own account is refused.",
    params(
        ("user_id" = String, Path, description = "User ID (UUID) to delete"),
    ),
    responses(
        (status = 204, description = "User deleted successfully"),
        (status = 400, description = "Bad request - cannot delete yourself"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: RequiresPermission<resource::Users, operation::DeleteAll>,
) -> Result<StatusCode> {
    let target_user_id = match user_id {
        UserIdOrCurrent::Current(_) => current_user.id,
        UserIdOrCurrent::Id(uuid) => uuid,
    };

    if target_user_id == current_user.id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut pool_conn);

    match repo.delete(target_user_id).await? {
        true => Ok(StatusCode::NO_CONTENT),
        false => Err(Error::NotFound {
            resource: "User".to_string(),
            id: target_user_id.to_string(),
        }),
    }
}
