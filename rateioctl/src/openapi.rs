use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::api;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "X-Rateio-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Rateio-User"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "Rateio API server")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::credits::add_credits,
        api::handlers::credits::use_credits,
        api::handlers::credits::get_balance,
        api::handlers::transactions::list_transactions,
        api::handlers::transactions::get_transaction,
        api::handlers::withdrawals::create_withdrawal,
        api::handlers::withdrawals::list_withdrawals,
        api::handlers::withdrawals::approve_withdrawal,
        api::handlers::withdrawals::reject_withdrawal,
        api::handlers::withdrawals::pay_withdrawal,
        api::handlers::notifications::list_notifications,
        api::handlers::notifications::mark_notification_read,
        api::handlers::stats::get_stats,
    ),
    components(
        schemas(
            api::models::users::Role,
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::users::CurrentUser,
            api::models::users::ListUsersQuery,
            api::models::users::GetUserQuery,
            api::models::credits::LedgerEntryCreate,
            api::models::credits::LedgerActionResponse,
            api::models::credits::BalanceResponse,
            api::models::transactions::CreditTransactionResponse,
            api::models::withdrawals::WithdrawalCreate,
            api::models::withdrawals::WithdrawalCreatedResponse,
            api::models::withdrawals::WithdrawalResponse,
            api::models::notifications::NotificationResponse,
            api::models::stats::PlatformStatsResponse,
            crate::db::models::credits::CreditEntryType,
            crate::db::models::withdrawals::WithdrawalStatus,
        )
    ),
    tags(
        (name = "users", description = "User management API"),
        (name = "credits", description = "Credit ledger entrypoints and balances"),
        (name = "transactions", description = "Credit transaction history"),
        (name = "withdrawals", description = "Withdrawal request workflow"),
        (name = "notifications", description = "User notifications"),
        (name = "stats", description = "Platform statistics"),
    ),
    info(
        title = "Rateio API",
        version = "0.1.0",
        description = "API for the Rateio marketplace credit ledger: user credits, withdrawal requests, and the notifications around them",
    ),
)]
pub struct ApiDoc;
