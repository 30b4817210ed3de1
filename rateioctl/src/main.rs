mod api;
mod auth;
mod cache;
mod config;
mod db;
mod errors;
mod openapi;
mod types;

#[cfg(test)]
mod test_utils;

use crate::{
    api::models::users::Role,
    cache::TtlCache,
    db::handlers::Users,
    db::models::users::UserCreateDBRequest,
    openapi::ApiDoc,
};
use axum::{
    http::{HeaderValue, Request, Response},
    routing::{delete, get, patch, post},
    Router,
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use clap::Parser;
use config::{Args, Config};
use db::handlers::Repository;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, instrument, Span};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use types::{NotificationId, TransactionId, UserId, WithdrawalRequestId};

#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub cache: Arc<TtlCache>,
}

/// Create the initial admin user if it doesn't exist
pub async fn create_initial_admin_user(email: &str, db: &PgPool) -> anyhow::Result<UserId> {
    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing_user) = user_repo.get_user_by_email(email).await? {
        tx.commit().await?;
        return Ok(existing_user.id);
    }

    let user_create = UserCreateDBRequest {
        username: email.to_string(),
        email: email.to_string(),
        display_name: None,
        avatar_url: None,
        is_admin: true,
        roles: vec![Role::Customer],
        auth_source: "system".to_string(),
        referral_code: None,
        referred_by: None,
    };

    let created_user = user_repo.create(&user_create).await?;
    tx.commit().await?;

    info!("Created initial admin user {email}");
    Ok(created_user.id)
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    use crate::config::CorsOrigin;
    use tower_http::cors::AllowOrigin;

    let allowed_origins = &config.auth.security.cors.allowed_origins;
    // tower-http rejects a literal `*` inside `AllowOrigin::list`; the
    // wildcard has to be expressed as `AllowOrigin::any()`.
    let origins = if allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .map(|origin| match origin {
                    CorsOrigin::Wildcard => "*".parse::<HeaderValue>(),
                    CorsOrigin::Url(url) => url.as_str().parse::<HeaderValue>(),
                })
                .collect::<Result<Vec<_>, _>>()?,
        )
    };

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the router and start the cache sweeper. The returned guard stops
/// the sweeper when dropped.
#[instrument(skip(pool, config))]
pub async fn setup_app(pool: PgPool, config: Config) -> anyhow::Result<(Router, DropGuard)> {
    debug!("Setting up application");

    let cache = Arc::new(TtlCache::new(config.cache.ttl));
    let token = CancellationToken::new();
    cache::spawn_sweeper(Arc::clone(&cache), config.cache.sweep_interval, token.clone());
    info!(
        "Cache sweeper running every {} (entry TTL {})",
        humantime::format_duration(config.cache.sweep_interval),
        humantime::format_duration(config.cache.ttl)
    );

    let app_state = AppState::builder().db(pool).config(config).cache(cache).build();
    let router = build_router(&app_state)?;

    Ok((router, token.drop_guard()))
}

fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        // User management (admin only for collection operations)
        .route("/users", get(api::handlers::users::list_users))
        .route("/users", post(api::handlers::users::create_user))
        .route("/users/{user_id}", get(api::handlers::users::get_user))
        .route("/users/{user_id}", patch(api::handlers::users::update_user))
        .route("/users/{user_id}", delete(api::handlers::users::delete_user))
        // Credit ledger entrypoints and balances
        .route("/credits/add", post(api::handlers::credits::add_credits))
        .route("/credits/use", post(api::handlers::credits::use_credits))
        .route("/credits/balance", get(api::handlers::credits::get_balance))
        // Transaction history
        .route("/transactions", get(api::handlers::transactions::list_transactions))
        .route("/transactions/{transaction_id}", get(api::handlers::transactions::get_transaction))
        // Withdrawal workflow
        .route("/withdrawals", post(api::handlers::withdrawals::create_withdrawal))
        .route("/withdrawals", get(api::handlers::withdrawals::list_withdrawals))
        .route("/withdrawals/{id}/approve", patch(api::handlers::withdrawals::approve_withdrawal))
        .route("/withdrawals/{id}/reject", patch(api::handlers::withdrawals::reject_withdrawal))
        .route("/withdrawals/{id}/pay", patch(api::handlers::withdrawals::pay_withdrawal))
        // Notifications
        .route("/notifications", get(api::handlers::notifications::list_notifications))
        .route("/notifications/{id}/read", patch(api::handlers::notifications::mark_notification_read))
        // Platform stats (admin dashboard)
        .route("/stats", get(api::handlers::stats::get_stats))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = %response.status(),
                        latency = ?latency,
                        "request completed"
                    );
                }),
        )
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/docs"));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    Ok(router)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    debug!("{:?}", args);

    let config = Config::load(&args)?;
    debug!("Starting rateioctl with configuration: {:#?}", config);

    let pool = PgPool::connect(&config.database_url).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    // Make sure someone can operate the service on a fresh database
    create_initial_admin_user(&config.admin_email, &pool).await?;

    let (router, _sweeper_guard) = setup_app(pool, config.clone()).await?;

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("rateioctl listening on http://{bind_addr}");

    axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
