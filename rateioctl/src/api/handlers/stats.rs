use crate::{
    api::models::stats::PlatformStatsResponse,
    auth::permissions::{operation, resource, RequiresPermission},
    cache::keys,
    db::handlers::Stats,
    errors::{Error, Result},
    AppState,
};
use axum::{extract::State, response::Json};

/// Read platform-wide aggregates
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    summary = "Get platform statistics",
    description = "Aggregate counters over the whole platform (admin only). Served through the TTL cache, so values may lag mutations by up to the configured TTL.",
    responses(
        (status = 200, description = "Platform statistics", body = PlatformStatsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Rateio-User" = [])
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    _perm: RequiresPermission<resource::Stats, operation::ReadAll>,
) -> Result<Json<PlatformStatsResponse>> {
    let db = state.db.clone();
    let stats = state
        .cache
        .get_or_fetch(keys::PLATFORM_STATS, Some(state.config.cache.ttl), move || async move {
            let mut pool_conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = Stats::new(&mut pool_conn);
            let row = repo.platform_stats().await?;
            Ok::<_, Error>(PlatformStatsResponse::from(row))
        })
        .await?;
    Ok(Json(stats))
}
