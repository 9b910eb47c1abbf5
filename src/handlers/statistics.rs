use axum::{extract::{Path, Query, State}, response::Json};
use chrono::{Datelike, Utc};
use common::{MonthPeriod, MonthlyStats};
use compute::stats::monthly_stats;
use tracing::{debug, instrument};
use crate::error::ApiError;
use crate::handlers::users::find_user;
use crate::schemas::{
    cache_monthly_stats, monthly_stats_cache_key, stats_generation, ApiResponse, AppState,
    CachedData, MonthlyStatsQuery,
};

/// Get income, expenses and category totals of one month
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/statistics/monthly",
    tag = "statistics",
    params(
        ("user_id" = i32, Path, description = "User ID"),
        MonthlyStatsQuery
    ),
    responses(
        (status = 200, description = "Monthly statistics retrieved successfully", body = ApiResponse<MonthlyStats>),
        (status = 400, description = "Invalid month", body = crate::schemas::ErrorResponse),
        (status = 404, description = "User not found", body = crate::schemas::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::schemas::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_monthly_statistics(
    Path(user_id): Path<i32>,
    Query(query): Query<MonthlyStatsQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MonthlyStats>>, ApiError> {
    let today = Utc::now().date_naive();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());
    let period = MonthPeriod::new(year, month)
        .ok_or_else(|| ApiError::Validation(format!("Invalid month {}-{}", year, month)))?;

    // Check cache first
    let cache_key = monthly_stats_cache_key(user_id, period);
    if let Some(CachedData::MonthlyStats(stats)) = state.cache.get(&cache_key).await {
        debug!("Serving {} from cache", cache_key);
        return Ok(Json(ApiResponse::ok(stats, "Monthly statistics retrieved from cache")));
    }

    find_user(&state, user_id).await?;
    let generation = stats_generation(&state);
    let stats = monthly_stats(&state.db, user_id, period).await?;
    cache_monthly_stats(&state, cache_key, stats.clone(), generation).await;

    Ok(Json(ApiResponse::ok(stats, "Monthly statistics retrieved successfully")))
}
