use common::{
    BudgetAlertRunSummary, CategoryTotal, MonthPeriod, MonthlyReportRunSummary, MonthlyStats,
    RecurringTriggerSummary,
};
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::config::Settings;
use crate::handlers::{
    accounts::{AccountDetailResponse, AccountResponse, CreateAccountRequest},
    budgets::{BudgetResponse, BudgetStatusResponse, UpsertBudgetRequest},
    dashboard::DashboardResponse,
    transactions::{
        BulkDeleteRequest, BulkDeleteResponse, CreateTransactionRequest, TransactionPage,
        TransactionResponse, UpdateTransactionRequest,
    },
    users::{SyncUserRequest, UserResponse},
};
use crate::insights::InsightGenerator;
use crate::mailer::Mailer;
use crate::scheduler::events::EventSender;

pub use common::{ApiResponse, ErrorResponse};

/// Application state shared across handlers, jobs and the scheduler
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Cache for expensive operations
    pub cache: Cache<String, CachedData>,
    /// Bumped before every statistics invalidation
    pub stats_generation: Arc<AtomicU64>,
    pub mailer: Arc<dyn Mailer>,
    pub insights: Arc<dyn InsightGenerator>,
    /// Feeds the event worker that processes recurring transactions
    pub events: EventSender,
    pub settings: Arc<Settings>,
}

/// Cached data types
#[derive(Clone, Debug)]
pub enum CachedData {
    MonthlyStats(MonthlyStats),
}

/// Cache key of a user's monthly statistics.
pub fn monthly_stats_cache_key(user_id: i32, period: MonthPeriod) -> String {
    format!("monthly_stats:{}:{:04}-{:02}", user_id, period.year, period.month)
}

/// Drops every cached month of a user's statistics.
///
/// The cache has to be built with `support_invalidation_closures`; without
/// it the whole cache is cleared instead.
pub fn invalidate_user_stats(state: &AppState, user_id: i32) {
    state.stats_generation.fetch_add(1, Ordering::SeqCst);
    let prefix = format!("monthly_stats:{}:", user_id);
    if let Err(e) = state
        .cache
        .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
    {
        warn!("Falling back to clearing the whole cache: {}", e);
        state.cache.invalidate_all();
    }
}

/// Current statistics generation, read before loading statistics to cache.
pub fn stats_generation(state: &AppState) -> u64 {
    state.stats_generation.load(Ordering::SeqCst)
}

/// Caches statistics loaded while `generation` was current.
///
/// An invalidation that ran after `generation` was read may have missed the
/// load, so the entry is dropped again instead of being served stale.
pub async fn cache_monthly_stats(state: &AppState, key: String, stats: MonthlyStats, generation: u64) {
    state
        .cache
        .insert(key.clone(), CachedData::MonthlyStats(stats))
        .await;
    if stats_generation(state) != generation {
        debug!("Statistics changed while loading {}, not caching", key);
        state.cache.invalidate(&key).await;
    }
}

/// Query parameters for the monthly statistics endpoint
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MonthlyStatsQuery {
    /// Year (e.g., 2024), defaults to the current year
    pub year: Option<i32>,
    /// Month (1-12), defaults to the current month
    pub month: Option<u32>,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::users::sync_user,
        crate::handlers::users::get_users,
        crate::handlers::users::get_user,
        crate::handlers::accounts::create_account,
        crate::handlers::accounts::get_user_accounts,
        crate::handlers::accounts::get_account,
        crate::handlers::accounts::set_default_account,
        crate::handlers::accounts::delete_account,
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::update_transaction,
        crate::handlers::transactions::bulk_delete_transactions,
        crate::handlers::transactions::get_user_transactions,
        crate::handlers::dashboard::get_dashboard,
        crate::handlers::budgets::get_budget,
        crate::handlers::budgets::upsert_budget,
        crate::handlers::statistics::get_monthly_statistics,
        crate::handlers::jobs::run_recurring_transactions,
        crate::handlers::jobs::run_monthly_reports,
        crate::handlers::jobs::run_budget_alerts,
    ),
    components(
        schemas(
            ApiResponse<UserResponse>,
            ApiResponse<AccountResponse>,
            ApiResponse<TransactionResponse>,
            ApiResponse<MonthlyStats>,
            ErrorResponse,
            HealthResponse,
            MonthlyStatsQuery,
            SyncUserRequest,
            UserResponse,
            CreateAccountRequest,
            AccountResponse,
            AccountDetailResponse,
            CreateTransactionRequest,
            UpdateTransactionRequest,
            TransactionResponse,
            TransactionPage,
            BulkDeleteRequest,
            BulkDeleteResponse,
            DashboardResponse,
            UpsertBudgetRequest,
            BudgetResponse,
            BudgetStatusResponse,
            MonthlyStats,
            MonthPeriod,
            CategoryTotal,
            RecurringTriggerSummary,
            MonthlyReportRunSummary,
            BudgetAlertRunSummary,
            model::entities::account::AccountType,
            model::entities::transaction::TransactionType,
            model::entities::transaction::TransactionStatus,
            model::entities::transaction::RecurringInterval,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "User synchronisation with the identity provider"),
        (name = "accounts", description = "Account management"),
        (name = "transactions", description = "Transaction management"),
        (name = "budgets", description = "Monthly budget"),
        (name = "statistics", description = "Monthly statistics"),
        (name = "jobs", description = "Manual triggers for the scheduled jobs"),
    ),
    info(
        title = "Spendwise API",
        description = "Personal finance API: accounts, transactions, budgets and scheduled reports",
        version = "0.1.0",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_stats_cache_key() {
        let key = monthly_stats_cache_key(7, MonthPeriod { year: 2024, month: 3 });
        assert_eq!(key, "monthly_stats:7:2024-03");
    }

    #[test]
    fn test_openapi_components() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();

        for name in ["ErrorResponse", "HealthResponse", "TransactionResponse", "MonthlyStats"] {
            assert!(components.schemas.contains_key(name), "missing schema {}", name);
        }
        assert!(serde_json::to_string(&doc).is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_user_stats_keeps_other_users() {
        let state = crate::test_utils::test_utils::setup_test_app_state().await;
        let march = MonthPeriod { year: 2024, month: 3 };
        let generation = stats_generation(&state);
        cache_monthly_stats(&state, monthly_stats_cache_key(1, march), MonthlyStats::empty(march), generation).await;
        cache_monthly_stats(&state, monthly_stats_cache_key(11, march), MonthlyStats::empty(march), generation).await;

        invalidate_user_stats(&state, 1);
        state.cache.run_pending_tasks().await;

        assert!(state.cache.get(&monthly_stats_cache_key(1, march)).await.is_none());
        assert!(state.cache.get(&monthly_stats_cache_key(11, march)).await.is_some());
    }

    #[tokio::test]
    async fn test_load_overtaken_by_invalidation_is_not_cached() {
        let state = crate::test_utils::test_utils::setup_test_app_state().await;
        let march = MonthPeriod { year: 2024, month: 3 };
        let key = monthly_stats_cache_key(5, march);

        // A write lands between reading the generation and caching the load.
        let generation = stats_generation(&state);
        invalidate_user_stats(&state, 5);
        cache_monthly_stats(&state, key.clone(), MonthlyStats::empty(march), generation).await;
        state.cache.run_pending_tasks().await;

        assert!(state.cache.get(&key).await.is_none());
    }

    #[test]
    fn test_openapi_lists_job_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/jobs/budget-alerts"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/users/sync"));
    }
}
