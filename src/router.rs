use crate::handlers::{
    accounts::{create_account, delete_account, get_account, get_user_accounts, set_default_account},
    budgets::{get_budget, upsert_budget},
    dashboard::get_dashboard,
    health::health_check,
    jobs::{run_budget_alerts, run_monthly_reports, run_recurring_transactions},
    statistics::get_monthly_statistics,
    transactions::{
        bulk_delete_transactions, create_transaction, get_transaction, get_user_transactions,
        update_transaction,
    },
    users::{get_user, get_users, sync_user},
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Users
        .route("/api/v1/users", get(get_users))
        .route("/api/v1/users/sync", post(sync_user))
        .route("/api/v1/users/:user_id", get(get_user))
        .route("/api/v1/users/:user_id/dashboard", get(get_dashboard))
        // Accounts
        .route("/api/v1/users/:user_id/accounts", post(create_account))
        .route("/api/v1/users/:user_id/accounts", get(get_user_accounts))
        .route("/api/v1/accounts/:account_id", get(get_account))
        .route("/api/v1/accounts/:account_id", delete(delete_account))
        .route("/api/v1/accounts/:account_id/default", put(set_default_account))
        // Transactions
        .route("/api/v1/users/:user_id/transactions", post(create_transaction))
        .route("/api/v1/users/:user_id/transactions", get(get_user_transactions))
        .route(
            "/api/v1/users/:user_id/transactions/bulk-delete",
            post(bulk_delete_transactions),
        )
        .route("/api/v1/transactions/:transaction_id", get(get_transaction))
        .route("/api/v1/transactions/:transaction_id", put(update_transaction))
        // Budget and statistics
        .route("/api/v1/users/:user_id/budget", get(get_budget))
        .route("/api/v1/users/:user_id/budget", put(upsert_budget))
        .route(
            "/api/v1/users/:user_id/statistics/monthly",
            get(get_monthly_statistics),
        )
        // Manual job triggers
        .route("/api/v1/jobs/recurring-transactions", post(run_recurring_transactions))
        .route("/api/v1/jobs/monthly-reports", post(run_monthly_reports))
        .route("/api/v1/jobs/budget-alerts", post(run_budget_alerts))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
