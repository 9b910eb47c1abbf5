//! Manual triggers for the scheduled jobs.

use axum::{extract::State, response::Json};
use chrono::Utc;
use common::{BudgetAlertRunSummary, MonthlyReportRunSummary, RecurringTriggerSummary};
use std::future::Future;
use tracing::{error, info, instrument};

use crate::error::ApiError;
use crate::jobs::{budget_alerts, monthly_report, recurring, JobError};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Runs a job on its own task. A request that times out or disconnects
/// stops waiting for the result but never interrupts the job.
async fn run_detached<T, F>(job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, JobError>> + Send + 'static,
{
    match tokio::spawn(job).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("Job task failed: {}", e);
            Err(ApiError::Internal(format!("job task failed: {}", e)))
        }
    }
}

/// Queue every due recurring transaction for processing
#[utoipa::path(
    post,
    path = "/api/v1/jobs/recurring-transactions",
    tag = "jobs",
    responses(
        (status = 200, description = "Due transactions queued", body = ApiResponse<RecurringTriggerSummary>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn run_recurring_transactions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RecurringTriggerSummary>>, ApiError> {
    let summary =
        recurring::trigger_recurring_transactions(&state.db, &state.events, Utc::now().date_naive())
            .await?;
    info!("Queued {} recurring transactions", summary.triggered);
    Ok(Json(ApiResponse::ok(summary, "Recurring transactions queued")))
}

/// Email last month's report to every user
#[utoipa::path(
    post,
    path = "/api/v1/jobs/monthly-reports",
    tag = "jobs",
    responses(
        (status = 200, description = "Reports generated", body = ApiResponse<MonthlyReportRunSummary>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn run_monthly_reports(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MonthlyReportRunSummary>>, ApiError> {
    let summary =
        run_detached(async move { monthly_report::generate_monthly_reports(&state, Utc::now()).await })
            .await?;
    Ok(Json(ApiResponse::ok(summary, "Monthly reports generated")))
}

/// Check every budget and send due alerts
#[utoipa::path(
    post,
    path = "/api/v1/jobs/budget-alerts",
    tag = "jobs",
    responses(
        (status = 200, description = "Budgets checked", body = ApiResponse<BudgetAlertRunSummary>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn run_budget_alerts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BudgetAlertRunSummary>>, ApiError> {
    let summary =
        run_detached(async move { budget_alerts::check_budget_alerts(&state, Utc::now()).await })
            .await?;
    Ok(Json(ApiResponse::ok(summary, "Budget alerts checked")))
}
