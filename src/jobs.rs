//! The scheduled jobs: recurring transactions, monthly reports and budget
//! alerts. Each can also be run on demand from the CLI or the HTTP API.

pub mod budget_alerts;
pub mod monthly_report;
pub mod recurring;

use chrono::Utc;
use common::{BudgetAlertRunSummary, MonthlyReportRunSummary, RecurringTriggerSummary};
use compute::ComputeError;
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, instrument};

use crate::mailer::MailError;
use crate::schemas::AppState;
use crate::services::ServiceError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("job event channel is closed")]
    ChannelClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum JobKind {
    RecurringTransactions,
    MonthlyReports,
    BudgetAlerts,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::RecurringTransactions,
        JobKind::MonthlyReports,
        JobKind::BudgetAlerts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::RecurringTransactions => "recurring-transactions",
            JobKind::MonthlyReports => "monthly-reports",
            JobKind::BudgetAlerts => "budget-alerts",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobSummary {
    RecurringTransactions(RecurringTriggerSummary),
    MonthlyReports(MonthlyReportRunSummary),
    BudgetAlerts(BudgetAlertRunSummary),
}

/// Runs one job against the current time.
///
/// The recurring job only queues events; the event worker materializes them.
#[instrument(skip(state))]
pub async fn run_job(state: &AppState, kind: JobKind) -> Result<JobSummary, JobError> {
    let now = Utc::now();
    let summary = match kind {
        JobKind::RecurringTransactions => JobSummary::RecurringTransactions(
            recurring::trigger_recurring_transactions(&state.db, &state.events, now.date_naive()).await?,
        ),
        JobKind::MonthlyReports => {
            JobSummary::MonthlyReports(monthly_report::generate_monthly_reports(state, now).await?)
        }
        JobKind::BudgetAlerts => {
            JobSummary::BudgetAlerts(budget_alerts::check_budget_alerts(state, now).await?)
        }
    };
    info!("Job {} finished: {:?}", kind, summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names_match_routes() {
        let names: Vec<&str> = JobKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, ["recurring-transactions", "monthly-reports", "budget-alerts"]);
    }

    #[test]
    fn test_summary_serializes_flat() {
        let summary = JobSummary::BudgetAlerts(BudgetAlertRunSummary {
            checked: 3,
            sent: 1,
            skipped: 2,
            failed: 0,
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["checked"], 3);
        assert_eq!(json["sent"], 1);
    }
}
