use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result of one run of the recurring-transaction trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurringTriggerSummary {
    /// Number of due recurring transactions handed to the event worker.
    pub triggered: usize,
}

/// What happened to a single recurring-transaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecurringProcessOutcome {
    /// A new transaction was created and the account balance updated.
    Materialized { created_transaction_id: i32 },
    /// The template no longer exists, belongs to someone else or is not due.
    Skipped,
}

/// Result of one run of the monthly report job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyReportRunSummary {
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Result of one run of the budget alert check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BudgetAlertRunSummary {
    pub checked: usize,
    pub sent: usize,
    /// Budgets without a default account, with a non-positive amount, below
    /// the threshold or already alerted this month.
    pub skipped: usize,
    pub failed: usize,
}
