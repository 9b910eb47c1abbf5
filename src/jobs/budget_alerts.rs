use chrono::{DateTime, Utc};
use common::BudgetAlertRunSummary;
use compute::budget::{current_month_expenses, should_send_alert, BudgetUsage};
use model::entities::{budget, user};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use tracing::{debug, error, info, instrument, warn};

use super::JobError;
use crate::mailer::templates::{self, BudgetAlert};
use crate::schemas::AppState;
use crate::services::accounts::default_account;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertOutcome {
    Sent,
    Skipped(&'static str),
}

/// Checks every budget against its owner's default-account spending this
/// month and emails an alert once usage reaches the configured threshold.
///
/// `last_alert_sent` is only stamped after the email went out, so a failed
/// send is retried on the next run.
#[instrument(skip(state))]
pub async fn check_budget_alerts(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<BudgetAlertRunSummary, JobError> {
    let threshold = state.settings.budget.alert_threshold;
    let budgets = budget::Entity::find()
        .find_also_related(user::Entity)
        .order_by_asc(budget::Column::Id)
        .all(&state.db)
        .await?;
    info!("Checking {} budgets against a {}% threshold", budgets.len(), threshold);

    let mut summary = BudgetAlertRunSummary::default();
    for (budget, owner) in budgets {
        summary.checked += 1;
        let Some(owner) = owner else {
            warn!("Budget {} has no owner", budget.id);
            summary.skipped += 1;
            continue;
        };

        match check_budget(state, budget, &owner, threshold, now).await {
            Ok(AlertOutcome::Sent) => summary.sent += 1,
            Ok(AlertOutcome::Skipped(reason)) => {
                debug!("No alert for user {}: {}", owner.id, reason);
                summary.skipped += 1;
            }
            Err(e) => {
                error!("Budget alert for user {} failed: {}", owner.id, e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Budget alerts: {} checked, {} sent, {} skipped, {} failed",
        summary.checked, summary.sent, summary.skipped, summary.failed
    );
    Ok(summary)
}

async fn check_budget(
    state: &AppState,
    budget: budget::Model,
    owner: &user::Model,
    threshold: Decimal,
    now: DateTime<Utc>,
) -> Result<AlertOutcome, JobError> {
    let Some(account) = default_account(&state.db, owner.id).await? else {
        warn!("Skipping budget {}: user {} has no default account", budget.id, owner.id);
        return Ok(AlertOutcome::Skipped("no default account"));
    };

    let expenses = current_month_expenses(&state.db, owner.id, account.id, now.date_naive()).await?;
    let usage = BudgetUsage::new(budget.amount, expenses);
    let Some(percentage_used) = usage.percentage_used else {
        return Ok(AlertOutcome::Skipped("budget amount is not positive"));
    };

    if !should_send_alert(usage.percentage_used, threshold, budget.last_alert_sent, now) {
        return Ok(AlertOutcome::Skipped("below threshold or already alerted this month"));
    }

    let email = templates::budget_alert(
        &owner.email,
        &BudgetAlert {
            user_name: owner.display_name(),
            account_name: &account.name,
            budget_amount: usage.budget_amount,
            total_expenses: usage.total_expenses,
            percentage_used,
            currency_symbol: &state.settings.currency_symbol,
        },
    );
    state.mailer.send(email).await?;

    let budget_id = budget.id;
    let mut active: budget::ActiveModel = budget.into();
    active.last_alert_sent = Set(Some(now));
    active.updated_at = Set(now);
    active.update(&state.db).await?;

    info!(
        "Sent budget alert to user {} at {}% of budget {}",
        owner.id,
        percentage_used.round_dp(1),
        budget_id
    );
    Ok(AlertOutcome::Sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use crate::services::accounts::{create_account, NewAccount};
    use crate::services::ledger::{create_transaction, TransactionInput};
    use crate::test_utils::test_utils::{create_test_budget, create_test_user, setup_test_app_state_with_mailer};
    use chrono::{NaiveDate, TimeZone};
    use model::entities::account::AccountType;
    use model::entities::transaction::{TransactionStatus, TransactionType};

    struct Fixture {
        state: AppState,
        mailer: RecordingMailer,
        budget_id: i32,
    }

    /// A 1000 budget with `spent` of expenses on the default account in June 2024.
    async fn fixture(name: &str, spent: i64) -> Fixture {
        let mailer = RecordingMailer::new();
        let state = setup_test_app_state_with_mailer(mailer.clone()).await;
        let user = create_test_user(&state.db, name).await;
        let account = create_account(
            &state.db,
            user.id,
            NewAccount {
                name: "Everyday".to_string(),
                account_type: AccountType::Current,
                balance: Decimal::new(5000, 0),
                is_default: true,
            },
        )
        .await
        .unwrap();
        create_transaction(
            &state.db,
            user.id,
            TransactionInput {
                transaction_type: TransactionType::Expense,
                amount: Decimal::new(spent, 0),
                description: Some("Shopping".to_string()),
                date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                category: "shopping".to_string(),
                receipt_url: None,
                is_recurring: false,
                recurring_interval: None,
                status: TransactionStatus::Completed,
                account_id: account.id,
            },
        )
        .await
        .unwrap();
        let budget = create_test_budget(&state.db, user.id, Decimal::new(1000, 0)).await;

        Fixture {
            state,
            mailer,
            budget_id: budget.id,
        }
    }

    fn june(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 6, 0, 0).unwrap()
    }

    async fn last_alert(f: &Fixture) -> Option<DateTime<Utc>> {
        budget::Entity::find_by_id(f.budget_id)
            .one(&f.state.db)
            .await
            .unwrap()
            .unwrap()
            .last_alert_sent
    }

    #[tokio::test]
    async fn test_alert_sent_once_per_month() {
        let f = fixture("alerts_once", 850).await;

        let first = check_budget_alerts(&f.state, june(10)).await.unwrap();
        assert_eq!(first, BudgetAlertRunSummary { checked: 1, sent: 1, skipped: 0, failed: 0 });
        assert_eq!(last_alert(&f).await, Some(june(10)));

        let mails = f.mailer.sent();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].subject, "Budget Alert: 85.0% of your budget used");

        let second = check_budget_alerts(&f.state, june(20)).await.unwrap();
        assert_eq!(second, BudgetAlertRunSummary { checked: 1, sent: 0, skipped: 1, failed: 0 });
        assert_eq!(f.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_below_threshold_is_skipped() {
        let f = fixture("alerts_below", 799).await;

        let summary = check_budget_alerts(&f.state, june(10)).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(f.mailer.sent().is_empty());
        assert_eq!(last_alert(&f).await, None);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_budget_unmarked() {
        let f = fixture("alerts_failed", 900).await;
        f.mailer.fail_sends(true);

        let summary = check_budget_alerts(&f.state, june(10)).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(last_alert(&f).await, None);

        f.mailer.fail_sends(false);
        let retry = check_budget_alerts(&f.state, june(10)).await.unwrap();
        assert_eq!(retry.sent, 1);
    }
}
