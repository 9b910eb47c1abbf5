use chrono::{DateTime, Utc};
use common::{MonthPeriod, MonthlyReportRunSummary};
use compute::stats::{monthly_stats, previous_month};
use model::entities::user;
use sea_orm::{EntityTrait, QueryOrder};
use tracing::{debug, error, info, instrument};

use super::JobError;
use crate::insights::insights_or_fallback;
use crate::mailer::templates::{self, MonthlyReport};
use crate::schemas::AppState;

/// Emails every user a report on the month before `now`.
///
/// A failure for one user is counted and does not stop the others.
#[instrument(skip(state))]
pub async fn generate_monthly_reports(
    state: &AppState,
    now: DateTime<Utc>,
) -> Result<MonthlyReportRunSummary, JobError> {
    let period = previous_month(now.date_naive());
    let month_name = period.month_name();
    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;
    info!("Generating {} monthly reports for {} {}", users.len(), month_name, period.year);

    let mut summary = MonthlyReportRunSummary::default();
    for user in &users {
        summary.processed += 1;
        match send_report(state, user, period, &month_name).await {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                error!("Monthly report for user {} failed: {}", user.id, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

async fn send_report(
    state: &AppState,
    user: &user::Model,
    period: MonthPeriod,
    month_name: &str,
) -> Result<(), JobError> {
    let stats = monthly_stats(&state.db, user.id, period).await?;
    let insights = insights_or_fallback(state.insights.as_ref(), &stats, month_name).await;
    debug!(
        "User {} had {} transactions in {}, {} insights",
        user.id,
        stats.transaction_count,
        month_name,
        insights.len()
    );

    let email = templates::monthly_report(
        &user.email,
        &MonthlyReport {
            user_name: user.display_name(),
            month_name,
            stats: &stats,
            insights: &insights,
            currency_symbol: &state.settings.currency_symbol,
        },
    );
    state.mailer.send(email).await?;
    Ok(())
}
