//! Budget usage and the alert decision.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use model::entities::transaction::{self, TransactionType};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, instrument};

use crate::error::{ComputeError, Result};
use crate::stats::{month_bounds, month_of};

/// Default share of the budget, in percent, at which an alert is sent.
pub const DEFAULT_ALERT_THRESHOLD: Decimal = Decimal::from_parts(80, 0, 0, false, 0);

/// How much of a budget has been spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetUsage {
    pub budget_amount: Decimal,
    pub total_expenses: Decimal,
    /// `None` when the budget amount is zero or negative.
    pub percentage_used: Option<Decimal>,
}

impl BudgetUsage {
    pub fn new(budget_amount: Decimal, total_expenses: Decimal) -> Self {
        Self {
            budget_amount,
            total_expenses,
            percentage_used: percentage_used(total_expenses, budget_amount),
        }
    }

    pub fn remaining(&self) -> Decimal {
        self.budget_amount - self.total_expenses
    }
}

/// `expenses / budget * 100`, or `None` for a non-positive budget.
pub fn percentage_used(expenses: Decimal, budget_amount: Decimal) -> Option<Decimal> {
    if budget_amount <= Decimal::ZERO {
        return None;
    }
    expenses
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(budget_amount))
}

/// Whether two instants fall in different calendar months (UTC).
pub fn is_new_month(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    last.month() != now.month() || last.year() != now.year()
}

/// Decides whether a budget alert should go out now.
///
/// An alert fires once usage reaches `threshold` percent, and at most once
/// per calendar month: a previous alert in the current month suppresses it.
pub fn should_send_alert(
    percentage_used: Option<Decimal>,
    threshold: Decimal,
    last_alert_sent: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(percentage) = percentage_used else {
        return false;
    };
    if percentage < threshold {
        return false;
    }
    match last_alert_sent {
        None => true,
        Some(last) => is_new_month(last, now),
    }
}

/// Total expenses on one account from the first day of `today`'s month up
/// to the end of that month.
#[instrument(skip(db))]
pub async fn current_month_expenses<C>(
    db: &C,
    user_id: i32,
    account_id: i32,
    today: NaiveDate,
) -> Result<Decimal>
where
    C: ConnectionTrait,
{
    let (start, end) = month_bounds(month_of(today))?;

    let expenses = transaction::Entity::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::AccountId.eq(account_id))
        .filter(transaction::Column::TransactionType.eq(TransactionType::Expense))
        .filter(transaction::Column::Date.gte(start))
        .filter(transaction::Column::Date.lte(end))
        .all(db)
        .await?;

    let total = expenses
        .iter()
        .try_fold(Decimal::ZERO, |sum, tx| sum.checked_add(tx.amount))
        .ok_or_else(|| ComputeError::Overflow("expense total overflowed".to_string()))?;

    debug!(
        "Account {} of user {} spent {} across {} expenses since {}",
        account_id,
        user_id,
        total,
        expenses.len(),
        start
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_account, new_transaction, new_user, setup_db};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_threshold_is_eighty_percent() {
        assert_eq!(DEFAULT_ALERT_THRESHOLD, Decimal::new(80, 0));
    }

    #[test]
    fn test_percentage_used() {
        assert_eq!(
            percentage_used(Decimal::new(850, 0), Decimal::new(1000, 0)),
            Some(Decimal::new(85, 0))
        );
        assert_eq!(percentage_used(Decimal::new(10, 0), Decimal::ZERO), None);
        assert_eq!(percentage_used(Decimal::new(10, 0), Decimal::new(-5, 0)), None);
    }

    #[test]
    fn test_is_new_month() {
        assert!(!is_new_month(at(2024, 3, 1), at(2024, 3, 31)));
        assert!(is_new_month(at(2024, 3, 31), at(2024, 4, 1)));
        // Same month number, different year
        assert!(is_new_month(at(2023, 3, 15), at(2024, 3, 15)));
    }

    #[test]
    fn test_alert_requires_threshold() {
        let now = at(2024, 6, 20);
        assert!(!should_send_alert(Some(Decimal::new(7999, 2)), DEFAULT_ALERT_THRESHOLD, None, now));
        assert!(should_send_alert(Some(Decimal::new(80, 0)), DEFAULT_ALERT_THRESHOLD, None, now));
        assert!(!should_send_alert(None, DEFAULT_ALERT_THRESHOLD, None, now));
    }

    #[test]
    fn test_alert_once_per_month() {
        let now = at(2024, 6, 20);
        let over = Some(Decimal::new(95, 0));

        assert!(!should_send_alert(over, DEFAULT_ALERT_THRESHOLD, Some(at(2024, 6, 2)), now));
        assert!(should_send_alert(over, DEFAULT_ALERT_THRESHOLD, Some(at(2024, 5, 30)), now));
    }

    #[test]
    fn test_budget_usage_remaining() {
        let usage = BudgetUsage::new(Decimal::new(500, 0), Decimal::new(620, 0));
        assert_eq!(usage.remaining(), Decimal::new(-120, 0));
        assert_eq!(usage.percentage_used, Some(Decimal::new(124, 0)));
    }

    #[tokio::test]
    async fn test_current_month_expenses_only_counts_account_expenses() {
        let db = setup_db().await;
        let user = new_user(&db).await.unwrap();
        let main = new_account(&db, &user).await.unwrap();
        let savings = new_account(&db, &user).await.unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();

        new_transaction(&db, &main, TransactionType::Expense, 100, day(1)).await.unwrap();
        new_transaction(&db, &main, TransactionType::Expense, 250, day(18)).await.unwrap();
        new_transaction(&db, &main, TransactionType::Income, 1000, day(5)).await.unwrap();
        new_transaction(&db, &savings, TransactionType::Expense, 75, day(7)).await.unwrap();
        new_transaction(
            &db,
            &main,
            TransactionType::Expense,
            40,
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .await
        .unwrap();

        let total = current_month_expenses(&db, user.id, main.id, day(20)).await.unwrap();
        assert_eq!(total, Decimal::new(350, 0));
    }
}
