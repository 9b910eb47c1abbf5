//! Monthly statistics module for the periodic report and the dashboard.
//!
//! Amounts are summed in Rust, not in SQL.

use chrono::{Datelike, Months, NaiveDate};
use common::{MonthPeriod, MonthlyStats};
use model::entities::transaction::{self, TransactionType};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::{debug, instrument};

use crate::error::{ComputeError, Result};

/// First and last day of the given month, both inclusive.
pub fn month_bounds(period: MonthPeriod) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(period.year, period.month, 1).ok_or_else(|| {
        ComputeError::Date(format!("invalid month {}-{}", period.year, period.month))
    })?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next_month| next_month.pred_opt())
        .ok_or_else(|| ComputeError::Date(format!("no month after {}", first)))?;
    Ok((first, last))
}

/// The calendar month containing `date`.
pub fn month_of(date: NaiveDate) -> MonthPeriod {
    MonthPeriod {
        year: date.year(),
        month: date.month(),
    }
}

/// The calendar month before the one containing `today`.
pub fn previous_month(today: NaiveDate) -> MonthPeriod {
    if today.month() == 1 {
        MonthPeriod {
            year: today.year() - 1,
            month: 12,
        }
    } else {
        MonthPeriod {
            year: today.year(),
            month: today.month() - 1,
        }
    }
}

/// Folds transactions into monthly totals.
///
/// Expenses are also broken down per category; income only contributes to
/// the total. The caller decides which transactions belong to the month.
pub fn aggregate_month<'a, I>(period: MonthPeriod, transactions: I) -> MonthlyStats
where
    I: IntoIterator<Item = &'a transaction::Model>,
{
    let mut stats = MonthlyStats::empty(period);
    for tx in transactions {
        stats.transaction_count += 1;
        match tx.transaction_type {
            TransactionType::Expense => {
                stats.total_expenses += tx.amount;
                *stats.by_category.entry(tx.category.clone()).or_default() += tx.amount;
            }
            TransactionType::Income => stats.total_income += tx.amount,
        }
    }
    stats.net_income = stats.total_income - stats.total_expenses;
    stats
}

/// Loads a user's transactions dated within `period` and aggregates them.
#[instrument(skip(db))]
pub async fn monthly_stats<C>(db: &C, user_id: i32, period: MonthPeriod) -> Result<MonthlyStats>
where
    C: ConnectionTrait,
{
    let (start, end) = month_bounds(period)?;

    let transactions = transaction::Entity::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .filter(transaction::Column::Date.gte(start))
        .filter(transaction::Column::Date.lte(end))
        .all(db)
        .await?;

    debug!(
        "Aggregating {} transactions for user {} between {} and {}",
        transactions.len(),
        user_id,
        start,
        end
    );

    Ok(aggregate_month(period, &transactions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_account, new_transaction, new_user, setup_db, transaction_model};
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(MonthPeriod { year: 2024, month: 2 }).unwrap();
        assert_eq!(first, date(2024, 2, 1));
        assert_eq!(last, date(2024, 2, 29));

        let (first, last) = month_bounds(MonthPeriod { year: 2023, month: 12 }).unwrap();
        assert_eq!(first, date(2023, 12, 1));
        assert_eq!(last, date(2023, 12, 31));

        assert!(month_bounds(MonthPeriod { year: 2023, month: 13 }).is_err());
    }

    #[test]
    fn test_previous_month_wraps_year() {
        assert_eq!(previous_month(date(2024, 1, 1)), MonthPeriod { year: 2023, month: 12 });
        assert_eq!(previous_month(date(2024, 7, 31)), MonthPeriod { year: 2024, month: 6 });
    }

    #[test]
    fn test_aggregate_month() {
        let day = date(2024, 4, 10);
        let mut groceries = transaction_model(TransactionType::Expense, Decimal::new(4550, 2), day);
        groceries.category = "groceries".into();
        let mut more_groceries = transaction_model(TransactionType::Expense, Decimal::new(1450, 2), day);
        more_groceries.category = "groceries".into();
        let mut rent = transaction_model(TransactionType::Expense, Decimal::new(80000, 2), day);
        rent.category = "housing".into();
        let mut salary = transaction_model(TransactionType::Income, Decimal::new(250000, 2), day);
        salary.category = "salary".into();

        let period = MonthPeriod { year: 2024, month: 4 };
        let stats = aggregate_month(period, [&groceries, &more_groceries, &rent, &salary]);

        assert_eq!(stats.transaction_count, 4);
        assert_eq!(stats.total_income, Decimal::new(250000, 2));
        assert_eq!(stats.total_expenses, Decimal::new(86000, 2));
        assert_eq!(stats.net_income, Decimal::new(164000, 2));
        assert_eq!(stats.by_category.len(), 2);
        assert_eq!(stats.by_category["groceries"], Decimal::new(6000, 2));
        assert!(!stats.by_category.contains_key("salary"));
    }

    #[tokio::test]
    async fn test_monthly_stats_only_counts_the_month_and_user() {
        let db = setup_db().await;
        let user = new_user(&db).await.unwrap();
        let other = new_user(&db).await.unwrap();
        let account = new_account(&db, &user).await.unwrap();
        let other_account = new_account(&db, &other).await.unwrap();

        new_transaction(&db, &account, TransactionType::Expense, 1000, date(2024, 3, 31)).await.unwrap();
        new_transaction(&db, &account, TransactionType::Expense, 2000, date(2024, 4, 1)).await.unwrap();
        new_transaction(&db, &account, TransactionType::Income, 5000, date(2024, 4, 30)).await.unwrap();
        new_transaction(&db, &account, TransactionType::Expense, 4000, date(2024, 5, 1)).await.unwrap();
        new_transaction(&db, &other_account, TransactionType::Expense, 9900, date(2024, 4, 15)).await.unwrap();

        let stats = monthly_stats(&db, user.id, MonthPeriod { year: 2024, month: 4 })
            .await
            .unwrap();

        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.total_expenses, Decimal::new(2000, 0));
        assert_eq!(stats.total_income, Decimal::new(5000, 0));
        assert_eq!(stats.net_income, Decimal::new(3000, 0));
    }
}
