use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct MonthPeriod {
    pub year: i32,
    /// 1-12
    pub month: u32,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// The full English month name, e.g. "March".
    pub fn month_name(&self) -> String {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|date| date.format("%B").to_string())
            .unwrap_or_default()
    }
}

/// Expense total for a single category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryTotal {
    pub category: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

/// Aggregate figures for one user over one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MonthlyStats {
    pub period: MonthPeriod,
    #[schema(value_type = String)]
    pub total_income: Decimal,
    #[schema(value_type = String)]
    pub total_expenses: Decimal,
    /// `total_income - total_expenses`
    #[schema(value_type = String)]
    pub net_income: Decimal,
    /// Expense totals keyed by category. Income is not broken down.
    #[schema(value_type = Object)]
    pub by_category: BTreeMap<String, Decimal>,
    pub transaction_count: u64,
}

impl MonthlyStats {
    pub fn empty(period: MonthPeriod) -> Self {
        Self {
            period,
            total_income: Decimal::ZERO,
            total_expenses: Decimal::ZERO,
            net_income: Decimal::ZERO,
            by_category: BTreeMap::new(),
            transaction_count: 0,
        }
    }

    /// Categories ordered from the largest expense to the smallest.
    pub fn top_categories(&self) -> Vec<CategoryTotal> {
        let mut totals: Vec<CategoryTotal> = self
            .by_category
            .iter()
            .map(|(category, amount)| CategoryTotal {
                category: category.clone(),
                amount: *amount,
            })
            .collect();
        totals.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.category.cmp(&b.category)));
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_period_rejects_invalid_months() {
        assert!(MonthPeriod::new(2024, 0).is_none());
        assert!(MonthPeriod::new(2024, 13).is_none());
        assert_eq!(MonthPeriod::new(2024, 2).unwrap().month_name(), "February");
    }

    #[test]
    fn top_categories_sorts_descending() {
        let mut stats = MonthlyStats::empty(MonthPeriod::new(2024, 5).unwrap());
        stats.by_category.insert("food".into(), Decimal::new(12000, 2));
        stats.by_category.insert("rent".into(), Decimal::new(90000, 2));
        stats.by_category.insert("fun".into(), Decimal::new(12000, 2));

        let names: Vec<_> = stats
            .top_categories()
            .into_iter()
            .map(|total| total.category)
            .collect();
        assert_eq!(names, vec!["rent", "food", "fun"]);
    }
}
