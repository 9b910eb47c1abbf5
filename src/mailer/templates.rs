//! HTML bodies and subjects of the emails the app sends.
//!
//! All interpolated values go through maud and are HTML-escaped.

use common::MonthlyStats;
use maud::{html, Markup, DOCTYPE};
use rust_decimal::{Decimal, RoundingStrategy};

use super::EmailMessage;

const CELL: &str = "padding: 8px; border: 1px solid #ddd;";

fn layout(title: &str, accent: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head { meta charset="utf-8"; title { (title) } }
            body style="font-family: Arial, sans-serif; background-color: #f9f9f9; padding: 24px; color: #333;" {
                div style="max-width: 600px; margin: auto; background: white; border-radius: 8px; padding: 24px;" {
                    h2 style={ "color: " (accent) ";" } { (title) }
                    (content)
                    p style="margin-top: 32px;" { "Thanks," br; strong { "Your Budget Tracker" } }
                }
            }
        }
    }
}

fn fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

fn money(currency_symbol: &str, amount: Decimal) -> String {
    format!("{}{}", currency_symbol, fixed(amount, 2))
}

pub struct BudgetAlert<'a> {
    pub user_name: &'a str,
    pub account_name: &'a str,
    pub budget_amount: Decimal,
    pub total_expenses: Decimal,
    pub percentage_used: Decimal,
    pub currency_symbol: &'a str,
}

pub fn budget_alert(to: &str, alert: &BudgetAlert<'_>) -> EmailMessage {
    let percentage = fixed(alert.percentage_used, 1);
    let body = layout(
        "Budget Alert",
        "#d9534f",
        html! {
            p { "Hi " strong { (alert.user_name) } "," }
            p {
                "You have used " strong { (percentage) "%" }
                " of your budget for " strong { (alert.account_name) } " this month."
            }
            table style="width: 100%; margin: 20px 0; border-collapse: collapse;" {
                tr { td style=(CELL) { "Budget Amount" } td style=(CELL) { (money(alert.currency_symbol, alert.budget_amount)) } }
                tr { td style=(CELL) { "Total Expenses" } td style=(CELL) { (money(alert.currency_symbol, alert.total_expenses)) } }
                tr { td style=(CELL) { "Percentage Used" } td style=(CELL) { (percentage) "%" } }
            }
            p { "Please review your spending to stay within your budget." }
        },
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Budget Alert: {}% of your budget used", percentage),
        html: body.into_string(),
    }
}

pub struct MonthlyReport<'a> {
    pub user_name: &'a str,
    pub month_name: &'a str,
    pub stats: &'a MonthlyStats,
    pub insights: &'a [String],
    pub currency_symbol: &'a str,
}

pub fn monthly_report(to: &str, report: &MonthlyReport<'_>) -> EmailMessage {
    let currency = report.currency_symbol;
    let stats = report.stats;
    let body = layout(
        "Monthly Financial Report",
        "#1f6feb",
        html! {
            p { "Hi " strong { (report.user_name) } "," }
            p { "Here is your financial summary for " strong { (report.month_name) } "." }
            table style="width: 100%; margin: 20px 0; border-collapse: collapse;" {
                tr { td style=(CELL) { "Total Income" } td style=(CELL) { (money(currency, stats.total_income)) } }
                tr { td style=(CELL) { "Total Expenses" } td style=(CELL) { (money(currency, stats.total_expenses)) } }
                tr { td style=(CELL) { "Net" } td style=(CELL) { (money(currency, stats.net_income)) } }
                tr { td style=(CELL) { "Transactions" } td style=(CELL) { (stats.transaction_count) } }
            }
            @if !stats.by_category.is_empty() {
                h3 { "Expenses by Category" }
                ul {
                    @for entry in stats.top_categories() {
                        li { (entry.category) ": " (money(currency, entry.amount)) }
                    }
                }
            }
            @if !report.insights.is_empty() {
                h3 { "Insights" }
                ul {
                    @for insight in report.insights {
                        li { (insight) }
                    }
                }
            }
        },
    );

    EmailMessage {
        to: to.to_string(),
        subject: format!("Your Monthly Financial Report - {}", report.month_name),
        html: body.into_string(),
    }
}

pub struct AccountCreated<'a> {
    pub user_name: &'a str,
    pub account_name: &'a str,
    pub balance: Decimal,
    pub currency_symbol: &'a str,
}

pub fn account_created(to: &str, created: &AccountCreated<'_>) -> EmailMessage {
    let body = layout(
        "New Account Created",
        "#2e7d32",
        html! {
            p { "Hello " strong { (created.user_name) } "," }
            p {
                "Your new account " strong { (created.account_name) }
                " has been created with a starting balance of "
                (money(created.currency_symbol, created.balance)) "."
            }
        },
    );

    EmailMessage {
        to: to.to_string(),
        subject: "New Account Created!".to_string(),
        html: body.into_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MonthPeriod;

    #[test]
    fn test_budget_alert_subject_and_figures() {
        let email = budget_alert(
            "ada@example.com",
            &BudgetAlert {
                user_name: "Ada",
                account_name: "Main",
                budget_amount: Decimal::new(1000, 0),
                total_expenses: Decimal::new(85050, 2),
                percentage_used: Decimal::new(85050, 3),
                currency_symbol: "$",
            },
        );

        assert_eq!(email.to, "ada@example.com");
        assert_eq!(email.subject, "Budget Alert: 85.1% of your budget used");
        assert!(email.html.contains("$1000.00"));
        assert!(email.html.contains("$850.50"));
    }

    #[test]
    fn test_values_are_escaped() {
        let email = account_created(
            "x@example.com",
            &AccountCreated {
                user_name: "<script>alert(1)</script>",
                account_name: "Rent & Bills",
                balance: Decimal::ZERO,
                currency_symbol: "$",
            },
        );

        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("Rent &amp; Bills"));
        assert_eq!(email.subject, "New Account Created!");
    }

    #[test]
    fn test_monthly_report_lists_categories_and_insights() {
        let mut stats = MonthlyStats::empty(MonthPeriod { year: 2024, month: 5 });
        stats.total_expenses = Decimal::new(300, 0);
        stats.by_category.insert("rent".to_string(), Decimal::new(250, 0));
        stats.by_category.insert("food".to_string(), Decimal::new(50, 0));
        let insights = vec!["Spend less on food.".to_string()];

        let email = monthly_report(
            "ada@example.com",
            &MonthlyReport {
                user_name: "Ada",
                month_name: "May",
                stats: &stats,
                insights: &insights,
                currency_symbol: "$",
            },
        );

        assert_eq!(email.subject, "Your Monthly Financial Report - May");
        let rent = email.html.find("rent: ").unwrap();
        let food = email.html.find("food: ").unwrap();
        assert!(rent < food);
        assert!(email.html.contains("Spend less on food."));
    }
}
