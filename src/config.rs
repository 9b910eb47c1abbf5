use anyhow::Result;
use config::{Config, ConfigError, Environment};
use moka::future::Cache;
use rust_decimal::Decimal;
use sea_orm::Database;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::insights::{FallbackInsights, GeminiInsights, InsightGenerator};
use crate::mailer::{LogMailer, Mailer, SmtpMailer};
use crate::scheduler::events::{event_channel, EventReceiver};
use crate::schemas::AppState;

/// Typed application settings.
///
/// Values come from built-in defaults overridden by `SPENDWISE_*` environment
/// variables, where `__` separates nested keys
/// (`SPENDWISE_SMTP__HOST`, `SPENDWISE_SCHEDULE__BUDGET_ALERTS`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub bind_address: String,
    /// Prefix used when amounts are rendered in emails.
    pub currency_symbol: String,
    pub smtp: SmtpSettings,
    pub schedule: ScheduleSettings,
    pub throttle: ThrottleSettings,
    pub budget: BudgetSettings,
    pub insights: InsightSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    /// Emails are only logged while this is unset.
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from_name: String,
}

/// Six-field cron expressions (seconds first), evaluated in UTC.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub recurring_transactions: String,
    pub monthly_reports: String,
    pub budget_alerts: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleSettings {
    /// Recurring transactions processed per user within one period.
    pub limit: usize,
    pub period_secs: u64,
}

impl ThrottleSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetSettings {
    /// Percentage of the budget that triggers an alert email.
    pub alert_threshold: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsightSettings {
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Settings {
    /// Loads `.env` (if present), the defaults and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::builder()?
            .add_source(
                Environment::with_prefix("SPENDWISE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// Defaults only, ignoring the environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database_url", "sqlite://spendwise.db?mode=rwc")?
            .set_default("bind_address", "0.0.0.0:3000")?
            .set_default("currency_symbol", "₹")?
            .set_default("smtp.port", 465)?
            .set_default("smtp.from_name", "Finance App")?
            .set_default("schedule.enabled", true)?
            .set_default("schedule.recurring_transactions", "0 0 0 * * *")?
            .set_default("schedule.monthly_reports", "0 0 0 1 * *")?
            .set_default("schedule.budget_alerts", "0 0 */6 * * *")?
            .set_default("throttle.limit", 10)?
            .set_default("throttle.period_secs", 60)?
            .set_default("budget.alert_threshold", "80")?
            .set_default("insights.model", "gemini-1.5-flash")?
            .set_default(
                "insights.endpoint",
                "https://generativelanguage.googleapis.com/v1beta/models",
            )?
            .set_default("insights.timeout_secs", 20)
    }
}

/// Picks the mailer for the given settings: SMTP when a host is configured,
/// logging otherwise.
pub fn build_mailer(settings: &Settings) -> Result<Arc<dyn Mailer>> {
    match SmtpMailer::from_settings(&settings.smtp)? {
        Some(smtp) => {
            info!("Sending email through SMTP relay {}", smtp.host());
            Ok(Arc::new(smtp))
        }
        None => {
            warn!("SMTP host not configured, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

/// Gemini when an API key is configured, the fixed insights otherwise.
pub fn build_insights(settings: &Settings) -> Result<Arc<dyn InsightGenerator>> {
    match settings.insights.gemini_api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            debug!("Using Gemini model {} for insights", settings.insights.model);
            Ok(Arc::new(GeminiInsights::new(&settings.insights, key, &settings.currency_symbol)?))
        }
        _ => {
            debug!("No Gemini API key configured, using fallback insights");
            Ok(Arc::new(FallbackInsights))
        }
    }
}

/// Initialize application state with the configured database URL
pub async fn initialize_app_state(settings: Settings) -> Result<(AppState, EventReceiver)> {
    let database_url = settings.database_url.clone();
    initialize_app_state_with_url(&database_url, settings).await
}

/// Initialize application state with a specific database URL
pub async fn initialize_app_state_with_url(
    database_url: &str,
    settings: Settings,
) -> Result<(AppState, EventReceiver)> {
    info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url).await?;

    let cache = Cache::builder()
        .max_capacity(1000)
        .time_to_live(Duration::from_secs(300))
        .support_invalidation_closures()
        .build();

    let mailer = build_mailer(&settings)?;
    let insights = build_insights(&settings)?;
    let (events, receiver) = event_channel();

    let state = AppState {
        db,
        cache,
        stats_generation: Arc::default(),
        mailer,
        insights,
        events,
        settings: Arc::new(settings),
    };
    Ok((state, receiver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::defaults().unwrap();

        assert_eq!(settings.bind_address, "0.0.0.0:3000");
        assert_eq!(settings.smtp.port, 465);
        assert!(settings.smtp.host.is_none());
        assert_eq!(settings.throttle.limit, 10);
        assert_eq!(settings.throttle.period(), Duration::from_secs(60));
        assert_eq!(settings.budget.alert_threshold, Decimal::new(80, 0));
        assert_eq!(settings.schedule.recurring_transactions, "0 0 0 * * *");
        assert!(settings.insights.gemini_api_key.is_none());
    }

    #[test]
    fn test_default_schedules_parse() {
        let settings = Settings::defaults().unwrap();
        for expression in [
            &settings.schedule.recurring_transactions,
            &settings.schedule.monthly_reports,
            &settings.schedule.budget_alerts,
        ] {
            assert!(crate::scheduler::parse_schedule(expression).is_ok(), "{expression}");
        }
    }
}
