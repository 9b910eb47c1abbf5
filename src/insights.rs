//! Short natural-language insights for the monthly report.

use async_trait::async_trait;
use common::MonthlyStats;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::InsightSettings;

const API_KEY_HEADER: &str = "x-goog-api-key";
const USER_AGENT: &str = concat!("spendwise/", env!("CARGO_PKG_VERSION"));

/// Used whenever the generator fails or returns nothing usable.
pub const FALLBACK_INSIGHTS: [&str; 3] = [
    "Your highest expense category this month might need attention.",
    "Consider setting up a budget for better financial management.",
    "Track your recurring expenses to identify potential savings.",
];

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("insight request failed: {0}")]
    Http(reqwest::Error),
    #[error("model returned no text")]
    EmptyResponse,
    #[error("model output is not a JSON array of strings: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for InsightError {
    /// Drops the request URL so endpoints and credentials stay out of logs.
    fn from(err: reqwest::Error) -> Self {
        InsightError::Http(err.without_url())
    }
}

#[async_trait]
pub trait InsightGenerator: Send + Sync + Debug {
    async fn generate(&self, stats: &MonthlyStats, month_name: &str) -> Result<Vec<String>, InsightError>;
}

/// Asks `generator` for insights and substitutes the fixed ones on failure.
pub async fn insights_or_fallback(
    generator: &dyn InsightGenerator,
    stats: &MonthlyStats,
    month_name: &str,
) -> Vec<String> {
    match generator.generate(stats, month_name).await {
        Ok(insights) if !insights.is_empty() => insights,
        Ok(_) => {
            warn!("Insight generator returned no insights, using fallback");
            fallback_insights()
        }
        Err(e) => {
            warn!("Failed to generate insights for {}: {}", month_name, e);
            fallback_insights()
        }
    }
}

pub fn fallback_insights() -> Vec<String> {
    FALLBACK_INSIGHTS.iter().map(|s| s.to_string()).collect()
}

/// Always answers with [`FALLBACK_INSIGHTS`].
#[derive(Debug, Clone, Default)]
pub struct FallbackInsights;

#[async_trait]
impl InsightGenerator for FallbackInsights {
    async fn generate(&self, _stats: &MonthlyStats, _month_name: &str) -> Result<Vec<String>, InsightError> {
        Ok(fallback_insights())
    }
}

/// Generates insights with Google's Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiInsights {
    client: reqwest::Client,
    url: String,
    api_key: String,
    currency_symbol: String,
}

impl Debug for GeminiInsights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiInsights").field("url", &self.url).finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiInsights {
    pub fn new(settings: &InsightSettings, api_key: &str, currency_symbol: &str) -> Result<Self, InsightError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/{}:generateContent",
                settings.endpoint.trim_end_matches('/'),
                settings.model
            ),
            api_key: api_key.to_string(),
            currency_symbol: currency_symbol.to_string(),
        })
    }
}

#[async_trait]
impl InsightGenerator for GeminiInsights {
    #[instrument(skip(self, stats))]
    async fn generate(&self, stats: &MonthlyStats, month_name: &str) -> Result<Vec<String>, InsightError> {
        let prompt = build_prompt(stats, month_name, &self.currency_symbol);
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let response: GenerateResponse = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text: String = response
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .filter_map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            return Err(InsightError::EmptyResponse);
        }
        debug!("Gemini answered with {} characters", text.len());

        parse_insights(&text)
    }
}

pub fn build_prompt(stats: &MonthlyStats, month_name: &str, currency_symbol: &str) -> String {
    let categories = stats
        .top_categories()
        .iter()
        .map(|entry| format!("{}: {}{}", entry.category, currency_symbol, entry.amount))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Analyze this financial data and provide 3 concise, actionable insights.\n\
         Focus on spending patterns and practical advice.\n\
         Keep it friendly and conversational.\n\
         \n\
         Financial Data for {month}:\n\
         - Total Income: {c}{income}\n\
         - Total Expenses: {c}{expenses}\n\
         - Net Income: {c}{net}\n\
         - Expense Categories: {categories}\n\
         \n\
         Format the response as a JSON array of strings, like this:\n\
         [\"insight 1\", \"insight 2\", \"insight 3\"]",
        month = month_name,
        c = currency_symbol,
        income = stats.total_income,
        expenses = stats.total_expenses,
        net = stats.net_income,
        categories = categories,
    )
}

/// Parses model output into insights, ignoring markdown code fences.
pub fn parse_insights(text: &str) -> Result<Vec<String>, InsightError> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let insights: Vec<String> = serde_json::from_str(cleaned.trim())?;
    Ok(insights
        .into_iter()
        .map(|insight| insight.trim().to_string())
        .filter(|insight| !insight.is_empty())
        .collect())
}
