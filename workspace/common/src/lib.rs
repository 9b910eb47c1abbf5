//! Common transport-layer types shared between the HTTP API, the scheduled
//! jobs and anything else that needs to read their payloads.

mod jobs;
mod statistics;

pub use jobs::{BudgetAlertRunSummary, MonthlyReportRunSummary, RecurringProcessOutcome, RecurringTriggerSummary};
pub use statistics::{CategoryTotal, MonthPeriod, MonthlyStats};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Generic API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success flag
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
            success: true,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_response_serializes_with_flat_fields() {
        let response = ApiResponse::ok(vec![1, 2, 3], "Numbers retrieved");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["message"], "Numbers retrieved");
        assert_eq!(json["success"], true);
    }
}
