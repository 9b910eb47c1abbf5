use crate::error::ApiError;
use crate::handlers::users::find_user;
use crate::schemas::{invalidate_user_stats, ApiResponse, AppState, ErrorResponse};
use crate::services::ledger::{self, TransactionInput};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::{DateTime, NaiveDate, Utc};
use model::entities::transaction::{self, RecurringInterval, TransactionStatus, TransactionType};
use rust_decimal::Decimal;
use sea_orm::sea_query::LikeExpr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const DEFAULT_PAGE_SIZE: u64 = 20;
const LIKE_ESCAPE: char = '\\';

/// `LIKE` pattern matching `search` literally anywhere in the column.
fn contains_pattern(search: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

/// Request body for creating a transaction
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateTransactionRequest {
    pub transaction_type: TransactionType,
    /// Positive amount; the sign comes from the transaction type
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(url)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    /// Required when `is_recurring` is set
    pub recurring_interval: Option<RecurringInterval>,
    /// Defaults to COMPLETED
    pub status: Option<TransactionStatus>,
    /// Must be one of the user's accounts
    pub account_id: i32,
}

impl From<CreateTransactionRequest> for TransactionInput {
    fn from(request: CreateTransactionRequest) -> Self {
        Self {
            transaction_type: request.transaction_type,
            amount: request.amount,
            description: request.description,
            date: request.date,
            category: request.category,
            receipt_url: request.receipt_url,
            is_recurring: request.is_recurring,
            recurring_interval: request.recurring_interval,
            status: request.status.unwrap_or(TransactionStatus::Completed),
            account_id: request.account_id,
        }
    }
}

/// Request body for updating a transaction. Omitted fields keep their value.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema, Validate)]
pub struct UpdateTransactionRequest {
    pub transaction_type: Option<TransactionType>,
    pub amount: Option<Decimal>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    #[validate(url)]
    pub receipt_url: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurring_interval: Option<RecurringInterval>,
    pub status: Option<TransactionStatus>,
    /// Moves the transaction, and its balance effect, to another account
    pub account_id: Option<i32>,
}

impl UpdateTransactionRequest {
    fn merged_with(self, existing: &transaction::Model) -> TransactionInput {
        TransactionInput {
            transaction_type: self.transaction_type.unwrap_or(existing.transaction_type),
            amount: self.amount.unwrap_or(existing.amount),
            description: self.description.or_else(|| existing.description.clone()),
            date: self.date.unwrap_or(existing.date),
            category: self.category.unwrap_or_else(|| existing.category.clone()),
            receipt_url: self.receipt_url.or_else(|| existing.receipt_url.clone()),
            is_recurring: self.is_recurring.unwrap_or(existing.is_recurring),
            recurring_interval: self.recurring_interval.or(existing.recurring_interval),
            status: self.status.unwrap_or(existing.status),
            account_id: self.account_id.unwrap_or(existing.account_id),
        }
    }
}

/// Transaction response model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i32,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub category: String,
    pub receipt_url: Option<String>,
    pub is_recurring: bool,
    pub recurring_interval: Option<RecurringInterval>,
    pub next_recurring_date: Option<NaiveDate>,
    pub last_processed: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub user_id: i32,
    pub account_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<transaction::Model> for TransactionResponse {
    fn from(model: transaction::Model) -> Self {
        Self {
            id: model.id,
            transaction_type: model.transaction_type,
            amount: model.amount,
            description: model.description,
            date: model.date,
            category: model.category,
            receipt_url: model.receipt_url,
            is_recurring: model.is_recurring,
            recurring_interval: model.recurring_interval,
            next_recurring_date: model.next_recurring_date,
            last_processed: model.last_processed,
            status: model.status,
            user_id: model.user_id,
            account_id: model.account_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Filters and paging for listing a user's transactions
#[derive(Debug, Deserialize, ToSchema, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct TransactionListQuery {
    pub account_id: Option<i32>,
    pub transaction_type: Option<TransactionType>,
    /// Only recurring (true) or only one-off (false) transactions
    pub recurring: Option<bool>,
    /// Inclusive
    pub start_date: Option<NaiveDate>,
    /// Inclusive
    pub end_date: Option<NaiveDate>,
    /// Substring of the description
    #[validate(length(max = 100))]
    pub search: Option<String>,
    /// Page number, starting at 1
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<u64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u64>,
}

/// One page of transactions
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionPage {
    pub items: Vec<TransactionResponse>,
    pub page: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, max = 1000))]
    pub transaction_ids: Vec<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
    /// Accounts whose balance changed
    pub account_ids: Vec<i32>,
}

/// Record a transaction and apply it to the account balance
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/transactions",
    tag = "transactions",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User or account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn create_transaction(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<CreateTransactionRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), ApiError> {
    trace!("Entering create_transaction function for user_id: {}", user_id);
    let created = ledger::create_transaction(&state.db, user_id, request.into()).await?;
    invalidate_user_stats(&state, user_id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            TransactionResponse::from(created),
            "Transaction created successfully",
        )),
    ))
}

/// Get a specific transaction by ID
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{transaction_id}",
    tag = "transactions",
    params(
        ("transaction_id" = i32, Path, description = "Transaction ID"),
    ),
    responses(
        (status = 200, description = "Transaction retrieved successfully", body = ApiResponse<TransactionResponse>),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_transaction(
    Path(transaction_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    trace!("Entering get_transaction function for transaction_id: {}", transaction_id);
    let found = find_transaction(&state, transaction_id).await?;
    Ok(Json(ApiResponse::ok(
        TransactionResponse::from(found),
        "Transaction retrieved successfully",
    )))
}

/// Update a transaction, moving its balance effect as needed
#[utoipa::path(
    put,
    path = "/api/v1/transactions/{transaction_id}",
    tag = "transactions",
    params(
        ("transaction_id" = i32, Path, description = "Transaction ID"),
    ),
    request_body = UpdateTransactionRequest,
    responses(
        (status = 200, description = "Transaction updated successfully", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Transaction or account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn update_transaction(
    Path(transaction_id): Path<i32>,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<UpdateTransactionRequest>>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ApiError> {
    trace!("Entering update_transaction function for transaction_id: {}", transaction_id);
    let existing = find_transaction(&state, transaction_id).await?;
    let input = request.merged_with(&existing);

    let updated = ledger::update_transaction(&state.db, transaction_id, input).await?;
    invalidate_user_stats(&state, updated.user_id);

    Ok(Json(ApiResponse::ok(
        TransactionResponse::from(updated),
        "Transaction updated successfully",
    )))
}

/// Delete several of a user's transactions at once
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/transactions/bulk-delete",
    tag = "transactions",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Transactions deleted", body = ApiResponse<BulkDeleteResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn bulk_delete_transactions(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<BulkDeleteRequest>>,
) -> Result<Json<ApiResponse<BulkDeleteResponse>>, ApiError> {
    trace!("Entering bulk_delete_transactions function for user_id: {}", user_id);
    let (account_ids, deleted) =
        ledger::bulk_delete_transactions(&state.db, user_id, &request.transaction_ids).await?;

    if deleted > 0 {
        invalidate_user_stats(&state, user_id);
    }
    if deleted < request.transaction_ids.len() as u64 {
        warn!(
            "Only {} of {} requested transactions were deleted for user {}",
            deleted,
            request.transaction_ids.len(),
            user_id
        );
    }

    Ok(Json(ApiResponse::ok(
        BulkDeleteResponse { deleted, account_ids },
        "Transactions deleted successfully",
    )))
}

/// List a user's transactions, newest first
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/transactions",
    tag = "transactions",
    params(
        ("user_id" = i32, Path, description = "User ID"),
        TransactionListQuery
    ),
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = ApiResponse<TransactionPage>),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_user_transactions(
    Path(user_id): Path<i32>,
    Valid(Query(query)): Valid<Query<TransactionListQuery>>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TransactionPage>>, ApiError> {
    trace!("Entering get_user_transactions function for user_id: {}", user_id);
    find_user(&state, user_id).await?;

    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(ApiError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }

    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PAGE_SIZE);
    debug!("Listing transactions of user {} - page: {}, per_page: {}", user_id, page, per_page);

    let mut select = transaction::Entity::find().filter(transaction::Column::UserId.eq(user_id));
    if let Some(account_id) = query.account_id {
        select = select.filter(transaction::Column::AccountId.eq(account_id));
    }
    if let Some(transaction_type) = query.transaction_type {
        select = select.filter(transaction::Column::TransactionType.eq(transaction_type));
    }
    if let Some(recurring) = query.recurring {
        select = select.filter(transaction::Column::IsRecurring.eq(recurring));
    }
    if let Some(start) = query.start_date {
        select = select.filter(transaction::Column::Date.gte(start));
    }
    if let Some(end) = query.end_date {
        select = select.filter(transaction::Column::Date.lte(end));
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(transaction::Column::Description.like(contains_pattern(search)));
    }

    let paginator = select
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .paginate(&state.db, per_page);
    let counts = paginator.num_items_and_pages().await?;
    let items = paginator.fetch_page(page - 1).await?;

    info!(
        "Retrieved {} of {} transactions for user {}",
        items.len(),
        counts.number_of_items,
        user_id
    );
    let response = TransactionPage {
        items: items.into_iter().map(TransactionResponse::from).collect(),
        page,
        per_page,
        total_items: counts.number_of_items,
        total_pages: counts.number_of_pages,
    };
    Ok(Json(ApiResponse::ok(response, "Transactions retrieved successfully")))
}

async fn find_transaction(state: &AppState, transaction_id: i32) -> Result<transaction::Model, ApiError> {
    match transaction::Entity::find_by_id(transaction_id).one(&state.db).await? {
        Some(found) => Ok(found),
        None => {
            warn!("Transaction with ID {} not found", transaction_id);
            Err(ApiError::not_found(format!("Transaction {}", transaction_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn existing() -> transaction::Model {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        transaction::Model {
            id: 5,
            transaction_type: TransactionType::Expense,
            amount: Decimal::new(1250, 2),
            description: Some("Lunch".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            category: "food".to_string(),
            receipt_url: None,
            is_recurring: false,
            recurring_interval: None,
            next_recurring_date: None,
            last_processed: None,
            status: TransactionStatus::Completed,
            user_id: 1,
            account_id: 2,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_update_keeps_omitted_fields() {
        let request = UpdateTransactionRequest {
            amount: Some(Decimal::new(20, 0)),
            account_id: Some(3),
            ..Default::default()
        };
        let input = request.merged_with(&existing());

        assert_eq!(input.amount, Decimal::new(20, 0));
        assert_eq!(input.account_id, 3);
        assert_eq!(input.description.as_deref(), Some("Lunch"));
        assert_eq!(input.category, "food");
        assert_eq!(input.transaction_type, TransactionType::Expense);
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateTransactionRequest = serde_json::from_value(serde_json::json!({
            "transaction_type": "INCOME",
            "amount": "100.50",
            "date": "2024-03-02",
            "category": "salary",
            "account_id": 1
        }))
        .unwrap();
        let input = TransactionInput::from(request);

        assert!(!input.is_recurring);
        assert_eq!(input.status, TransactionStatus::Completed);
        assert_eq!(input.amount, Decimal::new(10050, 2));
    }

    #[test]
    fn test_empty_bulk_delete_is_invalid() {
        let request = BulkDeleteRequest { transaction_ids: vec![] };
        assert!(request.validate().is_err());
    }
}
