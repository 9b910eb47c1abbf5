use crate::error::ApiError;
use crate::handlers::transactions::TransactionResponse;
use crate::handlers::users::find_user;
use crate::mailer::templates::{self, AccountCreated};
use crate::schemas::{invalidate_user_stats, ApiResponse, AppState, ErrorResponse};
use crate::services::accounts::{self as account_service, NewAccount};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use model::entities::account::{self, AccountType};
use model::entities::{transaction, user};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Request body for creating an account
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub account_type: AccountType,
    /// Opening balance, zero when omitted
    pub balance: Option<Decimal>,
    /// The user's first account becomes the default regardless
    #[serde(default)]
    pub is_default: bool,
}

/// Account response model
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: i32,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub is_default: bool,
    pub user_id: i32,
    /// Present on account listings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<account::Model> for AccountResponse {
    fn from(model: account::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            account_type: model.account_type,
            balance: model.balance,
            is_default: model.is_default,
            user_id: model.user_id,
            transaction_count: None,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// An account with its transactions, newest first
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountDetailResponse {
    pub account: AccountResponse,
    pub transactions: Vec<TransactionResponse>,
}

/// Create an account for a user
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/accounts",
    tag = "accounts",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    request_body = CreateAccountRequest,
    responses(
        (status = 201, description = "Account created successfully", body = ApiResponse<AccountResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn create_account(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<CreateAccountRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<AccountResponse>>), ApiError> {
    trace!("Entering create_account function for user_id: {}", user_id);
    let owner = find_user(&state, user_id).await?;

    let created = account_service::create_account(
        &state.db,
        user_id,
        NewAccount {
            name: request.name,
            account_type: request.account_type,
            balance: request.balance.unwrap_or(Decimal::ZERO),
            is_default: request.is_default,
        },
    )
    .await?;

    notify_account_created(&state, &owner, &created).await;

    let mut response = AccountResponse::from(created);
    response.transaction_count = Some(0);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(response, "Account created successfully")),
    ))
}

/// Sends the "account created" email. A failed send is logged only.
async fn notify_account_created(state: &AppState, owner: &user::Model, created: &account::Model) {
    let email = templates::account_created(
        &owner.email,
        &AccountCreated {
            user_name: owner.display_name(),
            account_name: &created.name,
            balance: created.balance,
            currency_symbol: &state.settings.currency_symbol,
        },
    );
    match state.mailer.send(email).await {
        Ok(receipt) => debug!("Account created email sent: {:?}", receipt.message_id),
        Err(e) => warn!("Failed to send account created email for account {}: {}", created.id, e),
    }
}

/// List a user's accounts, newest first, with transaction counts
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/accounts",
    tag = "accounts",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Accounts retrieved successfully", body = ApiResponse<Vec<AccountResponse>>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_user_accounts(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AccountResponse>>>, ApiError> {
    trace!("Entering get_user_accounts function for user_id: {}", user_id);
    find_user(&state, user_id).await?;
    let accounts = user_accounts_with_counts(&state, user_id).await?;

    info!("Retrieved {} accounts for user {}", accounts.len(), user_id);
    Ok(Json(ApiResponse::ok(accounts, "Accounts retrieved successfully")))
}

pub(crate) async fn user_accounts_with_counts(
    state: &AppState,
    user_id: i32,
) -> Result<Vec<AccountResponse>, ApiError> {
    let accounts = account::Entity::find()
        .filter(account::Column::UserId.eq(user_id))
        .order_by_desc(account::Column::CreatedAt)
        .order_by_desc(account::Column::Id)
        .all(&state.db)
        .await?;

    let mut responses = Vec::with_capacity(accounts.len());
    for model in accounts {
        let count = transaction::Entity::find()
            .filter(transaction::Column::AccountId.eq(model.id))
            .count(&state.db)
            .await?;
        let mut response = AccountResponse::from(model);
        response.transaction_count = Some(count);
        responses.push(response);
    }
    Ok(responses)
}

/// Get an account with its transactions
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}",
    tag = "accounts",
    params(
        ("account_id" = i32, Path, description = "Account ID"),
    ),
    responses(
        (status = 200, description = "Account retrieved successfully", body = ApiResponse<AccountDetailResponse>),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_account(
    Path(account_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountDetailResponse>>, ApiError> {
    trace!("Entering get_account function for account_id: {}", account_id);
    let Some(model) = account::Entity::find_by_id(account_id).one(&state.db).await? else {
        warn!("Account with ID {} not found", account_id);
        return Err(ApiError::not_found(format!("Account {}", account_id)));
    };

    let transactions = transaction::Entity::find()
        .filter(transaction::Column::AccountId.eq(account_id))
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .all(&state.db)
        .await?;
    debug!("Account {} has {} transactions", account_id, transactions.len());

    let mut account = AccountResponse::from(model);
    account.transaction_count = Some(transactions.len() as u64);
    let detail = AccountDetailResponse {
        account,
        transactions: transactions.into_iter().map(TransactionResponse::from).collect(),
    };
    Ok(Json(ApiResponse::ok(detail, "Account retrieved successfully")))
}

/// Make an account its owner's default account
#[utoipa::path(
    put,
    path = "/api/v1/accounts/{account_id}/default",
    tag = "accounts",
    params(
        ("account_id" = i32, Path, description = "Account ID"),
    ),
    responses(
        (status = 200, description = "Default account updated", body = ApiResponse<AccountResponse>),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn set_default_account(
    Path(account_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountResponse>>, ApiError> {
    trace!("Entering set_default_account function for account_id: {}", account_id);
    let updated = account_service::set_default_account(&state.db, account_id).await?;
    Ok(Json(ApiResponse::ok(
        AccountResponse::from(updated),
        "Default account updated successfully",
    )))
}

/// Delete an account and its transactions
#[utoipa::path(
    delete,
    path = "/api/v1/accounts/{account_id}",
    tag = "accounts",
    params(
        ("account_id" = i32, Path, description = "Account ID"),
    ),
    responses(
        (status = 200, description = "Account deleted successfully", body = ApiResponse<AccountResponse>),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 409, description = "Default account cannot be deleted while others exist", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_account(
    Path(account_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountResponse>>, ApiError> {
    trace!("Entering delete_account function for account_id: {}", account_id);
    let deleted = account_service::delete_account(&state.db, account_id).await?;
    invalidate_user_stats(&state, deleted.user_id);

    Ok(Json(ApiResponse::ok(
        AccountResponse::from(deleted),
        "Account deleted successfully",
    )))
}
