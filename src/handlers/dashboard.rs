use crate::error::ApiError;
use crate::handlers::accounts::{user_accounts_with_counts, AccountResponse};
use crate::handlers::transactions::TransactionResponse;
use crate::handlers::users::find_user;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};
use axum::{
    extract::{Path, State},
    response::Json,
};
use model::entities::transaction;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, trace};
use utoipa::ToSchema;

/// Everything the dashboard shows for one user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DashboardResponse {
    pub user_id: i32,
    /// Sum of all account balances
    pub total_balance: Decimal,
    pub accounts: Vec<AccountResponse>,
    /// All of the user's transactions, newest first
    pub transactions: Vec<TransactionResponse>,
}

/// Get a user's dashboard
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/dashboard",
    tag = "users",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Dashboard retrieved successfully", body = ApiResponse<DashboardResponse>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_dashboard(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardResponse>>, ApiError> {
    trace!("Entering get_dashboard function for user_id: {}", user_id);
    find_user(&state, user_id).await?;

    let accounts = user_accounts_with_counts(&state, user_id).await?;
    let transactions = transaction::Entity::find()
        .filter(transaction::Column::UserId.eq(user_id))
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .all(&state.db)
        .await?;

    let total_balance: Decimal = accounts.iter().map(|a| a.balance).sum();
    info!(
        "Dashboard for user {}: {} accounts, {} transactions",
        user_id,
        accounts.len(),
        transactions.len()
    );

    let dashboard = DashboardResponse {
        user_id,
        total_balance,
        accounts,
        transactions: transactions.into_iter().map(TransactionResponse::from).collect(),
    };
    Ok(Json(ApiResponse::ok(dashboard, "Dashboard retrieved successfully")))
}
