use crate::error::ApiError;
use crate::handlers::users::find_user;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};
use crate::services::accounts::default_account;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use compute::budget::{current_month_expenses, BudgetUsage};
use model::entities::{account, budget};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpsertBudgetRequest {
    /// Monthly budget, must be positive
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BudgetResponse {
    pub id: i32,
    pub amount: Decimal,
    pub last_alert_sent: Option<DateTime<Utc>>,
    pub user_id: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<budget::Model> for BudgetResponse {
    fn from(model: budget::Model) -> Self {
        Self {
            id: model.id,
            amount: model.amount,
            last_alert_sent: model.last_alert_sent,
            user_id: model.user_id,
            updated_at: model.updated_at,
        }
    }
}

/// The budget next to this month's spending on one account
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BudgetStatusResponse {
    /// `None` when the user has not set a budget
    pub budget: Option<BudgetResponse>,
    /// Account the expenses were summed over, if any
    pub account_id: Option<i32>,
    pub current_expenses: Decimal,
    pub percentage_used: Option<Decimal>,
    pub remaining: Option<Decimal>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BudgetQuery {
    /// Defaults to the user's default account
    pub account_id: Option<i32>,
}

/// Get a user's budget and this month's expenses
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/budget",
    tag = "budgets",
    params(
        ("user_id" = i32, Path, description = "User ID"),
        BudgetQuery
    ),
    responses(
        (status = 200, description = "Budget retrieved successfully", body = ApiResponse<BudgetStatusResponse>),
        (status = 404, description = "User or account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_budget(
    Path(user_id): Path<i32>,
    Query(query): Query<BudgetQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BudgetStatusResponse>>, ApiError> {
    trace!("Entering get_budget function for user_id: {}", user_id);
    find_user(&state, user_id).await?;

    let account_id = match query.account_id {
        Some(account_id) => {
            let owned = account::Entity::find_by_id(account_id)
                .filter(account::Column::UserId.eq(user_id))
                .one(&state.db)
                .await?;
            if owned.is_none() {
                warn!("Account {} does not belong to user {}", account_id, user_id);
                return Err(ApiError::not_found(format!("Account {}", account_id)));
            }
            Some(account_id)
        }
        None => default_account(&state.db, user_id).await?.map(|a| a.id),
    };

    let current_expenses = match account_id {
        Some(account_id) => {
            current_month_expenses(&state.db, user_id, account_id, Utc::now().date_naive()).await?
        }
        None => Decimal::ZERO,
    };

    let found = budget::Entity::find()
        .filter(budget::Column::UserId.eq(user_id))
        .one(&state.db)
        .await?;
    let usage = found
        .as_ref()
        .map(|b| BudgetUsage::new(b.amount, current_expenses));
    debug!("Budget usage for user {}: {:?}", user_id, usage);

    let status = BudgetStatusResponse {
        budget: found.map(BudgetResponse::from),
        account_id,
        current_expenses,
        percentage_used: usage.and_then(|u| u.percentage_used),
        remaining: usage.map(|u| u.remaining()),
    };
    Ok(Json(ApiResponse::ok(status, "Budget retrieved successfully")))
}

/// Create or replace a user's budget
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/budget",
    tag = "budgets",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    request_body = UpsertBudgetRequest,
    responses(
        (status = 200, description = "Budget saved", body = ApiResponse<BudgetResponse>),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn upsert_budget(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Json(request): Json<UpsertBudgetRequest>,
) -> Result<Json<ApiResponse<BudgetResponse>>, ApiError> {
    trace!("Entering upsert_budget function for user_id: {}", user_id);
    if request.amount <= Decimal::ZERO {
        return Err(ApiError::Validation("Budget amount must be greater than zero".to_string()));
    }
    find_user(&state, user_id).await?;

    let now = Utc::now();
    let existing = budget::Entity::find()
        .filter(budget::Column::UserId.eq(user_id))
        .one(&state.db)
        .await?;

    let saved = match existing {
        Some(existing) => {
            let mut active: budget::ActiveModel = existing.into();
            active.amount = Set(request.amount);
            active.updated_at = Set(now);
            active.update(&state.db).await?
        }
        None => {
            budget::ActiveModel {
                amount: Set(request.amount),
                last_alert_sent: Set(None),
                user_id: Set(user_id),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&state.db)
            .await?
        }
    };

    info!("Budget of user {} set to {}", user_id, saved.amount);
    Ok(Json(ApiResponse::ok(BudgetResponse::from(saved), "Budget saved successfully")))
}
