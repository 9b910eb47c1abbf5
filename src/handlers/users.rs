use crate::error::ApiError;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};
use crate::services::users::{self as user_service, IdentityClaims};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use axum_valid::Valid;
use chrono::{DateTime, Utc};
use model::entities::user;
use sea_orm::{EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Identity of a signed-in user as reported by the identity provider
#[derive(Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct SyncUserRequest {
    /// Subject id issued by the identity provider
    #[validate(length(min = 1, max = 255))]
    pub external_id: String,
    #[validate(email)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

impl From<SyncUserRequest> for IdentityClaims {
    fn from(request: SyncUserRequest) -> Self {
        Self {
            external_id: request.external_id,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            image_url: request.image_url,
        }
    }
}

/// User response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            external_id: model.external_id,
            email: model.email,
            name: model.name,
            image_url: model.image_url,
            created_at: model.created_at,
        }
    }
}

/// Find or create the local user for an identity
#[utoipa::path(
    post,
    path = "/api/v1/users/sync",
    tag = "users",
    request_body = SyncUserRequest,
    responses(
        (status = 200, description = "User already existed", body = ApiResponse<UserResponse>),
        (status = 201, description = "User created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn sync_user(
    State(state): State<AppState>,
    Valid(Json(request)): Valid<Json<SyncUserRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), ApiError> {
    trace!("Entering sync_user function");
    let (user_model, created) = user_service::sync_user(&state.db, request.into()).await?;

    let (status, message) = if created {
        info!("Created user {} for external id {}", user_model.id, user_model.external_id);
        (StatusCode::CREATED, "User created successfully")
    } else {
        debug!("User {} already exists", user_model.id);
        (StatusCode::OK, "User already exists")
    };
    Ok((status, Json(ApiResponse::ok(UserResponse::from(user_model), message))))
}

/// Get all users
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    responses(
        (status = 200, description = "Users retrieved successfully", body = ApiResponse<Vec<UserResponse>>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, ApiError> {
    trace!("Entering get_users function");
    let users = user::Entity::find()
        .order_by_asc(user::Column::Id)
        .all(&state.db)
        .await?;

    debug!("Retrieved {} users from database", users.len());
    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(ApiResponse::ok(users, "Users retrieved successfully")))
}

/// Get a specific user by ID
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = i32, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User retrieved successfully", body = ApiResponse<UserResponse>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_user(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    trace!("Entering get_user function for user_id: {}", user_id);
    let user_model = find_user(&state, user_id).await?;
    Ok(Json(ApiResponse::ok(UserResponse::from(user_model), "User retrieved successfully")))
}

/// Loads a user or fails with 404.
pub(crate) async fn find_user(state: &AppState, user_id: i32) -> Result<user::Model, ApiError> {
    match user::Entity::find_by_id(user_id).one(&state.db).await? {
        Some(user_model) => Ok(user_model),
        None => {
            warn!("User with ID {} not found", user_id);
            Err(ApiError::not_found(format!("User {}", user_id)))
        }
    }
}
