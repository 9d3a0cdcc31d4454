//! User HTTP handlers.
//!
//! - POST /api/v1/users - Create a user attached to an account
//! - GET /api/v1/users - List users
//! - GET /api/v1/users/{id} - Get a user with its memberships
//! - PATCH /api/v1/users/{id} - Update profile fields
//! - DELETE /api/v1/users/{id} - Delete a user and its memberships
//! - POST /api/v1/users/{id}/accounts - Link the user to another account
//! - DELETE /api/v1/users/{id}/accounts/{account_id} - Unlink

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    context::AppContext,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        pagination::{Page, PageRequest, PaginationQuery},
        user::{
            AddUserToAccountRequest, CreateUserRequest, User, UserFilter, UserProfileRequest,
            UserWithAccounts,
        },
    },
    services::user_service,
};

/// Create a user with the `user` role on an account.
///
/// # Request Body
///
/// ```json
/// {
///   "account_id": "550e8400-...",
///   "user_first_name": "Jeanne",
///   "user_email": "jeanne@example.com",
///   "user_birth_date": "1990-04-12"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the user and its memberships
/// - **409**: the account is deleted or not active yet
pub async fn create_user(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserWithAccounts>), AppError> {
    let profile = request.profile.validate()?;
    let user = user_service::create_user(&ctx, &auth.scope, request.account_id, profile).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserWithAccounts>, AppError> {
    let user = user_service::get_user(&ctx, &auth.scope, id).await?;
    Ok(Json(user))
}

pub async fn list_users(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Query(pagination): Query<PaginationQuery>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Page<User>>, AppError> {
    let page = PageRequest::from(pagination);
    let (users, total) = user_service::list_users(&ctx, &auth.scope, &filter, page).await?;
    Ok(Json(Page::new(users, total, page, &ctx.link_base("users"))))
}

pub async fn update_user(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UserProfileRequest>,
) -> Result<Json<User>, AppError> {
    let profile = request.validate()?;
    let user = user_service::update_user(&ctx, &auth.scope, id, profile).await?;
    Ok(Json(user))
}

/// Delete a user. Refused with 409 while the user is the only admin of an
/// active account.
pub async fn delete_user(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user_service::delete_user(&ctx, &auth.scope, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_user_to_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddUserToAccountRequest>,
) -> Result<Json<UserWithAccounts>, AppError> {
    let user = user_service::add_user_to_account(
        &ctx,
        &auth.scope,
        id,
        request.account_id,
        request.user_role,
    )
    .await?;
    Ok(Json(user))
}

pub async fn remove_user_from_account(
    State(ctx): State<AppContext>,
    Extension(auth): Extension<AuthContext>,
    Path((id, account_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    user_service::remove_user_from_account(&ctx, &auth.scope, id, account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
