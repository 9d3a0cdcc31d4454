//! User and membership service.

use chrono::Utc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::{
    pagination::PageRequest,
    scope::Scope,
    user::{Membership, User, UserFilter, UserProfile, UserRole, UserWithAccounts},
};
use crate::services::{identifiers, rules};

async fn load_user(ctx: &AppContext, scope: &Scope, user_id: Uuid) -> Result<User, AppError> {
    ctx.store
        .get_user(scope, user_id)
        .await?
        .ok_or(AppError::NotFound("user"))
}

/// Create a user with role `user` on a usable account.
pub async fn create_user(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    profile: UserProfile,
) -> Result<UserWithAccounts, AppError> {
    let account = rules::load_usable_account(ctx.store.as_ref(), scope, account_id).await?;

    let mut user = User::blank(identifiers::new_id(), &account.creator_id, Utc::now());
    profile.apply(&mut user);
    let membership = Membership {
        user_id: user.user_id,
        account_id,
        user_role: UserRole::User,
    };
    ctx.store.insert_user(&user, &membership).await?;

    tracing::info!(user_id = %user.user_id, %account_id, "user created");
    Ok(UserWithAccounts {
        user,
        accounts: vec![membership],
    })
}

pub async fn get_user(
    ctx: &AppContext,
    scope: &Scope,
    user_id: Uuid,
) -> Result<UserWithAccounts, AppError> {
    let user = load_user(ctx, scope, user_id).await?;
    let accounts = ctx.store.memberships_for_user(user_id).await?;
    Ok(UserWithAccounts { user, accounts })
}

pub async fn list_users(
    ctx: &AppContext,
    scope: &Scope,
    filter: &UserFilter,
    page: PageRequest,
) -> Result<(Vec<User>, i64), AppError> {
    ctx.store.list_users(scope, filter, page).await
}

/// Users with a membership on the account. The account must be visible.
pub async fn list_users_by_account(
    ctx: &AppContext,
    scope: &Scope,
    account_id: Uuid,
    filter: &UserFilter,
    page: PageRequest,
) -> Result<(Vec<User>, i64), AppError> {
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    let filter = UserFilter {
        account_id: Some(account_id),
        ..filter.clone()
    };
    ctx.store.list_users(scope, &filter, page).await
}

pub async fn update_user(
    ctx: &AppContext,
    scope: &Scope,
    user_id: Uuid,
    profile: UserProfile,
) -> Result<User, AppError> {
    let mut user = load_user(ctx, scope, user_id).await?;
    profile.apply(&mut user);
    user.user_last_modified = Utc::now();
    ctx.store.save_user(&user).await?;
    Ok(user)
}

/// Link an existing user to another account of the same tenant.
///
/// # Errors
///
/// `ConstraintViolation` if the user is already a member, or if user and
/// account belong to different tenants.
pub async fn add_user_to_account(
    ctx: &AppContext,
    scope: &Scope,
    user_id: Uuid,
    account_id: Uuid,
    role: Option<UserRole>,
) -> Result<UserWithAccounts, AppError> {
    let user = load_user(ctx, scope, user_id).await?;
    let account = rules::load_usable_account(ctx.store.as_ref(), scope, account_id).await?;
    if account.creator_id != user.creator_id {
        return Err(AppError::constraint(
            "user and account belong to different tenants",
        ));
    }

    let membership = Membership {
        user_id,
        account_id,
        user_role: role.unwrap_or(UserRole::User),
    };
    ctx.store.insert_membership(&membership).await?;

    tracing::info!(%user_id, %account_id, role = membership.user_role.as_str(), "user added to account");
    get_user(ctx, scope, user_id).await
}

/// Unlink a user from an account, protecting the sole admin.
pub async fn remove_user_from_account(
    ctx: &AppContext,
    scope: &Scope,
    user_id: Uuid,
    account_id: Uuid,
) -> Result<(), AppError> {
    load_user(ctx, scope, user_id).await?;
    rules::load_account(ctx.store.as_ref(), scope, account_id).await?;
    rules::ensure_not_sole_admin(ctx.store.as_ref(), user_id, account_id).await?;

    if !ctx.store.delete_membership(user_id, account_id).await? {
        return Err(AppError::NotFound("membership"));
    }
    tracing::info!(%user_id, %account_id, "user removed from account");
    Ok(())
}

/// Hard-delete a user unless it is the sole admin of a live account.
pub async fn delete_user(ctx: &AppContext, scope: &Scope, user_id: Uuid) -> Result<(), AppError> {
    load_user(ctx, scope, user_id).await?;
    for membership in ctx.store.memberships_for_user(user_id).await? {
        rules::ensure_not_sole_admin(ctx.store.as_ref(), user_id, membership.account_id).await?;
    }

    ctx.store.delete_user(user_id).await?;
    tracing::info!(%user_id, "user deleted");
    Ok(())
}
