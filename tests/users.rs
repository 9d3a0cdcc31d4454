mod common;

use common::*;
use merchant_account_service::{
    error::AppError,
    models::{
        pagination::PageRequest,
        user::{UserFilter, UserProfile, UserProfileRequest, UserRole},
    },
    services::{lifecycle, user_service},
};

fn profile(first_name: &str, email: &str) -> UserProfile {
    UserProfile {
        first_name: Some(first_name.to_string()),
        email: Some(email.to_string()),
        ..UserProfile::default()
    }
}

#[tokio::test]
async fn users_need_an_active_account() {
    let app = TestApp::new();
    let pending = app.create_account(TENANT, COMPANY_SIRET).await;

    let err = user_service::create_user(
        &app.ctx,
        &tenant(),
        pending.account.account_id,
        profile("Alice", "alice@example.com"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("not active")));
}

#[tokio::test]
async fn create_search_and_update() {
    let app = TestApp::new();
    let account = app.active_company().await.account;

    let alice = user_service::create_user(
        &app.ctx,
        &tenant(),
        account.account_id,
        profile("Alice", "alice@example.com"),
    )
    .await
    .expect("create");
    assert_eq!(alice.user.creator_id, TENANT);
    assert_eq!(alice.accounts.len(), 1);
    assert_eq!(alice.accounts[0].user_role, UserRole::User);

    let (found, total) = user_service::list_users(
        &app.ctx,
        &tenant(),
        &UserFilter {
            search: Some("ALICE@".to_string()),
            ..UserFilter::default()
        },
        PageRequest::default(),
    )
    .await
    .expect("search");
    assert_eq!(total, 1);
    assert_eq!(found[0].user_id, alice.user.user_id);

    let (members, total) = user_service::list_users_by_account(
        &app.ctx,
        &tenant(),
        account.account_id,
        &UserFilter::default(),
        PageRequest::default(),
    )
    .await
    .expect("members");
    // Admin created with the account plus Alice.
    assert_eq!(total, 2);
    assert_eq!(members.len(), 2);

    let changes = UserProfileRequest {
        user_last_name: Some("Durand".to_string()),
        user_birth_date: Some("03/04/1992".to_string()),
        ..UserProfileRequest::default()
    }
    .validate()
    .expect("valid");
    let updated = user_service::update_user(&app.ctx, &tenant(), alice.user.user_id, changes)
        .await
        .expect("update");
    assert_eq!(updated.user_first_name.as_deref(), Some("Alice"));
    assert_eq!(updated.user_last_name.as_deref(), Some("Durand"));
    assert_eq!(updated.user_birth_date.as_deref(), Some("1992/04/03"));
}

#[test]
fn profile_rejects_bad_dates_and_emails() {
    let err = UserProfileRequest {
        user_email: Some("not-an-email".to_string()),
        user_birth_date: Some("yesterday".to_string()),
        ..UserProfileRequest::default()
    }
    .validate()
    .unwrap_err();
    match err {
        AppError::Validation(fields) => assert_eq!(fields.len(), 2),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn memberships_are_unique_and_tenant_bound() {
    let app = TestApp::new();
    let first = app.active_company().await;
    let second = app.active_individual().await;

    let user = user_service::create_user(
        &app.ctx,
        &tenant(),
        first.account.account_id,
        profile("Bob", "bob@example.com"),
    )
    .await
    .expect("create");
    let user_id = user.user.user_id;

    let linked = user_service::add_user_to_account(
        &app.ctx,
        &tenant(),
        user_id,
        second.account.account_id,
        Some(UserRole::Admin),
    )
    .await
    .expect("link");
    assert_eq!(linked.accounts.len(), 2);

    let err = user_service::add_user_to_account(
        &app.ctx,
        &tenant(),
        user_id,
        second.account.account_id,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));

    // Another tenant's key cannot even see the user.
    let err = user_service::get_user(&app.ctx, &other_tenant(), user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("user")));
}

#[tokio::test]
async fn sole_admin_is_protected() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let account_id = created.account.account_id;
    let admin_id = created.user.user_id;

    let err = user_service::remove_user_from_account(&app.ctx, &tenant(), admin_id, account_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));
    let err = user_service::delete_user(&app.ctx, &tenant(), admin_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));

    // A second admin lifts the restriction.
    let deputy = user_service::create_user(
        &app.ctx,
        &tenant(),
        account_id,
        profile("Claire", "claire@example.com"),
    )
    .await
    .expect("deputy");
    user_service::remove_user_from_account(&app.ctx, &tenant(), deputy.user.user_id, account_id)
        .await
        .expect("plain members can leave");
    let err = user_service::remove_user_from_account(
        &app.ctx,
        &tenant(),
        deputy.user.user_id,
        account_id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound("membership")));

    user_service::add_user_to_account(
        &app.ctx,
        &tenant(),
        deputy.user.user_id,
        account_id,
        Some(UserRole::Admin),
    )
    .await
    .expect("promote");
    user_service::delete_user(&app.ctx, &tenant(), admin_id)
        .await
        .expect("no longer the only admin");
    let err = user_service::get_user(&app.ctx, &tenant(), admin_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound("user")));
}

#[tokio::test]
async fn deleted_account_releases_its_admin() {
    let app = TestApp::new();
    let created = app.active_company().await;
    lifecycle::soft_delete(&app.ctx, &tenant(), created.account.account_id)
        .await
        .expect("delete");

    user_service::delete_user(&app.ctx, &tenant(), created.user.user_id)
        .await
        .expect("admin of a deleted account can go");
}
