mod common;

use std::time::Duration;

use common::*;
use merchant_account_service::{
    error::AppError,
    models::{
        contract::{
            Contract, ContractFilter, ContractType, CreateRibpayCommand, CreateRibpayRequest,
            CreateVadsRequest,
        },
        pagination::PageRequest,
        scope::Scope,
        terminal::{CreateTerminalRequest, TerminalFilter},
    },
    providers::payment::AccountHolder,
    services::{contract_service, identifiers, lifecycle, terminal_service},
};
use uuid::Uuid;

fn ribpay(account_id: Uuid, terminal_id: Option<Uuid>) -> CreateRibpayCommand {
    CreateRibpayRequest {
        account_id,
        terminal_id,
        iban: IBAN.to_string(),
    }
    .validate()
    .expect("valid IBAN")
}

fn vads(account_id: Uuid, terminal_id: Option<Uuid>, merchant_id: &str) -> CreateVadsRequest {
    CreateVadsRequest {
        account_id,
        terminal_id,
        contract_merchant_id: merchant_id.to_string(),
        contract_bank_name: "BNP Paribas".to_string(),
        contract_bank_code: "30004".to_string(),
        contract_3d_secure: None,
        contract_max_amount: None,
    }
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..50 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn ribpay_provisioning_for_a_company() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let terminal_id = created.terminal.terminal_id;

    let contract = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, Some(terminal_id)),
    )
    .await
    .expect("create");

    let Contract::Ribpay(ribpay) = &contract else {
        panic!("expected RIBPAY, got {contract:?}");
    };
    assert!(contract.is_active());
    assert_eq!(ribpay.common.terminal_id, Some(terminal_id));
    assert!(ribpay.common.contract_number.starts_with("OXLN_"));
    assert_eq!(
        identifiers::decode_reference(&ribpay.common.contract_number).as_deref(),
        Some(ribpay.common.contract_merchant_id.as_str())
    );

    let payments = app.payments.state();
    assert!(payments.aliases.contains(&ribpay.contract_alias_id));
    assert!(payments
        .authorized_accounts
        .contains(&ribpay.common.contract_merchant_id));
    assert!(matches!(
        &payments.authorized_requests[0].holder,
        AccountHolder::Company { national_identification, .. } if national_identification == COMPANY_SIRET
    ));
}

#[tokio::test]
async fn ribpay_holder_for_a_sole_trader_is_the_admin() {
    let app = TestApp::new();
    let created = app.active_individual().await;

    contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, None),
    )
    .await
    .expect("create");

    let payments = app.payments.state();
    match &payments.authorized_requests[0].holder {
        AccountHolder::NaturalPerson {
            firstname,
            surname,
            birth_date,
            ..
        } => {
            assert_eq!(firstname, "Jean");
            assert_eq!(surname, "Martin");
            assert_eq!(birth_date, "1985-06-15");
        }
        other => panic!("unexpected holder {other:?}"),
    }
}

#[tokio::test]
async fn failed_authorized_account_removes_the_alias() {
    let app = TestApp::new();
    let created = app.active_company().await;
    app.payments.state().fail_authorized_account = true;

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, Some(created.terminal.terminal_id)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderRejected { .. }));

    assert!(app.payments.state().aliases.is_empty());
    let (contracts, _) = contract_service::list_contracts(
        &app.ctx,
        &tenant(),
        &ContractFilter::default(),
        PageRequest::default(),
    )
    .await
    .expect("list");
    assert!(contracts.is_empty());
}

#[tokio::test]
async fn failed_persistence_releases_provider_resources() {
    let app = TestApp::new();
    let created = app.active_company().await;
    app.store.fail_contract_writes(true);

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, Some(created.terminal.terminal_id)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let payments = app.payments.state();
    assert!(payments.aliases.is_empty());
    assert!(payments.authorized_accounts.is_empty());
}

#[tokio::test]
async fn unknown_bank_is_rejected_before_any_provisioning() {
    let app = TestApp::new();
    let created = app.active_company().await;
    app.payments.state().no_bank = true;

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, None),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderRejected { .. }));
    assert!(app.payments.state().aliases.is_empty());
}

#[tokio::test]
async fn hanging_provider_times_out() {
    let app = TestApp::new();
    let created = app.active_company().await;
    app.payments.state().hang_search = true;

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, None),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable { provider: "oxlin", .. }));
}

#[tokio::test]
async fn one_live_contract_per_type_per_terminal() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let account_id = created.account.account_id;
    let terminal_id = created.terminal.terminal_id;

    let first = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(account_id, Some(terminal_id)),
    )
    .await
    .expect("first");

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(account_id, Some(terminal_id)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(m) if m.contains("RIBPAY")));

    // A VADS contract can sit next to the RIBPAY one.
    let command = vads(account_id, Some(terminal_id), "7001").validate().expect("valid");
    contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("vads");

    // Removing the RIBPAY contract frees the slot and deprovisions it.
    let removed = contract_service::remove_contract(&app.ctx, &tenant(), first.id())
        .await
        .expect("remove");
    assert!(removed.is_deleted());
    assert!(app.payments.state().aliases.is_empty());

    let err = contract_service::remove_contract(&app.ctx, &tenant(), first.id())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("already deleted")));

    contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(account_id, Some(terminal_id)),
    )
    .await
    .expect("slot reusable after removal");
}

#[tokio::test]
async fn failed_deprovisioning_keeps_the_contract() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let contract = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, None),
    )
    .await
    .expect("create");

    app.payments.state().fail_delete_alias = true;
    let err = contract_service::remove_contract(&app.ctx, &tenant(), contract.id())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable { .. }));

    let stored = contract_service::get_contract(&app.ctx, &tenant(), contract.id())
        .await
        .expect("still there");
    assert!(!stored.is_deleted());
}

#[tokio::test]
async fn vads_starts_inactive_and_mails_the_form() {
    let app = TestApp::new();
    let created = app.active_company().await;

    let command = vads(created.account.account_id, Some(created.terminal.terminal_id), "7002")
        .validate()
        .expect("valid");
    let contract = contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("create");
    assert!(!contract.is_active());
    assert_eq!(contract.common().contract_number, "VADS_7002");

    wait_for(|| !app.mailer.state().forms.is_empty()).await;
    let mail = app.mailer.state();
    let (to, form) = &mail.forms[0];
    assert_eq!(to, ONBOARDING_EMAIL);
    assert_eq!(form.contract_id, contract.id());
    assert_eq!(form.max_amount, 10000);
    assert!(form.three_d_secure);
}

#[test]
fn vads_amount_must_be_a_known_ceiling() {
    let mut request = vads(Uuid::new_v4(), None, "7003");
    request.contract_max_amount = Some(1234);
    assert!(matches!(request.validate(), Err(AppError::Validation(_))));
}

#[tokio::test]
async fn vads_mail_failure_does_not_fail_creation() {
    let app = TestApp::new();
    let created = app.active_company().await;
    app.mailer.state().fail = true;

    let command = vads(created.account.account_id, None, "7004").validate().expect("valid");
    contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("created despite mail outage");
}

#[tokio::test]
async fn forced_activation_is_admin_only() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let command = vads(created.account.account_id, None, "7005").validate().expect("valid");
    let contract = contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("create");

    let err = contract_service::activate_vads_contract(&app.ctx, &tenant(), contract.id())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let active = contract_service::activate_vads_contract(&app.ctx, &Scope::Admin, contract.id())
        .await
        .expect("activate");
    assert!(active.is_active());

    let err = contract_service::activate_vads_contract(&app.ctx, &Scope::Admin, contract.id())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn contracts_need_a_usable_account_and_its_own_terminal() {
    let app = TestApp::new();
    let pending = app.create_account(TENANT, INDIVIDUAL_SIRET).await;
    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(pending.account.account_id, None),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let active = app.active_company().await;
    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(active.account.account_id, Some(pending.terminal.terminal_id)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(m) if m.contains("another account")));

    let err = contract_service::create_ribpay_contract(
        &app.ctx,
        &other_tenant(),
        ribpay(active.account.account_id, None),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound("account")));
}

#[tokio::test]
async fn reassignment_moves_between_terminals_of_one_account() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let account_id = created.account.account_id;
    let first_terminal = created.terminal.terminal_id;

    let second_terminal = terminal_service::create_terminal(
        &app.ctx,
        &tenant(),
        CreateTerminalRequest {
            account_id,
            terminal_label: Some("Counter 2".to_string()),
            terminal_favorite_contract_type: Some(ContractType::Vads),
            terminal_subscription_type: None,
        },
    )
    .await
    .expect("terminal");

    let on_first = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(account_id, Some(first_terminal)),
    )
    .await
    .expect("first");
    let on_second = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(account_id, Some(second_terminal.terminal_id)),
    )
    .await
    .expect("second");

    let err = contract_service::reassign_contract(
        &app.ctx,
        &tenant(),
        on_first.id(),
        second_terminal.terminal_id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));

    contract_service::remove_contract(&app.ctx, &tenant(), on_second.id())
        .await
        .expect("remove");
    let moved = contract_service::reassign_contract(
        &app.ctx,
        &tenant(),
        on_first.id(),
        second_terminal.terminal_id,
    )
    .await
    .expect("move");
    assert_eq!(moved.common().terminal_id, Some(second_terminal.terminal_id));

    // Reassigning to the current terminal is a no-op success.
    contract_service::reassign_contract(
        &app.ctx,
        &tenant(),
        on_first.id(),
        second_terminal.terminal_id,
    )
    .await
    .expect("same terminal");

    let (listed, total) = contract_service::list_contracts_by_terminal(
        &app.ctx,
        &tenant(),
        second_terminal.terminal_id,
        &ContractFilter {
            is_deleted: Some(false),
            ..ContractFilter::default()
        },
        PageRequest::default(),
    )
    .await
    .expect("list");
    assert_eq!(total, 1);
    assert_eq!(listed[0].id(), on_first.id());
}

#[tokio::test]
async fn terminals_with_live_contracts_cannot_be_deleted() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let terminal_id = created.terminal.terminal_id;
    let contract = contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        ribpay(created.account.account_id, Some(terminal_id)),
    )
    .await
    .expect("create");

    let err = terminal_service::delete_terminal(&app.ctx, &tenant(), terminal_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));

    contract_service::remove_contract(&app.ctx, &tenant(), contract.id())
        .await
        .expect("remove");
    terminal_service::delete_terminal(&app.ctx, &tenant(), terminal_id)
        .await
        .expect("delete");

    let (terminals, total) = terminal_service::list_terminals(
        &app.ctx,
        &tenant(),
        &TerminalFilter::default(),
        PageRequest::default(),
    )
    .await
    .expect("list");
    assert_eq!(total, 0);
    assert!(terminals.is_empty());

    // Account deletion does not cascade to contracts.
    lifecycle::soft_delete(&app.ctx, &tenant(), created.account.account_id)
        .await
        .expect("delete account");
}

#[tokio::test]
async fn racing_vads_activations_succeed_once() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let command = vads(created.account.account_id, None, "7010")
        .validate()
        .expect("valid");
    let contract = contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("create");
    let id = contract.id();

    // Snapshot taken by a reassignment that started before the activation.
    let stale = app
        .ctx
        .store
        .get_contract(&tenant(), id)
        .await
        .expect("load")
        .expect("contract");

    app.ctx
        .store
        .activate_vads_contract(id, chrono::Utc::now())
        .await
        .expect("first activation");
    let err = app
        .ctx
        .store
        .activate_vads_contract(id, chrono::Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    app.ctx.store.save_contract(&stale).await.expect("stale write");
    let stored = contract_service::get_contract(&app.ctx, &tenant(), id)
        .await
        .expect("stored");
    assert!(stored.is_active());

    contract_service::remove_contract(&app.ctx, &tenant(), id)
        .await
        .expect("remove");
    let err = app.ctx.store.save_contract(&stale).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    let stored = contract_service::get_contract(&app.ctx, &tenant(), id)
        .await
        .expect("stored");
    assert!(stored.is_deleted());
}
