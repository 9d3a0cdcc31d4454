mod common;

use common::*;
use merchant_account_service::{
    error::AppError,
    models::{
        account::AccountCreated,
        contract::{Contract, CreateRibpayRequest, CreateVadsRequest},
        pagination::PageRequest,
        transaction::{CreateTransactionCommand, TransactionFilter, TransactionStatus},
    },
    services::{contract_service, transaction_service},
};
use uuid::Uuid;

fn command(created: &AccountCreated, contract_id: Option<Uuid>, cents: i64) -> CreateTransactionCommand {
    CreateTransactionCommand {
        account_id: created.account.account_id,
        terminal_id: created.terminal.terminal_id,
        contract_id,
        amount_cents: cents,
        label: "Order 1234".to_string(),
        instant_payment: false,
        redirect_url: Some("https://shop.example.com/done".to_string()),
        notification_url: None,
        metadata: serde_json::json!({ "cart": 42 }),
    }
}

async fn ribpay_contract(app: &TestApp, created: &AccountCreated) -> Contract {
    contract_service::create_ribpay_contract(
        &app.ctx,
        &tenant(),
        CreateRibpayRequest {
            account_id: created.account.account_id,
            terminal_id: Some(created.terminal.terminal_id),
            iban: IBAN.to_string(),
        }
        .validate()
        .expect("valid IBAN"),
    )
    .await
    .expect("ribpay contract")
}

#[tokio::test]
async fn creation_computes_vat_and_authorization_url() {
    let app = TestApp::new();
    let created = app.active_company().await;

    let transaction =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&created, None, 1000))
            .await
            .expect("create");

    assert_eq!(transaction.transaction_status, TransactionStatus::New);
    assert_eq!(transaction.transaction_amount_cents, 1000);
    assert_eq!(transaction.transaction_amount_without_vat, 800);
    assert_eq!(transaction.transaction_vat, 20);
    assert_eq!(transaction.transaction_currency, "EUR");
    assert_eq!(transaction.transaction_beneficiary, created.account.account_name);
    assert_eq!(
        transaction.transaction_auth_url,
        Some(format!(
            "https://pay.example.com/authorize/{}",
            transaction.transaction_id
        ))
    );
    assert!(transaction.transaction_type.is_none());
    assert!(transaction.transaction_finished.is_none());

    // No provider involvement until a payment order is requested.
    assert!(app.payments.state().orders.is_empty());
}

#[tokio::test]
async fn odd_amounts_round_the_vat_down() {
    let app = TestApp::new();
    let created = app.active_company().await;

    let transaction =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&created, None, 1999))
            .await
            .expect("create");
    // floor(1999 * 0.2) = 399
    assert_eq!(transaction.transaction_amount_without_vat, 1600);
}

#[tokio::test]
async fn references_must_belong_to_the_account() {
    let app = TestApp::new();
    let company = app.active_company().await;
    let individual = app.active_individual().await;
    let foreign_contract = ribpay_contract(&app, &individual).await;

    let err = transaction_service::create_transaction(
        &app.ctx,
        &tenant(),
        command(&company, Some(foreign_contract.id()), 500),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(m) if m.contains("another account")));

    let mut wrong_terminal = command(&company, None, 500);
    wrong_terminal.terminal_id = individual.terminal.terminal_id;
    let err = transaction_service::create_transaction(&app.ctx, &tenant(), wrong_terminal)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConstraintViolation(_)));

    let err = transaction_service::create_transaction(
        &app.ctx,
        &tenant(),
        command(&company, Some(Uuid::new_v4()), 500),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound("contract")));
}

#[tokio::test]
async fn pending_accounts_cannot_take_payments() {
    let app = TestApp::new();
    let pending = app.create_account(TENANT, COMPANY_SIRET).await;

    let err =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&pending, None, 500))
            .await
            .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn final_status_is_reached_once() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let transaction =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&created, None, 500))
            .await
            .expect("create");
    let id = transaction.transaction_id;

    let err = transaction_service::update_transaction_status(
        &app.ctx,
        &tenant(),
        id,
        TransactionStatus::New,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let closed = transaction_service::update_transaction_status(
        &app.ctx,
        &tenant(),
        id,
        TransactionStatus::Closed,
    )
    .await
    .expect("close");
    assert_eq!(closed.transaction_status, TransactionStatus::Closed);
    assert!(closed.transaction_finished.is_some());

    let err = transaction_service::update_transaction_status(
        &app.ctx,
        &tenant(),
        id,
        TransactionStatus::Cancelled,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("already completed")));
}

#[tokio::test]
async fn payment_order_flow() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let contract = ribpay_contract(&app, &created).await;
    let Contract::Ribpay(ribpay) = &contract else {
        panic!("expected RIBPAY");
    };

    let mut cmd = command(&created, Some(contract.id()), 1250);
    cmd.instant_payment = true;
    let transaction = transaction_service::create_transaction(&app.ctx, &tenant(), cmd)
        .await
        .expect("create");
    assert_eq!(
        transaction.transaction_type,
        Some(contract.contract_type())
    );

    let ordered =
        transaction_service::initiate_payment_order(&app.ctx, &tenant(), transaction.transaction_id)
            .await
            .expect("order");
    let order_id = ordered.transaction_id_oxlin.clone().expect("order id");
    {
        let payments = app.payments.state();
        assert!(payments.orders.contains(&order_id));
        let request = &payments.order_requests[0];
        assert_eq!(request.alias_id, ribpay.contract_alias_id);
        assert_eq!(request.amount_cents, 1250);
        assert!(request.instant_payment);
        assert_eq!(
            request.redirect_url.as_deref(),
            Some("https://shop.example.com/done")
        );
    }

    let err =
        transaction_service::initiate_payment_order(&app.ctx, &tenant(), transaction.transaction_id)
            .await
            .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("already initiated")));

    let cancelled = transaction_service::update_transaction_status(
        &app.ctx,
        &tenant(),
        transaction.transaction_id,
        TransactionStatus::Cancelled,
    )
    .await
    .expect("cancel");
    assert_eq!(cancelled.transaction_status, TransactionStatus::Cancelled);
    assert_eq!(app.payments.state().cancelled_orders, vec![order_id]);
}

#[tokio::test]
async fn failed_cancellation_keeps_the_transaction_new() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let contract = ribpay_contract(&app, &created).await;
    let transaction = transaction_service::create_transaction(
        &app.ctx,
        &tenant(),
        command(&created, Some(contract.id()), 700),
    )
    .await
    .expect("create");
    transaction_service::initiate_payment_order(&app.ctx, &tenant(), transaction.transaction_id)
        .await
        .expect("order");

    app.payments.state().fail_cancel = true;
    let err = transaction_service::update_transaction_status(
        &app.ctx,
        &tenant(),
        transaction.transaction_id,
        TransactionStatus::Cancelled,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProviderUnavailable { .. }));

    let stored =
        transaction_service::get_transaction(&app.ctx, &tenant(), transaction.transaction_id)
            .await
            .expect("get");
    assert_eq!(stored.transaction_status, TransactionStatus::New);
    assert!(stored.transaction_finished.is_none());
}

#[tokio::test]
async fn payment_orders_need_a_ribpay_contract() {
    let app = TestApp::new();
    let created = app.active_company().await;

    let without_contract =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&created, None, 300))
            .await
            .expect("create");
    let err = transaction_service::initiate_payment_order(
        &app.ctx,
        &tenant(),
        without_contract.transaction_id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("no contract")));

    let vads = CreateVadsRequest {
        account_id: created.account.account_id,
        terminal_id: None,
        contract_merchant_id: "8001".to_string(),
        contract_bank_name: "BNP Paribas".to_string(),
        contract_bank_code: "30004".to_string(),
        contract_3d_secure: None,
        contract_max_amount: None,
    }
    .validate()
    .expect("valid");
    let vads = contract_service::create_vads_contract(&app.ctx, &tenant(), vads)
        .await
        .expect("vads");
    let card = transaction_service::create_transaction(
        &app.ctx,
        &tenant(),
        command(&created, Some(vads.id()), 300),
    )
    .await
    .expect("create");
    let err = transaction_service::initiate_payment_order(&app.ctx, &tenant(), card.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(m) if m.contains("RIBPAY")));
    assert!(app.payments.state().orders.is_empty());
}

#[tokio::test]
async fn listing_is_tenant_scoped_and_filterable() {
    let app = TestApp::new();
    let created = app.active_company().await;
    for cents in [100, 2500, 9000] {
        transaction_service::create_transaction(
            &app.ctx,
            &tenant(),
            command(&created, None, cents),
        )
        .await
        .expect("create");
    }

    let (expensive, total) = transaction_service::list_transactions(
        &app.ctx,
        &tenant(),
        &TransactionFilter {
            amount_min: Some(2000),
            ..TransactionFilter::default()
        },
        PageRequest::default(),
    )
    .await
    .expect("list");
    assert_eq!(total, 2);
    assert!(expensive.iter().all(|t| t.transaction_amount_cents >= 2000));

    let (by_terminal, total) = transaction_service::list_transactions_by_terminal(
        &app.ctx,
        &tenant(),
        created.terminal.terminal_id,
        &TransactionFilter::default(),
        PageRequest::default(),
    )
    .await
    .expect("by terminal");
    assert_eq!(total, 3);
    assert_eq!(by_terminal.len(), 3);

    let (foreign, total) = transaction_service::list_transactions(
        &app.ctx,
        &other_tenant(),
        &TransactionFilter::default(),
        PageRequest::default(),
    )
    .await
    .expect("other tenant");
    assert_eq!(total, 0);
    assert!(foreign.is_empty());

    let err = transaction_service::get_transaction(
        &app.ctx,
        &other_tenant(),
        by_terminal[0].transaction_id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound("transaction")));
}

#[tokio::test]
async fn stale_copy_cannot_change_a_final_status() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let transaction =
        transaction_service::create_transaction(&app.ctx, &tenant(), command(&created, None, 500))
            .await
            .expect("create");
    let id = transaction.transaction_id;

    let mut stale = app
        .ctx
        .store
        .get_transaction(&tenant(), id)
        .await
        .expect("load")
        .expect("transaction");
    let closed =
        transaction_service::update_transaction_status(&app.ctx, &tenant(), id, TransactionStatus::Closed)
            .await
            .expect("close");

    stale.transaction_status = TransactionStatus::Cancelled;
    stale.transaction_finished = Some(chrono::Utc::now());
    let err = app.ctx.store.save_transaction(&stale).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let stored = transaction_service::get_transaction(&app.ctx, &tenant(), id)
        .await
        .expect("get");
    assert_eq!(stored.transaction_status, TransactionStatus::Closed);
    assert_eq!(stored.transaction_finished, closed.transaction_finished);
}

#[tokio::test]
async fn stale_copy_cannot_skip_a_payment_order() {
    let app = TestApp::new();
    let created = app.active_company().await;
    let contract = ribpay_contract(&app, &created).await;
    let transaction = transaction_service::create_transaction(
        &app.ctx,
        &tenant(),
        command(&created, Some(contract.id()), 900),
    )
    .await
    .expect("create");
    let id = transaction.transaction_id;

    // Loaded before the order exists, so finalizing it would leave the
    // order uncancelled at the provider.
    let mut stale = app
        .ctx
        .store
        .get_transaction(&tenant(), id)
        .await
        .expect("load")
        .expect("transaction");
    let ordered = transaction_service::initiate_payment_order(&app.ctx, &tenant(), id)
        .await
        .expect("order");

    stale.transaction_status = TransactionStatus::Cancelled;
    let err = app.ctx.store.save_transaction(&stale).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let stored = transaction_service::get_transaction(&app.ctx, &tenant(), id)
        .await
        .expect("get");
    assert_eq!(stored.transaction_status, TransactionStatus::New);
    assert_eq!(stored.transaction_id_oxlin, ordered.transaction_id_oxlin);
}
