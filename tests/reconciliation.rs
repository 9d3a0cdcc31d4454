mod common;

use std::time::Duration;

use common::*;
use merchant_account_service::{
    models::{
        account::{AccountCreated, CreateAccountCommand},
        contract::{Contract, CreateVadsRequest},
        partner::CreatePartnerRequest,
        scope::Scope,
    },
    providers::payment::MerchantStatus,
    services::{
        account_service, contract_service, lifecycle, notification_service, partner_service,
        reconciliation::{self, ReconciliationReport},
    },
};

async fn vads(app: &TestApp, created: &AccountCreated, merchant_id: &str) -> Contract {
    let command = CreateVadsRequest {
        account_id: created.account.account_id,
        terminal_id: None,
        contract_merchant_id: merchant_id.to_string(),
        contract_bank_name: "BNP Paribas".to_string(),
        contract_bank_code: "30004".to_string(),
        contract_3d_secure: None,
        contract_max_amount: Some(500),
    }
    .validate()
    .expect("valid");
    contract_service::create_vads_contract(&app.ctx, &tenant(), command)
        .await
        .expect("vads contract")
}

/// Active company account onboarded through a partner with a webhook.
/// Returns the account and the webhook secret.
async fn partner_company(app: &TestApp) -> (AccountCreated, String) {
    let partner = partner_service::create_partner(
        &app.ctx,
        &Scope::Admin,
        CreatePartnerRequest {
            partner_name: "Caisse Connect".to_string(),
            creator_id: TENANT.to_string(),
        },
    )
    .await
    .expect("partner");
    let registration = partner_service::register_partner_webhook(
        &app.ctx,
        &Scope::Admin,
        partner.partner_id,
        "https://partner.example.com/hooks".to_string(),
    )
    .await
    .expect("webhook");

    let mut created = account_service::create_account(
        &app.ctx,
        TENANT,
        CreateAccountCommand {
            siret: COMPANY_SIRET.to_string(),
            notification_email: "owner@example.com".to_string(),
            subscription_type: None,
            partner_id: Some(partner.partner_id),
        },
    )
    .await
    .expect("account");
    created.account = lifecycle::activate_company(
        &app.ctx,
        &tenant(),
        created.account.account_id,
        "https://docs.example.com/kbis.pdf".to_string(),
    )
    .await
    .expect("activate");
    (created, registration.secret)
}

#[tokio::test]
async fn one_pass_sorts_every_pending_contract() {
    let app = TestApp::new();
    let (company, secret) = partner_company(&app).await;
    let individual = app.active_individual().await;

    let live = vads(&app, &company, "9001").await;
    vads(&app, &individual, "9002").await;
    vads(&app, &individual, "9003").await;
    vads(&app, &individual, "9004").await;
    {
        let mut payments = app.payments.state();
        payments
            .merchant_statuses
            .insert("9001".to_string(), MerchantStatus::Live);
        payments.merchant_statuses.insert(
            "9003".to_string(),
            MerchantStatus::Ambiguous("unexpected payload".to_string()),
        );
        payments.fail_merchant_status.insert("9004".to_string());
    }

    let report = reconciliation::run_reconciliation(&app.ctx)
        .await
        .expect("run");
    assert_eq!(
        report,
        ReconciliationReport {
            checked: 4,
            activated: 1,
            still_pending: 2,
            failed: 1,
        }
    );

    let stored = contract_service::get_contract(&app.ctx, &tenant(), live.id())
        .await
        .expect("contract");
    assert!(stored.is_active());

    // The partner webhook carries a verifiable signature.
    let deliveries = app.webhooks.deliveries.lock().expect("deliveries");
    assert_eq!(deliveries.len(), 1);
    let delivery = &deliveries[0];
    assert_eq!(delivery.url, "https://partner.example.com/hooks");
    assert_eq!(
        delivery.signature,
        notification_service::generate_signature(&secret, &delivery.body).expect("sign")
    );
    let body: serde_json::Value = serde_json::from_str(&delivery.body).expect("json");
    assert_eq!(body["merchant_id"], "9001");
    assert_eq!(body["contract_id"], live.id().to_string());
    assert_eq!(body["contract_is_active"], true);
    assert_eq!(body["event_id"], delivery.event_id.to_string());
}

#[tokio::test]
async fn activated_contracts_drop_out_of_later_passes() {
    let app = TestApp::new();
    let individual = app.active_individual().await;
    let first = vads(&app, &individual, "9101").await;
    vads(&app, &individual, "9102").await;
    app.payments
        .state()
        .merchant_statuses
        .insert("9101".to_string(), MerchantStatus::Live);

    let report = reconciliation::run_reconciliation(&app.ctx)
        .await
        .expect("first run");
    assert_eq!(report.activated, 1);

    let report = reconciliation::run_reconciliation(&app.ctx)
        .await
        .expect("second run");
    assert_eq!(report.checked, 1);
    assert_eq!(report.activated, 0);
    assert_eq!(report.still_pending, 1);

    // Without a partner the merchant is emailed once.
    let mail = app.mailer.state();
    assert_eq!(
        mail.activations,
        vec![("owner@example.com".to_string(), "9101".to_string(), first.id())]
    );
}

#[tokio::test]
async fn notification_failure_keeps_the_activation() {
    let app = TestApp::new();
    let individual = app.active_individual().await;
    let contract = vads(&app, &individual, "9201").await;
    app.payments
        .state()
        .merchant_statuses
        .insert("9201".to_string(), MerchantStatus::Live);
    // Let the subscription form go out before the mailer breaks.
    for _ in 0..50 {
        if !app.mailer.state().forms.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    app.mailer.state().fail = true;

    let report = reconciliation::run_reconciliation(&app.ctx)
        .await
        .expect("run");
    assert_eq!(report.activated, 1);
    assert_eq!(report.failed, 0);

    let stored = contract_service::get_contract(&app.ctx, &tenant(), contract.id())
        .await
        .expect("contract");
    assert!(stored.is_active());
}

#[tokio::test]
async fn deleted_and_forced_contracts_are_skipped() {
    let app = TestApp::new();
    let individual = app.active_individual().await;
    let removed = vads(&app, &individual, "9301").await;
    let forced = vads(&app, &individual, "9302").await;

    contract_service::remove_contract(&app.ctx, &tenant(), removed.id())
        .await
        .expect("remove");
    contract_service::activate_vads_contract(&app.ctx, &Scope::Admin, forced.id())
        .await
        .expect("force");

    let report = reconciliation::run_reconciliation(&app.ctx)
        .await
        .expect("run");
    assert_eq!(report, ReconciliationReport::default());
    assert_eq!(app.payments.state().merchant_status_calls, 0);
}

#[tokio::test]
async fn background_task_runs_on_its_interval() {
    let app = TestApp::new();
    let individual = app.active_individual().await;
    vads(&app, &individual, "9401").await;

    let handle = reconciliation::spawn_reconciliation(app.ctx.clone(), Duration::from_millis(20));
    let mut calls = 0;
    for _ in 0..100 {
        calls = app.payments.state().merchant_status_calls;
        if calls >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();
    assert!(calls >= 2, "expected repeated passes, saw {calls}");
}
