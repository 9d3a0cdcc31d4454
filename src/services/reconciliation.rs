//! VADS activation reconciliation.
//!
//! The acquirer approves VADS merchants out of band. Every run scans all
//! pending, non-deleted VADS contracts across tenants, asks the acquirer
//! whether each merchant is live, activates those that are and notifies
//! the merchant. A failure on one contract is logged and the scan moves on;
//! the contract is retried on the next run.

use std::time::Duration;

use crate::context::AppContext;
use crate::error::AppError;
use crate::models::contract::Contract;
use crate::providers::{bounded, payment::MerchantStatus};
use crate::services::{contract_service, notification_service};

/// Outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub activated: usize,
    pub still_pending: usize,
    pub failed: usize,
}

enum Outcome {
    Activated,
    Pending,
}

/// Run one full pass.
///
/// # Errors
///
/// Only the initial candidate query can fail the run.
pub async fn run_reconciliation(ctx: &AppContext) -> Result<ReconciliationReport, AppError> {
    let candidates = ctx.store.pending_vads_contracts().await?;
    let mut report = ReconciliationReport::default();

    for contract in candidates {
        report.checked += 1;
        let contract_id = contract.id();
        match reconcile_contract(ctx, contract).await {
            Ok(Outcome::Activated) => report.activated += 1,
            Ok(Outcome::Pending) => report.still_pending += 1,
            Err(e) => {
                tracing::warn!(%contract_id, error = %e, "reconciliation failed for contract");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        checked = report.checked,
        activated = report.activated,
        still_pending = report.still_pending,
        failed = report.failed,
        "reconciliation finished"
    );
    Ok(report)
}

async fn reconcile_contract(ctx: &AppContext, contract: Contract) -> Result<Outcome, AppError> {
    let merchant_id = contract.common().contract_merchant_id.clone();
    let status = bounded(
        "monext",
        ctx.provider_timeout(),
        ctx.payments.check_merchant_status(&merchant_id),
    )
    .await?;

    match status {
        MerchantStatus::Live => {}
        MerchantStatus::NotLive => return Ok(Outcome::Pending),
        MerchantStatus::Ambiguous(detail) => {
            tracing::warn!(contract_id = %contract.id(), %merchant_id, %detail, "ambiguous merchant status");
            return Ok(Outcome::Pending);
        }
    }

    let activated = contract_service::mark_vads_active(ctx, contract).await?;
    if let Err(e) = notification_service::notify_contract_activated(ctx, &activated).await {
        tracing::error!(contract_id = %activated.id(), error = %e, "activation notification failed");
    }
    Ok(Outcome::Activated)
}

/// Run `run_reconciliation` every `interval`, starting after one interval.
pub fn spawn_reconciliation(ctx: AppContext, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = run_reconciliation(&ctx).await {
                tracing::error!(error = %e, "reconciliation run failed");
            }
        }
    })
}
