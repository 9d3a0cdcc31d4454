//! External provider ports and their HTTP adapters.
//!
//! Each collaborator is a trait so services can be exercised against fakes:
//!
//! - `payment::PaymentProvider` - IBAN aliases, authorized accounts, payment
//!   orders, VADS merchant status
//! - `billing::BillingProvider` - customers, subscriptions, invoices
//! - `registry::CompanyRegistry` - company lookup by SIREN
//! - `storage::BlobStorage` - KYC document upload
//! - `mailer::Mailer` - transactional email
//!
//! # Failure mapping
//!
//! HTTP adapters share one `reqwest::Client`. Transport errors, timeouts,
//! 429 and 5xx responses become `AppError::ProviderUnavailable`; any other
//! non-success response becomes `AppError::ProviderRejected`.
//!
//! Services additionally wrap every call in `bounded`, so a hung provider
//! yields `ProviderUnavailable` before any local state changes.

pub mod billing;
pub mod mailer;
pub mod payment;
pub mod registry;
pub mod storage;

use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::error::AppError;

/// Run a provider call with a deadline.
///
/// # Errors
///
/// The call's own error, or `ProviderUnavailable` if `timeout` elapses
/// first.
pub async fn bounded<T, F>(provider: &'static str, timeout: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(provider, timeout_ms = timeout.as_millis() as u64, "provider call timed out");
            Err(AppError::ProviderUnavailable {
                provider,
                detail: format!("no response within {}ms", timeout.as_millis()),
            })
        }
    }
}

/// Build the shared HTTP client.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

pub(crate) fn transport_error(provider: &'static str, err: reqwest::Error) -> AppError {
    tracing::warn!(provider, error = %err, "provider transport error");
    AppError::ProviderUnavailable {
        provider,
        detail: err.to_string(),
    }
}

/// Pass successful responses through; classify the rest.
pub(crate) async fn check_status(
    provider: &'static str,
    response: Response,
) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{status}: {}", body.chars().take(500).collect::<String>());
    tracing::warn!(provider, %status, "provider returned an error");

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(AppError::ProviderUnavailable { provider, detail })
    } else {
        Err(AppError::ProviderRejected { provider, detail })
    }
}

/// Decode a JSON body, treating malformed payloads as a rejection.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    response: Response,
) -> Result<T, AppError> {
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::ProviderRejected {
            provider,
            detail: format!("unexpected response body: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let ok = bounded("test", Duration::from_millis(100), async { Ok::<_, AppError>(7) }).await;
        assert_eq!(ok.expect("ok"), 7);
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let slow = bounded("test", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await;
        assert!(matches!(
            slow,
            Err(AppError::ProviderUnavailable { provider: "test", .. })
        ));
    }
}
