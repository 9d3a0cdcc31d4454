//! Transaction data models.
//!
//! A transaction is a payment request raised on a terminal. It starts `NEW`
//! and moves to exactly one final status. Amounts are integer cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DecodeError, contract::ContractType, text_column};
use crate::error::{AppError, FieldError, collect_field_errors};
use crate::services::normalize::{self, AmountInput};

pub const DEFAULT_VAT_RATE: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    New,
    Closed,
    Cancelled,
    Finished,
    Accepted,
    Executed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::New => "NEW",
            TransactionStatus::Closed => "CLOSED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Finished => "FINISHED",
            TransactionStatus::Accepted => "ACCEPTED",
            TransactionStatus::Executed => "EXECUTED",
        }
    }

    /// Every status other than `NEW` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::New)
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "NEW" => Ok(TransactionStatus::New),
            "CLOSED" => Ok(TransactionStatus::Closed),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            "FINISHED" => Ok(TransactionStatus::Finished),
            "ACCEPTED" => Ok(TransactionStatus::Accepted),
            "EXECUTED" => Ok(TransactionStatus::Executed),
            _ => Err(DecodeError::UnknownVariant {
                kind: "transaction status",
                value,
            }),
        }
    }
}

text_column!(TransactionStatus);

/// Represents a transaction record.
///
/// `terminal_id` and `contract_id` are weak references: they are checked
/// when the transaction is created and never again.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Transaction {
    pub transaction_id: Uuid,

    /// Payment-order id at the payment provider, once one was created
    pub transaction_id_oxlin: Option<String>,

    pub transaction_status: TransactionStatus,
    pub transaction_instant_payment: bool,

    /// Gross amount in cents
    pub transaction_amount_cents: i64,

    /// `amount - floor(amount * 20%)`
    pub transaction_amount_without_vat: i64,

    /// VAT rate in percent
    pub transaction_vat: i32,

    pub transaction_currency: String,
    pub transaction_label: String,
    pub transaction_beneficiary: String,
    pub transaction_auth_url: Option<String>,
    pub transaction_redirect_url: Option<String>,
    pub transaction_notification_url: Option<String>,
    pub transaction_initiated: DateTime<Utc>,
    pub transaction_last_modified: DateTime<Utc>,
    pub transaction_finished: Option<DateTime<Utc>>,
    pub transaction_metadata: serde_json::Value,
    pub transaction_type: Option<ContractType>,
    pub account_id: Uuid,
    pub terminal_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub creator_id: String,
}

/// Request body for `POST /transactions`.
///
/// # JSON Example
///
/// ```json
/// {
///   "account_id": "b9f8e467-90a2-4976-9cd5-1624bdd80ab4",
///   "terminal_id": "f45b68fa-4586-4453-83af-ee2c1c2ecc27",
///   "amount_cents": "10.00",
///   "currency": "EUR",
///   "label": "Order 1234"
/// }
/// ```
///
/// `amount_cents` accepts an integer number of cents, or a decimal euro
/// amount as a string or fractional number.
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: Uuid,
    pub terminal_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub amount_cents: AmountInput,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub label: String,
    #[serde(default)]
    pub instant_payment: bool,
    pub redirect_url: Option<String>,
    pub notification_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

/// Validated transaction creation command.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTransactionCommand {
    pub account_id: Uuid,
    pub terminal_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub amount_cents: i64,
    pub label: String,
    pub instant_payment: bool,
    pub redirect_url: Option<String>,
    pub notification_url: Option<String>,
    pub metadata: serde_json::Value,
}

impl CreateTransactionRequest {
    /// Normalize the amount and check every field.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` listing the amount, currency, label, and URL
    /// problems found.
    pub fn validate(self) -> Result<CreateTransactionCommand, AppError> {
        let mut errors = Vec::new();

        let amount_cents = match normalize::normalize_amount(&self.amount_cents) {
            Ok(cents) => cents,
            Err(e) => {
                errors.push(FieldError::new("amount_cents", e.to_string()));
                0
            }
        };
        if self.currency != "EUR" {
            errors.push(FieldError::new("currency", "only EUR is supported"));
        }
        if self.label.trim().is_empty() {
            errors.push(FieldError::new("label", "must not be empty"));
        }
        for (field, value) in [
            ("redirect_url", &self.redirect_url),
            ("notification_url", &self.notification_url),
        ] {
            if let Some(raw) = value {
                if url::Url::parse(raw).is_err() {
                    errors.push(FieldError::new(field, "must be an absolute URL"));
                }
            }
        }
        let metadata = self.metadata.unwrap_or_else(|| serde_json::json!({}));
        if !metadata.is_object() {
            errors.push(FieldError::new("metadata", "must be a JSON object"));
        }
        collect_field_errors(errors)?;

        Ok(CreateTransactionCommand {
            account_id: self.account_id,
            terminal_id: self.terminal_id,
            contract_id: self.contract_id,
            amount_cents,
            label: self.label.trim().to_string(),
            instant_payment: self.instant_payment,
            redirect_url: self.redirect_url,
            notification_url: self.notification_url,
            metadata,
        })
    }
}

/// Request body for `PATCH /transactions/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateTransactionRequest {
    pub transaction_status: TransactionStatus,
}

/// List filters for transactions.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionFilter {
    /// Case-insensitive match on label, beneficiary, or external order id
    pub search: Option<String>,
    pub transaction_status: Option<TransactionStatus>,
    pub instant_payment: Option<bool>,
    pub amount_min: Option<i64>,
    pub amount_max: Option<i64>,
    pub account_id: Option<Uuid>,
    pub terminal_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub initiated_before: Option<DateTime<Utc>>,
    pub initiated_after: Option<DateTime<Utc>>,
    pub last_modified_before: Option<DateTime<Utc>>,
    pub last_modified_after: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: serde_json::Value) -> CreateTransactionRequest {
        serde_json::from_value(serde_json::json!({
            "account_id": Uuid::new_v4(),
            "terminal_id": Uuid::new_v4(),
            "amount_cents": amount,
            "label": "Order 1"
        }))
        .expect("valid json")
    }

    #[test]
    fn string_amount_is_euros() {
        let cmd = request(serde_json::json!("10.00")).validate().expect("valid");
        assert_eq!(cmd.amount_cents, 1000);
        assert_eq!(cmd.metadata, serde_json::json!({}));
    }

    #[test]
    fn integer_amount_is_cents() {
        let cmd = request(serde_json::json!(1000)).validate().expect("valid");
        assert_eq!(cmd.amount_cents, 1000);
    }

    #[test]
    fn non_eur_currency_is_rejected() {
        let mut req = request(serde_json::json!(500));
        req.currency = "USD".into();
        let err = req.validate().unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn only_new_is_not_terminal() {
        assert!(!TransactionStatus::New.is_terminal());
        assert!(TransactionStatus::Closed.is_terminal());
        assert!(TransactionStatus::Executed.is_terminal());
    }
}
