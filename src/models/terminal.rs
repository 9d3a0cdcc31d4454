//! Terminal data models.
//!
//! A terminal is the point of sale of an account. It carries a billing
//! subscription and at most one live contract per contract type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DecodeError, contract::ContractType, text_column};
use crate::error::AppError;

pub const DEFAULT_TERMINAL_LABEL: &str = "New Terminal";

/// Billing plan attached to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    RibpayClassic,
    RibpayPlus,
    Payments,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::RibpayClassic => "ribpay_classic",
            SubscriptionPlan::RibpayPlus => "ribpay_plus",
            SubscriptionPlan::Payments => "payments",
        }
    }
}

impl TryFrom<String> for SubscriptionPlan {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "ribpay_classic" => Ok(SubscriptionPlan::RibpayClassic),
            "ribpay_plus" => Ok(SubscriptionPlan::RibpayPlus),
            "payments" => Ok(SubscriptionPlan::Payments),
            _ => Err(DecodeError::UnknownVariant {
                kind: "subscription plan",
                value,
            }),
        }
    }
}

text_column!(SubscriptionPlan);

/// Represents a terminal record.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Terminal {
    pub terminal_id: Uuid,
    pub terminal_label: String,
    pub terminal_favorite_contract_type: ContractType,
    /// External id of the billing subscription
    pub terminal_subscription_id: String,
    pub terminal_subscription_type: SubscriptionPlan,
    pub terminal_created_at: DateTime<Utc>,
    pub terminal_last_modified: DateTime<Utc>,
    pub account_id: Uuid,
    pub creator_id: String,
}

/// Request body for `POST /terminals`.
#[derive(Debug, Deserialize)]
pub struct CreateTerminalRequest {
    pub account_id: Uuid,
    pub terminal_label: Option<String>,
    pub terminal_favorite_contract_type: Option<ContractType>,
    pub terminal_subscription_type: Option<SubscriptionPlan>,
}

/// Request body for `PATCH /terminals/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateTerminalRequest {
    pub terminal_label: Option<String>,
    pub terminal_favorite_contract_type: Option<ContractType>,
}

impl UpdateTerminalRequest {
    pub fn validate(self) -> Result<Self, AppError> {
        if let Some(label) = &self.terminal_label {
            if label.trim().is_empty() {
                return Err(AppError::invalid("terminal_label", "must not be empty"));
            }
        }
        Ok(self)
    }
}

/// List filters for terminals.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TerminalFilter {
    /// Case-insensitive match on the label or subscription id
    pub search: Option<String>,
    pub account_id: Option<Uuid>,
    pub terminal_subscription_type: Option<SubscriptionPlan>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub last_modified_before: Option<DateTime<Utc>>,
    pub last_modified_after: Option<DateTime<Utc>>,
}
