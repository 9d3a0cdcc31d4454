//! Account data models and API request/response types.
//!
//! This module defines:
//! - `Account`: Database entity representing a merchant account
//! - `AccountType`: Legal form reported by the company registry
//! - `AccountFilter`: List filters accepted by `GET /accounts`
//! - Request bodies for creation, update and the validation workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    DecodeError, billing_address::BillingAddress, terminal::SubscriptionPlan,
    terminal::Terminal, text_column, user::UserRole,
};
use crate::error::{AppError, FieldError, collect_field_errors};
use crate::services::normalize;

/// Legal form of the business behind an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    /// Company (legal person).
    #[serde(rename = "personneMorale")]
    Company,
    /// Sole trader (natural person).
    #[serde(rename = "personnePhysique")]
    Individual,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Company => "personneMorale",
            AccountType::Individual => "personnePhysique",
        }
    }
}

impl TryFrom<String> for AccountType {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "personneMorale" => Ok(AccountType::Company),
            "personnePhysique" => Ok(AccountType::Individual),
            _ => Err(DecodeError::UnknownVariant {
                kind: "account type",
                value,
            }),
        }
    }
}

text_column!(AccountType);

/// Represents an account record from the database.
///
/// # Lifecycle
///
/// - **pending**: created, `account_is_active = false`, no deletion date
/// - **active**: validated through the individual or company workflow
/// - **deleted**: `account_deletion_date` set; permanently inactive and read-only
///
/// Accounts are never hard-deleted. Soft deletion does not cascade to
/// terminals, contracts or transactions.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Account {
    pub account_id: Uuid,

    /// SIRET (14 digits)
    pub account_national_id: String,

    /// Registry denomination, sanitized for payment-provider beneficiary fields
    pub account_name: String,

    pub account_type: AccountType,

    /// Always `EUR`
    pub account_currency: String,

    pub account_notification_email: Option<String>,

    pub account_is_active: bool,

    pub account_created_at: DateTime<Utc>,

    pub account_last_modified: DateTime<Utc>,

    pub account_deletion_date: Option<DateTime<Utc>>,

    /// Portal link handed to the merchant to finish onboarding
    pub account_creation_url: Option<String>,

    /// KYC document location for companies
    pub account_blob_storage_url: Option<String>,

    pub creator_id: String,

    pub partner_id: Option<Uuid>,
}

impl Account {
    pub fn is_deleted(&self) -> bool {
        self.account_deletion_date.is_some()
    }
}

/// Request body for creating a new account.
///
/// # JSON Example
///
/// ```json
/// {
///   "siret": "73282932000074",
///   "country": "FR",
///   "notification_email": "billing@example.com",
///   "subscription_type": "ribpay_plus"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub siret: String,

    /// ISO country code. Only `FR` registries are supported.
    pub country: String,

    pub notification_email: String,

    /// Plan for the terminal created with the account
    pub subscription_type: Option<SubscriptionPlan>,

    pub partner_id: Option<Uuid>,
}

/// Validated account creation command.
#[derive(Debug, Clone)]
pub struct CreateAccountCommand {
    pub siret: String,
    pub notification_email: String,
    pub subscription_type: Option<SubscriptionPlan>,
    pub partner_id: Option<Uuid>,
}

impl CreateAccountRequest {
    /// Check every field and return the normalized command.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` listing each invalid field.
    pub fn validate(self) -> Result<CreateAccountCommand, AppError> {
        let mut errors = Vec::new();
        let siret: String = self.siret.chars().filter(|c| !c.is_whitespace()).collect();

        if let Err(message) = normalize::validate_siret(&siret) {
            errors.push(FieldError::new("siret", message.to_string()));
        }
        if !self.country.eq_ignore_ascii_case("FR") {
            errors.push(FieldError::new("country", "only FR is supported"));
        }
        if !normalize::looks_like_email(&self.notification_email) {
            errors.push(FieldError::new("notification_email", "must be an email address"));
        }
        collect_field_errors(errors)?;

        Ok(CreateAccountCommand {
            siret,
            notification_email: self.notification_email.trim().to_string(),
            subscription_type: self.subscription_type,
            partner_id: self.partner_id,
        })
    }
}

/// Request body for `PATCH /accounts/{id}`. Only the notification address
/// may change.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub notification_email: String,
}

impl UpdateAccountRequest {
    pub fn validate(self) -> Result<String, AppError> {
        if normalize::looks_like_email(&self.notification_email) {
            Ok(self.notification_email.trim().to_string())
        } else {
            Err(AppError::invalid("notification_email", "must be an email address"))
        }
    }
}

/// Identity submitted when validating a sole-trader account. Applied to
/// the account's admin user.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: String,
    pub birth_city: String,
    pub birth_country: String,
}

/// Identity with the birth date in canonical `YYYY/MM/DD` form.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: String,
    pub birth_city: String,
    pub birth_country: String,
}

impl IdentityRequest {
    pub fn validate(self) -> Result<Identity, AppError> {
        let mut errors = Vec::new();
        let required = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("birth_city", &self.birth_city),
            ("birth_country", &self.birth_country),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, "must not be empty"));
            }
        }
        let birth_date = match normalize::normalize_date(&self.birth_date) {
            Ok(date) => Some(date),
            Err(message) => {
                errors.push(FieldError::new("birth_date", message.to_string()));
                None
            }
        };
        if let Some(email) = &self.email {
            if !normalize::looks_like_email(email) {
                errors.push(FieldError::new("email", "must be an email address"));
            }
        }
        collect_field_errors(errors)?;

        Ok(Identity {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email,
            phone: self.phone,
            birth_date: birth_date.unwrap_or_default(),
            birth_city: self.birth_city.trim().to_string(),
            birth_country: self.birth_country.trim().to_string(),
        })
    }
}

/// Request body for validating a company account with an already-hosted
/// KYC document.
#[derive(Debug, Deserialize)]
pub struct CompanyDocumentRequest {
    pub document_url: String,
}

/// List filters for accounts.
///
/// `*_before` / `*_after` bounds are exclusive.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AccountFilter {
    /// Case-insensitive match on name, SIRET, or notification email
    pub search: Option<String>,
    pub account_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub last_modified_before: Option<DateTime<Utc>>,
    pub last_modified_after: Option<DateTime<Utc>>,
    pub deleted_before: Option<DateTime<Utc>>,
    pub deleted_after: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    #[serde(rename = "type")]
    pub account_type: Option<AccountType>,
    pub is_deleted: Option<bool>,
}

/// Admin user reference returned by account creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedUser {
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub creator_id: String,
}

/// Everything created together with an account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountCreated {
    pub account: Account,
    pub billing_address: BillingAddress,
    pub terminal: Terminal,
    pub user: CreatedUser,
}
