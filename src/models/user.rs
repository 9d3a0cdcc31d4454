//! User and membership models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DecodeError, text_column};
use crate::error::{AppError, FieldError, collect_field_errors};
use crate::services::normalize;

/// Role of a user on one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

impl TryFrom<String> for UserRole {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            _ => Err(DecodeError::UnknownVariant {
                kind: "user role",
                value,
            }),
        }
    }
}

text_column!(UserRole);

/// Represents a user record. Every identity field is optional until the
/// account validation workflow fills it in.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    /// Canonical `YYYY/MM/DD`
    pub user_birth_date: Option<String>,
    pub user_birth_city: Option<String>,
    pub user_birth_country: Option<String>,
    pub user_last_modified: DateTime<Utc>,
    pub creator_id: String,
}

impl User {
    /// Blank user owned by `creator_id`.
    pub fn blank(user_id: Uuid, creator_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            user_first_name: None,
            user_last_name: None,
            user_email: None,
            user_phone: None,
            user_birth_date: None,
            user_birth_city: None,
            user_birth_country: None,
            user_last_modified: now,
            creator_id: creator_id.to_string(),
        }
    }
}

/// Link between a user and an account.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub user_role: UserRole,
}

/// A user together with its memberships.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithAccounts {
    #[serde(flatten)]
    pub user: User,
    pub accounts: Vec<Membership>,
}

/// Request body for creating a user attached to an account.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub account_id: Uuid,
    #[serde(flatten)]
    pub profile: UserProfileRequest,
}

/// Optional profile fields accepted on create and update.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserProfileRequest {
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    pub user_email: Option<String>,
    pub user_phone: Option<String>,
    pub user_birth_date: Option<String>,
    pub user_birth_city: Option<String>,
    pub user_birth_country: Option<String>,
}

/// Profile changes with the birth date already normalized.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<String>,
    pub birth_city: Option<String>,
    pub birth_country: Option<String>,
}

impl UserProfileRequest {
    pub fn validate(self) -> Result<UserProfile, AppError> {
        let mut errors = Vec::new();

        let birth_date = match self.user_birth_date.as_deref().map(normalize::normalize_date) {
            Some(Ok(date)) => Some(date),
            Some(Err(e)) => {
                errors.push(FieldError::new("user_birth_date", e.to_string()));
                None
            }
            None => None,
        };
        if let Some(email) = &self.user_email {
            if !normalize::looks_like_email(email) {
                errors.push(FieldError::new("user_email", "must be an email address"));
            }
        }
        collect_field_errors(errors)?;

        Ok(UserProfile {
            first_name: self.user_first_name,
            last_name: self.user_last_name,
            email: self.user_email,
            phone: self.user_phone,
            birth_date,
            birth_city: self.user_birth_city,
            birth_country: self.user_birth_country,
        })
    }
}

impl UserProfile {
    /// Overwrite the fields present in this profile.
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.first_name {
            user.user_first_name = Some(v);
        }
        if let Some(v) = self.last_name {
            user.user_last_name = Some(v);
        }
        if let Some(v) = self.email {
            user.user_email = Some(v);
        }
        if let Some(v) = self.phone {
            user.user_phone = Some(v);
        }
        if let Some(v) = self.birth_date {
            user.user_birth_date = Some(v);
        }
        if let Some(v) = self.birth_city {
            user.user_birth_city = Some(v);
        }
        if let Some(v) = self.birth_country {
            user.user_birth_country = Some(v);
        }
    }
}

/// Request body for linking an existing user to an account.
#[derive(Debug, Deserialize)]
pub struct AddUserToAccountRequest {
    pub account_id: Uuid,
    #[serde(default)]
    pub user_role: Option<UserRole>,
}

/// List filters for users.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UserFilter {
    /// Case-insensitive match on names, email, or phone
    pub search: Option<String>,
    /// Only users with a membership on this account
    pub account_id: Option<Uuid>,
    pub last_modified_before: Option<DateTime<Utc>>,
    pub last_modified_after: Option<DateTime<Utc>>,
}
