//! Contract data models.
//!
//! A contract is either a RIBPAY bank-transfer contract (IBAN alias plus
//! authorized account at the payment provider) or a VADS card-acquiring
//! contract (merchant id at the acquirer). Both share `ContractCommon` and
//! live in one `contracts` table, discriminated by `contract_type`.
//!
//! `ContractRow` is the flat database shape; `Contract` is what the rest of
//! the crate works with. Decoding branches exhaustively on the type tag and
//! fails if a variant's required columns are missing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DecodeError, text_column};
use crate::error::{AppError, FieldError, collect_field_errors};
use crate::services::normalize;

/// Accepted VADS per-transaction ceilings, in euros.
pub const VADS_MAX_AMOUNTS: [i32; 8] = [100, 250, 500, 1000, 1500, 2500, 5000, 10000];
pub const DEFAULT_VADS_MAX_AMOUNT: i32 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    #[serde(rename = "RIBPAY")]
    Ribpay,
    #[serde(rename = "VADS")]
    Vads,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Ribpay => "RIBPAY",
            ContractType::Vads => "VADS",
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ContractType {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "RIBPAY" => Ok(ContractType::Ribpay),
            "VADS" => Ok(ContractType::Vads),
            _ => Err(DecodeError::UnknownVariant {
                kind: "contract type",
                value,
            }),
        }
    }
}

text_column!(ContractType);

/// Fields shared by every contract variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractCommon {
    pub contract_id: Uuid,
    pub contract_created_at: DateTime<Utc>,
    pub contract_last_modified: DateTime<Utc>,
    pub contract_deleted_at: Option<DateTime<Utc>>,
    pub contract_number: String,
    pub contract_beneficiary_name: String,
    /// Authorized-account id (RIBPAY) or acquirer merchant id (VADS)
    pub contract_merchant_id: String,
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub creator_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RibpayContract {
    #[serde(flatten)]
    pub common: ContractCommon,
    pub contract_alias_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VadsContract {
    #[serde(flatten)]
    pub common: ContractCommon,
    pub contract_bank_name: String,
    pub contract_bank_code: String,
    pub contract_3d_secure: bool,
    pub contract_max_amount: i32,
    /// False until the acquirer reports the merchant live
    pub contract_is_active: bool,
}

/// A contract, tagged by `contract_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "contract_type")]
pub enum Contract {
    #[serde(rename = "RIBPAY")]
    Ribpay(RibpayContract),
    #[serde(rename = "VADS")]
    Vads(VadsContract),
}

impl Contract {
    pub fn common(&self) -> &ContractCommon {
        match self {
            Contract::Ribpay(c) => &c.common,
            Contract::Vads(c) => &c.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut ContractCommon {
        match self {
            Contract::Ribpay(c) => &mut c.common,
            Contract::Vads(c) => &mut c.common,
        }
    }

    pub fn contract_type(&self) -> ContractType {
        match self {
            Contract::Ribpay(_) => ContractType::Ribpay,
            Contract::Vads(_) => ContractType::Vads,
        }
    }

    pub fn id(&self) -> Uuid {
        self.common().contract_id
    }

    pub fn is_deleted(&self) -> bool {
        self.common().contract_deleted_at.is_some()
    }

    /// RIBPAY contracts are live from creation; VADS contracts wait for
    /// the acquirer.
    pub fn is_active(&self) -> bool {
        match self {
            Contract::Ribpay(_) => true,
            Contract::Vads(c) => c.contract_is_active,
        }
    }

    /// Flatten into the table shape.
    pub fn to_row(&self) -> ContractRow {
        let common = self.common().clone();
        let mut row = ContractRow {
            contract_id: common.contract_id,
            contract_type: self.contract_type(),
            contract_created_at: common.contract_created_at,
            contract_last_modified: common.contract_last_modified,
            contract_deleted_at: common.contract_deleted_at,
            contract_number: common.contract_number,
            contract_beneficiary_name: common.contract_beneficiary_name,
            contract_merchant_id: common.contract_merchant_id,
            contract_alias_id: None,
            contract_is_active: self.is_active(),
            contract_bank_name: None,
            contract_bank_code: None,
            contract_3d_secure: None,
            contract_max_amount: None,
            account_id: common.account_id,
            terminal_id: common.terminal_id,
            creator_id: common.creator_id,
        };
        match self {
            Contract::Ribpay(c) => row.contract_alias_id = Some(c.contract_alias_id.clone()),
            Contract::Vads(c) => {
                row.contract_bank_name = Some(c.contract_bank_name.clone());
                row.contract_bank_code = Some(c.contract_bank_code.clone());
                row.contract_3d_secure = Some(c.contract_3d_secure);
                row.contract_max_amount = Some(c.contract_max_amount);
            }
        }
        row
    }
}

/// Flat `contracts` table row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ContractRow {
    pub contract_id: Uuid,
    pub contract_type: ContractType,
    pub contract_created_at: DateTime<Utc>,
    pub contract_last_modified: DateTime<Utc>,
    pub contract_deleted_at: Option<DateTime<Utc>>,
    pub contract_number: String,
    pub contract_beneficiary_name: String,
    pub contract_merchant_id: String,
    pub contract_alias_id: Option<String>,
    pub contract_is_active: bool,
    pub contract_bank_name: Option<String>,
    pub contract_bank_code: Option<String>,
    pub contract_3d_secure: Option<bool>,
    pub contract_max_amount: Option<i32>,
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub creator_id: String,
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField {
        entity: "contract",
        field,
    })
}

impl TryFrom<ContractRow> for Contract {
    type Error = DecodeError;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        let common = ContractCommon {
            contract_id: row.contract_id,
            contract_created_at: row.contract_created_at,
            contract_last_modified: row.contract_last_modified,
            contract_deleted_at: row.contract_deleted_at,
            contract_number: row.contract_number,
            contract_beneficiary_name: row.contract_beneficiary_name,
            contract_merchant_id: row.contract_merchant_id,
            account_id: row.account_id,
            terminal_id: row.terminal_id,
            creator_id: row.creator_id,
        };

        match row.contract_type {
            ContractType::Ribpay => Ok(Contract::Ribpay(RibpayContract {
                common,
                contract_alias_id: required(row.contract_alias_id, "contract_alias_id")?,
            })),
            ContractType::Vads => Ok(Contract::Vads(VadsContract {
                common,
                contract_bank_name: required(row.contract_bank_name, "contract_bank_name")?,
                contract_bank_code: required(row.contract_bank_code, "contract_bank_code")?,
                contract_3d_secure: required(row.contract_3d_secure, "contract_3d_secure")?,
                contract_max_amount: required(row.contract_max_amount, "contract_max_amount")?,
                contract_is_active: row.contract_is_active,
            })),
        }
    }
}

/// Request body for `POST /contracts`, tagged by `contract_type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "contract_type")]
pub enum CreateContractRequest {
    #[serde(rename = "RIBPAY")]
    Ribpay(CreateRibpayRequest),
    #[serde(rename = "VADS")]
    Vads(CreateVadsRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRibpayRequest {
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub iban: String,
}

/// Validated RIBPAY creation command. The IBAN is compact, upper-case and
/// passes the mod-97 check.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRibpayCommand {
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub iban: String,
}

impl CreateRibpayRequest {
    pub fn validate(self) -> Result<CreateRibpayCommand, AppError> {
        let iban = normalize::compact_iban(&self.iban);
        normalize::validate_iban(&iban).map_err(|e| AppError::invalid("iban", e.to_string()))?;
        Ok(CreateRibpayCommand {
            account_id: self.account_id,
            terminal_id: self.terminal_id,
            iban,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVadsRequest {
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub contract_merchant_id: String,
    pub contract_bank_name: String,
    pub contract_bank_code: String,
    pub contract_3d_secure: Option<bool>,
    pub contract_max_amount: Option<i32>,
}

/// Validated VADS creation command with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateVadsCommand {
    pub account_id: Uuid,
    pub terminal_id: Option<Uuid>,
    pub merchant_id: String,
    pub bank_name: String,
    pub bank_code: String,
    pub three_d_secure: bool,
    pub max_amount: i32,
}

impl CreateVadsRequest {
    pub fn validate(self) -> Result<CreateVadsCommand, AppError> {
        let mut errors = Vec::new();
        let required = [
            ("contract_merchant_id", &self.contract_merchant_id),
            ("contract_bank_name", &self.contract_bank_name),
            ("contract_bank_code", &self.contract_bank_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, "must not be empty"));
            }
        }
        let max_amount = self.contract_max_amount.unwrap_or(DEFAULT_VADS_MAX_AMOUNT);
        if !VADS_MAX_AMOUNTS.contains(&max_amount) {
            errors.push(FieldError::new(
                "contract_max_amount",
                format!("must be one of {VADS_MAX_AMOUNTS:?}"),
            ));
        }
        collect_field_errors(errors)?;

        Ok(CreateVadsCommand {
            account_id: self.account_id,
            terminal_id: self.terminal_id,
            merchant_id: self.contract_merchant_id.trim().to_string(),
            bank_name: self.contract_bank_name.trim().to_string(),
            bank_code: self.contract_bank_code.trim().to_string(),
            three_d_secure: self.contract_3d_secure.unwrap_or(true),
            max_amount,
        })
    }
}

/// Request body for `PATCH /contracts/{id}`: move the contract to another
/// terminal of the same account.
#[derive(Debug, Deserialize)]
pub struct ReassignContractRequest {
    pub terminal_id: Uuid,
}

/// List filters for contracts.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ContractFilter {
    /// Case-insensitive match on type, number, beneficiary, merchant id or alias id
    pub search: Option<String>,
    pub contract_type: Option<ContractType>,
    pub account_id: Option<Uuid>,
    pub terminal_id: Option<Uuid>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
    pub last_modified_before: Option<DateTime<Utc>>,
    pub last_modified_after: Option<DateTime<Utc>>,
    pub is_deleted: Option<bool>,
}
