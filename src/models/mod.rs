//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request types the HTTP layer deserializes into.

/// Business account model
pub mod account;
/// API key authentication model
pub mod api_key;
/// Billing address snapshot model
pub mod billing_address;
/// RIBPAY / VADS contract model
pub mod contract;
/// Invoice model (billing provider data)
pub mod invoice;
/// Pagination request and response types
pub mod pagination;
/// Partner model
pub mod partner;
/// Tenant / admin visibility scope
pub mod scope;
/// Terminal model
pub mod terminal;
/// Payment transaction model
pub mod transaction;
/// User and membership models
pub mod user;

/// A stored value did not decode into its domain type.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown {kind} `{value}`")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("{entity} row is missing `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
}

/// Implements text-column decoding for an enum that already has
/// `TryFrom<String, Error = DecodeError>`.
///
/// Values are bound back with `.as_str()`, so only `Type` and `Decode`
/// are needed.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(<$ty>::try_from(raw)?)
            }
        }
    };
}

pub(crate) use text_column;
