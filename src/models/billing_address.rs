//! Billing address model.
//!
//! One per account, copied from the company registry at account creation
//! and never modified afterwards.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Postal address as reported by the company registry. Every part is
/// optional because registry records are frequently incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAddress {
    pub address: Option<String>,
    pub complement: Option<String>,
    pub street_number: Option<String>,
    pub repetition_index: Option<String>,
    pub street_type: Option<String>,
    pub street_label: Option<String>,
    pub special_distribution: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

impl CompanyAddress {
    /// Single street line: complement, number, type and label.
    pub fn street_line(&self) -> String {
        [
            &self.complement,
            &self.street_number,
            &self.street_type,
            &self.street_label,
        ]
        .into_iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct BillingAddress {
    pub billing_address_id: Uuid,
    pub billing_address: Option<String>,
    pub billing_address_complement_localisation: Option<String>,
    pub billing_address_numero_voie: Option<String>,
    pub billing_address_indice_repetition: Option<String>,
    pub billing_address_type_voie: Option<String>,
    pub billing_address_libelle_voie: Option<String>,
    pub billing_address_distribution_speciale: Option<String>,
    pub billing_address_code_postal: Option<String>,
    pub billing_address_libelle_commune: Option<String>,
    pub billing_address_pays: Option<String>,
    pub billing_address_code_pays: Option<String>,
    pub account_id: Uuid,
    pub creator_id: String,
}

impl BillingAddress {
    pub fn from_registry(
        billing_address_id: Uuid,
        account_id: Uuid,
        creator_id: &str,
        address: &CompanyAddress,
    ) -> Self {
        let address = address.clone();
        Self {
            billing_address_id,
            billing_address: address.address,
            billing_address_complement_localisation: address.complement,
            billing_address_numero_voie: address.street_number,
            billing_address_indice_repetition: address.repetition_index,
            billing_address_type_voie: address.street_type,
            billing_address_libelle_voie: address.street_label,
            billing_address_distribution_speciale: address.special_distribution,
            billing_address_code_postal: address.postal_code,
            billing_address_libelle_commune: address.city,
            billing_address_pays: address.country,
            billing_address_code_pays: address.country_code,
            account_id,
            creator_id: creator_id.to_string(),
        }
    }
}
