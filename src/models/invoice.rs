//! Invoice model. Invoices live in the billing provider; nothing is stored
//! locally.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub lago_id: String,
    pub number: Option<String>,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub currency: Option<String>,
    pub issuing_date: Option<String>,
    pub total_amount_cents: Option<i64>,
    pub file_url: Option<String>,
    /// Billing customer external id (the account id)
    pub external_customer_id: Option<String>,
}

/// One page of invoices as reported by the billing provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceListing {
    pub invoices: Vec<Invoice>,
    pub total_count: i64,
}
