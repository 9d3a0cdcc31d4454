//! Business logic services.
//!
//! Services contain the domain rules, separated from HTTP handlers. Every
//! operation takes the shared `AppContext` and, where tenant data is read,
//! the caller's `Scope`. Provider calls are bounded and ordered before the
//! final datastore write.

pub mod account_service;
pub mod billing_address_service;
pub mod contract_service;
pub mod identifiers;
pub mod invoice_service;
pub mod lifecycle;
pub mod normalize;
pub mod notification_service;
pub mod partner_service;
pub mod reconciliation;
pub mod rules;
pub mod terminal_service;
pub mod transaction_service;
pub mod user_service;
