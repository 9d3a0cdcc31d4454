//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts the caller's `AuthContext`, path, query and JSON body
//! 2. Validates the body into a command and calls the matching service
//! 3. Returns JSON with the right status code, or an `AppError`

/// Account management endpoints
pub mod accounts;
/// Partner, forced activation and reconciliation endpoints (admin keys only)
pub mod admin;
/// Billing address lookup
pub mod billing_addresses;
/// Contract endpoints
pub mod contracts;
/// Health check endpoint
pub mod health;
/// Invoice lookup (billing provider)
pub mod invoices;
/// Terminal endpoints
pub mod terminals;
/// Transaction endpoints
pub mod transactions;
/// User and membership endpoints
pub mod users;
