//! Merchant account service.
//!
//! Accounts, users, terminals, contracts and transactions for merchants
//! accepting bank-transfer (RIBPAY) and card (VADS) payments. Persistence and
//! external providers sit behind traits so the domain layer runs unchanged
//! against PostgreSQL in production and in-memory doubles in tests.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod routes;
pub mod services;
pub mod store;
