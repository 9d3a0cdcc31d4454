//! HTTP middleware components.
//!
//! Middleware run before route handlers. They authenticate requests and
//! short-circuit the ones that lack the required access.

/// API key authentication and admin gate
pub mod auth;
