//! HTTP router assembly.
//!
//! Everything under `/api/v1` requires an API key; `/api/v1/admin` also
//! requires the key to be administrative. `/health` is public.

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    context::AppContext,
    handlers::{
        accounts, admin, billing_addresses, contracts, health, invoices, terminals, transactions,
        users,
    },
    middleware::auth::{auth_middleware, require_admin},
};

/// CORS policy from a comma-separated origin list. `None`, an empty list or
/// `*` allow any origin.
pub fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers: [HeaderName; 2] = [header::AUTHORIZATION, header::CONTENT_TYPE];
    let cors = CorsLayer::new().allow_methods(methods).allow_headers(headers);

    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or("*")
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Build the full application router.
pub fn build_router(ctx: AppContext, cors: CorsLayer) -> Router {
    let admin_routes = Router::new()
        .route("/partners", post(admin::create_partner))
        .route("/partners/{id}", get(admin::get_partner))
        .route(
            "/partners/{id}/webhook",
            post(admin::register_partner_webhook),
        )
        .route("/accounts/{id}", get(admin::get_account))
        .route("/contracts/{id}/activate", post(admin::activate_contract))
        .route("/reconciliation", post(admin::run_reconciliation))
        .route_layer(axum_middleware::from_fn(require_admin));

    let api_routes = Router::new()
        // Accounts
        .route(
            "/accounts",
            post(accounts::create_account).get(accounts::list_accounts),
        )
        .route(
            "/accounts/{id}",
            get(accounts::get_account)
                .patch(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route(
            "/accounts/{id}/validate/individual",
            post(accounts::validate_individual),
        )
        .route(
            "/accounts/{id}/validate/company",
            post(accounts::validate_company),
        )
        .route(
            "/accounts/{id}/kyc-document",
            post(accounts::upload_kyc_document),
        )
        .route("/accounts/{id}/users", get(accounts::list_account_users))
        .route(
            "/accounts/{id}/terminals",
            get(accounts::list_account_terminals),
        )
        .route(
            "/accounts/{id}/contracts",
            get(accounts::list_account_contracts),
        )
        .route(
            "/accounts/{id}/transactions",
            get(accounts::list_account_transactions),
        )
        .route(
            "/accounts/{id}/billing-addresses",
            get(accounts::list_account_billing_addresses),
        )
        .route(
            "/accounts/{id}/invoices",
            get(accounts::list_account_invoices),
        )
        // Users
        .route("/users", post(users::create_user).get(users::list_users))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{id}/accounts", post(users::add_user_to_account))
        .route(
            "/users/{id}/accounts/{account_id}",
            delete(users::remove_user_from_account),
        )
        // Terminals
        .route(
            "/terminals",
            post(terminals::create_terminal).get(terminals::list_terminals),
        )
        .route(
            "/terminals/{id}",
            get(terminals::get_terminal)
                .patch(terminals::update_terminal)
                .delete(terminals::delete_terminal),
        )
        .route(
            "/terminals/{id}/contracts",
            get(terminals::list_terminal_contracts),
        )
        .route(
            "/terminals/{id}/transactions",
            get(terminals::list_terminal_transactions),
        )
        // Contracts
        .route(
            "/contracts",
            post(contracts::create_contract).get(contracts::list_contracts),
        )
        .route(
            "/contracts/{id}",
            get(contracts::get_contract)
                .patch(contracts::reassign_contract)
                .delete(contracts::delete_contract),
        )
        // Transactions
        .route(
            "/transactions",
            post(transactions::create_transaction).get(transactions::list_transactions),
        )
        .route(
            "/transactions/{id}",
            get(transactions::get_transaction).patch(transactions::update_transaction),
        )
        .route(
            "/transactions/{id}/payment-order",
            post(transactions::initiate_payment_order),
        )
        // Billing
        .route(
            "/billing-addresses/{id}",
            get(billing_addresses::get_billing_address),
        )
        .route("/invoices/{id}", get(invoices::get_invoice))
        .nest("/admin", admin_routes)
        // Authentication runs before every route above, including admin ones
        .route_layer(axum_middleware::from_fn_with_state(
            ctx.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

