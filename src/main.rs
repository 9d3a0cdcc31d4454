//! Merchant Account Service - Main Application Entry Point
//!
//! REST API for onboarding merchants and taking payments: accounts,
//! users, terminals, RIBPAY / VADS contracts and transactions, backed by
//! PostgreSQL and a set of external providers.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: API key with SHA-256 hashing, tenant or admin scope
//! - **Providers**: bank payments, acquirer, billing, company registry,
//!   blob storage and mail over HTTP (reqwest)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the provider adapters and the shared `AppContext`
//! 4. Start the VADS reconciliation task
//! 5. Build HTTP router and start server on configured port

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use merchant_account_service::{
    config::Config,
    context::{AppContext, Settings},
    db,
    providers::{
        self,
        billing::LagoBillingProvider,
        mailer::HttpMailer,
        payment::{HttpPaymentProvider, HttpPaymentSettings},
        registry::InpiRegistry,
        storage::HttpBlobStorage,
    },
    routes,
    services::{notification_service::HttpWebhookSender, reconciliation},
    store::postgres::PgStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let client = providers::http_client(config.provider_timeout())?;
    let payments = HttpPaymentProvider::new(
        client.clone(),
        HttpPaymentSettings {
            oxlin_base_url: config.oxlin_base_url.clone(),
            oxlin_client_id: config.oxlin_client_id.clone(),
            oxlin_client_secret: config.oxlin_client_secret.clone(),
            monext_base_url: config.monext_base_url.clone(),
            monext_api_key: config.monext_api_key.clone(),
        },
    );

    let ctx = AppContext {
        store: Arc::new(PgStore::new(pool)),
        payments: Arc::new(payments),
        billing: Arc::new(LagoBillingProvider::new(
            client.clone(),
            config.lago_base_url.clone(),
            config.lago_api_key.clone(),
        )),
        registry: Arc::new(InpiRegistry::new(
            client.clone(),
            config.inpi_base_url.clone(),
            config.inpi_username.clone(),
            config.inpi_password.clone(),
        )),
        storage: Arc::new(HttpBlobStorage::new(
            client.clone(),
            config.blob_base_url.clone(),
            config.blob_sas_token.clone(),
        )),
        mailer: Arc::new(HttpMailer::new(
            client.clone(),
            config.mail_api_url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        )),
        webhooks: Arc::new(HttpWebhookSender::new(client)),
        settings: Arc::new(Settings::from_config(&config)),
    };

    let reconciler = reconciliation::spawn_reconciliation(ctx.clone(), config.reconciliation_interval());
    tracing::info!(
        interval_secs = config.reconciliation_interval_secs,
        "Reconciliation task started"
    );

    let cors = routes::cors_layer(config.cors_allowed_origins.as_deref());
    let app = routes::build_router(ctx, cors);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
