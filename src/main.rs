//! Payguard server binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderName;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use payguard::adapters::http::{app_router, PaymentAppState};
use payguard::adapters::{
    EntitlementRetrier, HttpCallbackVerifier, InMemoryEntitlementOutbox,
    InMemoryEntitlementService, InMemoryPaymentLedger, InMemoryRateLimiter,
    StaticCallbackVerifier,
};
use payguard::config::AppConfig;
use payguard::domain::payment::PaymentReconciler;
use payguard::ports::{CallbackVerifier, RateLimiter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let limiter = Arc::new(InMemoryRateLimiter::new(config.rate_limit.eviction));
    let sweeper = Arc::clone(&limiter).spawn_sweeper(
        Duration::from_secs(config.rate_limit.eviction.sweep_interval_secs),
        shutdown_rx.clone(),
    );

    let ledger = Arc::new(InMemoryPaymentLedger::new());
    let entitlements = Arc::new(InMemoryEntitlementService::new());
    let outbox = Arc::new(InMemoryEntitlementOutbox::new());

    let verifier: Arc<dyn CallbackVerifier> = match config.payment.provider_api() {
        Some(api) => Arc::new(HttpCallbackVerifier::new(api)?),
        None => {
            tracing::warn!("provider API not configured; redirect callbacks will be rejected");
            Arc::new(StaticCallbackVerifier::rejecting())
        }
    };

    let retrier = EntitlementRetrier::new(
        outbox.clone(),
        entitlements.clone(),
        config.payment.retrier_config(),
    );
    let retrier_shutdown = shutdown_rx.clone();
    let retrier_task = tokio::spawn(async move { retrier.run(retrier_shutdown).await });

    let limiter: Arc<dyn RateLimiter> = limiter;
    let reconciler = Arc::new(PaymentReconciler::new(
        limiter,
        ledger,
        entitlements,
        outbox,
        verifier,
        config.payment.reconciler_config(&config.rate_limit),
    ));

    let signature_header = HeaderName::from_bytes(config.payment.signature_header.as_bytes())
        .context("invalid signature header")?;
    let state = PaymentAppState::new(reconciler, config.payment.webhook_secret.clone())
        .with_signature_header(signature_header);

    let app = app_router(state, config.server.request_timeout());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, environment = ?config.server.environment, "payguard listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    if let Err(e) = retrier_task.await? {
        tracing::error!(error = %e, "entitlement retrier exited with error");
    }

    tracing::info!("payguard stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
