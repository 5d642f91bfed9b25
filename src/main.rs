// SPDX-License-Identifier: MIT

//! amo-audit API server.
//!
//! Integrates an amoCRM account's webhook stream with its REST API: entity
//! changes arrive as webhooks, get diffed against the last-known snapshot,
//! and leave as audit notes on the CRM record.

use amo_audit::{
    config::Config,
    db::{ActionLogStore, TokenStore},
    services::{AmoApiService, SnapshotCache, WebhookService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        subdomain = %config.amo_subdomain,
        port = config.port,
        "Starting amo-audit API"
    );

    // Stores: single-row token record plus the append-only action log
    let tokens = TokenStore::new();
    let action_log = ActionLogStore::new();
    let snapshot_cache = SnapshotCache::new();

    // amoCRM API client with lazy token refresh
    let api = AmoApiService::new(&config, tokens.clone());

    // Webhook pipeline
    let webhook_service =
        WebhookService::new(api.clone(), snapshot_cache.clone(), action_log.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        tokens,
        action_log,
        snapshot_cache,
        api,
        webhook_service,
    });

    // Build router
    let app = amo_audit::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("amo_audit=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
