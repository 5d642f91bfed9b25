// SPDX-License-Identifier: MIT

use amo_audit::config::Config;
use amo_audit::db::{ActionLogStore, TokenStore};
use amo_audit::services::{AmoApiService, MockApi, SnapshotCache, WebhookService};
use amo_audit::AppState;
use std::sync::Arc;

/// Create a test app with an offline mock API.
/// Returns the router, the shared state and the mock CRM.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<MockApi>) {
    let config = Config::test_default();
    let tokens = TokenStore::new();
    let action_log = ActionLogStore::new();
    let snapshot_cache = SnapshotCache::new();

    let (api, mock) = AmoApiService::new_mock(tokens.clone());
    let webhook_service =
        WebhookService::new(api.clone(), snapshot_cache.clone(), action_log.clone());

    let state = Arc::new(AppState {
        config,
        tokens,
        action_log,
        snapshot_cache,
        api,
        webhook_service,
    });

    (
        amo_audit::routes::create_router(state.clone()),
        state,
        mock,
    )
}

/// POST a JSON payload to the webhook endpoint via `oneshot`.
#[allow(dead_code)]
pub async fn post_webhook_json(
    app: axum::Router,
    payload: &serde_json::Value,
) -> axum::http::Response<axum::body::Body> {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/amocrm/webhook")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(payload).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap()
}
