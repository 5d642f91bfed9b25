// SPDX-License-Identifier: MIT

//! amoCRM API client with token lifecycle management.
//!
//! Handles:
//! - Lazy refresh-token exchange when the access token is near expiry
//! - GET/POST requests with bearer auth and typed non-2xx failures
//! - User lookups and note creation with a swallow-to-`None` contract
//! - An offline mock mode for tests (canned users, recorded notes)

use crate::config::Config;
use crate::db::TokenStore;
use crate::error::{AppError, Result};
use crate::models::{EntityKind, OAuthToken};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Safety margin subtracted from the provider's `expires_in` when persisting
/// a refreshed token (60 seconds).
const TOKEN_EXPIRY_SAFETY_SECS: i64 = 60;

/// Where a token sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Usable as-is.
    Valid,
    /// Within the refresh margin of expiry; must be exchanged before use.
    Expiring,
}

/// Classify a token against `now` with the 5-minute refresh margin.
pub fn token_state(token: &OAuthToken, now: DateTime<Utc>) -> TokenState {
    if token.expires_at <= now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) {
        TokenState::Expiring
    } else {
        TokenState::Valid
    }
}

/// amoCRM user as returned by `GET /api/v4/users/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: Option<String>,
}

/// Token endpoint response (both refresh and authorization-code grants).
#[derive(Debug, Clone, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// Note recorded by the mock API instead of being POSTed to the CRM.
#[derive(Debug, Clone)]
pub struct RecordedNote {
    pub entity: EntityKind,
    pub entity_id: i64,
    pub text: String,
}

/// Offline stand-in for the CRM: a canned user directory plus captured notes.
#[derive(Default)]
pub struct MockApi {
    users: DashMap<i64, String>,
    notes: Mutex<Vec<RecordedNote>>,
}

impl MockApi {
    pub fn add_user(&self, id: i64, name: &str) {
        self.users.insert(id, name.to_string());
    }

    pub fn notes(&self) -> Vec<RecordedNote> {
        self.notes.lock().expect("mock notes lock poisoned").clone()
    }
}

/// amoCRM API client.
#[derive(Clone)]
pub struct AmoApiService {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    tokens: TokenStore,
    /// Serializes refresh-token exchanges so concurrent near-expiry requests
    /// burn at most one refresh-token generation.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    mock: Option<Arc<MockApi>>,
}

impl AmoApiService {
    /// Create a live client for the configured account.
    pub fn new(config: &Config, tokens: TokenStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.account_base_url(),
            client_id: config.amo_client_id.clone(),
            client_secret: config.amo_client_secret.clone(),
            redirect_uri: config.amo_redirect_uri.clone(),
            tokens,
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            mock: None,
        }
    }

    /// Create an offline client: user lookups and notes are served by the
    /// returned [`MockApi`]; no HTTP leaves the process.
    pub fn new_mock(tokens: TokenStore) -> (Self, Arc<MockApi>) {
        let mock = Arc::new(MockApi::default());
        let service = Self {
            mock: Some(mock.clone()),
            ..Self::new(&Config::test_default(), tokens)
        };
        (service, mock)
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get an access token that is valid for at least the refresh margin,
    /// exchanging the refresh token first when needed.
    ///
    /// Fails with [`AppError::AuthRequired`] when no token record exists and
    /// [`AppError::TokenRefresh`] when the exchange is rejected; neither case
    /// falls back to the stale token.
    async fn valid_access_token(&self) -> Result<String> {
        let token = self.tokens.get().ok_or(AppError::AuthRequired)?;
        if token_state(&token, Utc::now()) == TokenState::Valid {
            return Ok(token.access_token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Re-check after acquiring the lock: a concurrent request may have
        // already refreshed and stored a new pair.
        let token = self.tokens.get().ok_or(AppError::AuthRequired)?;
        if token_state(&token, Utc::now()) == TokenState::Valid {
            return Ok(token.access_token);
        }

        tracing::info!("Access token expiring, refreshing");
        let refreshed = self
            .token_grant(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", token.refresh_token.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;

        self.tokens.set(refreshed.clone());
        tracing::info!(expires_at = %refreshed.expires_at, "Token refreshed and stored");
        Ok(refreshed.access_token)
    }

    /// Call the token endpoint with the given grant parameters and persist
    /// nothing; the caller decides what to do with the pair.
    async fn token_grant(&self, params: &[(&str, &str)]) -> Result<OAuthToken> {
        let url = format!("{}/oauth2/access_token", self.base_url);
        let body: serde_json::Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::TokenRefresh(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::TokenRefresh(format!("HTTP {status}: {body}")));
        }

        let grant: TokenGrantResponse = response
            .json()
            .await
            .map_err(|e| AppError::TokenRefresh(format!("unexpected token response: {e}")))?;

        Ok(OAuthToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: Utc::now()
                + Duration::seconds(grant.expires_in - TOKEN_EXPIRY_SAFETY_SECS),
        })
    }

    /// Exchange an authorization code for a token pair and store it.
    ///
    /// Interface boundary of the OAuth flow; the browser-facing part lives in
    /// `routes::auth`.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken> {
        let token = self
            .token_grant(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;

        self.tokens.set(token.clone());
        tracing::info!(expires_at = %token.expires_at, "Authorization code exchanged, tokens stored");
        Ok(token)
    }

    // ─── Request Layer ───────────────────────────────────────────────────────

    /// Authenticated request against the account's API host.
    ///
    /// Only GET and POST are supported. Non-2xx responses map to
    /// [`AppError::Api`] with the status and body attached.
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value> {
        let access_token = self.valid_access_token().await?;
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(method = %method, url = %url, "amoCRM API request");

        let builder = if method == Method::GET {
            self.http.get(&url)
        } else if method == Method::POST {
            let builder = self.http.post(&url);
            match body {
                Some(json) => builder.json(json),
                None => builder,
            }
        } else {
            return Err(AppError::UnsupportedMethod(method.to_string()));
        };

        let response = builder
            .bearer_auth(&access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(AppError::transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Api { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Api {
                status: 0,
                body: format!("JSON parse error: {e}"),
            })
    }

    // ─── API Wrappers ────────────────────────────────────────────────────────

    /// Look up a user by ID. Any failure is logged and degraded to `None`;
    /// this call never aborts the webhook pipeline.
    pub async fn get_user(&self, user_id: i64) -> Option<UserInfo> {
        if let Some(mock) = &self.mock {
            return mock.users.get(&user_id).map(|name| UserInfo {
                id: user_id,
                name: Some(name.value().clone()),
            });
        }

        match self
            .request(&format!("/api/v4/users/{user_id}"), Method::GET, None)
            .await
        {
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| {
                    tracing::error!(user_id, error = %e, "Unexpected user response shape");
                })
                .ok(),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to fetch user");
                None
            }
        }
    }

    /// Attach a common note to a lead or contact. Same swallow-to-`None`
    /// contract as [`get_user`](Self::get_user): a failed note post is logged
    /// and skipped, never fatal.
    pub async fn add_note(
        &self,
        entity: EntityKind,
        entity_id: i64,
        text: &str,
    ) -> Option<Value> {
        if let Some(mock) = &self.mock {
            mock.notes
                .lock()
                .expect("mock notes lock poisoned")
                .push(RecordedNote {
                    entity,
                    entity_id,
                    text: text.to_string(),
                });
            return Some(Value::Null);
        }

        let path = format!("/api/v4/{}/{}/notes", entity.api_segment(), entity_id);
        let body = serde_json::json!([
            {
                "note_type": "common",
                "params": { "text": text },
            }
        ]);

        match self.request(&path, Method::POST, Some(&body)).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(
                    entity = %entity,
                    entity_id,
                    error = %e,
                    "Failed to add note"
                );
                None
            }
        }
    }

    /// Resolve a user ID to a display name, degrading to `"ID: {id}"` when
    /// the lookup fails or the user record has no name.
    pub async fn resolve_user_name(&self, user_id: i64) -> String {
        match self.get_user(user_id).await {
            Some(UserInfo {
                name: Some(name), ..
            }) => name,
            _ => format!("ID: {user_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token_expiring_in(minutes: i64) -> OAuthToken {
        OAuthToken {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    /// Local stand-in for the CRM host: serves the token endpoint (counting
    /// refresh grants) and one user record.
    async fn spawn_stub_crm() -> (String, Arc<AtomicUsize>) {
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();

        let app = Router::new()
            .route(
                "/oauth2/access_token",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(serde_json::json!({
                            "access_token": "fresh_access",
                            "refresh_token": "fresh_refresh",
                            "expires_in": 3600
                        }))
                    }
                }),
            )
            .route(
                "/api/v4/users/{id}",
                get(|| async { Json(serde_json::json!({"id": 7, "name": "Alice"})) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve stub");
        });

        (format!("http://{addr}"), refreshes)
    }

    /// Live (non-mock) client pointed at the stub host.
    fn live_service(base_url: String, tokens: TokenStore) -> AmoApiService {
        AmoApiService {
            http: reqwest::Client::new(),
            base_url,
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:8080/amocrm/callback".to_string(),
            tokens,
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            mock: None,
        }
    }

    #[test]
    fn test_token_within_margin_is_expiring() {
        let token = token_expiring_in(4);
        assert_eq!(token_state(&token, Utc::now()), TokenState::Expiring);
    }

    #[test]
    fn test_token_outside_margin_is_valid() {
        let token = token_expiring_in(10);
        assert_eq!(token_state(&token, Utc::now()), TokenState::Valid);
    }

    #[test]
    fn test_already_expired_token_is_expiring() {
        let token = token_expiring_in(-1);
        assert_eq!(token_state(&token, Utc::now()), TokenState::Expiring);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected_before_send() {
        let tokens = TokenStore::new();
        tokens.set(token_expiring_in(60));
        let api = AmoApiService::new(&Config::test_default(), tokens);

        // Fails on the verb check, before any request leaves the process.
        let err = api
            .request("/api/v4/leads", Method::PUT, None)
            .await
            .unwrap_err();
        match err {
            AppError::UnsupportedMethod(m) => assert_eq!(m, "PUT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_expiring_token_triggers_exactly_one_refresh() {
        let (base_url, refreshes) = spawn_stub_crm().await;
        let tokens = TokenStore::new();
        tokens.set(token_expiring_in(4));
        let api = live_service(base_url, tokens.clone());

        let user = api.get_user(7).await.expect("user lookup");
        assert_eq!(user.name.as_deref(), Some("Alice"));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        // The refreshed pair is persisted, so a follow-up call rides it
        // without another exchange.
        let stored = tokens.get().unwrap();
        assert_eq!(stored.access_token, "fresh_access");
        assert_eq!(stored.refresh_token, "fresh_refresh");

        api.get_user(7).await.expect("user lookup after refresh");
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let (base_url, refreshes) = spawn_stub_crm().await;
        let tokens = TokenStore::new();
        tokens.set(token_expiring_in(10));
        let api = live_service(base_url, tokens);

        api.get_user(7).await.expect("user lookup");
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mock_user_lookup_and_fallback() {
        let (api, mock) = AmoApiService::new_mock(TokenStore::new());
        mock.add_user(7, "Alice");

        assert_eq!(api.resolve_user_name(7).await, "Alice");
        assert_eq!(api.resolve_user_name(8).await, "ID: 8");
    }

    #[tokio::test]
    async fn test_mock_records_notes() {
        let (api, mock) = AmoApiService::new_mock(TokenStore::new());
        api.add_note(EntityKind::Lead, 5, "hello").await;

        let notes = mock.notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].entity_id, 5);
        assert_eq!(notes[0].text, "hello");
    }
}
