// SPDX-License-Identifier: MIT

//! OAuth authorization routes.
//!
//! Interface boundary of the provider's authorization-code flow: redirect the
//! browser to amoCRM, then exchange the returned code for a token pair. The
//! webhook pipeline itself never touches these endpoints.

use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Auth routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/amocrm/authorize", get(authorize))
        .route("/amocrm/callback", get(callback))
}

/// Redirect the browser to the amoCRM consent page.
async fn authorize(State(state): State<Arc<AppState>>) -> Redirect {
    let csrf_state = format!("{:x}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0));
    let url = format!(
        "https://www.{}/oauth?client_id={}&state={}&mode=post_message",
        state.config.amo_base_domain,
        urlencoding::encode(&state.config.amo_client_id),
        csrf_state,
    );
    Redirect::temporary(&url)
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
}

/// OAuth callback: exchange the authorization code and store the token pair.
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<&'static str> {
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("authorization code missing".to_string()))?;

    state.api.exchange_code(&code).await?;
    Ok("Access и Refresh токены успешно получены и сохранены!")
}
