// SPDX-License-Identifier: MIT

//! amo-audit: change-audit pipeline for amoCRM webhooks.
//!
//! Receives lead/contact add/update notifications, diffs them against a
//! short-lived snapshot cache, resolves responsible users through the amoCRM
//! REST API, and writes an audit note back onto the record plus a durable
//! action-log entry.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{ActionLogStore, TokenStore};
use services::{AmoApiService, SnapshotCache, WebhookService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub tokens: TokenStore,
    pub action_log: ActionLogStore,
    pub snapshot_cache: SnapshotCache,
    pub api: AmoApiService,
    pub webhook_service: WebhookService,
}
