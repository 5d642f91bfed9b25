// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod api;
pub mod diff;
pub mod snapshot_cache;
pub mod webhook;

pub use api::{AmoApiService, MockApi, RecordedNote, UserInfo};
pub use snapshot_cache::SnapshotCache;
pub use webhook::{WebhookEvent, WebhookService};
