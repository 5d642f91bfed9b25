// SPDX-License-Identifier: MIT

//! Append-only audit log records.

use crate::models::entity::{EntityKind, FieldDiff};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Added,
    Updated,
}

/// One processed webhook event. Immutable once appended; written exactly once
/// per processed call, whether or not the audit note was ultimately sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogRecord {
    pub entity_type: EntityKind,
    pub entity_id: i64,
    pub action_type: ActionType,
    /// Tracked-field diff for updates; `None` for adds and empty diffs.
    pub old_values: Option<FieldDiff>,
    /// Full entity payload as delivered.
    pub new_values: Option<Value>,
    pub processed_at: DateTime<Utc>,
}
