// SPDX-License-Identifier: MIT

//! Entity snapshots and field-level diffs.
//!
//! amoCRM does not guarantee a stable entity schema, so a snapshot is kept as
//! the opaque field map the webhook delivered, with typed accessors only for
//! the handful of fields the pipeline cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Display marker for a field that has no value.
pub const NOT_SET: &str = "не задано";

/// Kind of CRM entity a webhook refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Contact,
}

impl EntityKind {
    /// Path segment used by the amoCRM v4 API (`/api/v4/{segment}/...`).
    pub fn api_segment(self) -> &'static str {
        match self {
            EntityKind::Lead => "leads",
            EntityKind::Contact => "contacts",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Lead => "lead",
            EntityKind::Contact => "contact",
        })
    }
}

/// Last-known state of a lead or contact, exactly as the CRM sent it.
///
/// Not authoritative; the CRM is the source of truth. Used only for diffing
/// against the next webhook for the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub serde_json::Map<String, Value>);

impl Snapshot {
    /// Entity ID. Accepts a JSON number or a numeric string (form-decoded
    /// payloads deliver everything as strings).
    pub fn id(&self) -> Option<i64> {
        value_as_i64(self.0.get("id")?)
    }

    /// Raw `name` value, if any.
    pub fn name_raw(&self) -> Option<&Value> {
        self.0.get("name")
    }

    /// Display name, or `None` when missing/empty.
    pub fn name(&self) -> Option<String> {
        match self.0.get("name") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        }
    }

    /// Raw `responsible_user_id` value, if any.
    pub fn responsible_user_raw(&self) -> Option<&Value> {
        self.0.get("responsible_user_id")
    }

    /// Responsible user ID, or `None` when missing, empty or zero.
    pub fn responsible_user_id(&self) -> Option<i64> {
        let id = value_as_i64(self.0.get("responsible_user_id")?)?;
        (id != 0).then_some(id)
    }

    /// Raw `created_at` value (epoch seconds or an ISO string).
    pub fn created_at_raw(&self) -> Option<&Value> {
        self.0.get("created_at")
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a raw field value for humans: null/empty string/empty collection
/// collapse to [`NOT_SET`].
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => NOT_SET.to_string(),
        Some(Value::String(s)) if s.is_empty() => NOT_SET.to_string(),
        Some(Value::Array(a)) if a.is_empty() => NOT_SET.to_string(),
        Some(Value::Object(o)) if o.is_empty() => NOT_SET.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One tracked field's old/new pair.
///
/// `old` is `None` only for initial entries (no prior snapshot existed);
/// otherwise it carries the display-formatted previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: String,
}

/// Structured diff of the tracked fields.
///
/// Only two fields are tracked on purpose: this is an audit-trail feature,
/// not a sync engine. Serializes to the audit-contract map shape
/// `{"Название": {...}, "Ответственный": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    #[serde(rename = "Название", skip_serializing_if = "Option::is_none")]
    pub name: Option<FieldChange>,
    #[serde(rename = "Ответственный", skip_serializing_if = "Option::is_none")]
    pub responsible: Option<FieldChange>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.responsible.is_none()
    }

    /// Tracked entries in stable rendering order: name, then responsible.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &FieldChange)> {
        self.name
            .iter()
            .map(|c| ("Название", c))
            .chain(self.responsible.iter().map(|c| ("Ответственный", c)))
    }
}
