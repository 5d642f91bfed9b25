// SPDX-License-Identifier: MIT

//! Change detection between entity snapshots.
//!
//! Only the display name and the responsible user are tracked. That is
//! deliberate: the CRM does not guarantee a stable field schema, and the
//! feature is an audit trail, not a sync.

use crate::models::entity::{display_value, NOT_SET};
use crate::models::{FieldChange, FieldDiff, Snapshot};
use crate::services::api::AmoApiService;

/// Compare a new snapshot against the previous one (if any) and build the
/// tracked-field diff.
///
/// With no prior snapshot every present tracked field becomes an initial
/// entry (`old: None`). Responsible-user entries additionally require the new
/// ID to be non-empty; both IDs are resolved to display names through the API
/// with an `"ID: {id}"` fallback. Returns `None` when nothing qualified.
pub async fn extract_changed_values(
    api: &AmoApiService,
    old: Option<&Snapshot>,
    new: &Snapshot,
) -> Option<FieldDiff> {
    let is_initial = old.is_none();
    let mut diff = FieldDiff::default();

    // 1. Name: compared on the raw values, rendered through the "not set"
    //    sentinel.
    let old_name = old.and_then(|o| o.name_raw());
    let new_name = new.name_raw();
    if is_initial || old_name != new_name {
        diff.name = Some(FieldChange {
            old: (!is_initial).then(|| display_value(old_name)),
            new: display_value(new_name),
        });
    }

    // 2. Responsible user: only when the new ID is present and non-empty.
    let old_responsible = old.and_then(|o| o.responsible_user_raw());
    let new_responsible = new.responsible_user_raw();
    if let Some(new_id) = new.responsible_user_id() {
        if is_initial || old_responsible != new_responsible {
            let old_user_name = match old.and_then(|o| o.responsible_user_id()) {
                Some(id) => Some(api.resolve_user_name(id).await),
                None => None,
            };
            let new_user_name = api.resolve_user_name(new_id).await;

            diff.responsible = Some(FieldChange {
                old: (!is_initial)
                    .then(|| old_user_name.unwrap_or_else(|| NOT_SET.to_string())),
                new: new_user_name,
            });
        }
    }

    (!diff.is_empty()).then_some(diff)
}
