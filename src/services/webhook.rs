// SPDX-License-Identifier: MIT

//! Webhook processing pipeline.
//!
//! An inbound payload is classified into a tagged event before any handler
//! runs, then flows through: snapshot cache read (updates) → change detection
//! → cache write (always) → action-log append → note render → note post.

use crate::db::ActionLogStore;
use crate::error::{AppError, Result};
use crate::models::{ActionLogRecord, ActionType, EntityKind, FieldDiff, Snapshot};
use crate::services::api::AmoApiService;
use crate::services::diff::extract_changed_values;
use crate::services::snapshot_cache::SnapshotCache;
use crate::time_utils::{format_msk, parse_created_at};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Inbound payload classified by shape.
///
/// amoCRM delivers at most one of these per call; classification is a single
/// ordered first-match list, so an (unexpected) payload carrying several
/// sections resolves deterministically.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    LeadAdded(Snapshot),
    ContactAdded(Snapshot),
    LeadUpdated(Snapshot),
    ContactUpdated(Snapshot),
    Unrecognized,
}

/// Classify a decoded payload. Looks for `{section}.{action}[0]` in a fixed
/// order: leads.add, contacts.add, leads.update, contacts.update.
pub fn classify(payload: &Value) -> WebhookEvent {
    const SHAPES: [(&str, &str); 4] = [
        ("leads", "add"),
        ("contacts", "add"),
        ("leads", "update"),
        ("contacts", "update"),
    ];

    for (section, action) in SHAPES {
        if let Some(Value::Object(entity)) = payload
            .get(section)
            .and_then(|s| s.get(action))
            .and_then(|a| a.get(0))
        {
            let snapshot = Snapshot(entity.clone());
            return match (section, action) {
                ("leads", "add") => WebhookEvent::LeadAdded(snapshot),
                ("contacts", "add") => WebhookEvent::ContactAdded(snapshot),
                ("leads", "update") => WebhookEvent::LeadUpdated(snapshot),
                _ => WebhookEvent::ContactUpdated(snapshot),
            };
        }
    }

    WebhookEvent::Unrecognized
}

/// Webhook pipeline over the API client, snapshot cache and action log.
#[derive(Clone)]
pub struct WebhookService {
    api: AmoApiService,
    cache: SnapshotCache,
    action_log: ActionLogStore,
    /// Per-entity mutex so concurrent deliveries for the same entity cannot
    /// diff against a half-updated snapshot.
    entity_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WebhookService {
    pub fn new(api: AmoApiService, cache: SnapshotCache, action_log: ActionLogStore) -> Self {
        Self {
            api,
            cache,
            action_log,
            entity_locks: Arc::new(DashMap::new()),
        }
    }

    /// Process one classified event. `Unrecognized` is logged and dropped;
    /// everything else runs the add/update pipeline for its entity kind.
    pub async fn handle(&self, event: WebhookEvent) -> Result<()> {
        match event {
            WebhookEvent::LeadAdded(snapshot) => {
                self.handle_added(EntityKind::Lead, snapshot).await
            }
            WebhookEvent::ContactAdded(snapshot) => {
                self.handle_added(EntityKind::Contact, snapshot).await
            }
            WebhookEvent::LeadUpdated(snapshot) => {
                self.handle_updated(EntityKind::Lead, snapshot).await
            }
            WebhookEvent::ContactUpdated(snapshot) => {
                self.handle_updated(EntityKind::Contact, snapshot).await
            }
            WebhookEvent::Unrecognized => {
                tracing::info!("Entity unrecognized");
                Ok(())
            }
        }
    }

    async fn entity_guard(&self, kind: EntityKind, entity_id: i64) -> Arc<Mutex<()>> {
        self.entity_locks
            .entry(format!("{kind}_{entity_id}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop an entity's lock entry once no other delivery holds it, so the
    /// lock map shrinks back instead of growing with every entity ever seen.
    ///
    /// Callers invoke this while still owning their `Arc` handle: a count of
    /// exactly 2 (the map's entry plus that handle) means nobody is waiting,
    /// and `remove_if` holds the shard lock, so no new waiter can clone the
    /// entry mid-check.
    fn release_entity_lock(&self, kind: EntityKind, entity_id: i64) {
        self.entity_locks
            .remove_if(&format!("{kind}_{entity_id}"), |_, lock| {
                Arc::strong_count(lock) == 2
            });
    }

    // ─── Added ───────────────────────────────────────────────────────────────

    async fn handle_added(&self, kind: EntityKind, snapshot: Snapshot) -> Result<()> {
        let entity_id = require_id(&snapshot)?;
        let lock = self.entity_guard(kind, entity_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process_added(kind, entity_id, snapshot).await
        };
        self.release_entity_lock(kind, entity_id);
        drop(lock);
        result
    }

    async fn process_added(
        &self,
        kind: EntityKind,
        entity_id: i64,
        snapshot: Snapshot,
    ) -> Result<()> {
        self.cache.put(kind, entity_id, snapshot.clone());
        self.log_action(kind, entity_id, ActionType::Added, None, &snapshot);

        let name = snapshot.name().unwrap_or_else(|| default_name(kind).to_string());
        let responsible = match snapshot.responsible_user_id() {
            Some(id) => self.api.resolve_user_name(id).await,
            None => "Неизвестно".to_string(),
        };
        let created_at = snapshot
            .created_at_raw()
            .and_then(parse_created_at)
            .ok_or_else(|| {
                AppError::BadRequest(format!("{kind} {entity_id}: missing or invalid created_at"))
            })?;

        let note_text = format!(
            "{}: {}\nОтветственный: {}\nВремя создания: {}",
            added_headline(kind),
            name,
            responsible,
            format_msk(created_at),
        );

        tracing::info!(entity = %kind, entity_id, "Processed add webhook");
        self.api.add_note(kind, entity_id, &note_text).await;
        Ok(())
    }

    // ─── Updated ─────────────────────────────────────────────────────────────

    async fn handle_updated(&self, kind: EntityKind, snapshot: Snapshot) -> Result<()> {
        let entity_id = require_id(&snapshot)?;
        let lock = self.entity_guard(kind, entity_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.process_updated(kind, entity_id, snapshot).await
        };
        self.release_entity_lock(kind, entity_id);
        drop(lock);
        result
    }

    async fn process_updated(
        &self,
        kind: EntityKind,
        entity_id: i64,
        snapshot: Snapshot,
    ) -> Result<()> {
        let previous = self.cache.get(kind, entity_id);
        let changes = extract_changed_values(&self.api, previous.as_ref(), &snapshot).await;

        // The cache always tracks the latest delivery, diff or no diff.
        self.cache.put(kind, entity_id, snapshot.clone());
        self.log_action(
            kind,
            entity_id,
            ActionType::Updated,
            changes.clone(),
            &snapshot,
        );

        let mut note_text = if previous.is_none() {
            tracing::info!(entity = %kind, entity_id, "Update without previous state in cache");
            self.render_uncached_update(kind, entity_id, &snapshot, changes.as_ref())
                .await
        } else if let Some(diff) = &changes {
            render_changes(kind, diff)
        } else {
            tracing::info!(entity = %kind, entity_id, "Update with no tracked-field changes");
            no_changes_line(kind).to_string()
        };

        if !note_text.is_empty() {
            note_text.push_str(&format!("\nВремя изменения: {}", format_msk(Utc::now())));
            self.api.add_note(kind, entity_id, &note_text).await;
        }
        Ok(())
    }

    /// Note body for an update whose previous state fell out of the cache:
    /// report the current values and, when a diff exists, its "became"
    /// entries relative to the empty state.
    async fn render_uncached_update(
        &self,
        kind: EntityKind,
        entity_id: i64,
        snapshot: &Snapshot,
        changes: Option<&FieldDiff>,
    ) -> String {
        let name = snapshot.name().unwrap_or_else(|| default_name(kind).to_string());
        let responsible = match snapshot.responsible_user_id() {
            Some(id) => self.api.resolve_user_name(id).await,
            None => "Неизвестно".to_string(),
        };

        let mut text = format!(
            "{}\n{}: {}\nТекущий ответственный: {}\n",
            uncached_headline(kind, entity_id),
            current_name_label(kind),
            name,
            responsible,
        );

        if let Some(diff) = changes {
            text.push_str("Обнаруженные изменения (относительно пустого состояния):\n");
            for (label, change) in diff.entries() {
                text.push_str(&format!("Поле '{}': стало '{}'\n", label, change.new));
            }
        }

        text
    }

    fn log_action(
        &self,
        kind: EntityKind,
        entity_id: i64,
        action_type: ActionType,
        old_values: Option<FieldDiff>,
        snapshot: &Snapshot,
    ) {
        self.action_log.append(ActionLogRecord {
            entity_type: kind,
            entity_id,
            action_type,
            old_values,
            new_values: Some(Value::Object(snapshot.0.clone())),
            processed_at: Utc::now(),
        });
    }
}

fn require_id(snapshot: &Snapshot) -> Result<i64> {
    snapshot
        .id()
        .ok_or_else(|| AppError::BadRequest("entity payload has no id".to_string()))
}

/// Note body listing each tracked change as a was/became line.
fn render_changes(kind: EntityKind, diff: &FieldDiff) -> String {
    let lines: Vec<String> = diff
        .entries()
        .map(|(label, change)| {
            let old_display = change.old.as_deref().unwrap_or("не было задано");
            format!(
                "Поле '{}': было '{}' -> стало '{}'",
                label, old_display, change.new
            )
        })
        .collect();

    format!("{}\n{}", changes_headline(kind), lines.join("\n"))
}

fn default_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "Без названия",
        EntityKind::Contact => "Без имени",
    }
}

fn added_headline(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "Создана сделка",
        EntityKind::Contact => "Создан контакт",
    }
}

fn changes_headline(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "Изменения в сделке:",
        EntityKind::Contact => "Изменения в контакте:",
    }
}

fn no_changes_line(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "Сделка была обновлена (без изменений отслеживаемых полей).",
        EntityKind::Contact => "Контакт был обновлен (без изменений отслеживаемых полей).",
    }
}

fn current_name_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Lead => "Текущее название",
        EntityKind::Contact => "Текущее имя",
    }
}

fn uncached_headline(kind: EntityKind, entity_id: i64) -> String {
    match kind {
        EntityKind::Lead => format!(
            "Сделка ID {entity_id} была изменена (предыдущее состояние не закэшировано)."
        ),
        EntityKind::Contact => format!(
            "Контакт ID {entity_id} был изменен (предыдущее состояние не закэшировано)."
        ),
    }
}
