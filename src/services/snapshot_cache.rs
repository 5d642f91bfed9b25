// SPDX-License-Identifier: MIT

//! Short-lived cache of last-known entity state.
//!
//! Keyed by `{kind}_{id}`, each entry lives 24 hours from its last write.
//! Writes always reset the TTL; reads never do. The cache only feeds diffing,
//! so losing an entry simply produces a "previous state not cached" note.

use crate::models::{EntityKind, Snapshot};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Snapshot time-to-live: 24 hours from the last write.
const SNAPSHOT_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Clone)]
struct CachedSnapshot {
    snapshot: Snapshot,
    expires_at: DateTime<Utc>,
}

/// Time-bounded entity snapshot cache.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    entries: Arc<DashMap<String, CachedSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(kind: EntityKind, entity_id: i64) -> String {
        format!("{kind}_{entity_id}")
    }

    /// Store the latest snapshot for an entity, resetting its TTL.
    pub fn put(&self, kind: EntityKind, entity_id: i64, snapshot: Snapshot) {
        self.put_at(kind, entity_id, snapshot, Utc::now());
    }

    /// Last-known snapshot for an entity, or `None` when absent or expired.
    pub fn get(&self, kind: EntityKind, entity_id: i64) -> Option<Snapshot> {
        self.get_at(kind, entity_id, Utc::now())
    }

    fn put_at(&self, kind: EntityKind, entity_id: i64, snapshot: Snapshot, now: DateTime<Utc>) {
        self.entries.insert(
            Self::cache_key(kind, entity_id),
            CachedSnapshot {
                snapshot,
                expires_at: now + Duration::seconds(SNAPSHOT_TTL_SECS),
            },
        );
    }

    fn get_at(&self, kind: EntityKind, entity_id: i64, now: DateTime<Utc>) -> Option<Snapshot> {
        let key = Self::cache_key(kind, entity_id);
        if let Some(entry) = self.entries.get(&key) {
            if now < entry.expires_at {
                return Some(entry.snapshot.clone());
            }
        }
        // Expired entries are evicted lazily on the read that finds them.
        self.entries.remove(&key);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(id: i64) -> Snapshot {
        match json!({"id": id, "name": "Deal"}) {
            serde_json::Value::Object(map) => Snapshot(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_get_returns_written_snapshot() {
        let cache = SnapshotCache::new();
        cache.put(EntityKind::Lead, 1, snapshot(1));
        assert!(cache.get(EntityKind::Lead, 1).is_some());
        // Contacts and leads never collide even with the same ID.
        assert!(cache.get(EntityKind::Contact, 1).is_none());
    }

    #[test]
    fn test_snapshot_expires_after_ttl() {
        let cache = SnapshotCache::new();
        let written = Utc::now();
        cache.put_at(EntityKind::Lead, 1, snapshot(1), written);

        let just_before = written + Duration::hours(23) + Duration::minutes(59);
        assert!(cache.get_at(EntityKind::Lead, 1, just_before).is_some());

        let just_after = written + Duration::hours(24) + Duration::minutes(1);
        assert!(cache.get_at(EntityKind::Lead, 1, just_after).is_none());
    }

    #[test]
    fn test_write_refreshes_ttl() {
        let cache = SnapshotCache::new();
        let first = Utc::now();
        cache.put_at(EntityKind::Lead, 1, snapshot(1), first);

        let rewrite = first + Duration::hours(20);
        cache.put_at(EntityKind::Lead, 1, snapshot(1), rewrite);

        // 26h after the first write but only 6h after the rewrite.
        let later = first + Duration::hours(26);
        assert!(cache.get_at(EntityKind::Lead, 1, later).is_some());
    }

    #[test]
    fn test_read_does_not_refresh_ttl() {
        let cache = SnapshotCache::new();
        let written = Utc::now();
        cache.put_at(EntityKind::Lead, 1, snapshot(1), written);

        let mid = written + Duration::hours(23);
        assert!(cache.get_at(EntityKind::Lead, 1, mid).is_some());

        let after = written + Duration::hours(25);
        assert!(cache.get_at(EntityKind::Lead, 1, after).is_none());
    }
}
