// SPDX-License-Identifier: MIT

//! In-memory token and action-log stores.

use crate::models::{ActionLogRecord, OAuthToken};
use std::sync::{Arc, RwLock};

/// Holds the installation's single OAuth token record.
///
/// Cheap to clone; all clones share the same record.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<OAuthToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token record, if the account has been authorized.
    pub fn get(&self) -> Option<OAuthToken> {
        self.inner.read().expect("token store lock poisoned").clone()
    }

    /// Replace the token record (initial authorization or refresh).
    pub fn set(&self, token: OAuthToken) {
        *self.inner.write().expect("token store lock poisoned") = Some(token);
    }
}

/// Append-only log of processed webhook events.
#[derive(Clone, Default)]
pub struct ActionLogStore {
    records: Arc<RwLock<Vec<ActionLogRecord>>>,
}

impl ActionLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: ActionLogRecord) {
        self.records
            .write()
            .expect("action log lock poisoned")
            .push(record);
    }

    /// All records in append order.
    pub fn all(&self) -> Vec<ActionLogRecord> {
        self.records
            .read()
            .expect("action log lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("action log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
