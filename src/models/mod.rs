// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod action_log;
pub mod entity;
pub mod token;

pub use action_log::{ActionLogRecord, ActionType};
pub use entity::{EntityKind, FieldChange, FieldDiff, Snapshot};
pub use token::OAuthToken;
