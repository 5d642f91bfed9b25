// SPDX-License-Identifier: MIT

//! Persistence layer.
//!
//! The pipeline only needs a single-row token store and an append-only action
//! log. Both are kept behind small store types so the backing engine can be
//! swapped without touching the services; the in-memory implementations here
//! are the reference backend and what the tests run against.

pub mod store;

pub use store::{ActionLogStore, TokenStore};
