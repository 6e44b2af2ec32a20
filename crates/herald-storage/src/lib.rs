// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Herald delivery engine.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer concurrency
//! model via `tokio-rusqlite`. Queue reservation, stale reclaim, and status
//! transitions are conditional updates inside immediate transactions, which
//! keeps them atomic across concurrent callers.

pub mod adapter;
mod codec;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
