// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Herald integration tests.
//!
//! [`TestHarness`] assembles the full stack (temp SQLite store, event bus,
//! engine, gateway router) so scenario tests can drive it over HTTP without
//! binding a socket.

pub mod harness;

pub use harness::{TestHarness, TestHarnessBuilder};
