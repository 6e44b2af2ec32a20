// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod adapter;
pub mod store;

pub use adapter::PluginAdapter;
pub use store::{
    CaptureInsert, MessageOrder, MessageQuery, OwnershipInsert, RecordStore, TransitionWrite,
};
