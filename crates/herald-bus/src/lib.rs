// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event distribution for Herald.
//!
//! Every core mutation emits an [`Envelope`](herald_core::Envelope) through the
//! [`EventBus`]: live subscribers (the websocket stream) get it over a tokio
//! broadcast channel, external endpoints get it as a signed webhook POST.

pub mod bus;
pub mod events;
pub mod webhook;

pub use bus::EventBus;
pub use webhook::WebhookDispatcher;
