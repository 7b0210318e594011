// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingress for the Wireline bridge.
//!
//! A small axum server accepting POSTs on one configured path, feeding the
//! notification pipeline. Fail-closed: every request must present the
//! shared secret, compared in constant time.

pub mod auth;
pub mod server;

pub use server::{serve, WebhookState};
