// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging-provider HTTP client.
//!
//! The provider is a black box with four endpoints: poll inbound messages,
//! send a message, send a typing indicator, and mark a message read. The
//! client retries transient failures with exponential backoff and jitter;
//! typing indicators and read receipts are best-effort.

pub mod client;
pub mod phone;
pub mod types;

pub use client::{ProviderClient, ProviderCredentials};
pub use phone::normalize_number;
pub use types::{InboundMessage, NumberField};
