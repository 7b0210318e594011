// SPDX-FileCopyrightText: 2026 Wireline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent integration for the Wireline bridge.
//!
//! Two layers: [`transport`] speaks newline-delimited JSON-RPC 2.0 to the
//! agent child process over its stdio, and [`session`] owns the thread/turn
//! state machine on top of it (steer-vs-start, spark fallback, model and
//! effort settings, approval policy, and the dynamic notification tools).

pub mod models;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;

pub use session::{SessionManager, TurnHandle, TurnLaunchMode};
pub use transport::{AgentEvent, CodexTransport};
